//! Configuration Module
//!
//! Handles loading server and cache engine configuration from environment
//! variables.

use std::env;
use std::time::Duration;

/// Tuning knobs for the cache engine itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Upper bound on the summed entry sizes; `None` means unbounded
    pub size_limit: Option<u64>,
    /// How often the background sweep looks for expired entries
    pub sweep_interval: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            size_limit: None,
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum summed size of cache entries, unbounded when unset
    pub size_limit: Option<u64>,
    /// Background sweep interval in milliseconds
    pub sweep_interval_ms: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Sliding window in seconds for the cached-time demo entry
    pub default_sliding_secs: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SIZE_LIMIT` - Maximum summed entry size (default: unbounded)
    /// - `SWEEP_INTERVAL_MS` - Sweep frequency in milliseconds (default: 1000)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `DEFAULT_SLIDING_SECS` - Sliding window of the cached time (default: 3)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            size_limit: parse_var("SIZE_LIMIT").or(defaults.size_limit),
            sweep_interval_ms: parse_var("SWEEP_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.sweep_interval_ms),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            default_sliding_secs: parse_var("DEFAULT_SLIDING_SECS")
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.default_sliding_secs),
        }
    }

    /// Engine options derived from this configuration.
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            size_limit: self.size_limit,
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            size_limit: None,
            sweep_interval_ms: 1000,
            server_port: 3000,
            default_sliding_secs: 3,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
