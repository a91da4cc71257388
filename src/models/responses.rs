//! Response DTOs for the sample web surface
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::models::DemoValue;

/// Response body of the cached-time endpoints (`/time`, `/time/cached`,
/// `/time/get-or-create`)
#[derive(Debug, Clone, Serialize)]
pub struct TimeResponse {
    /// The key the time is cached under
    pub key: String,
    /// The cached time
    pub time: String,
    /// True if this request created the entry
    pub created: bool,
}

impl TimeResponse {
    pub fn new(key: impl Into<String>, value: &DemoValue, created: bool) -> Self {
        Self {
            key: key.into(),
            time: value.to_string(),
            created,
        }
    }
}

/// One cache entry as seen by a check endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryReport {
    pub key: String,
    /// Rendered value, `None` if the key is absent
    pub value: Option<String>,
}

impl EntryReport {
    pub fn new(key: impl Into<String>, value: Option<&DemoValue>) -> Self {
        Self {
            key: key.into(),
            value: value.map(ToString::to_string),
        }
    }
}

/// Response body of the check endpoints (`/eviction-time`, `/dependency`,
/// `/cancel`)
#[derive(Debug, Clone, Serialize)]
pub struct CheckResponse {
    /// Entries watched by the scenario
    pub entries: Vec<EntryReport>,
    /// Message left by the last post-eviction callback, if any
    pub message: Option<String>,
    /// True if this request fired (or scheduled) the scenario's signal
    pub cancelled: bool,
}

/// Response body for `DELETE /time`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was removed
    pub key: String,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' removed", key),
            key,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of evictions, all reasons
    pub evictions: u64,
    pub removed: u64,
    pub replaced: u64,
    pub expired: u64,
    pub signal_triggered: u64,
    pub capacity: u64,
    /// Post-eviction callbacks that panicked
    pub callback_failures: u64,
    /// Current number of entries in cache
    pub total_entries: usize,
    /// Summed size of the current entries
    pub total_size: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            removed: stats.removed,
            replaced: stats.replaced,
            expired: stats.expired,
            signal_triggered: stats.signal_triggered,
            capacity: stats.capacity,
            callback_failures: stats.callback_failures,
            total_entries: stats.total_entries,
            total_size: stats.total_size,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
