//! Expiration Policy Module
//!
//! Options attached to an entry when it is written: deadlines, priority,
//! size, dependency signals and post-eviction callbacks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::ChangeSignal;
use crate::error::{CacheError, Result};

// == Priority ==
/// Relative importance of an entry under capacity pressure.
///
/// Ordered from first to last evicted; `NeverRemove` entries are never chosen
/// by capacity eviction but still expire and can still be removed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    NeverRemove,
}

// == Eviction Reason ==
/// Why an entry left the cache, delivered verbatim to callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvictionReason {
    /// Explicit `remove` or `clear`
    Removed,
    /// Overwritten by a `set` on the same key
    Replaced,
    /// Absolute or sliding deadline passed
    Expired,
    /// A dependency change signal fired
    SignalTriggered,
    /// Chosen by capacity eviction or compaction
    Capacity,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionReason::Removed => "Removed",
            EvictionReason::Replaced => "Replaced",
            EvictionReason::Expired => "Expired",
            EvictionReason::SignalTriggered => "SignalTriggered",
            EvictionReason::Capacity => "Capacity",
        };
        f.write_str(name)
    }
}

/// Callback run once after an entry has been evicted.
pub type PostEvictionCallback<K, V> = Arc<dyn Fn(&K, &V, EvictionReason) + Send + Sync>;

// == Expiration Policy ==
/// How long an entry lives and who hears about its eviction.
pub struct ExpirationPolicy<K, V> {
    /// Entry expires this long after it was written, regardless of reads
    pub absolute_ttl: Option<Duration>,
    /// Entry expires after going unread for this long
    pub sliding_window: Option<Duration>,
    pub priority: Priority,
    /// Units charged against the cache's size limit
    pub size: u64,
    /// Firing any of these evicts the entry
    pub depends_on: Vec<ChangeSignal>,
    /// Run in order after eviction
    pub callbacks: Vec<PostEvictionCallback<K, V>>,
}

impl<K, V> ExpirationPolicy<K, V> {
    /// Policy with no deadlines, `Normal` priority and size 1.
    pub fn new() -> Self {
        Self {
            absolute_ttl: None,
            sliding_window: None,
            priority: Priority::Normal,
            size: 1,
            depends_on: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn with_absolute_ttl(mut self, ttl: Duration) -> Self {
        self.absolute_ttl = Some(ttl);
        self
    }

    pub fn with_sliding_window(mut self, window: Duration) -> Self {
        self.sliding_window = Some(window);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Adds a dependency; the entry is evicted when `signal` fires.
    pub fn depends_on(mut self, signal: ChangeSignal) -> Self {
        self.depends_on.push(signal);
        self
    }

    /// Adds a post-eviction callback.
    pub fn on_evicted<F>(mut self, callback: F) -> Self
    where
        F: Fn(&K, &V, EvictionReason) + Send + Sync + 'static,
    {
        self.callbacks.push(Arc::new(callback));
        self
    }

    /// Adds a post-eviction callback that receives an explicit, caller-owned
    /// state value instead of capturing it.
    pub fn on_evicted_with_state<S>(self, state: S, callback: fn(&K, &V, EvictionReason, &S)) -> Self
    where
        K: 'static,
        V: 'static,
        S: Send + Sync + 'static,
    {
        self.on_evicted(move |key, value, reason| callback(key, value, reason, &state))
    }

    /// Rejects zero-length deadlines and zero sizes.
    pub fn validate(&self) -> Result<()> {
        if self.absolute_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(CacheError::InvalidPolicy(
                "absolute TTL must be positive".to_string(),
            ));
        }
        if self.sliding_window.is_some_and(|window| window.is_zero()) {
            return Err(CacheError::InvalidPolicy(
                "sliding window must be positive".to_string(),
            ));
        }
        if self.size == 0 {
            return Err(CacheError::InvalidPolicy(
                "entry size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl<K, V> Default for ExpirationPolicy<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for ExpirationPolicy<K, V> {
    fn clone(&self) -> Self {
        Self {
            absolute_ttl: self.absolute_ttl,
            sliding_window: self.sliding_window,
            priority: self.priority,
            size: self.size,
            depends_on: self.depends_on.clone(),
            callbacks: self.callbacks.clone(),
        }
    }
}

impl<K, V> fmt::Debug for ExpirationPolicy<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpirationPolicy")
            .field("absolute_ttl", &self.absolute_ttl)
            .field("sliding_window", &self.sliding_window)
            .field("priority", &self.priority)
            .field("size", &self.size)
            .field("depends_on", &self.depends_on)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
