//! Cache Statistics Module
//!
//! Tracks hits, misses and evictions broken down by reason.

use serde::Serialize;

use crate::cache::EvictionReason;

// == Cache Stats ==
/// Snapshot of cache activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Reads that returned a live value
    pub hits: u64,
    /// Reads that found nothing or found an expired entry
    pub misses: u64,
    /// Entries evicted for any reason
    pub evictions: u64,
    pub removed: u64,
    pub replaced: u64,
    pub expired: u64,
    pub signal_triggered: u64,
    pub capacity: u64,
    /// Post-eviction callbacks that panicked
    pub callback_failures: u64,
    /// Current number of live entries
    pub total_entries: usize,
    /// Sum of the sizes of live entries
    pub total_size: u64,
}

impl CacheStats {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Eviction ==
    pub fn record_eviction(&mut self, reason: EvictionReason) {
        self.evictions += 1;
        let counter = match reason {
            EvictionReason::Removed => &mut self.removed,
            EvictionReason::Replaced => &mut self.replaced,
            EvictionReason::Expired => &mut self.expired,
            EvictionReason::SignalTriggered => &mut self.signal_triggered,
            EvictionReason::Capacity => &mut self.capacity,
        };
        *counter += 1;
    }

    pub fn record_callback_failures(&mut self, count: u64) {
        self.callback_failures += count;
    }
}
