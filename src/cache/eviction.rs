//! Eviction Pipeline
//!
//! An entry leaves the mapping inside the store's critical section, where its
//! [`Eviction`] is created. User code (callbacks and the entry's eviction
//! signal) runs afterwards in [`Eviction::run`] with no lock held, so
//! callbacks may call back into the cache.

use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use crate::cache::entry::CacheEntry;
use crate::cache::EvictionReason;

// == Eviction ==
/// An entry that has been detached from the store and awaits notification.
pub(crate) struct Eviction<K, V> {
    entry: Arc<CacheEntry<K, V>>,
    reason: EvictionReason,
}

impl<K, V> Eviction<K, V>
where
    K: Debug,
{
    /// Wraps an entry that has just moved to `Evicting`.
    pub(crate) fn new(entry: Arc<CacheEntry<K, V>>, reason: EvictionReason) -> Self {
        debug_assert_eq!(entry.eviction_reason(), Some(reason));
        Self { entry, reason }
    }

    pub(crate) fn reason(&self) -> EvictionReason {
        self.reason
    }

    // == Run ==
    /// Detaches dependency observers, runs every callback once in
    /// registration order, then fires the entry's eviction signal.
    ///
    /// Returns the number of callbacks that panicked.
    pub(crate) fn run(self) -> u64 {
        let Self { entry, reason } = self;

        for registration in entry.take_registrations() {
            registration.dispose();
        }

        let mut failures = 0;
        for callback in entry.take_callbacks() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                callback(&entry.key, &entry.value, reason)
            }));
            if outcome.is_err() {
                failures += 1;
                error!(key = ?entry.key, %reason, "Post-eviction callback panicked");
            }
        }

        entry.finish_eviction();
        debug!(key = ?entry.key, %reason, generation = entry.generation, "Entry evicted");

        if let Err(err) = entry.eviction_signal.fire() {
            debug!(key = ?entry.key, %err, "Eviction signal not fired");
        }

        failures
    }
}
