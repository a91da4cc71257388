//! LRU Tracker Module
//!
//! Orders live keys for capacity eviction: lowest priority first, and within
//! a priority the least recently used first.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::cache::Priority;

// == LRU Tracker ==
/// Tracks access order per priority for capacity eviction.
///
/// Every touch stamps the key with a fresh, increasing sequence number, so
/// iterating `order` visits keys by `(priority, recency)`.
#[derive(Debug)]
pub(crate) struct LruTracker<K> {
    order: BTreeMap<(Priority, u64), K>,
    slots: HashMap<K, (Priority, u64)>,
    next_stamp: u64,
}

impl<K> LruTracker<K>
where
    K: Hash + Eq + Clone,
{
    // == Constructor ==
    pub(crate) fn new() -> Self {
        Self {
            order: BTreeMap::new(),
            slots: HashMap::new(),
            next_stamp: 0,
        }
    }

    // == Touch ==
    /// Marks a key as most recently used within `priority`.
    pub(crate) fn touch(&mut self, key: &K, priority: Priority) {
        self.remove(key);
        let slot = (priority, self.next_stamp);
        self.next_stamp += 1;
        self.order.insert(slot, key.clone());
        self.slots.insert(key.clone(), slot);
    }

    // == Remove ==
    pub(crate) fn remove(&mut self, key: &K) {
        if let Some(slot) = self.slots.remove(key) {
            self.order.remove(&slot);
        }
    }

    // == Eviction Candidates ==
    /// Keys in eviction order, skipping `NeverRemove`.
    pub(crate) fn candidates(&self) -> impl Iterator<Item = &K> {
        self.order
            .iter()
            .take_while(|((priority, _), _)| *priority < Priority::NeverRemove)
            .map(|(_, key)| key)
    }

    // == Length ==
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }
}
