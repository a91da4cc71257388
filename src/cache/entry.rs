//! Cache Entry Module
//!
//! Defines a single cached record: its value, expiration settings and the
//! `Live → Evicting → Evicted` lifecycle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::cache::{
    ChangeSignal, EvictionReason, ExpirationPolicy, PostEvictionCallback, Priority, Registration,
};

// == Entry State ==
/// Lifecycle of an entry. Only one transition out of `Live` ever succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum EntryState {
    Live = 0,
    Evicting = 1,
    Evicted = 2,
}

impl EntryState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => EntryState::Live,
            1 => EntryState::Evicting,
            _ => EntryState::Evicted,
        }
    }
}

// == Cache Entry ==
/// A stored key/value pair and everything needed to expire it.
pub(crate) struct CacheEntry<K, V> {
    /// Distinguishes successive entries written under the same key
    pub(crate) generation: u64,
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) created_at: Instant,
    pub(crate) absolute_ttl: Option<Duration>,
    pub(crate) sliding_window: Option<Duration>,
    pub(crate) priority: Priority,
    pub(crate) size: u64,
    pub(crate) depends_on: Vec<ChangeSignal>,
    /// Fired after this entry's callbacks have run
    pub(crate) eviction_signal: ChangeSignal,
    last_access: Mutex<Instant>,
    state: AtomicU8,
    reason: OnceLock<EvictionReason>,
    callbacks: Mutex<Vec<PostEvictionCallback<K, V>>>,
    registrations: Mutex<Vec<Registration>>,
}

impl<K, V> CacheEntry<K, V> {
    // == Constructor ==
    /// Creates a live entry written at `now`.
    pub(crate) fn new(
        generation: u64,
        key: K,
        value: V,
        policy: ExpirationPolicy<K, V>,
        now: Instant,
    ) -> Self {
        Self {
            generation,
            key,
            value,
            created_at: now,
            absolute_ttl: policy.absolute_ttl,
            sliding_window: policy.sliding_window,
            priority: policy.priority,
            size: policy.size,
            depends_on: policy.depends_on,
            eviction_signal: ChangeSignal::new(),
            last_access: Mutex::new(now),
            state: AtomicU8::new(EntryState::Live as u8),
            reason: OnceLock::new(),
            callbacks: Mutex::new(policy.callbacks),
            registrations: Mutex::new(Vec::new()),
        }
    }

    // == Access ==
    pub(crate) fn last_access(&self) -> Instant {
        *self.last_access.lock()
    }

    /// Records a successful read, restarting the sliding window.
    pub(crate) fn touch(&self, now: Instant) {
        let mut last_access = self.last_access.lock();
        if now > *last_access {
            *last_access = now;
        }
    }

    // == Lifecycle ==
    pub(crate) fn state(&self) -> EntryState {
        EntryState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn is_live(&self) -> bool {
        self.state() == EntryState::Live
    }

    /// Moves `Live → Evicting` and records `reason`.
    ///
    /// Returns false if some other trigger already won.
    pub(crate) fn begin_eviction(&self, reason: EvictionReason) -> bool {
        let won = self
            .state
            .compare_exchange(
                EntryState::Live as u8,
                EntryState::Evicting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            let _ = self.reason.set(reason);
        }
        won
    }

    pub(crate) fn finish_eviction(&self) {
        self.state.store(EntryState::Evicted as u8, Ordering::Release);
    }

    pub(crate) fn eviction_reason(&self) -> Option<EvictionReason> {
        self.reason.get().copied()
    }

    // == Callbacks ==
    /// Appends a callback; refused once eviction has begun.
    pub(crate) fn add_callback(&self, callback: PostEvictionCallback<K, V>) -> bool {
        let mut callbacks = self.callbacks.lock();
        if !self.is_live() {
            return false;
        }
        callbacks.push(callback);
        true
    }

    pub(crate) fn take_callbacks(&self) -> Vec<PostEvictionCallback<K, V>> {
        std::mem::take(&mut *self.callbacks.lock())
    }

    // == Dependency Registrations ==
    /// Keeps a dependency observer so it can be detached on eviction.
    pub(crate) fn hold_registration(&self, registration: Registration) {
        let mut registrations = self.registrations.lock();
        if self.is_live() {
            registrations.push(registration);
            return;
        }
        drop(registrations);
        registration.dispose();
    }

    pub(crate) fn take_registrations(&self) -> Vec<Registration> {
        std::mem::take(&mut *self.registrations.lock())
    }
}
