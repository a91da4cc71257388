//! Cache Store Module
//!
//! Main cache engine combining the key → entry mapping with expiration
//! evaluation, dependency signals, capacity eviction and post-eviction
//! callbacks.

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::entry::CacheEntry;
use crate::cache::eviction::Eviction;
use crate::cache::expiration;
use crate::cache::lru::LruTracker;
use crate::cache::{CacheStats, ChangeSignal, EvictionReason, ExpirationPolicy};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheOptions;
use crate::error::{CacheError, Result};

/// Bounds required of cache keys.
pub trait CacheKey: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Hash + Eq + Clone + Debug + Send + Sync + 'static {}

/// Bounds required of cached values.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}

// == Store State ==
/// Everything guarded by the store lock.
struct StoreState<K, V> {
    entries: HashMap<K, Arc<CacheEntry<K, V>>>,
    lru: LruTracker<K>,
    stats: CacheStats,
    total_size: u64,
}

impl<K: CacheKey, V> StoreState<K, V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            total_size: 0,
        }
    }

    fn install(&mut self, entry: Arc<CacheEntry<K, V>>) {
        self.lru.touch(&entry.key, entry.priority);
        self.total_size += entry.size;
        self.entries.insert(entry.key.clone(), entry);
    }

    /// Takes `entry` out of the mapping if this trigger wins its eviction.
    ///
    /// Every entry in the mapping is `Live` and eviction only begins under the
    /// store lock, so a successful transition always removes a mapped entry.
    fn detach(
        &mut self,
        entry: &Arc<CacheEntry<K, V>>,
        reason: EvictionReason,
    ) -> Option<Eviction<K, V>> {
        if !entry.begin_eviction(reason) {
            return None;
        }

        let mapped = self
            .entries
            .get(&entry.key)
            .is_some_and(|live| live.generation == entry.generation);
        if mapped {
            self.entries.remove(&entry.key);
            self.lru.remove(&entry.key);
            self.total_size = self.total_size.saturating_sub(entry.size);
        }

        self.stats.record_eviction(reason);
        Some(Eviction::new(entry.clone(), reason))
    }

    fn detach_key(&mut self, key: &K, reason: EvictionReason) -> Option<Eviction<K, V>> {
        let entry = self.entries.get(key).cloned()?;
        self.detach(&entry, reason)
    }

    /// Detaches every entry the evaluator reports as expired at `now`.
    fn detach_expired(&mut self, now: std::time::Instant) -> Vec<Eviction<K, V>> {
        let expired: Vec<_> = self
            .entries
            .values()
            .filter_map(|entry| {
                expiration::evaluate(entry, now)
                    .eviction_reason()
                    .map(|reason| (entry.clone(), reason))
            })
            .collect();

        expired
            .into_iter()
            .filter_map(|(entry, reason)| self.detach(&entry, reason))
            .collect()
    }

    /// Evicts in capacity order until the total size is at most `target`.
    fn shrink_to(&mut self, target: u64, evictions: &mut Vec<Eviction<K, V>>) {
        while self.total_size > target {
            let Some(key) = self.lru.candidates().next().cloned() else {
                break;
            };
            match self.detach_key(&key, EvictionReason::Capacity) {
                Some(eviction) => evictions.push(eviction),
                None => self.lru.remove(&key),
            }
        }
    }

    fn snapshot(&self) -> CacheStats {
        debug_assert_eq!(self.lru.len(), self.entries.len());
        let mut stats = self.stats.clone();
        stats.total_entries = self.entries.len();
        stats.total_size = self.total_size;
        stats
    }
}

type Gates<K> = Mutex<HashMap<K, Arc<Mutex<()>>>>;

struct CacheInner<K, V> {
    state: Mutex<StoreState<K, V>>,
    /// Per-key gates serializing `get_or_create` factories
    creating: Gates<K>,
    options: CacheOptions,
    clock: Arc<dyn Clock>,
    next_generation: AtomicU64,
}

// == Cache ==
/// Thread-safe in-memory cache.
///
/// Cloning is cheap; every clone operates on the same entries.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use memcache_engine::cache::{Cache, ExpirationPolicy};
/// use memcache_engine::CacheOptions;
///
/// let cache: Cache<String, u32> = Cache::new(CacheOptions::default());
/// let policy = ExpirationPolicy::new().with_sliding_window(Duration::from_secs(3));
/// cache.set("answer".to_string(), 42, policy).unwrap();
/// assert_eq!(cache.get(&"answer".to_string()), Some(42));
/// ```
pub struct Cache<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Non-owning handle to a [`Cache`].
///
/// Give this to callbacks stored inside the cache they write to; a strong
/// clone there would keep the cache alive forever.
pub struct WeakCache<K, V> {
    inner: Weak<CacheInner<K, V>>,
}

impl<K, V> WeakCache<K, V> {
    /// Returns the cache if it is still alive.
    pub fn upgrade(&self) -> Option<Cache<K, V>> {
        self.inner.upgrade().map(|inner| Cache { inner })
    }
}

impl<K, V> Clone for WeakCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Debug for WeakCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCache")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// == Gate Release ==
/// Drops a `get_or_create` gate and forgets it once nobody else holds it,
/// on return and on unwind alike.
struct GateRelease<'a, K: CacheKey> {
    creating: &'a Gates<K>,
    key: K,
    gate: Option<Arc<Mutex<()>>>,
}

impl<'a, K: CacheKey> GateRelease<'a, K> {
    fn acquire(creating: &'a Gates<K>, key: K) -> Self {
        let gate = creating.lock().entry(key.clone()).or_default().clone();
        Self {
            creating,
            key,
            gate: Some(gate),
        }
    }
}

impl<K: CacheKey> Drop for GateRelease<'_, K> {
    fn drop(&mut self) {
        // Gates are only cloned and released under this lock, so a count of
        // one means nobody else is waiting on it.
        let mut creating = self.creating.lock();
        drop(self.gate.take());
        if creating
            .get(&self.key)
            .is_some_and(|current| Arc::strong_count(current) == 1)
        {
            creating.remove(&self.key);
        }
    }
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> {
    // == Constructor ==
    /// Creates a cache driven by the system clock.
    pub fn new(options: CacheOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    /// Creates a cache driven by a custom clock (useful for testing).
    pub fn with_clock(options: CacheOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(StoreState::new()),
                creating: Mutex::new(HashMap::new()),
                options,
                clock,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    /// Returns a handle that does not keep the cache alive.
    pub fn downgrade(&self) -> WeakCache<K, V> {
        WeakCache {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // == Get ==
    /// Returns a clone of the live value for `key`.
    ///
    /// An entry found expired is evicted before this returns `None`. A hit
    /// restarts the entry's sliding window.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lookup(key, true)
    }

    fn lookup(&self, key: &K, record: bool) -> Option<V> {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();

        let Some(entry) = state.entries.get(key).cloned() else {
            if record {
                state.stats.record_miss();
            }
            return None;
        };

        match expiration::evaluate(&entry, now).eviction_reason() {
            None => {
                entry.touch(now);
                state.lru.touch(key, entry.priority);
                if record {
                    state.stats.record_hit();
                }
                Some(entry.value.clone())
            }
            Some(reason) => {
                if record {
                    state.stats.record_miss();
                }
                let eviction = state.detach(&entry, reason);
                drop(state);
                self.dispatch(eviction);
                None
            }
        }
    }

    // == Set ==
    /// Stores `value` under `key`.
    ///
    /// A live entry for `key` is evicted with `Replaced`, and its callbacks
    /// have run before the new entry becomes visible. Dependency signals are
    /// watched from then on, so firing one evicts the entry right away.
    pub fn set(&self, key: K, value: V, policy: ExpirationPolicy<K, V>) -> Result<()> {
        policy.validate()?;
        if let Some(signal) = policy.depends_on.iter().find(|s| s.is_disposed()) {
            return Err(CacheError::InvalidState(format!(
                "dependency signal {} is disposed",
                signal.id()
            )));
        }

        let entry = loop {
            let mut state = self.inner.state.lock();

            if let Some(existing) = state.entries.get(&key).cloned() {
                if policy
                    .depends_on
                    .iter()
                    .any(|signal| signal.derives_from(&existing.eviction_signal))
                {
                    return Err(CacheError::DependencyCycle(format!(
                        "{key:?} cannot depend on the eviction of the entry it replaces"
                    )));
                }
                let replaced = state.detach(&existing, EvictionReason::Replaced);
                drop(state);
                self.dispatch(replaced);
                continue;
            }

            let now = self.inner.clock.now();
            let entry = Arc::new(CacheEntry::new(
                self.inner.next_generation.fetch_add(1, Ordering::Relaxed),
                key,
                value,
                policy,
                now,
            ));
            state.install(entry.clone());
            let victims = self.enforce_size_limit(&mut state);
            drop(state);

            self.dispatch(victims);
            break entry;
        };

        debug!(key = ?entry.key, generation = entry.generation, "Entry stored");
        self.watch_dependencies(&entry)
    }

    fn watch_dependencies(&self, entry: &Arc<CacheEntry<K, V>>) -> Result<()> {
        for signal in &entry.depends_on {
            let cache = self.downgrade();
            let key = entry.key.clone();
            let generation = entry.generation;

            let registered = signal.register(move || {
                if let Some(cache) = cache.upgrade() {
                    cache.evict_generation(
                        &key,
                        generation,
                        EvictionReason::SignalTriggered,
                    );
                }
            });

            match registered {
                Ok(registration) => entry.hold_registration(registration),
                Err(err) => {
                    let removed = self.inner.state.lock().detach(entry, EvictionReason::Removed);
                    self.dispatch(removed);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn evict_generation(&self, key: &K, generation: u64, reason: EvictionReason) {
        let eviction = {
            let mut state = self.inner.state.lock();
            match state.entries.get(key).cloned() {
                Some(entry) if entry.generation == generation => state.detach(&entry, reason),
                _ => None,
            }
        };
        self.dispatch(eviction);
    }

    fn enforce_size_limit(&self, state: &mut StoreState<K, V>) -> Vec<Eviction<K, V>> {
        let mut evictions = Vec::new();
        let Some(limit) = self.inner.options.size_limit else {
            return evictions;
        };

        if state.total_size > limit {
            state.shrink_to(limit, &mut evictions);
            if state.total_size > limit {
                warn!(
                    total_size = state.total_size,
                    limit, "Size limit exceeded by entries exempt from capacity eviction"
                );
            }
        }
        evictions
    }

    // == Get Or Create ==
    /// Returns the live value for `key`, creating it with `factory` on a miss.
    ///
    /// Concurrent callers for the same key wait for a single factory run and
    /// receive the value it produced.
    pub fn get_or_create<F>(&self, key: K, factory: F, policy: ExpirationPolicy<K, V>) -> Result<V>
    where
        F: FnOnce() -> V,
    {
        self.try_get_or_create(
            key,
            || Ok::<V, std::convert::Infallible>(factory()),
            policy,
        )
    }

    /// Like [`Cache::get_or_create`] with a fallible factory.
    ///
    /// A failing factory leaves the key absent and surfaces as
    /// `FactoryFailure` to this caller only; a later call may retry.
    pub fn try_get_or_create<F, E>(
        &self,
        key: K,
        factory: F,
        policy: ExpirationPolicy<K, V>,
    ) -> Result<V>
    where
        F: FnOnce() -> std::result::Result<V, E>,
        E: Into<anyhow::Error>,
    {
        if let Some(value) = self.lookup(&key, true) {
            return Ok(value);
        }

        let release = GateRelease::acquire(&self.inner.creating, key.clone());
        let _guard = release.gate.as_deref().map(|gate| gate.lock());
        let outcome = match self.lookup(&key, false) {
            Some(value) => Ok(value),
            None => match factory() {
                Ok(value) => self.set(key.clone(), value.clone(), policy).map(|()| value),
                Err(err) => {
                    let err = err.into();
                    warn!(key = ?key, error = %err, "Cache entry factory failed");
                    Err(CacheError::FactoryFailure(err))
                }
            },
        };
        drop(_guard);
        drop(release);

        outcome
    }

    // == Remove ==
    /// Evicts `key` with `Removed`; absent keys are ignored.
    pub fn remove(&self, key: &K) {
        let eviction = self.inner.state.lock().detach_key(key, EvictionReason::Removed);
        if eviction.is_some() {
            debug!(key = ?key, "Entry removed");
        }
        self.dispatch(eviction);
    }

    /// Evicts every entry with `Removed`.
    pub fn clear(&self) {
        let evictions: Vec<_> = {
            let mut state = self.inner.state.lock();
            let entries: Vec<_> = state.entries.values().cloned().collect();
            entries
                .iter()
                .filter_map(|entry| state.detach(entry, EvictionReason::Removed))
                .collect()
        };
        self.dispatch(evictions);
    }

    // == Callbacks And Signals ==
    /// Adds a post-eviction callback to the live entry for `key`.
    ///
    /// Returns false if there is no live entry to attach it to.
    pub fn register_eviction_callback<F>(&self, key: &K, callback: F) -> bool
    where
        F: Fn(&K, &V, EvictionReason) + Send + Sync + 'static,
    {
        let entry = self.inner.state.lock().entries.get(key).cloned();
        entry.is_some_and(|entry| entry.add_callback(Arc::new(callback)))
    }

    /// Signal fired once the current entry for `key` has been evicted and its
    /// callbacks have run.
    ///
    /// Pass it to another entry's `depends_on` to chain invalidation.
    pub fn eviction_signal(&self, key: &K) -> Option<ChangeSignal> {
        self.inner
            .state
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.eviction_signal.clone())
    }

    // == Maintenance ==
    /// Evicts every entry that is expired right now, returning how many.
    pub fn sweep_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let evictions = self.inner.state.lock().detach_expired(now);
        let count = evictions.len();
        self.dispatch(evictions);
        count
    }

    /// Removes expired entries, then evicts in capacity order until
    /// `percentage` (0.0 to 1.0) of the total size has been released.
    pub fn compact(&self, percentage: f64) -> usize {
        let percentage = percentage.clamp(0.0, 1.0);
        let now = self.inner.clock.now();

        let evictions = {
            let mut state = self.inner.state.lock();
            let release = (state.total_size as f64 * percentage).ceil() as u64;
            let target = state.total_size.saturating_sub(release);
            let mut evictions = state.detach_expired(now);
            state.shrink_to(target, &mut evictions);
            evictions
        };

        let count = evictions.len();
        debug!(count, percentage, "Cache compacted");
        self.dispatch(evictions);
        count
    }

    // == Inspection ==
    /// Returns true if `key` holds a live, unexpired entry. Does not count
    /// as a read.
    pub fn contains_key(&self, key: &K) -> bool {
        let now = self.inner.clock.now();
        self.inner
            .state
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| !expiration::evaluate(entry, now).is_expired())
    }

    /// Returns the number of entries in the mapping, expired or not.
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.inner.state.lock().snapshot()
    }

    // == Dispatch ==
    /// Runs the notification phase of detached entries, outside the lock.
    fn dispatch<I>(&self, evictions: I)
    where
        I: IntoIterator<Item = Eviction<K, V>>,
    {
        let failures: u64 = evictions.into_iter().map(Eviction::run).sum();
        if failures > 0 {
            self.inner
                .state
                .lock()
                .stats
                .record_callback_failures(failures);
        }
    }
}

impl<K, V> Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("options", &self.inner.options)
            .field("clock", &self.inner.clock)
            .finish_non_exhaustive()
    }
}
