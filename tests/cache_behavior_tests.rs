//! Integration Tests for the cache engine's public API
//!
//! Exercises the scenarios a library user relies on, across threads and with
//! the background sweep running.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use memcache_engine::cache::CacheStats;
use memcache_engine::clock::ManualClock;
use memcache_engine::{
    spawn_sweep_task, Cache, CacheError, CacheOptions, ChangeSignal, EvictionReason,
    ExpirationPolicy, Priority,
};
use tokio_test::{assert_err, assert_ok};

type Log = Arc<Mutex<Vec<(String, EvictionReason)>>>;

fn manual_cache(size_limit: Option<u64>) -> (Cache<String, u64>, ManualClock) {
    let clock = ManualClock::new();
    let options = CacheOptions {
        size_limit,
        ..CacheOptions::default()
    };
    (Cache::with_clock(options, Arc::new(clock.clone())), clock)
}

fn logged(log: &Log) -> ExpirationPolicy<String, u64> {
    let log = log.clone();
    ExpirationPolicy::new().on_evicted(move |key: &String, _: &u64, reason| {
        log.lock().unwrap().push((key.clone(), reason))
    })
}

fn key(k: &str) -> String {
    k.to_string()
}

#[test]
fn test_absolute_ttl_expires_regardless_of_reads() {
    let (cache, clock) = manual_cache(None);
    let log = Log::default();
    assert_ok!(cache.set(
        key("k"),
        1,
        logged(&log).with_absolute_ttl(Duration::from_secs(2))
    ));

    for _ in 0..3 {
        clock.advance(Duration::from_millis(500));
        assert_eq!(cache.get(&key("k")), Some(1));
    }
    clock.advance(Duration::from_millis(500));

    assert_eq!(cache.get(&key("k")), None);
    assert_eq!(*log.lock().unwrap(), vec![(key("k"), EvictionReason::Expired)]);
}

#[test]
fn test_sliding_entry_expires_after_idle_gap() {
    let (cache, clock) = manual_cache(None);
    let window = Duration::from_secs(4);
    assert_ok!(cache.set(key("k"), 1, ExpirationPolicy::new().with_sliding_window(window)));

    for _ in 0..5 {
        clock.advance(window / 2);
        assert!(cache.get(&key("k")).is_some());
    }
    clock.advance(window + Duration::from_millis(1));

    assert_eq!(cache.get(&key("k")), None);
}

#[test]
fn test_shared_signal_evicts_both_entries_once() {
    let (cache, _) = manual_cache(None);
    let log = Log::default();
    let signal = ChangeSignal::new();

    assert_ok!(cache.set(key("a"), 1, logged(&log).depends_on(signal.clone())));
    assert_ok!(cache.set(key("b"), 2, logged(&log).depends_on(signal.clone())));

    assert_ok!(signal.fire());
    assert_ok!(signal.fire());

    let mut evicted = log.lock().unwrap().clone();
    evicted.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        evicted,
        vec![
            (key("a"), EvictionReason::SignalTriggered),
            (key("b"), EvictionReason::SignalTriggered),
        ]
    );
    assert!(cache.is_empty());
}

#[test]
fn test_combined_signal_evicts_on_any_source() {
    let (cache, _) = manual_cache(None);
    let first = ChangeSignal::new();
    let second = ChangeSignal::new();
    let either = assert_ok!(ChangeSignal::any([&first, &second]));

    assert_ok!(cache.set(key("k"), 1, ExpirationPolicy::new().depends_on(either)));
    assert_ok!(second.fire());

    assert!(!cache.contains_key(&key("k")));
    assert!(!first.is_fired());
}

#[test]
fn test_eviction_chain_of_ten_thousand_entries() {
    let (cache, _) = manual_cache(None);
    let log = Log::default();
    let root = ChangeSignal::new();
    assert_ok!(cache.set(key("link0"), 0, logged(&log).depends_on(root.clone())));
    for i in 1..10_000u64 {
        let previous = cache.eviction_signal(&format!("link{}", i - 1)).unwrap();
        assert_ok!(cache.set(format!("link{i}"), i, logged(&log).depends_on(previous)));
    }

    assert_ok!(root.fire());

    let log = log.lock().unwrap();
    assert!(cache.is_empty());
    assert_eq!(log.len(), 10_000);
    assert_eq!(log.first(), Some(&(key("link0"), EvictionReason::SignalTriggered)));
    assert_eq!(log.last(), Some(&(key("link9999"), EvictionReason::SignalTriggered)));
}

#[test]
fn test_maximum_durations_never_expire() {
    let (cache, clock) = manual_cache(None);
    assert_ok!(cache.set(
        key("k"),
        1,
        ExpirationPolicy::new()
            .with_absolute_ttl(Duration::MAX)
            .with_sliding_window(Duration::MAX),
    ));

    clock.advance(Duration::from_secs(10 * 365 * 24 * 60 * 60));

    assert_eq!(cache.get(&key("k")), Some(1));
    assert_eq!(cache.sweep_expired(), 0);
    assert_eq!(cache.compact(0.0), 0);
    assert!(cache.contains_key(&key("k")));
}

#[test]
fn test_never_remove_survives_pressure_then_expires() {
    let (cache, clock) = manual_cache(Some(2));
    let log = Log::default();
    assert_ok!(cache.set(
        key("pinned"),
        0,
        logged(&log)
            .with_priority(Priority::NeverRemove)
            .with_size(2)
            .with_absolute_ttl(Duration::from_secs(5)),
    ));

    for i in 0..5 {
        assert_ok!(cache.set(format!("filler{i}"), i, logged(&log)));
        assert_eq!(cache.get(&key("pinned")), Some(0));
    }
    assert!(log
        .lock()
        .unwrap()
        .iter()
        .all(|(k, r)| k != "pinned" && *r == EvictionReason::Capacity));

    clock.advance(Duration::from_secs(5));
    assert_eq!(cache.sweep_expired(), 1);
    assert_eq!(
        log.lock().unwrap().last().cloned(),
        Some((key("pinned"), EvictionReason::Expired))
    );
}

#[test]
fn test_get_or_create_across_threads() {
    let (cache, _) = manual_cache(None);
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6u64)
        .map(|i| {
            let cache = cache.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_create(
                    key("shared"),
                    || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        i
                    },
                    ExpirationPolicy::new(),
                )
            })
        })
        .collect();

    let values: Vec<u64> = handles
        .into_iter()
        .map(|handle| assert_ok!(handle.join().unwrap()))
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(values.iter().all(|value| *value == values[0]));
}

#[test]
fn test_factory_error_is_reported() {
    let (cache, _) = manual_cache(None);

    let err = assert_err!(cache.try_get_or_create(
        key("k"),
        || Err::<u64, _>(std::io::Error::other("unreachable backend")),
        ExpirationPolicy::new(),
    ));

    assert!(matches!(err, CacheError::FactoryFailure(_)));
    assert!(cache.is_empty());
}

#[test]
fn test_invalid_inputs_rejected() {
    let (cache, _) = manual_cache(None);
    let disposed = ChangeSignal::new();
    disposed.dispose();

    assert_err!(cache.set(key("a"), 1, ExpirationPolicy::new().with_size(0)));
    assert_err!(cache.set(key("b"), 1, ExpirationPolicy::new().depends_on(disposed.clone())));
    assert_err!(disposed.fire());
    assert!(cache.is_empty());
}

#[test]
fn test_callbacks_see_consistent_cache() {
    let (cache, _) = manual_cache(None);
    let observed = Arc::new(Mutex::new(Vec::new()));
    let (reader, sink) = (cache.clone(), observed.clone());

    assert_ok!(cache.set(
        key("k"),
        1,
        ExpirationPolicy::new().on_evicted(move |k: &String, v: &u64, reason| {
            sink.lock().unwrap().push((*v, reason, reader.get(k)));
        }),
    ));
    assert_ok!(cache.set(key("k"), 2, ExpirationPolicy::new()));

    assert_eq!(
        *observed.lock().unwrap(),
        vec![(1, EvictionReason::Replaced, None)]
    );
    assert_eq!(cache.get(&key("k")), Some(2));
}

#[test]
fn test_stats_snapshot() {
    let (cache, _) = manual_cache(Some(2));
    assert_ok!(cache.set(key("a"), 1, ExpirationPolicy::new()));
    assert_ok!(cache.set(key("b"), 2, ExpirationPolicy::new()));
    assert_ok!(cache.set(key("c"), 3, ExpirationPolicy::new()));
    cache.get(&key("c"));
    cache.get(&key("a"));
    cache.remove(&key("c"));

    let stats = cache.stats();
    assert_eq!(
        stats,
        CacheStats {
            hits: 1,
            misses: 1,
            evictions: 2,
            removed: 1,
            capacity: 1,
            total_entries: 1,
            total_size: 1,
            ..CacheStats::default()
        }
    );
}

#[tokio::test]
async fn test_background_sweep_runs_callbacks() {
    let cache: Cache<String, u64> = Cache::new(CacheOptions::default());
    let log = Log::default();
    assert_ok!(cache.set(
        key("short"),
        1,
        logged(&log).with_sliding_window(Duration::from_millis(50))
    ));

    let sweep = spawn_sweep_task(cache.clone(), Duration::from_millis(25));
    tokio::time::sleep(Duration::from_millis(300)).await;
    sweep.abort();

    assert!(cache.is_empty());
    assert_eq!(*log.lock().unwrap(), vec![(key("short"), EvictionReason::Expired)]);
}
