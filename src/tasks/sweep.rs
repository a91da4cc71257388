//! Expiration Sweep Task
//!
//! Background task that periodically evicts expired cache entries, so entries
//! that are never read again are still reclaimed and their callbacks still run.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{Cache, CacheKey, CacheValue};

/// Spawns a background task that sweeps `cache` every `interval`.
///
/// The sweep runs eviction callbacks on the task's worker thread. The returned
/// handle can be used to abort the task during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache: Cache<String, String> = Cache::new(CacheOptions::default());
/// let sweep_handle = spawn_sweep_task(cache.clone(), Duration::from_secs(1));
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task<K, V>(cache: Cache<K, V>, interval: Duration) -> JoinHandle<()>
where
    K: CacheKey,
    V: CacheValue,
{
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "Starting expiration sweep task");

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let removed = cache.sweep_expired();
            if removed > 0 {
                info!("Expiration sweep: evicted {} entries", removed);
            } else {
                debug!("Expiration sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{EvictionReason, ExpirationPolicy};
    use crate::config::CacheOptions;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn cache() -> Cache<String, String> {
        Cache::new(CacheOptions::default())
    }

    #[tokio::test]
    async fn test_sweep_task_evicts_unread_entries() {
        let cache = cache();
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let sink = reasons.clone();
        let policy = ExpirationPolicy::new()
            .with_absolute_ttl(Duration::from_millis(100))
            .on_evicted(move |_, _, reason| sink.lock().push(reason));
        cache
            .set("expire_soon".to_string(), "value".to_string(), policy)
            .unwrap();

        let handle = spawn_sweep_task(cache.clone(), Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(cache.len(), 0, "Expired entry should have been swept");
        assert_eq!(*reasons.lock(), vec![EvictionReason::Expired]);

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_preserves_valid_entries() {
        let cache = cache();
        cache
            .set(
                "long_lived".to_string(),
                "value".to_string(),
                ExpirationPolicy::new().with_absolute_ttl(Duration::from_secs(3600)),
            )
            .unwrap();

        let handle = spawn_sweep_task(cache.clone(), Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.get(&"long_lived".to_string()), Some("value".to_string()));

        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_task_can_be_aborted() {
        let handle = spawn_sweep_task(cache(), Duration::from_millis(50));

        // Abort immediately
        handle.abort();

        // Wait a bit and verify task is finished
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
