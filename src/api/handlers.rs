//! API Handlers
//!
//! HTTP request handlers for the sample web surface. Each scenario stores
//! entries with a different expiration policy and reports what the cache
//! holds afterwards.

use std::time::Duration;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Local;
use tracing::{info, warn};

use crate::cache::{Cache, ChangeSignal, EvictionReason, ExpirationPolicy, Priority, WeakCache};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    CheckQuery, CheckResponse, DeleteResponse, DemoCache, DemoValue, EntryReport, HealthResponse,
    StatsResponse, TimeResponse,
};

/// Cache keys used by the scenarios.
pub mod keys {
    pub const TIME: &str = "time";
    pub const EVICTION_TIME: &str = "eviction_time";
    pub const EVICTION_MESSAGE: &str = "eviction_time_message";
    pub const DEPENDENCY_SIGNAL: &str = "dependency_signal";
    pub const DEPENDENCY_SOURCE: &str = "dependency_source";
    pub const DEPENDENCY_DEPENDENT: &str = "dependency_dependent";
    pub const DEPENDENCY_MESSAGE: &str = "dependency_message";
    pub const CANCEL_SIGNAL: &str = "cancel_signal";
    pub const CANCEL_TICKS: &str = "cancel_ticks";
    pub const CANCEL_MESSAGE: &str = "cancel_message";
}

const EVICTION_TIME_ABSOLUTE: Duration = Duration::from_secs(6);
const EVICTION_TIME_SLIDING: Duration = Duration::from_secs(2);
const CANCEL_DELAY: Duration = Duration::from_millis(100);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Cache shared by every request
    pub cache: DemoCache,
    /// Sliding window of the cached-time entry
    pub sliding_window: Duration,
}

impl AppState {
    /// Creates a new AppState with the given cache.
    pub fn new(cache: DemoCache, sliding_window: Duration) -> Self {
        Self {
            cache,
            sliding_window,
        }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Cache::new(config.cache_options()),
            Duration::from_secs(config.default_sliding_secs),
        )
    }

    fn time_policy(&self) -> ExpirationPolicy<String, DemoValue> {
        ExpirationPolicy::new().with_sliding_window(self.sliding_window)
    }
}

// == Helpers ==
fn lookup(cache: &DemoCache, key: &str) -> Option<DemoValue> {
    cache.get(&key.to_string())
}

/// Stores `message` under `key` if the cache is still alive. Runs inside
/// post-eviction callbacks, so failures are logged rather than returned.
fn leave_message(cache: &WeakCache<String, DemoValue>, key: &str, message: String) {
    let Some(cache) = cache.upgrade() else {
        return;
    };
    if let Err(err) = cache.set(key.to_string(), DemoValue::Text(message), ExpirationPolicy::new())
    {
        warn!(key, error = %err, "Failed to store eviction message");
    }
}

fn record_eviction_time(
    key: &String,
    value: &DemoValue,
    reason: EvictionReason,
    cache: &WeakCache<String, DemoValue>,
) {
    leave_message(
        cache,
        keys::EVICTION_MESSAGE,
        format!("key: {key}, Value: {value}, Reason: {reason}"),
    );
}

fn stored_signal(cache: &DemoCache, key: &str) -> Result<ChangeSignal> {
    lookup(cache, key)
        .and_then(|value| value.as_signal().cloned())
        .ok_or_else(|| CacheError::NotFound(key.to_string()))
}

fn check(cache: &DemoCache, watched: &[&str], message_key: &str, cancelled: bool) -> CheckResponse {
    let entries = watched
        .iter()
        .map(|key| EntryReport::new(*key, lookup(cache, key).as_ref()))
        .collect();
    let message = lookup(cache, message_key).and_then(|value| value.as_text().map(str::to_string));

    CheckResponse {
        entries,
        message,
        cancelled,
    }
}

// == Cached Time ==
/// Handler for GET /time
///
/// Returns the cached time, storing the current time with a sliding window
/// on a miss.
pub async fn time_handler(State(state): State<AppState>) -> Result<Json<TimeResponse>> {
    if let Some(value) = lookup(&state.cache, keys::TIME) {
        return Ok(Json(TimeResponse::new(keys::TIME, &value, false)));
    }

    let value = DemoValue::Time(Local::now());
    state
        .cache
        .set(keys::TIME.to_string(), value.clone(), state.time_policy())?;

    Ok(Json(TimeResponse::new(keys::TIME, &value, true)))
}

/// Handler for GET /time/cached
///
/// Reads the cached time without creating it.
pub async fn cached_time_handler(State(state): State<AppState>) -> Result<Json<TimeResponse>> {
    let value = lookup(&state.cache, keys::TIME)
        .ok_or_else(|| CacheError::NotFound(keys::TIME.to_string()))?;

    Ok(Json(TimeResponse::new(keys::TIME, &value, false)))
}

/// Handler for GET /time/get-or-create
pub async fn get_or_create_time_handler(
    State(state): State<AppState>,
) -> Result<Json<TimeResponse>> {
    let mut created = false;
    let value = state.cache.get_or_create(
        keys::TIME.to_string(),
        || {
            created = true;
            DemoValue::Time(Local::now())
        },
        state.time_policy(),
    )?;

    Ok(Json(TimeResponse::new(keys::TIME, &value, created)))
}

/// Handler for DELETE /time
pub async fn remove_time_handler(State(state): State<AppState>) -> Json<DeleteResponse> {
    state.cache.remove(&keys::TIME.to_string());
    Json(DeleteResponse::new(keys::TIME))
}

// == Eviction Time ==
/// Handler for POST /eviction-time
///
/// Pins the current time with both deadlines and a callback that leaves a
/// message once the entry is gone.
pub async fn set_eviction_time_handler(
    State(state): State<AppState>,
) -> Result<Json<CheckResponse>> {
    let policy = ExpirationPolicy::new()
        .with_absolute_ttl(EVICTION_TIME_ABSOLUTE)
        .with_sliding_window(EVICTION_TIME_SLIDING)
        .with_priority(Priority::NeverRemove)
        .on_evicted_with_state(state.cache.downgrade(), record_eviction_time);

    state.cache.set(
        keys::EVICTION_TIME.to_string(),
        DemoValue::Time(Local::now()),
        policy,
    )?;
    // Don't show the message of a previous run
    state.cache.remove(&keys::EVICTION_MESSAGE.to_string());

    Ok(Json(check(
        &state.cache,
        &[keys::EVICTION_TIME],
        keys::EVICTION_MESSAGE,
        false,
    )))
}

/// Handler for GET /eviction-time
pub async fn check_eviction_time_handler(State(state): State<AppState>) -> Json<CheckResponse> {
    Json(check(
        &state.cache,
        &[keys::EVICTION_TIME],
        keys::EVICTION_MESSAGE,
        false,
    ))
}

// == Dependency ==
/// Handler for POST /dependency
///
/// Stores a signal, a source entry that depends on it, and a dependent entry
/// that depends on the source's eviction.
pub async fn set_dependency_handler(State(state): State<AppState>) -> Result<Json<CheckResponse>> {
    let cache = &state.cache;
    let signal = ChangeSignal::new();
    cache.set(
        keys::DEPENDENCY_SIGNAL.to_string(),
        DemoValue::Signal(signal.clone()),
        ExpirationPolicy::new(),
    )?;

    let now = Local::now();
    cache.set(
        keys::DEPENDENCY_SOURCE.to_string(),
        DemoValue::Time(now),
        ExpirationPolicy::new().depends_on(signal),
    )?;
    let source_evicted = cache
        .eviction_signal(&keys::DEPENDENCY_SOURCE.to_string())
        .ok_or_else(|| CacheError::Internal("source entry vanished while linking".to_string()))?;

    let writer = cache.downgrade();
    cache.set(
        keys::DEPENDENCY_DEPENDENT.to_string(),
        DemoValue::Time(now),
        ExpirationPolicy::new()
            .depends_on(source_evicted)
            .on_evicted(move |key, value, reason| {
                leave_message(
                    &writer,
                    keys::DEPENDENCY_MESSAGE,
                    format!("key: {key}, Value: {value}, Reason: {reason}"),
                );
            }),
    )?;
    cache.remove(&keys::DEPENDENCY_MESSAGE.to_string());

    Ok(Json(check(
        cache,
        &[keys::DEPENDENCY_SOURCE, keys::DEPENDENCY_DEPENDENT],
        keys::DEPENDENCY_MESSAGE,
        false,
    )))
}

/// Handler for GET /dependency
///
/// With `?cancel=1` the stored signal fires first, evicting the source and,
/// through it, the dependent entry.
pub async fn check_dependency_handler(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>> {
    let cancelled = query.wants_cancel();
    if cancelled {
        stored_signal(&state.cache, keys::DEPENDENCY_SIGNAL)?.fire()?;
        info!("Dependency signal fired");
    }

    Ok(Json(check(
        &state.cache,
        &[keys::DEPENDENCY_SOURCE, keys::DEPENDENCY_DEPENDENT],
        keys::DEPENDENCY_MESSAGE,
        cancelled,
    )))
}

// == Cancel ==
/// Handler for POST /cancel-test
pub async fn set_cancel_test_handler(State(state): State<AppState>) -> Result<Json<CheckResponse>> {
    let cache = &state.cache;
    let signal = ChangeSignal::new();
    cache.set(
        keys::CANCEL_SIGNAL.to_string(),
        DemoValue::Signal(signal.clone()),
        ExpirationPolicy::new(),
    )?;
    cache.remove(&keys::CANCEL_MESSAGE.to_string());

    let writer = cache.downgrade();
    cache.set(
        keys::CANCEL_TICKS.to_string(),
        DemoValue::Text(Local::now().format("%S").to_string()),
        ExpirationPolicy::new()
            .depends_on(signal)
            .on_evicted(move |key, value, reason| {
                leave_message(
                    &writer,
                    keys::CANCEL_MESSAGE,
                    format!("'{key}':'{value}' was evicted because: {reason}"),
                );
            }),
    )?;

    Ok(Json(check(
        cache,
        &[keys::CANCEL_TICKS],
        keys::CANCEL_MESSAGE,
        false,
    )))
}

/// Handler for GET /cancel
///
/// With `?cancel=1` the stored signal is scheduled to fire shortly; the
/// entry is still reported as present by this response.
pub async fn check_cancel_handler(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>> {
    let cancelled = query.wants_cancel();
    if cancelled {
        let signal = stored_signal(&state.cache, keys::CANCEL_SIGNAL)?;
        if signal.is_disposed() {
            return Err(CacheError::InvalidState(format!(
                "signal {} is disposed",
                signal.id()
            )));
        }
        signal.fire_after(CANCEL_DELAY);
        info!(delay_ms = CANCEL_DELAY.as_millis() as u64, "Cancel signal scheduled");
    }

    Ok(Json(check(
        &state.cache,
        &[keys::CANCEL_TICKS],
        keys::CANCEL_MESSAGE,
        cancelled,
    )))
}

// == Stats And Health ==
/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.cache.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheOptions;

    fn test_state() -> AppState {
        AppState::new(Cache::new(CacheOptions::default()), Duration::from_secs(3))
    }

    fn cancel(id: u32) -> Query<CheckQuery> {
        Query(CheckQuery { cancel: Some(id) })
    }

    #[tokio::test]
    async fn test_time_handler_creates_then_reuses() {
        let state = test_state();

        let first = time_handler(State(state.clone())).await.unwrap();
        assert!(first.created);

        let second = time_handler(State(state.clone())).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.time, first.time);
    }

    #[tokio::test]
    async fn test_cached_time_missing() {
        let state = test_state();

        let result = cached_time_handler(State(state)).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_or_create_time() {
        let state = test_state();

        let created = get_or_create_time_handler(State(state.clone())).await.unwrap();
        assert!(created.created);

        let cached = cached_time_handler(State(state)).await.unwrap();
        assert_eq!(cached.time, created.time);
    }

    #[tokio::test]
    async fn test_remove_time() {
        let state = test_state();
        time_handler(State(state.clone())).await.unwrap();

        remove_time_handler(State(state.clone())).await;

        assert!(cached_time_handler(State(state)).await.is_err());
    }

    #[tokio::test]
    async fn test_eviction_time_message_after_remove() {
        let state = test_state();
        let response = set_eviction_time_handler(State(state.clone())).await.unwrap();
        assert!(response.entries[0].value.is_some());
        assert!(response.message.is_none());

        state.cache.remove(&keys::EVICTION_TIME.to_string());

        let response = check_eviction_time_handler(State(state)).await;
        assert!(response.entries[0].value.is_none());
        let message = response.message.clone().unwrap();
        assert!(message.starts_with("key: eviction_time, Value: "));
        assert!(message.ends_with("Reason: Removed"));
    }

    #[tokio::test]
    async fn test_dependency_cancel_evicts_chain() {
        let state = test_state();
        let response = set_dependency_handler(State(state.clone())).await.unwrap();
        assert!(response.entries.iter().all(|entry| entry.value.is_some()));

        let response = check_dependency_handler(State(state.clone()), cancel(1))
            .await
            .unwrap();

        assert!(response.cancelled);
        assert!(response.entries.iter().all(|entry| entry.value.is_none()));
        assert!(response
            .message
            .as_deref()
            .unwrap()
            .starts_with("key: dependency_dependent"));
        assert_eq!(state.cache.stats().signal_triggered, 2);
    }

    #[tokio::test]
    async fn test_dependency_cancel_without_setup() {
        let state = test_state();

        let result = check_dependency_handler(State(state), cancel(1)).await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancel_fires_after_delay() {
        let state = test_state();
        set_cancel_test_handler(State(state.clone())).await.unwrap();

        let response = check_cancel_handler(State(state.clone()), cancel(1))
            .await
            .unwrap();
        assert!(response.cancelled);
        assert!(response.entries[0].value.is_some());

        tokio::time::sleep(Duration::from_millis(300)).await;

        let response = check_cancel_handler(State(state), Query(CheckQuery::default()))
            .await
            .unwrap();
        assert!(response.entries[0].value.is_none());
        assert!(response
            .message
            .as_deref()
            .unwrap()
            .ends_with("was evicted because: SignalTriggered"));
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let state = test_state();
        time_handler(State(state.clone())).await.unwrap();

        let response = stats_handler(State(state)).await;
        assert_eq!(response.misses, 1);
        assert_eq!(response.total_entries, 1);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }

    #[tokio::test]
    async fn test_scenario_callbacks_do_not_keep_cache_alive() {
        let state = test_state();
        set_eviction_time_handler(State(state.clone())).await.unwrap();
        set_dependency_handler(State(state.clone())).await.unwrap();
        set_cancel_test_handler(State(state.clone())).await.unwrap();

        let weak = state.cache.downgrade();
        drop(state);

        assert!(weak.upgrade().is_none());
    }
}
