//! memcache_engine - An in-process cache engine
//!
//! Key → value caching with absolute and sliding expiration, change-signal
//! dependencies, priority-aware capacity eviction and post-eviction callbacks,
//! plus a small axum server demonstrating each feature.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use cache::{Cache, ChangeSignal, EvictionReason, ExpirationPolicy, Priority, WeakCache};
pub use config::{CacheOptions, Config};
pub use error::CacheError;
pub use tasks::spawn_sweep_task;
