//! Cache Module
//!
//! Provides the in-memory cache engine: change signals, expiration policies,
//! the concurrent store and its eviction pipeline.

mod entry;
mod eviction;
mod expiration;
mod lru;
mod policy;
mod signal;
mod stats;
mod store;


// Re-export public types
pub use policy::{EvictionReason, ExpirationPolicy, PostEvictionCallback, Priority};
pub use signal::{ChangeSignal, Registration};
pub use stats::CacheStats;
pub use store::{Cache, CacheKey, CacheValue, WeakCache};
