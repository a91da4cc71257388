//! Background Tasks Module
//!
//! Contains background tasks that run periodically alongside the cache.
//!
//! # Tasks
//! - Expiration sweep: evicts expired entries that nobody reads

mod sweep;

pub use sweep::spawn_sweep_task;
