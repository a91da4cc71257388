//! API Module
//!
//! HTTP handlers and routing for the sample web surface over the cache engine.
//!
//! # Endpoints
//! - `GET /time` - Cached time, created with a sliding window on a miss
//! - `GET /time/cached` - Cached time without creating it
//! - `GET /time/get-or-create` - Cached time through `get_or_create`
//! - `DELETE /time` - Remove the cached time
//! - `POST /eviction-time`, `GET /eviction-time` - Pinned entry with deadlines
//! - `POST /dependency`, `GET /dependency?cancel=1` - Chained invalidation
//! - `POST /cancel-test`, `GET /cancel?cancel=1` - Delayed signal firing
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
