//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror. Expiration and eviction are
//! lifecycle events, not errors, so they never appear here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its HTTP surface.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache (HTTP surface only; the engine reports misses as `None`)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Operation on a disposed change signal
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Expiration policy carries an unusable value
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// Entry would depend on the eviction of the entry it replaces
    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    /// The value factory of `try_get_or_create` failed
    #[error("Factory failed: {0}")]
    FactoryFailure(#[source] anyhow::Error),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidState(_) => StatusCode::CONFLICT,
            CacheError::InvalidPolicy(_)
            | CacheError::DependencyCycle(_)
            | CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::FactoryFailure(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
