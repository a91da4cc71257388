//! API Routes
//!
//! Configures the Axum router with all sample endpoints.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cached_time_handler, check_cancel_handler, check_dependency_handler,
    check_eviction_time_handler, get_or_create_time_handler, health_handler, remove_time_handler,
    set_cancel_test_handler, set_dependency_handler, set_eviction_time_handler, stats_handler,
    time_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/time", get(time_handler).delete(remove_time_handler))
        .route("/time/cached", get(cached_time_handler))
        .route("/time/get-or-create", get(get_or_create_time_handler))
        .route(
            "/eviction-time",
            post(set_eviction_time_handler).get(check_eviction_time_handler),
        )
        .route(
            "/dependency",
            post(set_dependency_handler).get(check_dependency_handler),
        )
        .route("/cancel-test", post(set_cancel_test_handler))
        .route("/cancel", get(check_cancel_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
