use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::require_auth;
use super::handlers;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Public routes — no authentication required
    let public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::render));

    // Protected operational routes — require Bearer token when API_TOKEN is set
    let protected = Router::new()
        // Fleet
        .route("/api/workers", get(handlers::workers::list))
        .route("/api/workers/:id", get(handlers::workers::detail))
        .route("/api/workers/:id/recycle", post(handlers::workers::recycle))
        .route("/api/allocations", get(handlers::allocations::utilization))
        // Dispatch audit trail
        .route("/api/dispatches", get(handlers::dispatches::list))
        .route("/api/dispatches/:id", get(handlers::dispatches::detail))
        .route("/api/outcomes", get(handlers::dispatches::outcomes))
        // Control
        .route("/api/control/pause", post(handlers::control::pause))
        .route("/api/control/resume", post(handlers::control::resume))
        .route("/api/control/status", get(handlers::control::status))
        .layer(middleware::from_fn(require_auth));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
