use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::db::worker_repo;
use crate::AppState;

/// Liveness plus a fleet snapshot. The database ping gates
/// healthy/unhealthy; the live-worker count and pause flag are
/// informational for operators.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    if sqlx::query("SELECT 1").execute(&state.db).await.is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "db": "disconnected" })),
        );
    }

    let live_workers = worker_repo::list_live(&state.db)
        .await
        .map(|workers| workers.len())
        .unwrap_or(0);

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "db": "connected",
            "live_workers": live_workers,
            "dispatch_paused": state.pause_flag.load(Ordering::Relaxed),
        })),
    )
}
