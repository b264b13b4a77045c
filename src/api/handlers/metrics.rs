use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics::gauge;

use crate::db::worker_repo;
use crate::models::WorkerStatus;
use crate::AppState;

/// Prometheus scrape endpoint. The fleet gauge is refreshed from the
/// database at scrape time so the payload never reports a worker count
/// older than the last watchdog pass.
pub async fn render(State(state): State<AppState>) -> impl IntoResponse {
    if let Ok(running) = worker_repo::list_by_status(&state.db, WorkerStatus::Running).await {
        gauge!("live_workers").set(running.len() as f64);
    }

    let body = state.metrics_handle.render();
    ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
