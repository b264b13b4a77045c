use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::db::worker_repo;
use crate::errors::AppError;
use crate::AppState;

pub async fn list(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let workers = worker_repo::list_all(&state.db, 200).await?;
    Ok(Json(json!({ "success": true, "workers": workers })))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(worker_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let worker = worker_repo::get_worker(&state.db, worker_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("worker {worker_id}")))?;
    Ok(Json(json!({ "success": true, "worker": worker })))
}

/// Operator-initiated recycle: tear the worker down and free its
/// allocation. The next dispatch for the owner provisions a fresh one.
pub async fn recycle(
    State(state): State<AppState>,
    Path(worker_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.fleet.recycle_worker(worker_id).await?;
    Ok(Json(json!({ "success": true, "worker_id": worker_id })))
}
