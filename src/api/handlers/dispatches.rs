use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::db::{dispatch_repo, outcome_repo};
use crate::errors::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1_000);
    let dispatches = dispatch_repo::list_recent(&state.db, limit).await?;
    Ok(Json(json!({ "success": true, "dispatches": dispatches })))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(dispatch_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let dispatch = dispatch_repo::get_dispatch(&state.db, &dispatch_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("dispatch {dispatch_id}")))?;
    let outcome = outcome_repo::get_by_dispatch_id(&state.db, &dispatch_id).await?;
    Ok(Json(json!({ "success": true, "dispatch": dispatch, "outcome": outcome })))
}

pub async fn outcomes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1_000);
    let outcomes = outcome_repo::list_recent(&state.db, limit).await?;
    let counts = outcome_repo::status_counts(&state.db).await?;
    let counts: serde_json::Map<String, serde_json::Value> = counts
        .into_iter()
        .map(|(status, count)| (status, json!(count)))
        .collect();
    Ok(Json(json!({ "success": true, "outcomes": outcomes, "counts": counts })))
}
