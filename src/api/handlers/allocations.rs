use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::errors::AppError;
use crate::AppState;

/// Allocation-pool utilization per broker band.
pub async fn utilization(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let bands = state.fleet.registry().utilization().await;
    Ok(Json(json!({ "success": true, "bands": bands })))
}
