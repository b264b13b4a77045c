use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::AppState;

/// Pause fan-out: signals received while paused are not dispatched.
pub async fn pause(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.pause_flag.store(true, Ordering::Relaxed);
    tracing::warn!("Dispatch paused via control API");
    Json(json!({ "success": true, "paused": true }))
}

pub async fn resume(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.pause_flag.store(false, Ordering::Relaxed);
    tracing::info!("Dispatch resumed via control API");
    Json(json!({ "success": true, "paused": false }))
}

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "paused": state.pause_flag.load(Ordering::Relaxed),
    }))
}
