use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::fleet::FleetError;

/// API-facing error taxonomy. Fleet and database failures funnel into
/// these variants at the handler boundary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    /// The fleet cannot serve this request right now (provisioning timeout,
    /// exhausted allocation band). Retryable from the caller's side.
    #[error("worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, retryable, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, false, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, false, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, false, "unauthorized".into()),
            AppError::WorkerUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, true, msg.clone())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    false,
                    "internal server error".into(),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                success: false,
                error: message,
                retryable,
            }),
        )
            .into_response()
    }
}

impl From<FleetError> for AppError {
    fn from(e: FleetError) -> Self {
        match e {
            FleetError::UnknownWorker(id) => AppError::NotFound(format!("worker {id}")),
            FleetError::ProvisioningTimeout(_, _) | FleetError::Allocation(_) => {
                AppError::WorkerUnavailable(e.to_string())
            }
            FleetError::Internal(inner) => AppError::Internal(inner),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Internal(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn test_fleet_errors_map_to_api_statuses() {
        let id = Uuid::new_v4();
        assert!(matches!(
            AppError::from(FleetError::UnknownWorker(id)),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(FleetError::ProvisioningTimeout(id, Duration::from_secs(10))),
            AppError::WorkerUnavailable(_)
        ));
    }
}
