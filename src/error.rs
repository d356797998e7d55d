//! Error taxonomy for the aggregator, matching the kinds in spec.md §7:
//! `AllVenuesDown`, `NotFound`, `ValidationError` map to HTTP responses
//! here. `FetchError` (see `venue::VenueError`) is recovered locally per
//! venue and surfaces only as degraded health, never as an `AppError`;
//! `NormalizationSkip` never leaves the venue adapter (logged, record
//! dropped); `Fatal` only happens at startup via `Config::validate`.

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("all venues are down")]
    AllVenuesDown,

    #[error("unified market {0} not found")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AllVenuesDown => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    request_id: String,
    timestamp: i64,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: match &self {
                AppError::AllVenuesDown => "ALL_VENUES_DOWN",
                AppError::NotFound(_) => "NOT_FOUND",
                AppError::Validation(_) => "VALIDATION_ERROR",
                AppError::Internal(_) => "INTERNAL_ERROR",
            }
            .to_string(),
            message: self.to_string(),
            request_id: Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        tracing::error!(request_id = %body.request_id, error = %body.error, "request failed");

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError::NotFound("abc".into());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn all_venues_down_maps_to_500() {
        assert_eq!(AppError::AllVenuesDown.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
