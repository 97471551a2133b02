//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use murmur_updater::UpdateError;
use serde::Serialize;
use thiserror::Error;

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A pipeline already holds the single update slot.
    #[error("an update is already in progress")]
    UpdateInProgress,

    /// An update operation failed.
    #[error("update error: {0}")]
    Update(UpdateError),
}

impl From<UpdateError> for ApiError {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::InProgress => ApiError::UpdateInProgress,
            other => ApiError::Update(other),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::UpdateInProgress => (StatusCode::CONFLICT, "update_in_progress"),
            ApiError::Update(_) => (StatusCode::INTERNAL_SERVER_ERROR, "update_failed"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
