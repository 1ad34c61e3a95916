//! Application error type mapping to HTTP status codes.
//!
//! Every error body has the shape `{"error": true, "reason": "<message>"}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use parley_types::error::{RepositoryError, TurnError};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Missing or wrong `X-API-KEY`.
    Unauthorized,
    /// Body is not a JSON object.
    InvalidJson,
    /// Request is well-formed JSON but fails validation.
    Validation(String),
    /// The turn failed before any reply was sent.
    Turn(TurnError),
    /// Session store failure outside a turn.
    Store(RepositoryError),
}

impl From<TurnError> for AppError {
    fn from(e: TurnError) -> Self {
        AppError::Turn(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, reason) = match &self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized: invalid or missing X-API-KEY header".to_string(),
            ),
            AppError::InvalidJson => (StatusCode::BAD_REQUEST, "Invalid JSON payload".to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Turn(TurnError::InvalidInput(msg)) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Turn(e) => {
                tracing::error!(error = %e, "Chat turn failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::Store(e) => {
                tracing::error!(error = %e, "Session store request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        (status, Json(json!({ "error": true, "reason": reason }))).into_response()
    }
}
