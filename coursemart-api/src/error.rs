//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::routes::envelope;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for storage and service operations
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label placed in the envelope's `message`
    fn label(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "Not found",
            ApiError::Validation(_) => "Validation error",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::Internal(_) => "Internal server error",
        }
    }
}

impl From<coursemart_core::Error> for ApiError {
    fn from(err: coursemart_core::Error) -> Self {
        use coursemart_core::Error;
        match err {
            Error::UnknownTable(name) => ApiError::NotFound(format!("Unknown table `{}`", name)),
            other => ApiError::Validation(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ApiError::Conflict(
                    msg.clone()
                        .unwrap_or_else(|| "Unique constraint violated".to_string()),
                )
            }
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("Serialization failed: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::Internal(msg) => tracing::error!("Internal error: {}", msg),
            other => tracing::debug!(status = status.as_u16(), error = %other, "Request failed"),
        }

        envelope(status, self.label(), serde_json::Value::Null, Some(self.to_string()))
    }
}
