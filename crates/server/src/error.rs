// crates/server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use powerpulse_db::DbError;
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes (§7 "Input-level, fatal
/// to upload").
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("upload exceeds the configured size limit")]
    FileTooLarge { max_bytes: usize },

    #[error("upload body is not valid JSON")]
    InvalidJson(String),

    #[error("upload must be a JSON object of chat_id -> message array")]
    InvalidShape,

    #[error("no upload found for id {0}")]
    UploadNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            ApiError::FileTooLarge { max_bytes } => {
                tracing::warn!(max_bytes, "rejected oversized upload");
                (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    ErrorResponse::with_details(
                        "file too large",
                        format!("limit is {max_bytes} bytes"),
                    ),
                )
            }
            ApiError::InvalidJson(detail) => {
                tracing::warn!(detail = %detail, "rejected malformed upload JSON");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("invalid JSON", detail.clone()),
                )
            }
            ApiError::InvalidShape => {
                tracing::warn!("rejected upload with unexpected top-level shape");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::new("expected an object of chat_id -> message array"),
                )
            }
            ApiError::UploadNotFound(id) => {
                tracing::warn!(upload_id = %id, "progress requested for unknown upload");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("upload not found", format!("upload_id: {id}")),
                )
            }
            ApiError::Database(e) => {
                tracing::error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("internal server error"),
                )
            }
            ApiError::BadRequest(detail) => {
                tracing::warn!(detail = %detail, "bad request");
                (StatusCode::BAD_REQUEST, ErrorResponse::new(detail.clone()))
            }
        };

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_with_details_round_trips_fields() {
        let r = ErrorResponse::with_details("bad", "why");
        assert_eq!(r.error, "bad");
        assert_eq!(r.details.as_deref(), Some("why"));
    }
}
