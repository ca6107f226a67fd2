//! Error handling for the erwin API
//!
//! One error type for the control API and the services behind it, with
//! HTTP status mapping via Axum's IntoResponse trait. Every rejected request
//! leaves the store untouched: services return before committing.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for client-side handling
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    // ========== Resource Errors ==========
    /// Requested resource not found
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    // ========== Validation Errors ==========
    /// Request validation failed
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Invalid request body format
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Timeline operation that needs a loaded track
    #[error("no active track")]
    NoActiveTrack,

    // ========== Consistency Guards ==========
    /// Vote cast with no open round, or after it expired
    #[error("no vote round is open")]
    NoActiveVoteRound,

    // ========== Database Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    // ========== Audio Errors ==========
    /// Asset missing on disk or not yet acquired
    #[error("audio file not found: {0}")]
    AudioFileNotFound(String),

    /// Range request invalid (400 Bad Request)
    #[error("invalid range request: {0}")]
    InvalidRange(String),

    /// Range not satisfiable (416 Range Not Satisfiable)
    #[error("range not satisfiable")]
    RangeNotSatisfiable { file_size: u64 },

    // ========== Internal Errors ==========
    /// Internal server error (catch-all for unexpected errors)
    #[error("internal server error: {0}")]
    Internal(String),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 404 Not Found
            Self::NotFound { .. } | Self::AudioFileNotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::NoActiveVoteRound => StatusCode::CONFLICT,

            // 400 Bad Request
            Self::ValidationError(_)
            | Self::InvalidBody(_)
            | Self::NoActiveTrack
            | Self::InvalidRange(_) => StatusCode::BAD_REQUEST,

            // 416 Range Not Satisfiable
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,

            // 500 Internal Server Error
            Self::Database(_) | Self::Internal(_) | Self::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error code string for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::InvalidBody(_) => "INVALID_BODY",
            Self::NoActiveTrack => "NO_ACTIVE_TRACK",
            Self::NoActiveVoteRound => "NO_ACTIVE_VOTE_ROUND",
            Self::Database(_) => "DATABASE_ERROR",
            Self::AudioFileNotFound(_) => "AUDIO_NOT_FOUND",
            Self::InvalidRange(_) => "INVALID_RANGE",
            Self::RangeNotSatisfiable { .. } => "RANGE_NOT_SATISFIABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found(resource_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Log the error with appropriate severity based on status code
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::debug!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Client error"
            );
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        // Never leak SQL or filesystem details to callers
        let message = if status.is_server_error() {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };
        let error_response = ErrorResponse {
            code: self.error_code(),
            message,
            details: None,
        };

        // Content-Range per RFC 7233
        if let Self::RangeNotSatisfiable { file_size } = &self {
            return (
                status,
                [("Content-Range", format!("bytes */{}", file_size))],
                Json(error_response),
            )
                .into_response();
        }

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::AudioFileNotFound(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}
