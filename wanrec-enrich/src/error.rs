//! Error types for wanrec-enrich
//!
//! Per-site and per-lookup problems never surface here: they are counted in
//! the run report. `ReconError` covers the few outcomes that end a run, and
//! `ApiError` maps failures onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Run-fatal reconciliation errors
#[derive(Debug, Error)]
pub enum ReconError {
    /// Device telemetry could not be read; nothing was written
    #[error("Device telemetry unavailable: {0}")]
    TelemetryUnavailable(String),

    /// Reference data or the database as a whole could not be used
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    /// Another run is in progress in this process
    #[error("Reconciliation run {0} is already in progress")]
    AlreadyRunning(Uuid),

    #[error("Configuration error: {0}")]
    Config(#[from] wanrec_common::Error),
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. a run is already in progress
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Common error: {0}")]
    Common(#[from] wanrec_common::Error),
}

impl From<ReconError> for ApiError {
    fn from(err: ReconError) -> Self {
        match err {
            ReconError::AlreadyRunning(_) => ApiError::Conflict(err.to_string()),
            ReconError::Config(inner) => ApiError::BadRequest(inner.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
