//! Shared error taxonomy used across every layer of the orchestrator.
//!
//! Every inner error (repository, broker, LLM, raster, template) maps onto
//! one of these six kinds so the HTTP layer and the CLI can report a
//! consistent status/exit code regardless of which subsystem failed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// The six-way error taxonomy shared by all components.
#[derive(Error, Debug)]
pub enum AppError {
    /// The caller supplied something that can never succeed (bad shape,
    /// missing required field, unsupported mime type).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A state transition was requested that the state machine forbids
    /// (e.g. resuming a job that is not paused).
    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    /// The operation failed for a reason that may succeed on retry
    /// (timeout, 5xx, 429, connection reset).
    #[error("transient failure: {0}")]
    Transient(String),

    /// The operation failed for a reason that will not succeed on retry
    /// (4xx other than 429, malformed document, schema violation).
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// An invariant the system relies on was violated (corrupt persisted
    /// state, FK pointing nowhere, impossible status combination).
    #[error("integrity fault: {0}")]
    IntegrityFault(String),
}

impl AppError {
    /// Whether the broker should schedule a retry for this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }

    /// HTTP status code this error maps onto, for the server layer.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::InvalidInput(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::IllegalTransition(_) => 409,
            AppError::Transient(_) => 503,
            AppError::Permanent(_) => 422,
            AppError::IntegrityFault(_) => 500,
        }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => AppError::NotFound(e.to_string()),
            other => AppError::IntegrityFault(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::InvalidInput(e.to_string())
    }
}

/// Lets every handler in `crate::server` return `Result<T, AppError>`
/// directly — the status mapping lives here once rather than at every
/// call site (§7's error-handling design).
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_retryable() {
        assert!(AppError::Transient("timeout".into()).is_retryable());
        assert!(!AppError::Permanent("bad schema".into()).is_retryable());
    }

    #[test]
    fn status_codes_map() {
        assert_eq!(AppError::NotFound("job".into()).status_code(), 404);
        assert_eq!(AppError::IllegalTransition("x".into()).status_code(), 409);
    }
}
