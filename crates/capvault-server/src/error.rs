//! HTTP error types for `capvault` server.
//!
//! Maps domain errors from `capvault-core` into appropriate HTTP responses.
//! Every error variant produces a JSON body with a machine-readable `error`
//! field and a human-readable `message`. Server-side failures are logged
//! in full and answered with a redacted message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use capvault_core::error::{CryptoError, DirectoryError, QuotaError, SessionError, StoreError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// The capability key is missing, malformed, or opens nothing valid.
    Unauthorized(String),
    /// Requested resource not found.
    NotFound(String),
    /// Client sent invalid input.
    BadRequest(String),
    /// A uniqueness conflict (e.g., duplicate session token).
    Conflict(String),
    /// The record has no requests left.
    QuotaExceeded { max: u64, current: u64 },
    /// Internal server error. The message is logged, never returned.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::QuotaExceeded { max, current } => (
                StatusCode::TOO_MANY_REQUESTS,
                "quota_exceeded",
                format!("quota exceeded: {current} of {max} requests used"),
            ),
            Self::Internal(msg) => {
                error!(error = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_owned(),
                )
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound("no company matches this key".to_owned()),
            StoreError::Authentication { slot, .. } => {
                warn!(slot, "capability record failed authentication");
                Self::Unauthorized("invalid capability key".to_owned())
            }
            StoreError::Serialization { .. }
            | StoreError::Corrupted { .. }
            | StoreError::Persistence(_)
            | StoreError::Crypto(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<QuotaError> for AppError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::Exceeded { max, current } => Self::QuotaExceeded { max, current },
            QuotaError::Store(inner) => inner.into(),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound { .. } => Self::NotFound(err.to_string()),
            SessionError::Conflict { .. } => Self::Conflict(err.to_string()),
            SessionError::CeilingViolation { .. } | SessionError::UnknownColumn { .. } => {
                Self::BadRequest(err.to_string())
            }
            SessionError::Database { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound { .. } => Self::NotFound(err.to_string()),
            DirectoryError::Conflict { .. } => Self::Conflict(err.to_string()),
            DirectoryError::Invalid { .. } | DirectoryError::UnknownColumn { .. } => {
                Self::BadRequest(err.to_string())
            }
            DirectoryError::Database { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<CryptoError> for AppError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKey { .. } => {
                Self::Unauthorized("invalid capability key".to_owned())
            }
            CryptoError::Encryption { .. }
            | CryptoError::Decryption { .. }
            | CryptoError::CiphertextTooShort { .. }
            | CryptoError::KeyDerivation { .. }
            | CryptoError::InvalidEncoding { .. } => Self::Internal(err.to_string()),
        }
    }
}
