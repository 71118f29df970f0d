//! HTTP error types for the `mdview` server.
//!
//! Maps domain errors from `mdview-core` into HTTP responses. Every response
//! body is `{"error": "<message>"}` with a fixed, generic message; the
//! underlying detail is logged and never sent to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

use mdview_core::error::{CsrfError, GuardError, SessionError, ThemeError};
use mdview_core::guard::PathKind;

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Client sent invalid input.
    BadRequest(&'static str),
    /// The request is not allowed.
    Forbidden(&'static str),
    /// Requested path does not exist.
    NotFound(&'static str),
    /// The file exceeds the size ceiling.
    PayloadTooLarge(&'static str),
    /// The file is not markdown.
    UnsupportedMediaType(&'static str),
    /// Internal server error.
    Internal,
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            Self::UnsupportedMediaType(msg) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, msg),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        (status, axum::Json(ErrorBody { error: message })).into_response()
    }
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::PathTraversal { .. } => Self::Forbidden("Access denied"),
            GuardError::NotFound { .. } => Self::NotFound("Path not found"),
            GuardError::UnsupportedType {
                expected: PathKind::File,
                ..
            } => Self::UnsupportedMediaType("Not a markdown file"),
            GuardError::UnsupportedType {
                expected: PathKind::Directory,
                ..
            } => Self::BadRequest("Not a directory"),
            GuardError::InvalidPath { .. } => Self::BadRequest("Invalid path"),
            GuardError::FileTooLarge { .. } => Self::PayloadTooLarge("File too large"),
            GuardError::PermissionDenied { .. } => Self::Forbidden("Permission denied"),
            GuardError::Io { .. } => {
                error!(error = %err, "file system error");
                Self::Internal
            }
        }
    }
}

impl From<CsrfError> for AppError {
    fn from(_: CsrfError) -> Self {
        Self::Forbidden("Invalid CSRF token")
    }
}

impl From<ThemeError> for AppError {
    fn from(err: ThemeError) -> Self {
        match err {
            ThemeError::Invalid { ref reason } => {
                warn!(reason = %reason, "theme rejected");
                Self::BadRequest("Invalid theme")
            }
            ThemeError::Io { .. } => {
                error!(error = %err, "theme storage error");
                Self::Internal
            }
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        error!(error = %err, "session error");
        Self::Internal
    }
}
