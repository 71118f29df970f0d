//! Error types for `mdview-core`.
//!
//! Variants carry enough context to diagnose a rejection from the logs. The
//! server never forwards that context to clients; it maps each variant to a
//! fixed, generic message.

use std::path::PathBuf;

use mdview_storage::StorageError;

use crate::guard::PathKind;

/// Errors from path validation and guarded file reads.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// The resolved path lies outside the root directory.
    #[error("path '{raw}' resolves to '{}' outside the root", resolved.display())]
    PathTraversal { raw: String, resolved: PathBuf },

    /// The resolved path does not exist.
    #[error("path '{}' does not exist", resolved.display())]
    NotFound { resolved: PathBuf },

    /// The path exists but is the wrong kind for the requested operation.
    #[error("path '{}' is not a valid {expected}", resolved.display())]
    UnsupportedType { resolved: PathBuf, expected: PathKind },

    /// The file is larger than the configured ceiling.
    #[error("file is {size} bytes, limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// The raw input cannot be interpreted as a path.
    #[error("invalid path: {reason}")]
    InvalidPath { reason: String },

    /// The operating system refused access.
    #[error("permission denied for '{}'", path.display())]
    PermissionDenied { path: PathBuf },

    /// Any other I/O failure.
    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from CSRF token validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CsrfError {
    /// The session has never been issued a token.
    #[error("no CSRF token in session")]
    MissingToken,

    /// The session's token is older than the expiry window.
    #[error("CSRF token expired")]
    ExpiredToken,

    /// The presented token does not match the session's token.
    #[error("CSRF token mismatch")]
    Mismatch,
}

/// Errors from the session store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session record could not be encoded or decoded.
    #[error("session serialization failed: {reason}")]
    Serialization { reason: String },

    /// The session cookie could not be signed.
    #[error("session signing failed: {reason}")]
    Signing { reason: String },

    /// The storage backend returned an error.
    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors from the theme catalogue.
#[derive(Debug, thiserror::Error)]
pub enum ThemeError {
    /// The submitted theme failed validation.
    #[error("invalid theme: {reason}")]
    Invalid { reason: String },

    /// Reading or writing a theme file failed.
    #[error("theme i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
