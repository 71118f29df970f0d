//! Request guard for `mdview`.
//!
//! Every file-system access and every mutating request passes through the
//! [`Guard`] first:
//!
//! - [`Guard::validate_path`] turns a client-supplied string into a
//!   [`SafePath`] that is known to live under the root directory.
//! - [`check_file_size`] enforces the size ceiling from metadata alone,
//!   before any content is read.
//! - [`Guard::issue_csrf_token`] / [`Guard::validate_csrf_token`] bind
//!   anti-forgery tokens to the caller's [`Session`].
//!
//! # Path resolution
//!
//! Containment is decided on fully-resolved paths only. The input is joined
//! onto the root (absolute inputs replace it), every symbolic link is
//! followed, and the result is compared component-wise against the
//! canonical root. For a path that does not exist yet, the longest existing
//! ancestor is resolved and the remaining components are applied on top, so
//! `..` segments can never be used to step around the check. Order of
//! checks: resolve, containment, existence, type.

use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::Duration;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::warn;

use crate::csrf;
use crate::error::{CsrfError, GuardError};
use crate::session::Session;

/// Default markdown size ceiling (10 MiB).
pub const DEFAULT_MAX_MARKDOWN_SIZE: u64 = 10 * 1024 * 1024;

/// Extension (without the dot) that file reads are restricted to.
pub const MARKDOWN_EXTENSION: &str = "md";

/// Settings the guard needs, built once at startup.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Directory every path must resolve under.
    pub root_dir: PathBuf,
    /// Maximum markdown file size in bytes.
    pub max_markdown_size: u64,
    /// How long a CSRF token stays valid.
    pub csrf_expiry: Duration,
}

impl GuardConfig {
    /// Config rooted at `root_dir` with the default ceiling and expiry.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            max_markdown_size: DEFAULT_MAX_MARKDOWN_SIZE,
            csrf_expiry: csrf::default_expiry(),
        }
    }
}

/// What the caller intends to do with a validated path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Read a markdown file's contents.
    File,
    /// List a directory.
    Directory,
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("markdown file"),
            Self::Directory => f.write_str("directory"),
        }
    }
}

/// A path that passed [`Guard::validate_path`].
///
/// Only the guard can construct one, so holding a `SafePath` proves the
/// checks ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePath {
    raw: String,
    resolved: PathBuf,
    kind: PathKind,
}

impl SafePath {
    /// The string the client sent.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The fully-resolved absolute path.
    #[must_use]
    pub fn resolved(&self) -> &Path {
        &self.resolved
    }

    /// The kind the path was validated for.
    #[must_use]
    pub fn kind(&self) -> PathKind {
        self.kind
    }
}

/// A markdown file read through the guard.
#[derive(Debug, Clone, Serialize)]
pub struct MarkdownFile {
    pub path: String,
    pub name: String,
    pub content: String,
}

/// Whether the resolved path exists, and if not, why we could not tell.
#[derive(Debug)]
enum Existence {
    Exists,
    Missing,
    Denied,
}

/// Validates paths and tokens before any read or mutation happens.
#[derive(Debug, Clone)]
pub struct Guard {
    config: GuardConfig,
    root: PathBuf,
}

impl Guard {
    /// Build a guard, canonicalizing the configured root.
    ///
    /// # Errors
    ///
    /// - [`GuardError::NotFound`] if the root does not exist.
    /// - [`GuardError::UnsupportedType`] if the root is not a directory.
    /// - [`GuardError::Io`] for other resolution failures.
    pub async fn new(config: GuardConfig) -> Result<Self, GuardError> {
        let root = tokio::fs::canonicalize(&config.root_dir)
            .await
            .map_err(|e| io_error(&config.root_dir, e))?;

        let meta = tokio::fs::metadata(&root)
            .await
            .map_err(|e| io_error(&root, e))?;
        if !meta.is_dir() {
            return Err(GuardError::UnsupportedType {
                resolved: root,
                expected: PathKind::Directory,
            });
        }

        Ok(Self { config, root })
    }

    /// The canonical root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configuration the guard was built from.
    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Validate a client-supplied path for the given use.
    ///
    /// Every rejection is logged with the raw input and the resolved path.
    ///
    /// # Errors
    ///
    /// - [`GuardError::InvalidPath`] for empty input or embedded NUL bytes.
    /// - [`GuardError::PathTraversal`] if the resolved path escapes the root.
    /// - [`GuardError::NotFound`] if it does not exist.
    /// - [`GuardError::PermissionDenied`] if the OS refused to resolve it.
    /// - [`GuardError::UnsupportedType`] if it is not a `.md` file (file
    ///   mode) or not a directory (directory mode).
    pub async fn validate_path(&self, raw: &str, kind: PathKind) -> Result<SafePath, GuardError> {
        let result = self.resolve_checked(raw, kind).await;
        if let Err(ref err) = result {
            warn!(raw = %raw, kind = %kind, error = %err, "path rejected");
        }
        result
    }

    async fn resolve_checked(&self, raw: &str, kind: PathKind) -> Result<SafePath, GuardError> {
        if raw.trim().is_empty() {
            return Err(GuardError::InvalidPath {
                reason: "path is empty".to_owned(),
            });
        }
        if raw.contains('\0') {
            return Err(GuardError::InvalidPath {
                reason: "path contains a NUL byte".to_owned(),
            });
        }

        let candidate = self.root.join(raw);
        let (resolved, existence) = resolve_lenient(&candidate).await?;

        if !resolved.starts_with(&self.root) {
            return Err(GuardError::PathTraversal {
                raw: raw.to_owned(),
                resolved,
            });
        }

        match existence {
            Existence::Exists => {}
            Existence::Missing => return Err(GuardError::NotFound { resolved }),
            Existence::Denied => return Err(GuardError::PermissionDenied { path: resolved }),
        }

        let meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| io_error(&resolved, e))?;

        let acceptable = match kind {
            PathKind::File => meta.is_file() && has_markdown_extension(&resolved),
            PathKind::Directory => meta.is_dir(),
        };
        if !acceptable {
            return Err(GuardError::UnsupportedType {
                resolved,
                expected: kind,
            });
        }

        Ok(SafePath {
            raw: raw.to_owned(),
            resolved,
            kind,
        })
    }

    /// [`check_file_size`] against the configured ceiling.
    ///
    /// # Errors
    ///
    /// Same as [`check_file_size`].
    pub async fn check_file_size(&self, path: &SafePath) -> Result<u64, GuardError> {
        check_file_size(path, self.config.max_markdown_size).await
    }

    /// Size-check and read a validated markdown file.
    ///
    /// The size check runs on metadata first; the read itself is capped at
    /// the ceiling as well, so a file that grows in between is still caught.
    ///
    /// # Errors
    ///
    /// - [`GuardError::UnsupportedType`] if `path` was validated as a directory.
    /// - [`GuardError::FileTooLarge`] if the file exceeds the ceiling.
    /// - [`GuardError::Io`] on read failure or invalid UTF-8.
    pub async fn read_markdown(&self, path: &SafePath) -> Result<MarkdownFile, GuardError> {
        if path.kind != PathKind::File {
            return Err(GuardError::UnsupportedType {
                resolved: path.resolved.clone(),
                expected: PathKind::File,
            });
        }

        let limit = self.config.max_markdown_size;
        self.check_file_size(path).await?;

        let file = tokio::fs::File::open(&path.resolved)
            .await
            .map_err(|e| io_error(&path.resolved, e))?;
        let mut buf = Vec::new();
        file.take(limit.saturating_add(1))
            .read_to_end(&mut buf)
            .await
            .map_err(|e| io_error(&path.resolved, e))?;

        let read = u64::try_from(buf.len()).unwrap_or(u64::MAX);
        if read > limit {
            warn!(raw = %path.raw, size = read, limit, "file grew past limit during read");
            return Err(GuardError::FileTooLarge { size: read, limit });
        }

        let content = String::from_utf8(buf).map_err(|e| GuardError::Io {
            path: path.resolved.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        let name = path
            .resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(MarkdownFile {
            path: path.resolved.display().to_string(),
            name,
            content,
        })
    }

    /// Return the session's CSRF token, issuing a fresh one when needed.
    pub fn issue_csrf_token(&self, session: &mut Session) -> String {
        csrf::issue_csrf_token(session, self.config.csrf_expiry)
    }

    /// Validate a presented CSRF token against the session.
    ///
    /// # Errors
    ///
    /// See [`csrf::validate_csrf_token`].
    pub fn validate_csrf_token(
        &self,
        session: &Session,
        presented: Option<&str>,
    ) -> Result<(), CsrfError> {
        csrf::validate_csrf_token(session, presented, self.config.csrf_expiry)
    }
}

/// Reject a validated file whose size exceeds `max_bytes`.
///
/// Only metadata is consulted. A file of exactly `max_bytes` passes.
/// Returns the file size on success.
///
/// # Errors
///
/// - [`GuardError::FileTooLarge`] if the file is larger than `max_bytes`.
/// - [`GuardError::Io`] if metadata cannot be read.
pub async fn check_file_size(path: &SafePath, max_bytes: u64) -> Result<u64, GuardError> {
    let meta = tokio::fs::metadata(&path.resolved)
        .await
        .map_err(|e| io_error(&path.resolved, e))?;

    let size = meta.len();
    if size > max_bytes {
        warn!(
            raw = %path.raw,
            resolved = %path.resolved.display(),
            size,
            limit = max_bytes,
            "file rejected: too large"
        );
        return Err(GuardError::FileTooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(size)
}

/// Whether `path` ends in `.md` (case-insensitive).
#[must_use]
pub fn has_markdown_extension(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(MARKDOWN_EXTENSION))
}

/// Resolve `path` as far as the file system allows.
///
/// When the full path resolves, it exists. Otherwise the longest existing
/// ancestor is canonicalized and the rest is applied lexically; nothing past
/// that ancestor exists, so it cannot be a symlink.
async fn resolve_lenient(path: &Path) -> Result<(PathBuf, Existence), GuardError> {
    let existence = match tokio::fs::canonicalize(path).await {
        Ok(resolved) => return Ok((resolved, Existence::Exists)),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => Existence::Denied,
        Err(_) => Existence::Missing,
    };

    let components: Vec<Component<'_>> = path.components().collect();
    for split in (1..components.len()).rev() {
        let prefix: PathBuf = components[..split].iter().collect();
        let Ok(mut resolved) = tokio::fs::canonicalize(&prefix).await else {
            continue;
        };
        for component in &components[split..] {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        return Ok((resolved, existence));
    }

    // Absolute inputs always stop at the file-system root above; only a
    // relative path with no existing ancestor gets here.
    Err(GuardError::InvalidPath {
        reason: format!("no resolvable ancestor for '{}'", path.display()),
    })
}

fn io_error(path: &Path, err: io::Error) -> GuardError {
    match err.kind() {
        io::ErrorKind::NotFound => GuardError::NotFound {
            resolved: path.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => GuardError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => GuardError::Io {
            path: path.to_path_buf(),
            source: err,
        },
    }
}
