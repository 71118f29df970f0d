//! File browsing routes: `/api/browse` and `/api/file`.
//!
//! Both take a `path` query parameter, which goes through the request guard
//! before anything touches the file system.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use mdview_core::browse::{DirectoryListing, list_directory};
use mdview_core::guard::{MarkdownFile, PathKind};

use crate::error::AppError;
use crate::state::AppState;

/// Build the file browsing router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/browse", get(browse))
        .route("/file", get(read_file))
}

// ── Request types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    pub path: Option<String>,
}

impl PathQuery {
    fn non_empty(self) -> Option<String> {
        self.path.filter(|p| !p.trim().is_empty())
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

/// List a directory. Without a path, lists `<root>/Documents` if present,
/// else the root.
async fn browse(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<DirectoryListing>, AppError> {
    let raw = query
        .non_empty()
        .unwrap_or_else(|| state.default_browse_dir.display().to_string());

    let dir = state.guard.validate_path(&raw, PathKind::Directory).await?;
    let listing = list_directory(&dir, state.guard.root()).await?;
    Ok(Json(listing))
}

/// Return a markdown file's contents.
async fn read_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PathQuery>,
) -> Result<Json<MarkdownFile>, AppError> {
    let raw = query
        .non_empty()
        .ok_or(AppError::BadRequest("No path provided"))?;

    let path = state.guard.validate_path(&raw, PathKind::File).await?;
    let file = state.guard.read_markdown(&path).await?;
    Ok(Json(file))
}
