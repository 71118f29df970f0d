//! Theme catalogue routes: `/api/themes`.
//!
//! Listing is public. Saving requires the session's CSRF token in the
//! `X-CSRF-Token` header; the token is checked before the body is parsed.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;
use tower::limit::ConcurrencyLimitLayer;

use mdview_core::theme::{MAX_THEME_CSS_BYTES, SaveTheme, Theme};

use crate::error::AppError;
use crate::middleware::SessionHandle;
use crate::state::AppState;

/// Header carrying the CSRF token on mutating requests.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Request body ceiling: the CSS limit plus room for the other fields.
const MAX_SAVE_BODY_BYTES: usize = MAX_THEME_CSS_BYTES + 64 * 1024;

/// Concurrent theme requests allowed.
const THEME_CONCURRENCY: usize = 8;

/// Build the theme router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/themes", get(list_themes).post(save_theme))
        .layer(DefaultBodyLimit::max(MAX_SAVE_BODY_BYTES))
        .layer(ConcurrencyLimitLayer::new(THEME_CONCURRENCY))
}

// ── Response types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ThemeListResponse {
    pub themes: Vec<Theme>,
}

#[derive(Debug, Serialize)]
pub struct SaveThemeResponse {
    pub success: bool,
    pub id: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// List every theme in the catalogue.
async fn list_themes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ThemeListResponse>, AppError> {
    let themes = state.themes.list().await?;
    Ok(Json(ThemeListResponse { themes }))
}

/// Save a theme after CSRF validation.
async fn save_theme(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SaveThemeResponse>, AppError> {
    let presented = headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok());
    {
        let session = session.lock().await;
        state.guard.validate_csrf_token(&session, presented)?;
    }

    let theme: SaveTheme =
        serde_json::from_slice(&body).map_err(|_| AppError::BadRequest("Invalid theme"))?;
    let id = state.themes.save(theme).await?;

    Ok(Json(SaveThemeResponse { success: true, id }))
}
