//! Landing page and browser UI routes.
//!
//! The page and its script are compiled into the binary. Markdown is
//! rendered client-side by `marked` and sanitized by `DOMPurify` when those
//! are present under `/static/js`; otherwise the raw text is shown escaped.

use std::sync::Arc;

use axum::Router;
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum::routing::get;

use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../../assets/index.html");
const APP_JS: &str = include_str!("../../assets/app.js");

/// Build the UI router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(landing_page))
        .route("/app.js", get(app_script))
}

async fn landing_page() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn app_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        APP_JS,
    )
}
