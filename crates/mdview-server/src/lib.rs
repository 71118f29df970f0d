//! `mdview` HTTP server.
//!
//! Wires the request guard, session store, and theme catalogue from
//! `mdview-core` into an Axum router. Serves the JSON API at `/api/*`, static
//! assets at `/static/*`, and the browser UI at `/`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::middleware as axum_mw;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::session_middleware;
use crate::state::AppState;

/// Policy limiting the page to same-origin resources.
const CONTENT_SECURITY_POLICY: &str =
    "default-src 'self'; img-src 'self' data:; object-src 'none'; base-uri 'none'; frame-ancestors 'none'";

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Every API request gets a session; it is only persisted if touched.
    let api = Router::new()
        .merge(routes::files::router())
        .merge(routes::csrf::router())
        .merge(routes::themes::router())
        .merge(routes::sys::router())
        .layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            session_middleware,
        ));

    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        .nest("/api", api)
        .nest_service("/static", static_files)
        .merge(routes::ui::router())
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("same-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .with_state(state)
}
