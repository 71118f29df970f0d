//! CSRF token route: `/api/csrf-token`.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};
use serde::Serialize;

use crate::middleware::SessionHandle;
use crate::state::AppState;

/// Build the CSRF token router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/csrf-token", get(csrf_token))
}

#[derive(Debug, Serialize)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

/// Return the session's CSRF token, issuing one if needed.
async fn csrf_token(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
) -> Json<CsrfTokenResponse> {
    let mut session = session.lock().await;
    let csrf_token = state.guard.issue_csrf_token(&mut session);
    Json(CsrfTokenResponse { csrf_token })
}
