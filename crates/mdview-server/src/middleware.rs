//! Session middleware for `mdview`.
//!
//! Reads the signed `mdview_session` cookie, loads the matching session (or
//! starts a new one), and injects it into the request extensions as a
//! [`SessionHandle`]. After the handler runs, a modified session is saved and
//! the cookie is (re)issued. Unmodified sessions never produce a cookie.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use cookie::time::Duration as CookieDuration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

use mdview_core::error::SessionError;
use mdview_core::session::Session;

use crate::error::AppError;
use crate::state::AppState;

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "mdview_session";

/// The current request's session, shared between middleware and handler.
#[derive(Debug, Clone)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    /// Lock the session for reading or mutation.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().await
    }
}

/// Middleware that attaches a [`SessionHandle`] to every request.
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let session = load_session(&state, &jar)
        .await
        .unwrap_or_else(|| state.sessions.create());

    let handle = SessionHandle::new(session);
    req.extensions_mut().insert(handle.clone());

    let response = next.run(req).await;

    let mut session = handle.lock().await;
    if !session.is_modified() {
        return response;
    }

    if let Err(e) = state.sessions.save(&mut session).await {
        error!(session = session.log_id(), error = %e, "failed to persist session");
        return AppError::Internal.into_response();
    }

    match session_cookie(&state, &session) {
        Ok(cookie) => (jar.add(cookie), response).into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

/// Resolve the cookie to a live session, if it names one.
async fn load_session(state: &AppState, jar: &CookieJar) -> Option<Session> {
    let cookie = jar.get(SESSION_COOKIE_NAME)?;

    let Some(id) = state.signer.verify(cookie.value()) else {
        warn!("session cookie failed signature check, starting new session");
        return None;
    };

    match state.sessions.load(&id).await {
        Ok(Some(session)) => Some(session),
        Ok(None) => {
            debug!("session cookie names an unknown or expired session");
            None
        }
        Err(e) => {
            warn!(error = %e, "failed to load session, starting new session");
            None
        }
    }
}

/// Build the hardened session cookie for `session`.
fn session_cookie(state: &AppState, session: &Session) -> Result<Cookie<'static>, SessionError> {
    let mut cookie = Cookie::build((SESSION_COOKIE_NAME, state.signer.sign(&session.id)?))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.secure_cookies);

    if session.permanent {
        let lifetime = state.sessions.lifetime().num_seconds();
        cookie = cookie.max_age(CookieDuration::seconds(lifetime));
    }

    Ok(cookie.build())
}
