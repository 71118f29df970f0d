//! Anti-forgery tokens bound to a [`Session`].
//!
//! Lifecycle: `ABSENT → ISSUED → (reused while fresh) → EXPIRED → re-ISSUED`.
//! Expiry is evaluated lazily whenever a token is issued or validated; there
//! is no background timer. Validation never rotates the token.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::crypto::{constant_time_eq, random_token};
use crate::error::CsrfError;
use crate::session::Session;

/// Lifetime of a CSRF token in seconds (one hour).
pub const CSRF_TOKEN_EXPIRY_SECS: i64 = 60 * 60;

/// The token expiry window as a [`Duration`].
#[must_use]
pub fn default_expiry() -> Duration {
    Duration::seconds(CSRF_TOKEN_EXPIRY_SECS)
}

/// A token stored in the session alongside its issuance time.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CsrfToken {
    /// Hex-encoded random value.
    pub value: String,
    /// When the token was issued.
    pub issued_at: DateTime<Utc>,
}

impl CsrfToken {
    /// Whether the token has reached the end of its window at `now`.
    ///
    /// A token dated in the future is treated as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let age = now - self.issued_at;
        age < Duration::zero() || age >= window
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfToken")
            .field("value", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Return the session's token, minting a new one if absent or expired.
pub fn issue_csrf_token(session: &mut Session, window: Duration) -> String {
    issue_csrf_token_at(session, window, Utc::now())
}

/// [`issue_csrf_token`] with an explicit clock.
///
/// Issuing a new token marks the session permanent and modified.
pub fn issue_csrf_token_at(session: &mut Session, window: Duration, now: DateTime<Utc>) -> String {
    if let Some(token) = &session.csrf {
        if !token.is_expired_at(now, window) {
            return token.value.clone();
        }
        debug!(session = session.log_id(), "CSRF token expired, rotating");
    }

    let value = random_token();
    session.csrf = Some(CsrfToken {
        value: value.clone(),
        issued_at: now,
    });
    session.permanent = true;
    session.mark_modified();
    value
}

/// Check a presented token against the session's current token.
///
/// # Errors
///
/// - [`CsrfError::MissingToken`] if the session holds no token.
/// - [`CsrfError::ExpiredToken`] if the stored token is out of its window.
/// - [`CsrfError::Mismatch`] if the presented token is absent, empty, or
///   different from the stored one.
pub fn validate_csrf_token(
    session: &Session,
    presented: Option<&str>,
    window: Duration,
) -> Result<(), CsrfError> {
    validate_csrf_token_at(session, presented, window, Utc::now())
}

/// [`validate_csrf_token`] with an explicit clock.
///
/// # Errors
///
/// Same as [`validate_csrf_token`].
pub fn validate_csrf_token_at(
    session: &Session,
    presented: Option<&str>,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<(), CsrfError> {
    let result = check(session, presented, window, now);
    if let Err(ref err) = result {
        warn!(session = session.log_id(), error = %err, "CSRF validation failed");
    }
    result
}

fn check(
    session: &Session,
    presented: Option<&str>,
    window: Duration,
    now: DateTime<Utc>,
) -> Result<(), CsrfError> {
    let stored = session.csrf.as_ref().ok_or(CsrfError::MissingToken)?;

    if stored.is_expired_at(now, window) {
        return Err(CsrfError::ExpiredToken);
    }

    match presented {
        Some(token) if !token.is_empty() && constant_time_eq(token, &stored.value) => Ok(()),
        _ => Err(CsrfError::Mismatch),
    }
}
