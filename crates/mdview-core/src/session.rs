//! Server-side sessions for `mdview`.
//!
//! A [`Session`] is an explicit value: the HTTP layer loads it once per
//! request, hands it to the guard operations that need it, and saves it back
//! if it changed. Records are stored as JSON under `sessions/<id>` in any
//! [`StorageBackend`].
//!
//! Session ids are 32 random bytes (hex). The id only ever leaves the server
//! inside a signed cookie, and only an 8-character prefix is logged.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mdview_storage::StorageBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::crypto::{is_token_shaped, random_token};
use crate::csrf::CsrfToken;
use crate::error::SessionError;

/// Storage prefix for session records.
const SESSION_PREFIX: &str = "sessions/";

/// Default session lifetime in seconds (24 hours).
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Per-client session state.
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    /// Random session id (the storage key suffix).
    pub id: String,
    /// When the session was first created.
    pub created_at: DateTime<Utc>,
    /// When the session stops being honoured.
    pub expires_at: DateTime<Utc>,
    /// Whether the cookie should outlive the browser session.
    pub permanent: bool,
    /// Current anti-forgery token, if one has been issued.
    pub csrf: Option<CsrfToken>,
    #[serde(skip)]
    modified: bool,
    #[serde(skip)]
    fresh: bool,
}

impl Session {
    /// Build a new, unsaved session expiring `lifetime` after `now`.
    #[must_use]
    pub fn new_at(now: DateTime<Utc>, lifetime: Duration) -> Self {
        Self {
            id: random_token(),
            created_at: now,
            expires_at: now + lifetime,
            permanent: false,
            csrf: None,
            modified: false,
            fresh: true,
        }
    }

    /// Whether the session has passed its expiry time.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Record that the session must be written back.
    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    /// Whether the session changed since it was loaded or created.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Whether the session was created during this request.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.fresh
    }

    /// Short id prefix for log lines.
    #[must_use]
    pub fn log_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &format_args!("{}…", self.log_id()))
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("permanent", &self.permanent)
            .field("csrf", &self.csrf)
            .field("modified", &self.modified)
            .finish()
    }
}

/// Creates, loads, saves, and expires sessions.
pub struct SessionStore {
    backend: Arc<dyn StorageBackend>,
    lifetime: Duration,
}

impl SessionStore {
    /// Create a session store over the given backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>, lifetime: Duration) -> Self {
        Self { backend, lifetime }
    }

    /// Configured session lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Start a new session. Nothing is stored until [`save`](Self::save).
    #[must_use]
    pub fn create(&self) -> Session {
        Session::new_at(Utc::now(), self.lifetime)
    }

    /// Load a session by id.
    ///
    /// Returns `Ok(None)` for unknown, malformed, or expired ids. Expired
    /// records are deleted on the way out.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Storage`] if the backend fails.
    /// - [`SessionError::Serialization`] if the stored record is corrupt.
    pub async fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        if !is_token_shaped(id) {
            return Ok(None);
        }

        let key = format!("{SESSION_PREFIX}{id}");
        let Some(data) = self.backend.get(&key).await? else {
            return Ok(None);
        };

        let session: Session =
            serde_json::from_slice(&data).map_err(|e| SessionError::Serialization {
                reason: format!("session deserialization failed: {e}"),
            })?;

        if session.is_expired_at(Utc::now()) {
            self.backend.delete(&key).await?;
            debug!(session = session.log_id(), "expired session discarded");
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Persist a session and extend its expiry by the configured lifetime.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Serialization`] if encoding fails.
    /// - [`SessionError::Storage`] if the backend fails.
    pub async fn save(&self, session: &mut Session) -> Result<(), SessionError> {
        session.expires_at = Utc::now() + self.lifetime;

        let bytes = serde_json::to_vec(&*session).map_err(|e| SessionError::Serialization {
            reason: format!("session serialization failed: {e}"),
        })?;

        let key = format!("{SESSION_PREFIX}{}", session.id);
        self.backend.put(&key, &bytes).await?;

        if session.fresh {
            info!(session = session.log_id(), "session created");
        }
        session.modified = false;
        session.fresh = false;
        Ok(())
    }

    /// Delete a session. Removing an unknown id is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the backend fails.
    pub async fn remove(&self, id: &str) -> Result<(), SessionError> {
        if !is_token_shaped(id) {
            return Ok(());
        }
        self.backend.delete(&format!("{SESSION_PREFIX}{id}")).await?;
        Ok(())
    }

    /// Delete every expired session record. Returns how many were removed.
    ///
    /// Corrupt records are removed as well.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Storage`] if the backend fails.
    pub async fn purge_expired(&self) -> Result<usize, SessionError> {
        let now = Utc::now();
        let keys = self.backend.list(SESSION_PREFIX).await?;
        let mut removed = 0usize;

        for key in &keys {
            let Some(data) = self.backend.get(key).await? else {
                continue;
            };
            let expired = !serde_json::from_slice::<Session>(&data)
                .is_ok_and(|session| !session.is_expired_at(now));
            if expired {
                self.backend.delete(key).await?;
                removed = removed.saturating_add(1);
            }
        }

        Ok(removed)
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}
