//! Shared application state for the `mdview` server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`. It holds the request guard, the session store and
//! cookie signer, and the theme catalogue.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use mdview_core::crypto::{SessionKey, SessionSigner};
use mdview_core::guard::Guard;
use mdview_core::session::SessionStore;
use mdview_core::theme::ThemeStore;
use mdview_storage::{MemoryBackend, StorageBackend};

use crate::config::ServerConfig;

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// Path validation, size checks, and CSRF operations.
    pub guard: Guard,
    /// Server-side session records.
    pub sessions: SessionStore,
    /// Signs and verifies the session cookie.
    pub signer: SessionSigner,
    /// Theme stylesheets under the static directory.
    pub themes: ThemeStore,
    /// Directory listed when `/api/browse` is called without a path.
    pub default_browse_dir: PathBuf,
    /// Directory served under `/static`.
    pub static_dir: PathBuf,
    /// Whether session cookies carry the `Secure` flag.
    pub secure_cookies: bool,
}

impl AppState {
    /// Build the shared state from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the root directory cannot be resolved.
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Arc<Self>> {
        let guard = Guard::new(config.guard_config())
            .await
            .with_context(|| format!("invalid root directory {}", config.root_dir.display()))?;

        let key = if let Some(key) = &config.secret_key {
            key.clone()
        } else {
            warn!("MDVIEW_SECRET_KEY not set, generated an ephemeral session key; sessions will not survive a restart");
            SessionKey::generate()
        };

        let storage: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        let sessions = SessionStore::new(storage, config.session_lifetime());

        let documents = guard.root().join("Documents");
        let default_browse_dir = if tokio::fs::metadata(&documents)
            .await
            .is_ok_and(|m| m.is_dir())
        {
            documents
        } else {
            guard.root().to_path_buf()
        };

        info!(
            root = %guard.root().display(),
            max_markdown_size = config.max_markdown_size,
            production = config.production,
            "request guard ready"
        );

        Ok(Arc::new(Self {
            guard,
            sessions,
            signer: SessionSigner::new(key),
            themes: ThemeStore::new(config.themes_dir()),
            default_browse_dir,
            static_dir: config.static_dir.clone(),
            secure_cookies: config.production,
        }))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("root", &self.guard.root())
            .field("secure_cookies", &self.secure_cookies)
            .finish_non_exhaustive()
    }
}
