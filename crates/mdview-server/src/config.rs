//! Server configuration for `mdview`.
//!
//! Loads configuration from environment variables with sensible defaults.
//! All settings can be overridden via `MDVIEW_*` environment variables.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use chrono::Duration;
use mdview_core::crypto::{MIN_SESSION_KEY_LEN, SessionKey};
use mdview_core::guard::{DEFAULT_MAX_MARKDOWN_SIZE, GuardConfig};
use mdview_core::session::DEFAULT_SESSION_LIFETIME_SECS;

/// Default listen port.
const DEFAULT_PORT: u16 = 5000;

/// Default seconds between expired-session sweeps.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Longest accepted session lifetime (ten years). Larger values overflow
/// timestamp arithmetic.
const MAX_SESSION_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Production mode was requested without a session key.
    #[error("MDVIEW_SECRET_KEY must be set when MDVIEW_PRODUCTION is enabled")]
    MissingSecretKey,

    /// The configured session key is too short.
    #[error("MDVIEW_SECRET_KEY must be at least {min} bytes, got {len}")]
    WeakSecretKey { len: usize, min: usize },

    /// Neither `MDVIEW_ROOT` nor `HOME` is set.
    #[error("no root directory: set MDVIEW_ROOT or HOME")]
    MissingRoot,

    /// A variable holds a value that cannot be used.
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Log level filter (e.g., `info`, `debug`, `warn`).
    pub log_level: String,
    /// Production mode: `Secure` cookies, mandatory secret key.
    pub production: bool,
    /// Session signing key. `None` means one is generated at startup.
    pub secret_key: Option<SessionKey>,
    /// Directory all browsing and reads are confined to.
    pub root_dir: PathBuf,
    /// Directory served under `/static`.
    pub static_dir: PathBuf,
    /// Markdown size ceiling in bytes.
    pub max_markdown_size: u64,
    /// Session lifetime in seconds.
    pub session_lifetime_secs: i64,
    /// Seconds between expired-session sweeps.
    pub session_sweep_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MDVIEW_BIND_ADDR`: full bind address (overrides host and port)
    /// - `MDVIEW_HOST`: host to bind on (default: `127.0.0.1`)
    /// - `MDVIEW_PORT`: port to bind on (default: `5000`)
    /// - `MDVIEW_SECRET_KEY`: session signing key, at least 32 bytes
    ///   (required in production, generated otherwise)
    /// - `MDVIEW_PRODUCTION`: production mode (default: `false`)
    /// - `MDVIEW_DEBUG`: debug mode, lowers the default log level (default: `false`)
    /// - `MDVIEW_LOG_LEVEL`: log filter (default: `info`, or `debug` in debug mode)
    /// - `MDVIEW_ROOT`: root directory (default: `$HOME`)
    /// - `MDVIEW_STATIC_DIR`: static asset directory (default: `./static`)
    /// - `MDVIEW_MAX_MARKDOWN_SIZE`: size ceiling in bytes (default: `10485760`)
    /// - `MDVIEW_SESSION_LIFETIME`: session lifetime in seconds (default: `86400`)
    /// - `MDVIEW_SESSION_SWEEP_INTERVAL`: seconds between session sweeps (default: `300`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a required value is missing or a value is
    /// out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| lookup(key).is_some_and(|v| v == "true" || v == "1");

        // Priority: MDVIEW_BIND_ADDR > MDVIEW_HOST/MDVIEW_PORT > 127.0.0.1:5000
        let bind_addr = if let Some(addr) = lookup("MDVIEW_BIND_ADDR") {
            addr.parse().map_err(|_| ConfigError::Invalid {
                var: "MDVIEW_BIND_ADDR",
                reason: format!("'{addr}' is not a socket address"),
            })?
        } else {
            let host: IpAddr = match lookup("MDVIEW_HOST") {
                Some(host) => host.parse().map_err(|_| ConfigError::Invalid {
                    var: "MDVIEW_HOST",
                    reason: format!("'{host}' is not an IP address"),
                })?,
                None => IpAddr::V4(Ipv4Addr::LOCALHOST),
            };
            let port: u16 = match lookup("MDVIEW_PORT") {
                Some(port) => port.parse().map_err(|_| ConfigError::Invalid {
                    var: "MDVIEW_PORT",
                    reason: format!("'{port}' is not a port number"),
                })?,
                None => DEFAULT_PORT,
            };
            SocketAddr::new(host, port)
        };

        let production = flag("MDVIEW_PRODUCTION");
        let debug = flag("MDVIEW_DEBUG");

        let log_level = lookup("MDVIEW_LOG_LEVEL")
            .unwrap_or_else(|| String::from(if debug { "debug" } else { "info" }));

        let secret_key = match lookup("MDVIEW_SECRET_KEY").filter(|k| !k.is_empty()) {
            Some(key) if key.len() < MIN_SESSION_KEY_LEN => {
                return Err(ConfigError::WeakSecretKey {
                    len: key.len(),
                    min: MIN_SESSION_KEY_LEN,
                });
            }
            Some(key) => Some(SessionKey::from_bytes(key.into_bytes())),
            None if production => return Err(ConfigError::MissingSecretKey),
            None => None,
        };

        let root_dir = lookup("MDVIEW_ROOT")
            .or_else(|| lookup("HOME"))
            .filter(|r| !r.is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingRoot)?;

        let static_dir = lookup("MDVIEW_STATIC_DIR")
            .map_or_else(|| PathBuf::from("./static"), PathBuf::from);

        let max_markdown_size = positive(
            &lookup,
            "MDVIEW_MAX_MARKDOWN_SIZE",
            DEFAULT_MAX_MARKDOWN_SIZE,
        )?;
        let session_lifetime = positive(
            &lookup,
            "MDVIEW_SESSION_LIFETIME",
            DEFAULT_SESSION_LIFETIME_SECS.unsigned_abs(),
        )?;
        if session_lifetime > MAX_SESSION_LIFETIME_SECS {
            return Err(ConfigError::Invalid {
                var: "MDVIEW_SESSION_LIFETIME",
                reason: format!("must be at most {MAX_SESSION_LIFETIME_SECS} seconds"),
            });
        }
        let session_lifetime_secs =
            i64::try_from(session_lifetime).map_err(|_| ConfigError::Invalid {
                var: "MDVIEW_SESSION_LIFETIME",
                reason: "value is too large".to_owned(),
            })?;
        let session_sweep_interval_secs = positive(
            &lookup,
            "MDVIEW_SESSION_SWEEP_INTERVAL",
            DEFAULT_SWEEP_INTERVAL_SECS,
        )?;

        Ok(Self {
            bind_addr,
            log_level,
            production,
            secret_key,
            root_dir,
            static_dir,
            max_markdown_size,
            session_lifetime_secs,
            session_sweep_interval_secs,
        })
    }

    /// Directory holding theme stylesheets.
    #[must_use]
    pub fn themes_dir(&self) -> PathBuf {
        self.static_dir.join("css").join("themes")
    }

    /// Session lifetime as a [`Duration`].
    #[must_use]
    pub fn session_lifetime(&self) -> Duration {
        Duration::seconds(self.session_lifetime_secs)
    }

    /// Guard settings derived from this configuration.
    #[must_use]
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            max_markdown_size: self.max_markdown_size,
            ..GuardConfig::new(&self.root_dir)
        }
    }
}

/// Parse an optional positive integer, falling back to `default` when unset.
fn positive<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            reason: "must be greater than zero".to_owned(),
        }),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: format!("'{raw}' is not a number: {e}"),
        }),
    }
}
