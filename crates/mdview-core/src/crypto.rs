//! Random tokens and cookie signing for `mdview`.
//!
//! # Security model
//!
//! - Session ids and CSRF tokens are 32 bytes from the OS CSPRNG,
//!   hex-encoded (64 characters).
//! - Session cookies carry `id.mac` where `mac` is HMAC-SHA256 of the id
//!   under the server's session key. Verification is constant-time.
//! - The session key is zeroized on drop and never appears in `Debug`.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SessionError;

type HmacSha256 = Hmac<Sha256>;

/// Number of random bytes in a token.
pub const TOKEN_BYTES: usize = 32;

/// Minimum accepted length for a configured session key.
pub const MIN_SESSION_KEY_LEN: usize = 32;

/// Generate a new random token, hex-encoded.
#[must_use]
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Whether `value` has the shape of a token from [`random_token`].
#[must_use]
pub fn is_token_shaped(value: &str) -> bool {
    value.len() == TOKEN_BYTES * 2 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Compare two strings without short-circuiting on the first differing byte.
///
/// Strings of different length compare unequal.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Key material used to sign session cookies.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey(Vec<u8>);

impl SessionKey {
    /// Wrap configured key bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random key. Sessions signed with it do not survive a
    /// restart.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Length of the key in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn mac(&self) -> Result<HmacSha256, SessionError> {
        HmacSha256::new_from_slice(&self.0).map_err(|e| SessionError::Signing {
            reason: e.to_string(),
        })
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Signs and verifies session cookie values.
#[derive(Debug, Clone)]
pub struct SessionSigner {
    key: SessionKey,
}

impl SessionSigner {
    /// Create a signer for the given key.
    #[must_use]
    pub fn new(key: SessionKey) -> Self {
        Self { key }
    }

    /// Produce the cookie value `id.mac` for a session id.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Signing`] if the key cannot initialize HMAC.
    pub fn sign(&self, session_id: &str) -> Result<String, SessionError> {
        let mut mac = self.key.mac()?;
        mac.update(session_id.as_bytes());
        Ok(format!(
            "{session_id}.{}",
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    /// Verify a cookie value and return the session id it carries.
    ///
    /// Returns `None` for malformed values and bad signatures.
    #[must_use]
    pub fn verify(&self, cookie_value: &str) -> Option<String> {
        let (session_id, mac_hex) = cookie_value.split_once('.')?;
        if !is_token_shaped(session_id) {
            return None;
        }
        let expected = hex::decode(mac_hex).ok()?;

        let mut mac = self.key.mac().ok()?;
        mac.update(session_id.as_bytes());
        mac.verify_slice(&expected).ok()?;
        Some(session_id.to_owned())
    }
}
