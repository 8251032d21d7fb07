//! Request Authentication
//!
//! HMAC-SHA256 request signing for venue command calls and private stream
//! auth frames.
//!
//! # Signing Scheme
//!
//! The canonical string is `timestamp + method + path + body + nonce`; its
//! HMAC-SHA256 digest (keyed by the API secret) is encoded as lowercase hex
//! or standard base64 per venue convention. The signer is stateless apart
//! from the nonce sequence and safe to call concurrently.
//!
//! Secrets are never logged: `Debug` and `Display` implementations redact.

use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use chrono::Utc;
use thiserror::Error;

use crate::application::ports::{CommandPayload, SignedRequest};

/// Header carrying the API key.
pub const HEADER_KEY: &str = "X-API-KEY";
/// Header carrying the request timestamp (unix seconds).
pub const HEADER_TIMESTAMP: &str = "X-API-TIMESTAMP";
/// Header carrying the request nonce.
pub const HEADER_NONCE: &str = "X-API-NONCE";
/// Header carrying the request signature.
pub const HEADER_SIGNATURE: &str = "X-API-SIGN";

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur while building credentials.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// A required credential environment variable is not set.
    #[error("missing credential environment variable: {0}")]
    MissingCredential(String),

    /// A credential value is empty.
    #[error("credential {0} cannot be empty")]
    EmptyCredential(String),
}

// =============================================================================
// Credentials
// =============================================================================

/// Venue API credentials.
///
/// The `Debug` implementation redacts both values so credentials can appear
/// in error context without leaking.
#[derive(Clone)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if either key or secret is empty.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Result<Self, AuthError> {
        let key = key.into();
        let secret = secret.into();

        if key.is_empty() {
            return Err(AuthError::EmptyCredential("API key".to_string()));
        }
        if secret.is_empty() {
            return Err(AuthError::EmptyCredential("API secret".to_string()));
        }

        Ok(Self { key, secret })
    }

    /// Create credentials from environment variables.
    ///
    /// Reads `ADAPTER_API_KEY` and `ADAPTER_API_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns an error if either variable is unset or empty.
    pub fn from_env() -> Result<Self, AuthError> {
        let key = std::env::var("ADAPTER_API_KEY")
            .map_err(|_| AuthError::MissingCredential("ADAPTER_API_KEY".to_string()))?;
        let secret = std::env::var("ADAPTER_API_SECRET")
            .map_err(|_| AuthError::MissingCredential("ADAPTER_API_SECRET".to_string()))?;

        Self::new(key, secret)
    }

    /// The API key (safe to send in headers).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn secret_bytes(&self) -> &[u8] {
        self.secret.as_bytes()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl std::fmt::Display for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credentials(key={})", self.key)
    }
}

// =============================================================================
// Nonce Sequence
// =============================================================================

/// Strictly increasing nonce source.
///
/// Seeded from the wall clock at construction, then advanced atomically, so
/// nonces stay unique across concurrent requests and across process
/// restarts within the same millisecond resolution.
#[derive(Debug)]
pub struct NonceSequence {
    counter: AtomicU64,
}

impl Default for NonceSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceSequence {
    /// Create a sequence seeded from the current time.
    #[must_use]
    pub fn new() -> Self {
        #[allow(clippy::cast_sign_loss)]
        let seed = Utc::now().timestamp_millis().max(0) as u64;
        Self {
            counter: AtomicU64::new(seed),
        }
    }

    /// Create a sequence starting at a fixed value (deterministic tests).
    #[must_use]
    pub const fn starting_at(seed: u64) -> Self {
        Self {
            counter: AtomicU64::new(seed),
        }
    }

    /// Next nonce.
    pub fn next_nonce(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

// =============================================================================
// Signature Encoding
// =============================================================================

/// Digest encoding required by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureEncoding {
    /// Lowercase hexadecimal.
    #[default]
    Hex,
    /// Standard base64 with padding.
    Base64,
}

impl SignatureEncoding {
    /// Encode a digest.
    #[must_use]
    pub fn encode(self, digest: &[u8; 32]) -> String {
        match self {
            Self::Hex => hex::encode(digest),
            Self::Base64 => base64::engine::general_purpose::STANDARD.encode(digest),
        }
    }
}

// =============================================================================
// Request Signer
// =============================================================================

/// Signs command requests and private-stream auth frames.
///
/// # Example
///
/// ```rust
/// use adapter_core::application::ports::{CommandMethod, CommandPayload};
/// use adapter_core::infrastructure::auth::{Credentials, RequestSigner, SignatureEncoding};
///
/// let credentials = Credentials::new("key", "secret").unwrap();
/// let signer = RequestSigner::new(credentials, SignatureEncoding::Hex);
///
/// let payload = CommandPayload {
///     method: CommandMethod::Post,
///     path: "/v1/orders".to_string(),
///     body: "{}".to_string(),
/// };
/// let signed = signer.sign(&payload);
/// assert_eq!(signed.headers.len(), 4);
/// ```
#[derive(Debug)]
pub struct RequestSigner {
    credentials: Credentials,
    encoding: SignatureEncoding,
    nonce: NonceSequence,
}

impl RequestSigner {
    /// Create a signer.
    #[must_use]
    pub fn new(credentials: Credentials, encoding: SignatureEncoding) -> Self {
        Self {
            credentials,
            encoding,
            nonce: NonceSequence::new(),
        }
    }

    /// The API key this signer authenticates as.
    #[must_use]
    pub fn key(&self) -> &str {
        self.credentials.key()
    }

    /// Compute the signature for explicit inputs.
    ///
    /// Exposed separately from [`sign`](Self::sign) so the scheme can be
    /// verified against fixed inputs.
    #[must_use]
    pub fn signature(
        &self,
        timestamp: &str,
        nonce: u64,
        method: &str,
        path: &str,
        body: &str,
    ) -> String {
        let canonical = format!("{timestamp}{method}{path}{body}{nonce}");
        let digest = hmac_sha256::HMAC::mac(canonical.as_bytes(), self.credentials.secret_bytes());
        self.encoding.encode(&digest)
    }

    /// Sign a command payload, producing the full header set.
    #[must_use]
    pub fn sign(&self, payload: &CommandPayload) -> SignedRequest {
        let timestamp = Utc::now().timestamp().to_string();
        let nonce = self.nonce.next_nonce();
        let signature = self.signature(
            &timestamp,
            nonce,
            payload.method.as_str(),
            &payload.path,
            &payload.body,
        );

        SignedRequest {
            method: payload.method,
            path: payload.path.clone(),
            body: payload.body.clone(),
            headers: vec![
                (HEADER_KEY.to_string(), self.credentials.key().to_string()),
                (HEADER_TIMESTAMP.to_string(), timestamp),
                (HEADER_NONCE.to_string(), nonce.to_string()),
                (HEADER_SIGNATURE.to_string(), signature),
            ],
        }
    }

    /// Build the auth frame sent on private streaming connections.
    ///
    /// Signs the fixed `GET /ws/auth` canonical request, matching the
    /// command-path scheme so venues verify both with the same secret.
    #[must_use]
    pub fn stream_auth_frame(&self) -> String {
        let timestamp = Utc::now().timestamp().to_string();
        let nonce = self.nonce.next_nonce();
        let signature = self.signature(&timestamp, nonce, "GET", "/ws/auth", "");

        serde_json::json!({
            "op": "auth",
            "key": self.credentials.key(),
            "ts": timestamp,
            "nonce": nonce.to_string(),
            "sig": signature,
        })
        .to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
