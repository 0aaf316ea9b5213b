//! Access and refresh token types, and unverified JWT claim decoding.
//!
//! Tokens are minted and verified by the backend. The portal only ever
//! *decodes* the access token to read its expiry so it can refresh
//! pre-emptively. Decoded claims must never be used to authorize anything:
//! the signature is not checked here.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};

/// Short-lived bearer credential sent as `Authorization: Bearer <token>`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

/// Long-lived credential that can mint a new token pair. Only ever travels
/// in an HTTP-only cookie or in the body of a backend refresh/logout call.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the embedded claims without verifying the signature.
    pub fn claims(&self) -> Result<AccessClaims, TokenError> {
        decode_claims(&self.0)
    }
}

impl RefreshToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Keep credentials out of logs.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshToken(..)")
    }
}

/// A freshly issued access/refresh pair, as returned by the backend refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
}

/// Claims the portal reads from an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: Option<u64>,
    /// User role, when the backend embeds it
    #[serde(default)]
    pub role: Option<String>,
}

impl AccessClaims {
    /// Whether the token has expired at `now` (Unix seconds).
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exp <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }
}

/// Errors from decoding a token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is not a compact JWT")]
    Malformed,
    #[error("invalid token header: {0}")]
    Header(#[from] jsonwebtoken::errors::Error),
    #[error("invalid token payload encoding: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("invalid token claims: {0}")]
    Claims(#[from] serde_json::Error),
}

/// Decode an access token's payload without signature verification.
pub fn decode_claims(token: &str) -> Result<AccessClaims, TokenError> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::Malformed);
    };

    jsonwebtoken::decode_header(token)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
