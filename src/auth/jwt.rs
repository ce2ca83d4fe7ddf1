//! Read-only peek at JWT claims for display.
//!
//! Nothing here validates a token; the backend's status code is the only
//! authority on whether a token is usable.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct PeekedClaims {
    pub sub: Option<String>,
    pub exp: Option<i64>,
}

impl PeekedClaims {
    /// Seconds until expiry relative to `now`; negative once past.
    pub fn expires_in(&self, now: i64) -> Option<i64> {
        self.exp.map(|exp| exp - now)
    }
}

/// Decode the payload segment of a compact JWT. Returns `None` for anything
/// that does not look like one.
pub fn peek_claims(token: &str) -> Option<PeekedClaims> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}
