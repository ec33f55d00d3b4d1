//! Stable-token request building and response parsing
//!
//! The stable-token endpoint takes a JSON POST with the credential pair and
//! returns `{access_token, expires_in}` on success or `{errcode, errmsg}` on
//! failure. Building and parsing live here, away from the HTTP path, so the
//! token manager's refresh logic can be exercised against canned bodies.

use serde::Deserialize;
use serde_json::json;

use crate::credentials::AppCredentials;
use crate::errcode;
use crate::error::{Error, Result};

/// Response from the stable-token endpoint.
///
/// `expires_in` is a delta in seconds from the response time. The token
/// manager converts it to an absolute expiry when caching.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
}

/// A cached access token.
///
/// Replaced wholesale on refresh, never mutated in place, and never persisted
/// outside process memory.
#[derive(Debug, Clone)]
pub struct Token {
    pub value: String,
    /// Unix milliseconds at which the token was obtained
    pub obtained_at_millis: u64,
    pub ttl_secs: u64,
}

impl Token {
    /// Absolute expiry in unix milliseconds.
    pub fn expires_at_millis(&self) -> u64 {
        self.obtained_at_millis + self.ttl_secs * 1000
    }

    /// Whether the token is still valid with at least `margin_millis` of TTL
    /// left at `now_millis`.
    pub fn fresh_at(&self, now_millis: u64, margin_millis: u64) -> bool {
        self.expires_at_millis() > now_millis + margin_millis
    }
}

/// Build the JSON payload for a stable-token request.
///
/// `force_refresh` asks the platform to invalidate the previous token and
/// mint a new one; used after a request-time 40014/42001.
pub fn refresh_request(credentials: &AppCredentials, force_refresh: bool) -> serde_json::Value {
    json!({
        "grant_type": "client_credential",
        "appid": credentials.app_id(),
        "secret": credentials.app_secret(),
        "force_refresh": force_refresh,
    })
}

/// Parse a stable-token response body.
///
/// A body with a non-zero `errcode` is translated through the errcode table;
/// anything else must carry `access_token` and `expires_in`.
pub fn parse_response(body: &[u8]) -> Result<TokenResponse> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| Error::Parse(format!("token endpoint returned invalid JSON: {e}")))?;

    if let Some(code) = value.get("errcode").and_then(|c| c.as_i64())
        && code != 0
    {
        let errmsg = value.get("errmsg").and_then(|m| m.as_str()).unwrap_or("");
        return Err(Error::Api(errcode::translate(code, errmsg)));
    }

    serde_json::from_value(value)
        .map_err(|e| Error::Parse(format!("invalid token response: {e}")))
}
