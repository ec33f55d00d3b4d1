//! Validated app credentials
//!
//! WeChat answers a wrong app secret and an expired access token with the
//! same generic 40001, so format problems must be caught before the first
//! network call. `AppCredentials::new` is the only constructor; a value of
//! this type is always well-formed.

use common::Secret;

use crate::error::{Error, Result};

/// App ID length: the `wx` prefix plus 16 hex characters.
const APP_ID_LEN: usize = 18;

/// App ID reserved prefix.
const APP_ID_PREFIX: &str = "wx";

/// App secret length: 32 hex characters.
const APP_SECRET_LEN: usize = 32;

/// Validated Official Account credential pair.
///
/// Immutable once constructed. One `TokenManager` owns exactly one pair;
/// switching accounts means constructing a new manager.
#[derive(Debug, Clone)]
pub struct AppCredentials {
    app_id: String,
    app_secret: Secret<String>,
}

impl AppCredentials {
    /// Validate and construct a credential pair.
    ///
    /// Rejects an app ID that is not `wx` + 16 hex chars, a secret that is
    /// not 32 hex chars, and either field carrying surrounding whitespace.
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Result<Self> {
        let app_id = app_id.into();
        let app_secret = app_secret.into();

        if app_id.trim() != app_id {
            return Err(Error::CredentialFormat(
                "app_id has leading or trailing whitespace".into(),
            ));
        }
        if app_secret.trim() != app_secret {
            return Err(Error::CredentialFormat(
                "app_secret has leading or trailing whitespace".into(),
            ));
        }
        if app_id.is_empty() {
            return Err(Error::CredentialFormat("app_id is required".into()));
        }
        if app_secret.is_empty() {
            return Err(Error::CredentialFormat("app_secret is required".into()));
        }
        if app_id.len() != APP_ID_LEN
            || !app_id.starts_with(APP_ID_PREFIX)
            || !app_id[APP_ID_PREFIX.len()..]
                .chars()
                .all(|c| c.is_ascii_hexdigit())
        {
            return Err(Error::CredentialFormat(format!(
                "app_id must be \"{APP_ID_PREFIX}\" followed by 16 hex characters \
                 ({APP_ID_LEN} total), got {} characters",
                app_id.len()
            )));
        }
        if app_secret.len() != APP_SECRET_LEN
            || !app_secret.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(Error::CredentialFormat(format!(
                "app_secret must be {APP_SECRET_LEN} hex characters, got {} characters",
                app_secret.len()
            )));
        }

        Ok(Self {
            app_id,
            app_secret: Secret::new(app_secret),
        })
    }

    /// App ID (not a secret — safe to log).
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// App secret, redacted in Debug output.
    pub fn app_secret(&self) -> &str {
        self.app_secret.expose()
    }
}
