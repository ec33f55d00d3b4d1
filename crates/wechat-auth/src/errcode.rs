//! Errcode translation for WeChat API responses
//!
//! WeChat reports every failure as a flat `{errcode, errmsg}` pair. This
//! module is the single source of truth for what each code means to the
//! request path: only the `TokenExpired` category triggers the forced
//! refresh-and-retry cycle; none of the other categories are retried
//! automatically.

/// Failure category derived from a WeChat errcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad app ID or secret; the token manager becomes unusable until the
    /// credential pair is replaced
    InvalidCredential,
    /// A required request parameter was absent
    MissingParameter,
    /// Stale or invalidated access token; recoverable by one forced refresh
    TokenExpired,
    /// The account lacks the API permission, or the caller IP is not
    /// whitelisted
    PermissionDenied,
    /// Remote quota or frequency limit; not retried by this layer
    RateLimited,
    /// Any code outside the known table, carrying the raw remote message
    Unclassified,
}

impl ErrorCategory {
    /// Category label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::InvalidCredential => "invalid_credential",
            ErrorCategory::MissingParameter => "missing_parameter",
            ErrorCategory::TokenExpired => "token_expired",
            ErrorCategory::PermissionDenied => "permission_denied",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::Unclassified => "unclassified",
        }
    }
}

/// A translated remote failure.
///
/// Only produced by [`translate`]; callers never construct one directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (errcode {code})")]
pub struct ApiError {
    pub code: i64,
    pub category: ErrorCategory,
    pub message: String,
}

/// Translate a raw `{errcode, errmsg}` pair into a categorized failure.
///
/// Known codes get a curated description; unknown codes fall back to the
/// remote message under `Unclassified` so no information is lost.
pub fn translate(code: i64, errmsg: &str) -> ApiError {
    let (category, known) = match code {
        40001 => (
            ErrorCategory::InvalidCredential,
            Some("app secret is wrong or does not belong to this account"),
        ),
        40002 => (ErrorCategory::InvalidCredential, Some("invalid grant type")),
        40013 => (ErrorCategory::InvalidCredential, Some("invalid app ID")),
        40125 => (ErrorCategory::InvalidCredential, Some("invalid app secret")),
        41001 => (
            ErrorCategory::MissingParameter,
            Some("missing access_token parameter"),
        ),
        41002 => (ErrorCategory::MissingParameter, Some("missing appid parameter")),
        41004 => (ErrorCategory::MissingParameter, Some("missing secret parameter")),
        41005 => (ErrorCategory::MissingParameter, Some("missing media file data")),
        41006 => (ErrorCategory::MissingParameter, Some("missing media_id parameter")),
        40014 => (ErrorCategory::TokenExpired, Some("invalid access token")),
        42001 => (ErrorCategory::TokenExpired, Some("access token expired")),
        40164 => (
            ErrorCategory::PermissionDenied,
            Some("caller IP is not in the account whitelist"),
        ),
        48001 => (
            ErrorCategory::PermissionDenied,
            Some("API unauthorized for this account"),
        ),
        48004 => (ErrorCategory::PermissionDenied, Some("API has been banned")),
        50001 => (
            ErrorCategory::PermissionDenied,
            Some("user has not authorized this API"),
        ),
        50002 => (ErrorCategory::PermissionDenied, Some("user is restricted")),
        45009 => (ErrorCategory::RateLimited, Some("API call quota exceeded")),
        85039 => (
            ErrorCategory::RateLimited,
            Some("publishing too frequently, slow down"),
        ),
        85040 => (
            ErrorCategory::RateLimited,
            Some("daily publish limit reached"),
        ),
        _ => (ErrorCategory::Unclassified, None),
    };

    let message = match known {
        Some(description) => description.to_string(),
        None if errmsg.is_empty() => format!("unknown error code {code}"),
        None => errmsg.to_string(),
    };

    ApiError {
        code,
        category,
        message,
    }
}
