//! Error types for client operations
//!
//! Local failures (`CredentialFormat`, `Validation`, `File`) never reach the
//! network. `Network` covers transport-tier failures after the retry bound is
//! exhausted. `Api` is a translated remote rejection; only its `TokenExpired`
//! category is recovered internally, and only once per request.

use crate::material::MediaType;
use wechat_auth::ApiError;

/// Errors from client operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid credential format: {0}")]
    CredentialFormat(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    File(#[from] FileError),

    #[error("reading media file: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("{0}")]
    Api(ApiError),

    #[error("response parse error: {0}")]
    Parse(String),
}

/// Local media-file rejection, raised before any bytes are transferred.
///
/// Size and format violations are kept as distinct variants so callers can
/// tell "shrink the file" apart from "convert the file".
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("{media_type} payload of {size_bytes} bytes exceeds the {limit_bytes} byte limit")]
    TooLarge {
        media_type: MediaType,
        size_bytes: u64,
        limit_bytes: u64,
    },

    #[error("unsupported {media_type} format: {filename}")]
    UnsupportedFormat {
        media_type: MediaType,
        filename: String,
    },

    #[error("media payload is empty")]
    Empty,
}

impl From<wechat_auth::Error> for Error {
    fn from(err: wechat_auth::Error) -> Self {
        match err {
            wechat_auth::Error::CredentialFormat(msg) => Error::CredentialFormat(msg),
            wechat_auth::Error::Parse(msg) => Error::Parse(msg),
            wechat_auth::Error::Api(api) => Error::Api(api),
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
