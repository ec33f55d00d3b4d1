//! Error types for authentication primitives

use crate::errcode::ApiError;

/// Errors from credential validation and token response handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid credential format: {0}")]
    CredentialFormat(String),

    #[error("token response parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Api(ApiError),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
