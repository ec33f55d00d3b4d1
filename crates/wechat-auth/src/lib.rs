//! WeChat Official Account authentication primitives
//!
//! Pure building blocks for the token lifecycle: validated app credentials,
//! stable-token request building and response parsing, and the errcode
//! translator that maps WeChat's flat numeric error space into categories.
//! This crate performs no I/O — the HTTP side lives in `wechat-client`, which
//! makes every check here testable without a network.
//!
//! Token flow:
//! 1. Host constructs `AppCredentials::new()` (format validated up front)
//! 2. `token::refresh_request()` builds the stable-token payload
//! 3. The client POSTs it and feeds the body to `token::parse_response()`
//! 4. Remote `{errcode, errmsg}` bodies go through `errcode::translate()`

pub mod constants;
pub mod credentials;
pub mod errcode;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::AppCredentials;
pub use errcode::{ApiError, ErrorCategory, translate};
pub use error::{Error, Result};
pub use token::{Token, TokenResponse};
