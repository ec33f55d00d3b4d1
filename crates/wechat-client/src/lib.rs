//! WeChat Official Account publishing client
//!
//! Performs authenticated operations against the Official Account HTTP API:
//! permanent-material upload/fetch/delete, article-image upload, draft
//! creation, and draft publishing. The interesting part is not the individual
//! calls but the machinery underneath them:
//!
//! - `manager::TokenManager` caches the short-lived access token and refreshes
//!   it single-flight: concurrent callers share one refresh and observe the
//!   same token or the same failure.
//! - `executor::RequestExecutor` applies timeout and bounded exponential-
//!   backoff retry to transport failures, and recovers from a token-expired
//!   errcode with exactly one forced refresh and replay.
//! - `material` and `draft` validate size ceilings and field-length limits
//!   before anything reaches the network.
//!
//! Request flow:
//! 1. Host constructs `WechatClient::new(app_id, app_secret)` (format checked)
//! 2. An operation asks the token manager for a valid token (lazy refresh)
//! 3. The executor attaches the token, sends, retries per policy
//! 4. Remote `{errcode, errmsg}` bodies surface as categorized `ApiError`s

pub mod client;
pub mod draft;
pub mod error;
pub mod executor;
pub mod manager;
pub mod material;
pub mod transport;

pub use client::{ClientConfig, WechatClient};
pub use draft::{Draft, DraftManager};
pub use error::{Error, FileError, Result};
pub use executor::{RequestExecutor, RetryPolicy};
pub use manager::{Clock, SystemClock, TokenManager};
pub use material::{Material, MaterialManager, MediaAsset, MediaSource, MediaType, UploadedMaterial};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError};
pub use wechat_auth::{ApiError, AppCredentials, ErrorCategory, Token};
