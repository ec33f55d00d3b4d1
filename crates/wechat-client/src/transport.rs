//! Transport abstraction over the wire
//!
//! The executor and token manager talk to a `Transport` trait rather than to
//! reqwest directly, so retry, single-flight, and validation behavior can be
//! exercised against a fake with deterministic responses and call counting.
//! `HttpTransport` is the production implementation.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn Transport>`).

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

/// Request body shapes the WeChat API accepts.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(MultipartPayload),
}

/// Multipart upload payload. The file always travels under the `media` field;
/// extra form fields carry e.g. the video description JSON.
#[derive(Debug, Clone)]
pub struct MultipartPayload {
    pub filename: String,
    pub data: Vec<u8>,
    pub fields: Vec<(String, String)>,
}

/// An outbound API call, fully specified before the token is attached.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    /// Whether the executor must attach a valid access token
    pub requires_token: bool,
    /// Whether transport-tier failures may be retried. Off for operations
    /// that are not safely repeatable on the remote side.
    pub retryable: bool,
}

impl ApiRequest {
    /// A token-requiring, retryable POST with a JSON body.
    pub fn post_json(url: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            body: RequestBody::Json(payload),
            requires_token: true,
            retryable: true,
        }
    }

    /// A token-requiring, retryable multipart POST.
    pub fn post_multipart(url: impl Into<String>, payload: MultipartPayload) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            body: RequestBody::Multipart(payload),
            requires_token: true,
            retryable: true,
        }
    }

    /// Skip token attachment (the stable-token call itself).
    pub fn without_token(mut self) -> Self {
        self.requires_token = false;
        self
    }

    /// Disable transport-tier retries for this request.
    pub fn non_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    /// Append a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Raw response from the wire. WeChat answers material fetches with binary
/// bodies, everything else with JSON, so the body stays as bytes here.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Transport-tier failures, the only tier eligible for bounded retry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {0}")]
    Other(String),
}

/// Abstraction over outbound HTTP.
///
/// `send` performs one attempt of one API call; `download` fetches arbitrary
/// bytes (media sources referenced by URL). Neither retries — that is the
/// executor's job.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<ApiResponse, TransportError>> + Send + '_>>;

    fn download(
        &self,
        url: String,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Vec<u8>, TransportError>> + Send + '_>>;
}

/// Production transport backed by reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with a bounded connect timeout. The per-call
    /// deadline is enforced by the executor, not here.
    pub fn new() -> std::result::Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .user_agent("wechat-publish-client/0.1")
            .build()
            .map_err(|e| TransportError::Other(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn classify(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        request: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<ApiResponse, TransportError>> + Send + '_>>
    {
        Box::pin(async move {
            let mut builder = self.client.post(&request.url).query(&request.query);

            builder = match request.body {
                RequestBody::Empty => builder,
                RequestBody::Json(payload) => builder.json(&payload),
                RequestBody::Multipart(payload) => {
                    let part = reqwest::multipart::Part::bytes(payload.data)
                        .file_name(payload.filename);
                    let mut form = reqwest::multipart::Form::new().part("media", part);
                    for (key, value) in payload.fields {
                        form = form.text(key, value);
                    }
                    builder.multipart(form)
                }
            };

            let response = builder.send().await.map_err(Self::classify)?;
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let body = response
                .bytes()
                .await
                .map_err(Self::classify)?
                .to_vec();

            debug!(url = %request.url, status, bytes = body.len(), "api call completed");
            Ok(ApiResponse {
                status,
                content_type,
                body,
            })
        })
    }

    fn download(
        &self,
        url: String,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<Vec<u8>, TransportError>> + Send + '_>>
    {
        Box::pin(async move {
            let response = self.client.get(&url).send().await.map_err(Self::classify)?;
            if !response.status().is_success() {
                return Err(TransportError::Other(format!(
                    "download of {url} returned HTTP {}",
                    response.status()
                )));
            }
            let bytes = response.bytes().await.map_err(Self::classify)?;
            if bytes.is_empty() {
                return Err(TransportError::Other(format!("download of {url} was empty")));
            }
            debug!(url = %url, bytes = bytes.len(), "media source downloaded");
            Ok(bytes.to_vec())
        })
    }
}
