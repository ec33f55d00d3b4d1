//! Request execution: timeout, bounded retry, and token recovery
//!
//! Outcomes are classified into three tiers:
//! 1. transport failures (connect, DNS, timeout, HTTP 408/5xx) — retried up
//!    to the policy bound with exponential backoff,
//! 2. a `TokenExpired`-category errcode — exactly one forced refresh followed
//!    by exactly one replay of the request, never more,
//! 3. every other errcode — translated and surfaced immediately.
//!
//! The policy is injected rather than hard-coded so retry behavior is
//! testable under paused tokio time with a fake transport.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::manager::TokenManager;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use wechat_auth::{ApiError, ErrorCategory, errcode};

/// Retry and timeout policy for one API call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for transport failures (1 initial + N-1 retries)
    pub max_attempts: u32,
    /// First retry delay; doubles per subsequent retry
    pub base_backoff: Duration,
    /// Deadline for a single attempt
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the given retry (attempt numbering starts at 1 for the
    /// first retry): base, 2x base, 4x base, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// HTTP statuses treated as transport-tier (retryable) failures.
fn retryable_status(status: u16) -> bool {
    status == 408 || (500..=599).contains(&status)
}

/// Send one request with timeout and bounded retry on transport failures.
///
/// Non-retryable requests get a single attempt. Remote errcode bodies are NOT
/// inspected here — a 200 with an errcode is still a completed exchange.
pub(crate) async fn send_with_retry(
    transport: &dyn Transport,
    policy: &RetryPolicy,
    request: &ApiRequest,
) -> Result<ApiResponse> {
    let max_attempts = if request.retryable {
        policy.max_attempts
    } else {
        1
    };
    let mut last_failure = String::new();

    for attempt in 0..max_attempts {
        if attempt > 0 {
            let delay = policy.backoff(attempt);
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                url = %request.url,
                "retrying after transport failure"
            );
            tokio::time::sleep(delay).await;
        }

        match tokio::time::timeout(policy.request_timeout, transport.send(request.clone())).await {
            Ok(Ok(response)) if response.status == 200 => return Ok(response),
            Ok(Ok(response)) if retryable_status(response.status) => {
                last_failure = format!("upstream returned HTTP {}", response.status);
            }
            Ok(Ok(response)) => {
                return Err(Error::Network(format!(
                    "unexpected HTTP status {} from {}",
                    response.status, request.url
                )));
            }
            Ok(Err(e)) => {
                last_failure = e.to_string();
            }
            Err(_) => {
                last_failure = format!(
                    "request timed out after {}s",
                    policy.request_timeout.as_secs()
                );
            }
        }
    }

    Err(Error::Network(format!(
        "{last_failure} ({max_attempts} attempts)"
    )))
}

/// Inspect a response body for a remote `{errcode, errmsg}` rejection.
///
/// Binary bodies (material downloads) do not parse as JSON and pass through.
fn extract_api_error(response: &ApiResponse) -> Option<ApiError> {
    let value: serde_json::Value = serde_json::from_slice(&response.body).ok()?;
    let code = value.get("errcode")?.as_i64()?;
    if code == 0 {
        return None;
    }
    let errmsg = value.get("errmsg").and_then(|m| m.as_str()).unwrap_or("");
    Some(errcode::translate(code, errmsg))
}

/// Executes API calls with token attachment, retry, and token recovery.
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    tokens: Arc<TokenManager>,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy, tokens: Arc<TokenManager>) -> Self {
        Self {
            transport,
            policy,
            tokens,
        }
    }

    /// Execute a request, attaching a valid token when required.
    ///
    /// On a `TokenExpired` errcode the stale token is force-refreshed and the
    /// request replayed once; a second consecutive rejection surfaces as is.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut refreshed = false;
        loop {
            let token = if request.requires_token {
                Some(self.tokens.get_valid_token().await?)
            } else {
                None
            };

            let mut attempt = request.clone();
            if let Some(token) = &token {
                attempt = attempt.with_query("access_token", token.value.clone());
            }

            let response = send_with_retry(self.transport.as_ref(), &self.policy, &attempt).await?;

            if let Some(api_error) = extract_api_error(&response) {
                if api_error.category == ErrorCategory::TokenExpired
                    && !refreshed
                    && let Some(token) = token
                {
                    warn!(
                        code = api_error.code,
                        url = %request.url,
                        "access token rejected, forcing one refresh and replaying"
                    );
                    refreshed = true;
                    self.tokens.force_refresh(&token.value).await?;
                    continue;
                }
                debug!(
                    code = api_error.code,
                    category = api_error.category.label(),
                    url = %request.url,
                    "remote rejected request"
                );
                return Err(Error::Api(api_error));
            }

            return Ok(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{SystemClock, TokenManager};
    use crate::transport::TransportError;
    use crate::transport::testing::FakeTransport;
    use wechat_auth::AppCredentials;

    const TOKEN_BODY: &str = r#"{"access_token":"at_1","expires_in":7200}"#;

    fn creds() -> AppCredentials {
        AppCredentials::new("wx0123456789abcdef", "0123456789abcdef0123456789abcdef").unwrap()
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(10),
            request_timeout: Duration::from_secs(30),
        }
    }

    fn executor(transport: Arc<FakeTransport>) -> RequestExecutor {
        let tokens = Arc::new(TokenManager::new(
            creds(),
            "https://api.example/cgi-bin/stable_token".into(),
            transport.clone(),
            quick_policy(),
            Arc::new(SystemClock),
            Duration::from_secs(300),
        ));
        RequestExecutor::new(transport, quick_policy(), tokens)
    }

    fn plain_request() -> ApiRequest {
        ApiRequest::post_json("https://api.example/cgi-bin/draft/add", serde_json::json!({}))
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy {
            base_backoff: Duration::from_millis(200),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_retried_up_to_bound() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_error(TransportError::Connect("refused".into()));
        transport.queue_error(TransportError::Timeout);
        transport.queue_error(TransportError::Connect("refused".into()));

        let request = plain_request().without_token();
        let err = send_with_retry(transport.as_ref(), &quick_policy(), &request)
            .await
            .unwrap_err();

        assert_eq!(transport.send_calls(), 3, "1 initial + 2 retries");
        assert!(matches!(err, Error::Network(_)), "got {err:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_then_success_recovers() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_error(TransportError::Timeout);
        transport.queue_json(r#"{"errcode":0,"errmsg":"ok"}"#);

        let request = plain_request().without_token();
        let response = send_with_retry(transport.as_ref(), &quick_policy(), &request)
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.send_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn http_5xx_is_retried() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_status(502);
        transport.queue_json(r#"{"errcode":0,"errmsg":"ok"}"#);

        let request = plain_request().without_token();
        let response = send_with_retry(transport.as_ref(), &quick_policy(), &request)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_request_gets_single_attempt() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_error(TransportError::Timeout);

        let request = plain_request().without_token().non_retryable();
        let err = send_with_retry(transport.as_ref(), &quick_policy(), &request)
            .await
            .unwrap_err();

        assert_eq!(transport.send_calls(), 1);
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_http_status_not_retried() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_status(404);

        let request = plain_request().without_token();
        let err = send_with_retry(transport.as_ref(), &quick_policy(), &request)
            .await
            .unwrap_err();

        assert_eq!(transport.send_calls(), 1);
        assert!(err.to_string().contains("404"), "got {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn token_attached_as_query_parameter() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(TOKEN_BODY); // token refresh
        transport.queue_json(r#"{"errcode":0,"errmsg":"ok","media_id":"m1"}"#);

        let exec = executor(transport.clone());
        exec.execute(plain_request()).await.unwrap();

        let sent = transport.sent_requests();
        assert_eq!(sent.len(), 2);
        assert!(
            sent[1]
                .query
                .iter()
                .any(|(k, v)| k == "access_token" && v == "at_1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn token_expired_triggers_one_refresh_and_one_replay() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(TOKEN_BODY); // initial token
        transport.queue_json(r#"{"errcode":42001,"errmsg":"access_token expired"}"#);
        transport.queue_json(r#"{"access_token":"at_2","expires_in":7200}"#); // forced refresh
        transport.queue_json(r#"{"errcode":0,"errmsg":"ok"}"#); // replay succeeds

        let exec = executor(transport.clone());
        let response = exec.execute(plain_request()).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(transport.send_calls(), 4);
        let sent = transport.sent_requests();
        assert!(
            sent[3]
                .query
                .iter()
                .any(|(k, v)| k == "access_token" && v == "at_2"),
            "replay must carry the refreshed token"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn second_consecutive_token_expired_surfaces() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(TOKEN_BODY);
        transport.queue_json(r#"{"errcode":40014,"errmsg":"invalid access_token"}"#);
        transport.queue_json(r#"{"access_token":"at_2","expires_in":7200}"#);
        transport.queue_json(r#"{"errcode":40014,"errmsg":"invalid access_token"}"#);

        let exec = executor(transport.clone());
        let err = exec.execute(plain_request()).await.unwrap_err();

        match err {
            Error::Api(api) => assert_eq!(api.category, ErrorCategory::TokenExpired),
            other => panic!("expected Api error, got {other:?}"),
        }
        // No third replay, no extra refresh
        assert_eq!(transport.send_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errcodes_surface_without_retry() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(TOKEN_BODY);
        transport.queue_json(r#"{"errcode":48001,"errmsg":"api unauthorized"}"#);

        let exec = executor(transport.clone());
        let err = exec.execute(plain_request()).await.unwrap_err();

        match err {
            Error::Api(api) => assert_eq!(api.category, ErrorCategory::PermissionDenied),
            other => panic!("expected Api error, got {other:?}"),
        }
        assert_eq!(transport.send_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn binary_body_passes_through() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(TOKEN_BODY);
        transport.queue_json("\u{1}\u{2}binary-not-json");

        let exec = executor(transport.clone());
        let response = exec.execute(plain_request()).await.unwrap();
        assert_eq!(response.status, 200);
    }
}
