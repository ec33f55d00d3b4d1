//! Token manager: cached access token with single-flight refresh
//!
//! State machine: `Empty → Refreshing → Valid → (TTL below safety margin) →
//! Refreshing → Valid`, with `Refreshing → Failed` on a credential-class
//! rejection. `Failed` is terminal for this manager instance — the credential
//! pair is immutable, so recovery means constructing a new manager.
//!
//! Refresh is strictly lazy: no background task, no timers. Demand
//! (`get_valid_token` / `force_refresh`) is the only trigger. A tokio Mutex
//! serializes refreshes; waiters re-check the cache after acquiring it, so N
//! concurrent callers on a cold cache produce exactly one token-endpoint
//! request and all observe the same token or the same failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::executor::{RetryPolicy, send_with_retry};
use crate::transport::{ApiRequest, Transport};
use wechat_auth::{AppCredentials, ErrorCategory, Token, token};

/// Default TTL buffer before expiry at which a refresh is triggered,
/// avoiding "valid at read time, expired at use time" races.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(300);

/// Time source, injectable so expiry is simulated without wall-clock sleeps.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Wall-clock time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

enum TokenState {
    Empty,
    Valid(Arc<Token>),
    /// Credential-class rejection; stored error is returned to every
    /// subsequent caller without another network call
    Failed(wechat_auth::ApiError),
}

/// Owns the cached token and its refresh lifecycle for one credential pair.
pub struct TokenManager {
    credentials: AppCredentials,
    token_url: String,
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    safety_margin: Duration,
    state: RwLock<TokenState>,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    /// Build a manager for an already-validated credential pair.
    ///
    /// `AppCredentials::new` is the only way to obtain the pair, so the
    /// format check has necessarily run before anything can reach the
    /// network through this manager.
    pub fn new(
        credentials: AppCredentials,
        token_url: String,
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
        safety_margin: Duration,
    ) -> Self {
        Self {
            credentials,
            token_url,
            transport,
            policy,
            clock,
            safety_margin,
            state: RwLock::new(TokenState::Empty),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Return a token with remaining TTL above the safety margin, refreshing
    /// if necessary. The fast path is lock-read only, zero network calls.
    pub async fn get_valid_token(&self) -> Result<Arc<Token>> {
        {
            let state = self.state.read().await;
            match &*state {
                TokenState::Valid(token)
                    if token.fresh_at(self.clock.now_millis(), self.margin_millis()) =>
                {
                    return Ok(token.clone());
                }
                TokenState::Failed(api) => return Err(Error::Api(api.clone())),
                _ => {}
            }
        }
        self.refresh(None).await
    }

    /// Bypass the TTL check and replace `stale_value`.
    ///
    /// Used by the executor after a request-time token-invalid errcode. Still
    /// single-flight: if another caller already replaced the stale token, the
    /// current one is returned without a network call.
    pub async fn force_refresh(&self, stale_value: &str) -> Result<Arc<Token>> {
        self.refresh(Some(stale_value)).await
    }

    /// Snapshot of the cached token, if any (diagnostics).
    pub async fn current(&self) -> Option<Arc<Token>> {
        match &*self.state.read().await {
            TokenState::Valid(token) => Some(token.clone()),
            _ => None,
        }
    }

    fn margin_millis(&self) -> u64 {
        self.safety_margin.as_millis() as u64
    }

    async fn refresh(&self, stale_value: Option<&str>) -> Result<Arc<Token>> {
        let _guard = self.refresh_lock.lock().await;

        // Re-check under the lock: a concurrent caller may have finished the
        // refresh while this one was waiting.
        {
            let state = self.state.read().await;
            match &*state {
                TokenState::Failed(api) => return Err(Error::Api(api.clone())),
                TokenState::Valid(token) => {
                    let now = self.clock.now_millis();
                    let satisfied = match stale_value {
                        // TTL-driven refresh: any fresh token will do
                        None => token.fresh_at(now, self.margin_millis()),
                        // Forced refresh: only a token that already replaced
                        // the rejected one counts
                        Some(stale) => token.value != stale && token.fresh_at(now, 0),
                    };
                    if satisfied {
                        return Ok(token.clone());
                    }
                }
                TokenState::Empty => {}
            }
        }

        debug!(
            app_id = self.credentials.app_id(),
            forced = stale_value.is_some(),
            "refreshing access token"
        );

        let payload = token::refresh_request(&self.credentials, stale_value.is_some());
        let request = ApiRequest::post_json(self.token_url.clone(), payload).without_token();
        let response = send_with_retry(self.transport.as_ref(), &self.policy, &request).await?;

        match token::parse_response(&response.body) {
            Ok(granted) => {
                let token = Arc::new(Token {
                    value: granted.access_token,
                    obtained_at_millis: self.clock.now_millis(),
                    ttl_secs: granted.expires_in,
                });
                *self.state.write().await = TokenState::Valid(token.clone());
                info!(
                    app_id = self.credentials.app_id(),
                    ttl_secs = token.ttl_secs,
                    "access token refreshed"
                );
                Ok(token)
            }
            Err(wechat_auth::Error::Api(api))
                if api.category == ErrorCategory::InvalidCredential =>
            {
                warn!(
                    app_id = self.credentials.app_id(),
                    code = api.code,
                    "credentials rejected by token endpoint, manager unusable"
                );
                *self.state.write().await = TokenState::Failed(api.clone());
                Err(Error::Api(api))
            }
            // Other remote rejections (rate limit, whitelist) do not poison
            // the state; the next demand retries the refresh.
            Err(other) => Err(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use crate::transport::testing::FakeTransport;
    use std::sync::atomic::{AtomicU64, Ordering};

    const TOKEN_BODY: &str = r#"{"access_token":"at_1","expires_in":7200}"#;

    /// Manually advanced clock.
    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn at(millis: u64) -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(millis)))
        }

        fn advance_secs(&self, secs: u64) {
            self.0.fetch_add(secs * 1000, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn creds() -> AppCredentials {
        AppCredentials::new("wx0123456789abcdef", "0123456789abcdef0123456789abcdef").unwrap()
    }

    fn manager(transport: Arc<FakeTransport>, clock: Arc<dyn Clock>) -> TokenManager {
        TokenManager::new(
            creds(),
            "https://api.example/cgi-bin/stable_token".into(),
            transport,
            RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::from_millis(10),
                request_timeout: Duration::from_secs(30),
            },
            clock,
            DEFAULT_SAFETY_MARGIN,
        )
    }

    #[tokio::test]
    async fn first_demand_refreshes_once_then_caches() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(TOKEN_BODY);
        let clock = ManualClock::at(1_000_000);
        let mgr = manager(transport.clone(), clock.clone());

        let token = mgr.get_valid_token().await.unwrap();
        assert_eq!(token.value, "at_1");
        assert_eq!(token.ttl_secs, 7200);
        assert_eq!(transport.send_calls(), 1);

        // Second call within the safety margin: cached, zero network calls
        let again = mgr.get_valid_token().await.unwrap();
        assert_eq!(again.value, "at_1");
        assert_eq!(transport.send_calls(), 1);
    }

    #[tokio::test]
    async fn refresh_payload_carries_credentials() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(TOKEN_BODY);
        let mgr = manager(transport.clone(), ManualClock::at(0));

        mgr.get_valid_token().await.unwrap();

        let sent = transport.sent_requests();
        assert!(!sent[0].requires_token);
        match &sent[0].body {
            crate::transport::RequestBody::Json(payload) => {
                assert_eq!(payload["appid"], "wx0123456789abcdef");
                assert_eq!(payload["grant_type"], "client_credential");
                assert_eq!(payload["force_refresh"], false);
            }
            other => panic!("expected JSON body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expiring_token_is_replaced_not_reused() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(TOKEN_BODY);
        transport.queue_json(r#"{"access_token":"at_2","expires_in":7200}"#);
        let clock = ManualClock::at(1_000_000);
        let mgr = manager(transport.clone(), clock.clone());

        let first = mgr.get_valid_token().await.unwrap();
        assert_eq!(first.value, "at_1");

        // Advance to within the 5-minute safety margin of expiry
        clock.advance_secs(7200 - 200);

        let second = mgr.get_valid_token().await.unwrap();
        assert_eq!(second.value, "at_2");
        assert_eq!(transport.send_calls(), 2);
        // The first Arc still holds the old value — replaced, never mutated
        assert_eq!(first.value, "at_1");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_cold_demands_share_one_refresh() {
        let transport = Arc::new(FakeTransport::with_delay(Duration::from_millis(50)));
        transport.queue_json(TOKEN_BODY);
        let mgr = Arc::new(manager(transport.clone(), ManualClock::at(1_000_000)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = mgr.clone();
            handles.push(tokio::spawn(async move {
                mgr.get_valid_token().await.unwrap().value.clone()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "at_1");
        }
        assert_eq!(transport.send_calls(), 1, "exactly one refresh request");
    }

    #[tokio::test]
    async fn credential_rejection_is_terminal() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(r#"{"errcode":40001,"errmsg":"invalid credential"}"#);
        let mgr = manager(transport.clone(), ManualClock::at(0));

        let err = mgr.get_valid_token().await.unwrap_err();
        match err {
            Error::Api(api) => assert_eq!(api.category, ErrorCategory::InvalidCredential),
            other => panic!("expected Api error, got {other:?}"),
        }

        // Failed is terminal: later demands fail without touching the network
        let err = mgr.get_valid_token().await.unwrap_err();
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(transport.send_calls(), 1);

        // Forced refresh is equally refused
        let err = mgr.force_refresh("at_whatever").await.unwrap_err();
        assert!(matches!(err, Error::Api(_)));
        assert_eq!(transport.send_calls(), 1);
    }

    #[tokio::test]
    async fn transient_remote_rejection_does_not_poison_state() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(r#"{"errcode":45009,"errmsg":"reach max api quota"}"#);
        transport.queue_json(TOKEN_BODY);
        let mgr = manager(transport.clone(), ManualClock::at(0));

        let err = mgr.get_valid_token().await.unwrap_err();
        match err {
            Error::Api(api) => assert_eq!(api.category, ErrorCategory::RateLimited),
            other => panic!("expected Api error, got {other:?}"),
        }

        // Next demand retries and succeeds
        let token = mgr.get_valid_token().await.unwrap();
        assert_eq!(token.value, "at_1");
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_retried_during_refresh() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_error(TransportError::Timeout);
        transport.queue_json(TOKEN_BODY);
        let mgr = manager(transport.clone(), ManualClock::at(0));

        let token = mgr.get_valid_token().await.unwrap();
        assert_eq!(token.value, "at_1");
        assert_eq!(transport.send_calls(), 2);
    }

    #[tokio::test]
    async fn force_refresh_replaces_stale_token() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(TOKEN_BODY);
        transport.queue_json(r#"{"access_token":"at_2","expires_in":7200}"#);
        let mgr = manager(transport.clone(), ManualClock::at(0));

        let first = mgr.get_valid_token().await.unwrap();
        let second = mgr.force_refresh(&first.value).await.unwrap();
        assert_eq!(second.value, "at_2");
        assert_eq!(transport.send_calls(), 2);

        let sent = transport.sent_requests();
        match &sent[1].body {
            crate::transport::RequestBody::Json(payload) => {
                assert_eq!(payload["force_refresh"], true)
            }
            other => panic!("expected JSON body, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn force_refresh_skips_network_when_token_already_replaced() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(r#"{"access_token":"at_2","expires_in":7200}"#);
        let mgr = manager(transport.clone(), ManualClock::at(0));

        mgr.get_valid_token().await.unwrap();
        // Caller still holding "at_1" reports it stale, but at_2 is current
        let token = mgr.force_refresh("at_1").await.unwrap();
        assert_eq!(token.value, "at_2");
        assert_eq!(transport.send_calls(), 1);
    }

    #[tokio::test]
    async fn current_reflects_cache_state() {
        let transport = Arc::new(FakeTransport::new());
        transport.queue_json(TOKEN_BODY);
        let mgr = manager(transport.clone(), ManualClock::at(0));

        assert!(mgr.current().await.is_none());
        mgr.get_valid_token().await.unwrap();
        assert_eq!(mgr.current().await.unwrap().value, "at_1");
    }
}
