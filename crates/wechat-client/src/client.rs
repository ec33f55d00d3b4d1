//! Top-level client facade
//!
//! `WechatClient` wires credentials, transport, token manager, executor,
//! and the material/draft managers into one handle. Construction is
//! synchronous; the first token is fetched lazily on the first operation
//! that needs one.

use std::sync::Arc;
use std::time::Duration;

use crate::draft::{Draft, DraftManager};
use crate::error::{Error, Result};
use crate::executor::{RequestExecutor, RetryPolicy};
use crate::manager::{DEFAULT_SAFETY_MARGIN, SystemClock, TokenManager};
use crate::material::{Material, MaterialManager, MediaAsset, MediaSource, UploadedMaterial};
use crate::transport::{HttpTransport, Transport};
use wechat_auth::constants::{API_BASE_URL, STABLE_TOKEN_PATH};
use wechat_auth::{AppCredentials, Token};

/// Tunables for a client instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub retry: RetryPolicy,
    /// Tokens within this margin of expiry are treated as stale
    pub safety_margin: Duration,
    /// Publish submission is keyed by media_id, so replays are safe;
    /// set false to surface transport failures instead
    pub allow_publish_retry: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            safety_margin: DEFAULT_SAFETY_MARGIN,
            allow_publish_retry: true,
        }
    }
}

/// Publishing client for a single Official Account.
///
/// Cheap to share behind an `Arc`; all operations take `&self`.
pub struct WechatClient {
    tokens: Arc<TokenManager>,
    materials: MaterialManager,
    drafts: DraftManager,
}

impl std::fmt::Debug for WechatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WechatClient").finish_non_exhaustive()
    }
}

impl WechatClient {
    /// Build a client with default configuration and a real HTTP transport.
    pub fn new(app_id: &str, app_secret: &str) -> Result<Self> {
        Self::with_config(app_id, app_secret, ClientConfig::default())
    }

    pub fn with_config(app_id: &str, app_secret: &str, config: ClientConfig) -> Result<Self> {
        let transport =
            Arc::new(HttpTransport::new().map_err(|e| Error::Network(e.to_string()))?);
        Self::with_transport(app_id, app_secret, config, transport)
    }

    /// Build against an externally supplied transport.
    pub fn with_transport(
        app_id: &str,
        app_secret: &str,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let credentials = AppCredentials::new(app_id, app_secret)?;
        let token_url = format!("{}{STABLE_TOKEN_PATH}", config.base_url);

        let tokens = Arc::new(TokenManager::new(
            credentials,
            token_url,
            transport.clone(),
            config.retry.clone(),
            Arc::new(SystemClock),
            config.safety_margin,
        ));
        let executor = Arc::new(RequestExecutor::new(
            transport.clone(),
            config.retry.clone(),
            tokens.clone(),
        ));
        let materials =
            MaterialManager::new(executor.clone(), transport, config.base_url.clone());
        let drafts = DraftManager::new(executor, config.base_url, config.allow_publish_retry);

        Ok(Self {
            tokens,
            materials,
            drafts,
        })
    }

    /// Upload a permanent material; returns its media_id and, for images
    /// and thumbs, a platform URL.
    pub async fn upload_material(&self, asset: &MediaAsset) -> Result<UploadedMaterial> {
        self.materials.upload(asset).await
    }

    /// Upload an image for use inside article HTML; returns its URL.
    pub async fn upload_article_image(&self, source: &MediaSource) -> Result<String> {
        self.materials.upload_article_image(source).await
    }

    /// Fetch a permanent material by media_id.
    pub async fn get_material(&self, media_id: &str) -> Result<Material> {
        self.materials.get(media_id).await
    }

    /// Delete a permanent material by media_id.
    pub async fn delete_material(&self, media_id: &str) -> Result<()> {
        self.materials.delete(media_id).await
    }

    /// Create a draft; returns the draft's media_id.
    pub async fn create_draft(&self, draft: &Draft) -> Result<String> {
        self.drafts.create(draft).await
    }

    /// Submit a created draft for publication; returns the publish task id.
    pub async fn publish_draft(&self, media_id: &str) -> Result<String> {
        self.drafts.publish(media_id).await
    }

    /// Snapshot of the cached access token, if one is held.
    pub async fn current_token(&self) -> Option<Arc<Token>> {
        self.tokens.current().await
    }

    /// Discard the cached token and fetch a fresh one.
    pub async fn refresh_token(&self) -> Result<Arc<Token>> {
        let stale = self
            .tokens
            .current()
            .await
            .map(|t| t.value.clone())
            .unwrap_or_default();
        self.tokens.force_refresh(&stale).await
    }
}
