//! Draft construction and publication
//!
//! `Draft` is a validating builder for a single news article: field limits
//! are counted in characters, not bytes, so CJK titles get the same budget
//! as ASCII ones. `DraftManager` pushes drafts to the platform and submits
//! them for publication.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::executor::RequestExecutor;
use crate::transport::ApiRequest;
use wechat_auth::constants::{DRAFT_ADD_PATH, PUBLISH_SUBMIT_PATH};

pub const MAX_TITLE_CHARS: usize = 64;
pub const MAX_AUTHOR_CHARS: usize = 8;
pub const MAX_DIGEST_CHARS: usize = 120;

/// A single validated news article draft.
#[derive(Debug, Clone)]
pub struct Draft {
    title: String,
    content: String,
    thumb_media_id: String,
    author: Option<String>,
    digest: Option<String>,
    content_source_url: Option<String>,
    need_open_comment: bool,
    only_fans_can_comment: bool,
}

impl Draft {
    /// Build a draft from the three mandatory fields.
    ///
    /// The thumb must be a media_id from a prior permanent upload; this
    /// layer only checks that it is present.
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        thumb_media_id: impl Into<String>,
    ) -> Result<Self> {
        let title = title.into();
        let content = content.into();
        let thumb_media_id = thumb_media_id.into();

        if title.trim().is_empty() {
            return Err(Error::Validation("draft title must not be empty".into()));
        }
        check_chars("title", &title, MAX_TITLE_CHARS)?;
        if content.trim().is_empty() {
            return Err(Error::Validation("draft content must not be empty".into()));
        }
        check_content(&content)?;
        if thumb_media_id.trim().is_empty() {
            return Err(Error::Validation(
                "draft thumb_media_id must not be empty".into(),
            ));
        }

        Ok(Self {
            title,
            content,
            thumb_media_id,
            author: None,
            digest: None,
            content_source_url: None,
            need_open_comment: false,
            only_fans_can_comment: false,
        })
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Result<Self> {
        let author = author.into();
        check_chars("author", &author, MAX_AUTHOR_CHARS)?;
        self.author = Some(author);
        Ok(self)
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Result<Self> {
        let digest = digest.into();
        check_chars("digest", &digest, MAX_DIGEST_CHARS)?;
        self.digest = Some(digest);
        Ok(self)
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.content_source_url = Some(url.into());
        self
    }

    pub fn with_comments(mut self, open: bool, fans_only: bool) -> Self {
        self.need_open_comment = open;
        self.only_fans_can_comment = fans_only;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Serialize to the draft-add payload.
    fn to_article(&self) -> serde_json::Value {
        let mut article = serde_json::json!({
            "article_type": "news",
            "title": self.title,
            "content": self.content,
            "thumb_media_id": self.thumb_media_id,
            "author": self.author.as_deref().unwrap_or(""),
            "digest": self.digest.as_deref().unwrap_or(""),
            "need_open_comment": if self.need_open_comment { 1 } else { 0 },
            "only_fans_can_comment": if self.only_fans_can_comment { 1 } else { 0 },
        });
        if let Some(url) = &self.content_source_url {
            article["content_source_url"] = serde_json::Value::String(url.clone());
        }
        article
    }
}

fn check_chars(field: &str, value: &str, limit: usize) -> Result<()> {
    let count = value.chars().count();
    if count > limit {
        return Err(Error::Validation(format!(
            "{field} is {count} characters, limit is {limit}"
        )));
    }
    Ok(())
}

/// Reject content the platform strips anyway; catching it locally keeps
/// the failure actionable.
fn check_content(content: &str) -> Result<()> {
    let lowered = content.to_lowercase();
    for tag in ["<script", "<iframe"] {
        if lowered.contains(tag) {
            return Err(Error::Validation(format!(
                "draft content must not contain {tag} tags"
            )));
        }
    }
    Ok(())
}

/// Build the draft-add request for one article. No I/O.
pub fn prepare_draft(draft: &Draft, base_url: &str) -> ApiRequest {
    let payload = serde_json::json!({ "articles": [draft.to_article()] });
    ApiRequest::post_json(format!("{base_url}{DRAFT_ADD_PATH}"), payload)
}

#[derive(Debug, Deserialize)]
struct DraftAddResponse {
    media_id: String,
}

/// The platform has been observed returning publish_id both as a string
/// and as a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PublishId {
    Text(String),
    Number(i64),
}

impl fmt::Display for PublishId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishId::Text(s) => f.write_str(s),
            PublishId::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    publish_id: PublishId,
}

/// Draft and publish operations.
pub struct DraftManager {
    executor: Arc<RequestExecutor>,
    base_url: String,
    allow_publish_retry: bool,
}

impl DraftManager {
    pub fn new(executor: Arc<RequestExecutor>, base_url: String, allow_publish_retry: bool) -> Self {
        Self {
            executor,
            base_url,
            allow_publish_retry,
        }
    }

    /// Create a draft on the platform, returning its media_id.
    pub async fn create(&self, draft: &Draft) -> Result<String> {
        let request = prepare_draft(draft, &self.base_url);
        let response = self.executor.execute(request).await?;
        let parsed: DraftAddResponse = serde_json::from_slice(&response.body)
            .map_err(|e| Error::Parse(format!("invalid draft add response: {e}")))?;

        info!(title = draft.title(), media_id = %parsed.media_id, "draft created");
        Ok(parsed.media_id)
    }

    /// Submit a draft for publication, returning the publish task id.
    ///
    /// Submission is keyed by media_id, so a replay after an ambiguous
    /// transport failure is safe; retry stays configurable regardless.
    pub async fn publish(&self, media_id: &str) -> Result<String> {
        if media_id.trim().is_empty() {
            return Err(Error::Validation("media_id must not be empty".into()));
        }
        let mut request = ApiRequest::post_json(
            format!("{}{PUBLISH_SUBMIT_PATH}", self.base_url),
            serde_json::json!({ "media_id": media_id }),
        );
        if !self.allow_publish_retry {
            request = request.non_retryable();
        }

        let response = self.executor.execute(request).await?;
        let parsed: PublishResponse = serde_json::from_slice(&response.body)
            .map_err(|e| Error::Parse(format!("invalid publish response: {e}")))?;

        let publish_id = parsed.publish_id.to_string();
        info!(media_id, publish_id = %publish_id, "draft submitted for publication");
        Ok(publish_id)
    }
}
