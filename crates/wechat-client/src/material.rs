//! Permanent-material validation and upload
//!
//! Every constraint is checked before a byte leaves the process: size
//! ceilings per media type, extension whitelists, and the video-only
//! title/introduction requirement (enforced at `MediaAsset` construction).
//! `prepare_upload` builds the multipart request without performing I/O;
//! `MaterialManager` resolves sources, executes, and parses.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, FileError, Result};
use crate::executor::RequestExecutor;
use crate::transport::{ApiRequest, MultipartPayload, Transport};
use wechat_auth::constants::{
    ADD_MATERIAL_PATH, DEL_MATERIAL_PATH, GET_MATERIAL_PATH, UPLOAD_IMAGE_PATH,
};

/// Ceiling for article-body images (`uploadimg`), which is tighter than the
/// permanent-image limit.
pub const ARTICLE_IMAGE_MAX_BYTES: u64 = 1024 * 1024;

/// Permanent-material media types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Image,
    Voice,
    Video,
    Thumb,
}

impl MediaType {
    /// Wire value for the `type` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Voice => "voice",
            MediaType::Video => "video",
            MediaType::Thumb => "thumb",
        }
    }

    /// Per-type size ceiling in bytes.
    pub fn max_bytes(&self) -> u64 {
        match self {
            MediaType::Image => 10 * 1024 * 1024,
            MediaType::Voice => 2 * 1024 * 1024,
            MediaType::Video => 20 * 1024 * 1024,
            MediaType::Thumb => 64 * 1024,
        }
    }

    /// Extensions the platform accepts for this type.
    fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            MediaType::Image => &["jpg", "jpeg", "png", "gif", "bmp"],
            MediaType::Voice => &["mp3", "wma", "wav", "amr"],
            MediaType::Video => &["mp4"],
            MediaType::Thumb => &["jpg", "jpeg"],
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the media bytes come from.
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// Local file, read at upload time
    File(PathBuf),
    /// Remote file, downloaded through the transport before validation
    Url(String),
    /// In-memory bytes with an explicit filename
    Bytes { data: Vec<u8>, filename: String },
}

/// A validated media asset ready for upload.
///
/// Construction enforces the video title/introduction invariant; size and
/// format are checked once the bytes are resolved, still before any upload.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    media_type: MediaType,
    source: MediaSource,
    title: Option<String>,
    introduction: Option<String>,
}

impl MediaAsset {
    /// Construct a non-video asset.
    pub fn new(media_type: MediaType, source: MediaSource) -> Result<Self> {
        if media_type == MediaType::Video {
            return Err(Error::Validation(
                "video assets require a title and introduction, use MediaAsset::video".into(),
            ));
        }
        Ok(Self {
            media_type,
            source,
            title: None,
            introduction: None,
        })
    }

    /// Construct a video asset; title and introduction are mandatory and
    /// must be non-empty.
    pub fn video(
        source: MediaSource,
        title: impl Into<String>,
        introduction: impl Into<String>,
    ) -> Result<Self> {
        let title = title.into();
        let introduction = introduction.into();
        if title.trim().is_empty() {
            return Err(Error::Validation("video title must not be empty".into()));
        }
        if introduction.trim().is_empty() {
            return Err(Error::Validation(
                "video introduction must not be empty".into(),
            ));
        }
        Ok(Self {
            media_type: MediaType::Video,
            source,
            title: Some(title),
            introduction: Some(introduction),
        })
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }
}

/// Validate resolved media bytes against the type's constraints.
///
/// A filename without an extension passes the format check — the remote side
/// is the authority there; this gate only rejects what is provably wrong.
pub fn validate_media(media_type: MediaType, data: &[u8], filename: &str) -> std::result::Result<(), FileError> {
    if data.is_empty() {
        return Err(FileError::Empty);
    }
    let limit = media_type.max_bytes();
    if data.len() as u64 > limit {
        return Err(FileError::TooLarge {
            media_type,
            size_bytes: data.len() as u64,
            limit_bytes: limit,
        });
    }
    if let Some(ext) = filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
        && !media_type.allowed_extensions().contains(&ext.as_str())
    {
        return Err(FileError::UnsupportedFormat {
            media_type,
            filename: filename.to_string(),
        });
    }
    Ok(())
}

/// Build the multipart upload request for a resolved asset. No I/O.
pub fn prepare_upload(
    asset: &MediaAsset,
    data: Vec<u8>,
    filename: &str,
    base_url: &str,
) -> std::result::Result<ApiRequest, FileError> {
    validate_media(asset.media_type, &data, filename)?;

    let mut fields = Vec::new();
    if let (Some(title), Some(introduction)) = (&asset.title, &asset.introduction) {
        let description = serde_json::json!({
            "title": title,
            "introduction": introduction,
        });
        fields.push(("description".to_string(), description.to_string()));
    }

    let payload = MultipartPayload {
        filename: filename.to_string(),
        data,
        fields,
    };
    Ok(
        ApiRequest::post_multipart(format!("{base_url}{ADD_MATERIAL_PATH}"), payload)
            .with_query("type", asset.media_type.as_str()),
    )
}

/// Result of a permanent-material upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedMaterial {
    pub media_id: String,
    /// Only present for image and thumb uploads
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageUploadResponse {
    url: String,
}

/// A fetched permanent material: JSON info (video, news) or raw bytes.
#[derive(Debug, Clone)]
pub enum Material {
    Info(serde_json::Value),
    Binary { content_type: String, data: Vec<u8> },
}

/// Permanent-material operations.
pub struct MaterialManager {
    executor: Arc<RequestExecutor>,
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl MaterialManager {
    pub fn new(
        executor: Arc<RequestExecutor>,
        transport: Arc<dyn Transport>,
        base_url: String,
    ) -> Self {
        Self {
            executor,
            transport,
            base_url,
        }
    }

    /// Upload a permanent material, returning its stable media_id.
    pub async fn upload(&self, asset: &MediaAsset) -> Result<UploadedMaterial> {
        let (data, filename) = self.resolve(asset.source()).await?;
        let request = prepare_upload(asset, data, &filename, &self.base_url)?;
        let response = self.executor.execute(request).await?;
        let uploaded: UploadedMaterial = serde_json::from_slice(&response.body)
            .map_err(|e| Error::Parse(format!("invalid upload response: {e}")))?;

        info!(
            media_type = asset.media_type().as_str(),
            media_id = %uploaded.media_id,
            "uploaded permanent material"
        );
        Ok(uploaded)
    }

    /// Upload an image for embedding in article HTML; returns its URL.
    ///
    /// Tighter constraints than permanent images: jpg/png only, 1 MiB.
    pub async fn upload_article_image(&self, source: &MediaSource) -> Result<String> {
        let (data, filename) = self.resolve(source).await?;
        if data.is_empty() {
            return Err(FileError::Empty.into());
        }
        if data.len() as u64 > ARTICLE_IMAGE_MAX_BYTES {
            return Err(FileError::TooLarge {
                media_type: MediaType::Image,
                size_bytes: data.len() as u64,
                limit_bytes: ARTICLE_IMAGE_MAX_BYTES,
            }
            .into());
        }
        if let Some(ext) = filename.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase())
            && !matches!(ext.as_str(), "jpg" | "jpeg" | "png")
        {
            return Err(FileError::UnsupportedFormat {
                media_type: MediaType::Image,
                filename: filename.clone(),
            }
            .into());
        }

        let payload = MultipartPayload {
            filename,
            data,
            fields: Vec::new(),
        };
        let request =
            ApiRequest::post_multipart(format!("{}{UPLOAD_IMAGE_PATH}", self.base_url), payload);
        let response = self.executor.execute(request).await?;
        let parsed: ImageUploadResponse = serde_json::from_slice(&response.body)
            .map_err(|e| Error::Parse(format!("invalid uploadimg response: {e}")))?;
        info!(url = %parsed.url, "uploaded article image");
        Ok(parsed.url)
    }

    /// Fetch a permanent material by media_id.
    ///
    /// Video and news materials come back as JSON; images and voice come
    /// back as raw bytes.
    pub async fn get(&self, media_id: &str) -> Result<Material> {
        let request = ApiRequest::post_json(
            format!("{}{GET_MATERIAL_PATH}", self.base_url),
            serde_json::json!({ "media_id": media_id }),
        );
        let response = self.executor.execute(request).await?;

        match serde_json::from_slice::<serde_json::Value>(&response.body) {
            Ok(value) if value.is_object() => Ok(Material::Info(value)),
            _ => {
                debug!(
                    media_id,
                    bytes = response.body.len(),
                    "material fetched as binary"
                );
                Ok(Material::Binary {
                    content_type: response.content_type,
                    data: response.body,
                })
            }
        }
    }

    /// Delete a permanent material by media_id.
    pub async fn delete(&self, media_id: &str) -> Result<()> {
        if media_id.trim().is_empty() {
            return Err(Error::Validation("media_id must not be empty".into()));
        }
        let request = ApiRequest::post_json(
            format!("{}{DEL_MATERIAL_PATH}", self.base_url),
            serde_json::json!({ "media_id": media_id }),
        );
        self.executor.execute(request).await?;
        info!(media_id, "deleted permanent material");
        Ok(())
    }

    async fn resolve(&self, source: &MediaSource) -> Result<(Vec<u8>, String)> {
        match source {
            MediaSource::Bytes { data, filename } => Ok((data.clone(), filename.clone())),
            MediaSource::File(path) => {
                let data = tokio::fs::read(path).await?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "uploaded_file".to_string());
                Ok((data, filename))
            }
            MediaSource::Url(url) => {
                let data = self
                    .transport
                    .download(url.clone())
                    .await
                    .map_err(|e| Error::Network(e.to_string()))?;
                Ok((data, filename_from_url(url)))
            }
        }
    }
}

/// Last path segment of the URL if it carries an extension, otherwise a
/// neutral placeholder (lets the extension gate pass and the remote decide).
fn filename_from_url(url: &str) -> String {
    url.split('?')
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|segment| segment.contains('.'))
        .map(str::to_string)
        .unwrap_or_else(|| "uploaded_file".to_string())
}
