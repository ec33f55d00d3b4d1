//! WeChat Official Account API endpoints
//!
//! Exact paths are a contract with the platform. All calls are POST over
//! HTTPS; bodies are JSON or multipart, responses are JSON containing either
//! a success payload or `{errcode, errmsg}`.

/// Base URL for the Official Account API
pub const API_BASE_URL: &str = "https://api.weixin.qq.com";

/// Stable access-token endpoint (`grant_type=client_credential`)
pub const STABLE_TOKEN_PATH: &str = "/cgi-bin/stable_token";

/// Permanent-material upload (multipart; `?type=image|voice|video|thumb`)
pub const ADD_MATERIAL_PATH: &str = "/cgi-bin/material/add_material";

/// Permanent-material fetch by media_id
pub const GET_MATERIAL_PATH: &str = "/cgi-bin/material/get_material";

/// Permanent-material delete by media_id
pub const DEL_MATERIAL_PATH: &str = "/cgi-bin/material/del_material";

/// Article-body image upload (returns a stable URL, not a media_id)
pub const UPLOAD_IMAGE_PATH: &str = "/cgi-bin/media/uploadimg";

/// Draft creation
pub const DRAFT_ADD_PATH: &str = "/cgi-bin/draft/add";

/// Draft publishing (keyed by draft media_id on the remote side)
pub const PUBLISH_SUBMIT_PATH: &str = "/cgi-bin/freepublish/submit";

/// TTL the stable-token endpoint grants, in seconds
pub const TOKEN_TTL_SECS: u64 = 7200;
