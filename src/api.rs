// API client module: a small blocking HTTP client that talks to the WeChat
// Official Account API. Every call goes through `check_response`, which is
// the one place where transport errors and the platform's `errcode` field
// are turned into `PublishError`s.

use reqwest::blocking::{multipart, Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{PublishError, Result};

/// Base URL used when the configuration does not name one.
pub const DEFAULT_BASE_URL: &str = "https://api.weixin.qq.com";

pub const TOKEN_PATH: &str = "/cgi-bin/token";
pub const THUMB_UPLOAD_PATH: &str = "/cgi-bin/material/add_material";
pub const CONTENT_IMAGE_UPLOAD_PATH: &str = "/cgi-bin/media/uploadimg";
pub const DRAFT_ADD_PATH: &str = "/cgi-bin/draft/add";

const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const DRAFT_TIMEOUT: Duration = Duration::from_secs(30);

/// Raw text included in protocol errors is cut to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Blocking client bound to one API base URL.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

/// Successful answer of the token endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
}

/// The two kinds of media the platform stores, each with its own endpoint,
/// accepted file types, size limit and returned identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Permanent "thumb" material used as the article cover.
    Thumb,
    /// Image embedded in the article body.
    ContentImage,
}

impl MediaKind {
    pub fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Thumb => &["jpg", "jpeg"],
            MediaKind::ContentImage => &["jpg", "jpeg", "png"],
        }
    }

    pub fn max_bytes(self) -> u64 {
        match self {
            MediaKind::Thumb => 64 * 1024,
            MediaKind::ContentImage => 1024 * 1024,
        }
    }

    fn limit_label(self) -> &'static str {
        match self {
            MediaKind::Thumb => "64KB",
            MediaKind::ContentImage => "1MB",
        }
    }

    fn label(self) -> &'static str {
        match self {
            MediaKind::Thumb => "thumbnail image",
            MediaKind::ContentImage => "content image",
        }
    }

    fn endpoint(self) -> &'static str {
        match self {
            MediaKind::Thumb => THUMB_UPLOAD_PATH,
            MediaKind::ContentImage => CONTENT_IMAGE_UPLOAD_PATH,
        }
    }

    /// Field of the response body holding the identifier.
    pub fn response_field(self) -> &'static str {
        match self {
            MediaKind::Thumb => "media_id",
            MediaKind::ContentImage => "url",
        }
    }
}

impl ApiClient {
    /// Build a client for the given base URL (a trailing `/` is ignored).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| PublishError::configuration(format!("failed to build HTTP client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(ApiClient { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Request a fresh access token with the client-credential grant.
    pub fn fetch_token(&self, app_id: &str, app_secret: &str) -> Result<TokenGrant> {
        let url = self.url(TOKEN_PATH);
        debug!(%url, "requesting access token");
        let res = self
            .client
            .get(&url)
            .query(&[
                ("grant_type", "client_credential"),
                ("appid", app_id),
                ("secret", app_secret),
            ])
            .timeout(TOKEN_TIMEOUT)
            .send()
            .map_err(|e| PublishError::network(format!("failed to request access token: {e}")))?;

        let body = check_response(res)?;
        let access_token = body.get("access_token").and_then(Value::as_str);
        let expires_in = body.get("expires_in").and_then(Value::as_u64);
        match (access_token, expires_in) {
            (Some(token), Some(expires_in)) => Ok(TokenGrant {
                access_token: token.to_string(),
                expires_in,
            }),
            _ => Err(PublishError::protocol(format!(
                "unexpected response format from token endpoint: {}",
                truncate(&body.to_string())
            ))),
        }
    }

    /// Upload one local file as `kind` and return the media id (thumb) or
    /// hosted URL (content image). Type and size are checked before any
    /// request is made.
    pub fn upload_media(&self, access_token: &str, file_path: &Path, kind: MediaKind) -> Result<String> {
        let size = validate_media_file(file_path, kind)?;

        let file = File::open(file_path)
            .map_err(|e| PublishError::io(format!("failed to open {}", file_path.display()), e))?;
        let file_name = file_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("image.jpg")
            .to_string();
        let part = multipart::Part::reader_with_length(file, size)
            .file_name(file_name)
            .mime_str(mime_for(file_path))?;
        let form = multipart::Form::new().part("media", part);

        let mut query = vec![("access_token", access_token)];
        if kind == MediaKind::Thumb {
            query.push(("type", "thumb"));
        }

        let url = self.url(kind.endpoint());
        info!(path = %file_path.display(), bytes = size, ?kind, "uploading media");
        let res = self
            .client
            .post(&url)
            .query(&query)
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .map_err(|e| PublishError::network(format!("failed to upload {}: {e}", file_path.display())))?;

        let body = check_response(res)?;
        let field = kind.response_field();
        body.get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                PublishError::protocol(format!(
                    "upload response is missing '{field}': {}",
                    truncate(&body.to_string())
                ))
            })
    }

    /// POST a JSON body to an authenticated endpoint and return the
    /// validated response body.
    pub fn post_json<T: Serialize + ?Sized>(&self, path: &str, access_token: &str, body: &T) -> Result<Value> {
        let url = self.url(path);
        // serde_json keeps non-ASCII text as-is, which the draft endpoint needs.
        let payload = serde_json::to_vec(body)
            .map_err(|e| PublishError::validation(format!("failed to serialize request body: {e}")))?;
        let res = self
            .client
            .post(&url)
            .query(&[("access_token", access_token)])
            .header(reqwest::header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(payload)
            .timeout(DRAFT_TIMEOUT)
            .send()
            .map_err(|e| PublishError::network(format!("request to {path} failed: {e}")))?;
        check_response(res)
    }
}

/// Interpret a response: HTTP status first, then JSON, then the
/// application-level `errcode`. Returns the parsed body unchanged.
pub fn check_response(res: Response) -> Result<Value> {
    let status = res.status();
    let url = strip_query(res.url().as_str());
    if status.is_client_error() || status.is_server_error() {
        return Err(PublishError::network(format!(
            "HTTP {status} from {url}"
        )));
    }
    let text = res
        .text()
        .map_err(|e| PublishError::network(format!("failed to read response from {url}: {e}")))?;
    parse_body(&url, &text)
}

fn parse_body(url: &str, text: &str) -> Result<Value> {
    let body: Value = serde_json::from_str(text).map_err(|_| {
        PublishError::protocol(format!("invalid response from {url}: {}", truncate(text)))
    })?;

    if let Some(code) = body.get("errcode").and_then(Value::as_i64) {
        if code != 0 {
            let msg = body.get("errmsg").and_then(Value::as_str).unwrap_or("");
            return Err(PublishError::protocol(format!(
                "WeChat API error from {url}: {code} - {msg}"
            )));
        }
    }
    Ok(body)
}

/// Pre-flight checks for an upload; returns the file size.
pub fn validate_media_file(file_path: &Path, kind: MediaKind) -> Result<u64> {
    if !file_path.is_file() {
        return Err(PublishError::not_found(format!(
            "{} not found: {}",
            capitalize(kind.label()),
            file_path.display()
        )));
    }

    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !kind.allowed_extensions().contains(&ext.as_str()) {
        return Err(PublishError::validation(format!(
            "Invalid {} type '.{}' for {} (allowed: {})",
            kind.label(),
            ext,
            file_path.display(),
            kind.allowed_extensions().join(", ")
        )));
    }

    let size = std::fs::metadata(file_path)
        .map_err(|e| PublishError::io(format!("failed to stat {}", file_path.display()), e))?
        .len();
    if size > kind.max_bytes() {
        return Err(PublishError::validation(format!(
            "{} {} is {} bytes, which exceeds {} limit",
            capitalize(kind.label()),
            file_path.display(),
            size,
            kind.limit_label()
        )));
    }
    Ok(size)
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// The token and secret travel in the query string; keep them out of errors.
fn strip_query(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_ERROR_BODY_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{cut}...")
}
