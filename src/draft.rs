// Draft payload: the JSON body of `draft/add`, how it is assembled from the
// article metadata, and the call that submits it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, DRAFT_ADD_PATH};
use crate::article::ArticleMetadata;
use crate::error::{PublishError, Result};

/// Longest digest the platform accepts, in characters.
pub const MAX_DIGEST_CHARS: usize = 54;

/// One article of a draft, field names as the API expects them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DraftArticle {
    pub title: String,
    pub author: String,
    pub digest: String,
    pub content: String,
    pub content_source_url: String,
    pub thumb_media_id: String,
    pub need_open_comment: u8,
    pub only_fans_can_comment: u8,
}

/// Body of the submit call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DraftPayload {
    pub articles: Vec<DraftArticle>,
}

/// Build the payload for a single article.
pub fn build_draft_payload(metadata: &ArticleMetadata, html_content: &str, thumb_media_id: &str) -> Result<DraftPayload> {
    if metadata.title.trim().is_empty() {
        return Err(PublishError::validation("Required metadata 'title' is missing"));
    }
    if thumb_media_id.is_empty() {
        return Err(PublishError::validation("thumb_media_id cannot be empty"));
    }

    let digest = match metadata.digest.as_deref().filter(|d| !d.is_empty()) {
        Some(digest) if digest.chars().count() > MAX_DIGEST_CHARS => {
            warn!(
                len = digest.chars().count(),
                "digest exceeds {MAX_DIGEST_CHARS} characters, truncating"
            );
            digest.chars().take(MAX_DIGEST_CHARS).collect()
        }
        Some(digest) => digest.to_string(),
        None => {
            let generated = summarize(html_content);
            debug!(digest = %generated, "generated digest from content");
            generated
        }
    };

    let article = DraftArticle {
        title: metadata.title.clone(),
        author: metadata.author.clone().unwrap_or_default(),
        digest,
        content: html_content.to_string(),
        content_source_url: metadata.content_source_url.clone().unwrap_or_default(),
        thumb_media_id: thumb_media_id.to_string(),
        need_open_comment: u8::from(metadata.need_open_comment),
        only_fans_can_comment: u8::from(metadata.only_fans_can_comment),
    };
    info!(title = %article.title, "draft payload built");
    Ok(DraftPayload {
        articles: vec![article],
    })
}

/// Submit the payload and return the draft's media id.
pub fn submit(api: &ApiClient, access_token: &str, payload: &DraftPayload) -> Result<String> {
    if payload.articles.is_empty() {
        return Err(PublishError::validation(
            "Draft payload must contain a non-empty 'articles' list",
        ));
    }
    info!(articles = payload.articles.len(), "submitting draft");
    let body = api.post_json(DRAFT_ADD_PATH, access_token, payload)?;
    extract_media_id(&body)
}

fn extract_media_id(body: &Value) -> Result<String> {
    body.get("media_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PublishError::protocol(format!("draft response is missing 'media_id': {body}")))
}

/// Plain-text prefix of an HTML fragment: style blocks and tags removed,
/// whitespace collapsed, cut to `MAX_DIGEST_CHARS`.
pub fn summarize(html: &str) -> String {
    static STYLE: OnceLock<Regex> = OnceLock::new();
    static TAG: OnceLock<Regex> = OnceLock::new();
    let style = STYLE.get_or_init(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid regex"));
    let tag = TAG.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

    let without_style = style.replace_all(html, " ");
    let text = tag.replace_all(&without_style, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_DIGEST_CHARS).collect()
}
