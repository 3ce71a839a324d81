// Publishing workflow. `Publisher` owns the token manager and the media
// manager for the lifetime of a run and hands them to each step, so every
// upload and the final submit share one token and one pair of caches.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::api::ApiClient;
use crate::article::{read_article, render_markdown};
use crate::auth::TokenManager;
use crate::config::{Credentials, Settings};
use crate::draft::{build_draft_payload, submit, DraftPayload};
use crate::error::Result;
use crate::html::{local_image_srcs, process_html, read_css};
use crate::media::MediaManager;

/// Everything needed to submit, computed without submitting.
#[derive(Debug, Clone)]
pub struct PreparedDraft {
    pub title: String,
    pub thumb_media_id: String,
    pub payload: DraftPayload,
    /// Uploads that went over the network while preparing (cache misses).
    pub uploads: usize,
    /// Local images referenced by the article.
    pub local_images: usize,
}

/// Result of a full run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub title: String,
    pub draft_media_id: String,
    pub thumb_media_id: String,
    pub uploads: usize,
}

pub struct Publisher {
    api: ApiClient,
    tokens: TokenManager,
    media: MediaManager,
    credentials: Credentials,
    css_template: Option<PathBuf>,
}

impl Publisher {
    /// Wire up a publisher from loaded settings.
    pub fn new(settings: &Settings, credentials: Credentials) -> Result<Self> {
        let api = ApiClient::new(&settings.wechat.base_url)?;
        let mut tokens = TokenManager::new(api.clone());
        if let Some(path) = &settings.wechat.token_cache {
            tokens = tokens.with_store(path);
        }
        let media = MediaManager::new(api.clone(), &settings.paths.cache_dir);
        Ok(Publisher::from_parts(
            api,
            tokens,
            media,
            credentials,
            settings.paths.css_template.clone(),
        ))
    }

    pub fn from_parts(
        api: ApiClient,
        tokens: TokenManager,
        media: MediaManager,
        credentials: Credentials,
        css_template: Option<PathBuf>,
    ) -> Self {
        Publisher {
            api,
            tokens,
            media,
            credentials,
            css_template,
        }
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn media(&mut self) -> &mut MediaManager {
        &mut self.media
    }

    fn access_token(&self) -> Result<String> {
        self.tokens
            .get_access_token(&self.credentials.app_id, &self.credentials.app_secret)
    }

    /// Upload the cover and inline images and build the payload.
    pub fn prepare(&mut self, markdown_path: &Path) -> Result<PreparedDraft> {
        let uploads_before = self.media.uploads();

        info!("fetching access token");
        let token = self.access_token()?;

        let article = read_article(markdown_path)?;
        let metadata = &article.metadata;

        info!(cover = %metadata.cover_image_path.display(), "uploading cover image");
        let thumb_media_id = self
            .media
            .get_or_upload_thumb(&token, &metadata.cover_image_path)?;

        let css = match &self.css_template {
            Some(path) => Some(read_css(path)?),
            None => None,
        };

        let rendered = render_markdown(&article.markdown);
        let local_images = local_image_srcs(&rendered).len();
        info!(local_images, "processing article html");
        let processed = {
            let mut uploader = self.media.content_uploader(&token);
            process_html(&rendered, article.base_dir(), &mut uploader, css.as_deref())?
        };

        let payload = build_draft_payload(metadata, &processed.html, &thumb_media_id)?;
        Ok(PreparedDraft {
            title: metadata.title.clone(),
            thumb_media_id,
            payload,
            uploads: self.media.uploads() - uploads_before,
            local_images,
        })
    }

    /// Submit a prepared draft and return its media id.
    pub fn submit(&self, prepared: &PreparedDraft) -> Result<String> {
        let token = self.access_token()?;
        let draft_media_id = submit(&self.api, &token, &prepared.payload)?;
        info!(title = %prepared.title, %draft_media_id, "draft created");
        Ok(draft_media_id)
    }

    /// Prepare and submit in one go.
    pub fn publish(&mut self, markdown_path: &Path) -> Result<PublishOutcome> {
        let prepared = self.prepare(markdown_path)?;
        let draft_media_id = self.submit(&prepared)?;
        Ok(PublishOutcome {
            title: prepared.title,
            draft_media_id,
            thumb_media_id: prepared.thumb_media_id,
            uploads: prepared.uploads,
        })
    }
}
