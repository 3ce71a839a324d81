// Media manager: get-or-upload on top of the uploader in `api` and the
// persistent caches in `cache`. A local file is uploaded at most once per
// kind; later runs get the stored identifier back without a request.
//
// Cached identifiers are never revalidated against the platform. Media
// deleted on the platform side keeps its stale entry until it is removed
// with `forget` (or `wechat-draft cache forget <path>`).

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::api::{ApiClient, MediaKind};
use crate::cache::MediaCache;
use crate::error::{PublishError, Result};

pub const THUMB_CACHE_FILE: &str = "thumb_media.json";
pub const CONTENT_IMAGE_CACHE_FILE: &str = "content_images.json";

/// Something that turns a local image into a URL the article can reference.
/// The HTML processor only depends on this.
pub trait ImageUploader {
    fn upload_image(&mut self, path: &Path) -> Result<String>;
}

/// Uploads media through `ApiClient`, remembering results per media kind.
#[derive(Debug)]
pub struct MediaManager {
    api: ApiClient,
    thumbs: MediaCache,
    images: MediaCache,
    uploads: usize,
}

impl MediaManager {
    /// Manager whose two stores live in `cache_dir`.
    pub fn new(api: ApiClient, cache_dir: &Path) -> Self {
        MediaManager::with_caches(
            api,
            MediaCache::new(cache_dir.join(THUMB_CACHE_FILE)),
            MediaCache::new(cache_dir.join(CONTENT_IMAGE_CACHE_FILE)),
        )
    }

    pub fn with_caches(api: ApiClient, thumbs: MediaCache, images: MediaCache) -> Self {
        MediaManager {
            api,
            thumbs,
            images,
            uploads: 0,
        }
    }

    /// Number of uploads that actually went over the network.
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn cache(&mut self, kind: MediaKind) -> &mut MediaCache {
        match kind {
            MediaKind::Thumb => &mut self.thumbs,
            MediaKind::ContentImage => &mut self.images,
        }
    }

    /// Return the cached identifier for `file_path`, uploading it first if
    /// there is none. On upload failure the cache is left untouched.
    pub fn get_or_upload(&mut self, access_token: &str, file_path: &Path, kind: MediaKind) -> Result<String> {
        let key = cache_key(file_path)?;

        if let Some(cached) = self.cache(kind).get(&key)? {
            debug!(path = %key, ?kind, "media cache hit");
            return Ok(cached);
        }

        let uploaded = self.api.upload_media(access_token, Path::new(&key), kind)?;
        self.uploads += 1;
        info!(path = %key, ?kind, id = %uploaded, "media uploaded");

        self.cache(kind).insert(key, uploaded.clone())?;
        Ok(uploaded)
    }

    /// Cover image shortcut.
    pub fn get_or_upload_thumb(&mut self, access_token: &str, file_path: &Path) -> Result<String> {
        self.get_or_upload(access_token, file_path, MediaKind::Thumb)
    }

    /// Inline image shortcut.
    pub fn get_or_upload_image(&mut self, access_token: &str, file_path: &Path) -> Result<String> {
        self.get_or_upload(access_token, file_path, MediaKind::ContentImage)
    }

    /// Drop the entries for `file_path` from both stores.
    pub fn forget(&mut self, file_path: &Path) -> Result<bool> {
        let key = cache_key(file_path)?;
        let thumb = self.thumbs.remove(&key)?.is_some();
        let image = self.images.remove(&key)?.is_some();
        Ok(thumb || image)
    }

    /// `ImageUploader` for content images, bound to one access token.
    pub fn content_uploader<'a>(&'a mut self, access_token: &'a str) -> ContentImageUploader<'a> {
        ContentImageUploader {
            manager: self,
            access_token,
        }
    }
}

/// Borrowed view of a `MediaManager` that uploads inline images.
pub struct ContentImageUploader<'a> {
    manager: &'a mut MediaManager,
    access_token: &'a str,
}

impl ImageUploader for ContentImageUploader<'_> {
    fn upload_image(&mut self, path: &Path) -> Result<String> {
        self.manager.get_or_upload_image(self.access_token, path)
    }
}

/// Absolute form of `path` used as the cache key. Symlinks are resolved when
/// the file exists.
pub fn cache_key(path: &Path) -> Result<String> {
    let absolute: PathBuf = match std::fs::canonicalize(path) {
        Ok(p) => p,
        Err(_) => std::path::absolute(path)
            .map_err(|e| PublishError::io(format!("failed to resolve {}", path.display()), e))?,
    };
    Ok(absolute.to_string_lossy().into_owned())
}
