// Access token lifecycle: one cached credential shared by every caller that
// holds the manager, refreshed when it gets within five minutes of expiry.
// Optionally the token is written to disk so consecutive runs reuse it
// instead of spending the daily token quota.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::error::{PublishError, Result};

/// A cached token is never handed out this close to its expiry.
pub const EXPIRY_BUFFER_SECS: i64 = 300;

/// Bearer credential plus its absolute expiry (unix seconds).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_at: i64,
}

impl AccessToken {
    /// True while `now` is strictly before `expires_at - EXPIRY_BUFFER_SECS`.
    pub fn is_fresh_at(&self, now: i64) -> bool {
        !self.access_token.is_empty() && now.saturating_add(EXPIRY_BUFFER_SECS) < self.expires_at
    }
}

/// What gets written to the token file.
#[derive(Serialize, Deserialize)]
struct StoredToken {
    app_id: String,
    #[serde(flatten)]
    token: AccessToken,
}

#[derive(Debug, Default)]
struct TokenSlot {
    token: Option<AccessToken>,
    /// The token file is consulted at most once per manager.
    store_checked: bool,
}

/// Owns the cached access token. Calls are serialized on an internal lock,
/// so concurrent callers never trigger more than one refresh at a time.
#[derive(Debug)]
pub struct TokenManager {
    api: ApiClient,
    cached: Mutex<TokenSlot>,
    store: Option<PathBuf>,
}

impl TokenManager {
    pub fn new(api: ApiClient) -> Self {
        TokenManager {
            api,
            cached: Mutex::new(TokenSlot::default()),
            store: None,
        }
    }

    /// Persist refreshed tokens to `path`.
    pub fn with_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.store = Some(path.into());
        self
    }

    /// Seed the cache, e.g. with a token obtained elsewhere.
    pub fn prime(&self, token: AccessToken) {
        self.lock().token = Some(token);
    }

    /// Drop the cached token so the next call refreshes. The token file, if
    /// any, is removed too so later runs do not pick the old token up again.
    pub fn invalidate(&self) {
        let mut slot = self.lock();
        slot.token = None;
        slot.store_checked = true;
        if let Some(path) = &self.store {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "token file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove token file"),
            }
        }
    }

    /// The currently cached token, if any.
    pub fn token_info(&self) -> Option<AccessToken> {
        self.lock().token.clone()
    }

    /// Return a token that is valid for at least `EXPIRY_BUFFER_SECS`,
    /// fetching a new one only when the cached one is missing or too old.
    pub fn get_access_token(&self, app_id: &str, app_secret: &str) -> Result<String> {
        if app_id.is_empty() || app_secret.is_empty() {
            return Err(PublishError::configuration(
                "App ID and App Secret must be provided",
            ));
        }

        let mut slot = self.lock();
        let now = now_unix();

        if !slot.store_checked {
            slot.store_checked = true;
            if slot.token.is_none() {
                if let Some(path) = &self.store {
                    slot.token = load_token(path, app_id);
                }
            }
        }

        if let Some(token) = slot.token.as_ref() {
            if token.is_fresh_at(now) {
                debug!(expires_at = token.expires_at, "reusing cached access token");
                return Ok(token.access_token.clone());
            }
        }

        info!("fetching new access token");
        let grant = self.api.fetch_token(app_id, app_secret)?;
        let token = AccessToken {
            access_token: grant.access_token,
            expires_at: now_unix().saturating_add(i64::try_from(grant.expires_in).unwrap_or(i64::MAX)),
        };
        info!(
            token = %mask(&token.access_token),
            expires_in = grant.expires_in,
            "access token obtained"
        );

        if let Some(path) = &self.store {
            if let Err(e) = persist_token(path, app_id, &token) {
                warn!(path = %path.display(), error = %e, "failed to persist access token");
            }
        }

        let value = token.access_token.clone();
        slot.token = Some(token);
        Ok(value)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TokenSlot> {
        self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Seconds since the unix epoch.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

fn mask(token: &str) -> String {
    let head: String = token.chars().take(8).collect();
    format!("{head}...")
}

/// Read a token persisted by an earlier run. Anything unreadable, or a token
/// issued for a different app, counts as no token.
fn load_token(path: &Path, app_id: &str) -> Option<AccessToken> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read token file");
            return None;
        }
    };
    match serde_json::from_str::<StoredToken>(&data) {
        Ok(stored) if stored.app_id == app_id => Some(stored.token),
        Ok(_) => {
            debug!(path = %path.display(), "token file belongs to another app, ignoring");
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "token file is corrupt, ignoring");
            None
        }
    }
}

fn persist_token(path: &Path, app_id: &str, token: &AccessToken) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| PublishError::io(format!("failed to create {}", parent.display()), e))?;
    }
    let stored = StoredToken {
        app_id: app_id.to_string(),
        token: token.clone(),
    };
    let data = serde_json::to_string(&stored)
        .map_err(|e| PublishError::protocol(format!("failed to encode token: {e}")))?;
    std::fs::write(path, data)
        .map_err(|e| PublishError::io(format!("failed to write {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(expires_at: i64) -> AccessToken {
        AccessToken {
            access_token: "TOKEN".into(),
            expires_at,
        }
    }

    #[test]
    fn freshness_respects_buffer() {
        let now = 1_000_000;
        assert!(token(now + 301).is_fresh_at(now));
        assert!(!token(now + 300).is_fresh_at(now));
        assert!(!token(now + 100).is_fresh_at(now));
        assert!(!token(now - 100).is_fresh_at(now));
        assert!(!token(0).is_fresh_at(now));
    }

    #[test]
    fn empty_token_is_never_fresh() {
        let t = AccessToken {
            access_token: String::new(),
            expires_at: i64::MAX,
        };
        assert!(!t.is_fresh_at(0));
    }

    #[test]
    fn missing_credentials_fail_before_network() {
        // Port 9 is discard; the call must fail before reaching it anyway.
        let manager = TokenManager::new(ApiClient::new("http://127.0.0.1:9").unwrap());
        let err = manager.get_access_token("", "secret").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        let err = manager.get_access_token("id", "").unwrap_err();
        assert!(err.to_string().contains("App ID and App Secret must be provided"));
    }

    #[test]
    fn cached_token_is_returned_without_network() {
        let manager = TokenManager::new(ApiClient::new("http://127.0.0.1:9").unwrap());
        manager.prime(token(now_unix() + 5000));
        assert_eq!(manager.get_access_token("id", "secret").unwrap(), "TOKEN");
    }

    #[test]
    fn invalidate_clears_cache() {
        let manager = TokenManager::new(ApiClient::new("http://127.0.0.1:9").unwrap());
        manager.prime(token(now_unix() + 5000));
        assert!(manager.token_info().is_some());
        manager.invalidate();
        assert!(manager.token_info().is_none());
    }

    #[test]
    fn invalidate_removes_token_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        persist_token(&path, "app", &token(now_unix() + 7200)).unwrap();
        let manager = TokenManager::new(ApiClient::new("http://127.0.0.1:9").unwrap()).with_store(&path);
        manager.invalidate();
        assert!(!path.exists());
        // Nothing cached and nothing on disk: the next call must hit the API.
        let err = manager.get_access_token("app", "secret").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Network);
    }

    #[test]
    fn token_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("token.json");
        let t = token(now_unix() + 7200);
        persist_token(&path, "app", &t).unwrap();
        assert_eq!(load_token(&path, "app"), Some(t));
        assert_eq!(load_token(&path, "other-app"), None);
    }

    #[test]
    fn corrupt_token_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(load_token(&path, "app"), None);
    }

    #[test]
    fn stored_token_is_used_by_manager() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        persist_token(
            &path,
            "app",
            &AccessToken {
                access_token: "FROM_DISK".into(),
                expires_at: now_unix() + 7200,
            },
        )
        .unwrap();
        let manager = TokenManager::new(ApiClient::new("http://127.0.0.1:9").unwrap()).with_store(&path);
        assert_eq!(manager.get_access_token("app", "secret").unwrap(), "FROM_DISK");
    }
}
