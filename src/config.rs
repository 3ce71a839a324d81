// Settings: a TOML file for paths and endpoints, environment variables
// (optionally from a `.env` file) for the app credentials.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::api::DEFAULT_BASE_URL;
use crate::error::{PublishError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_ENV_PATH: &str = ".env";
pub const APP_ID_VAR: &str = "WECHAT_APP_ID";
pub const APP_SECRET_VAR: &str = "WECHAT_APP_SECRET";

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub wechat: WeChatSettings,
    pub paths: PathSettings,
    pub logging: LogSettings,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WeChatSettings {
    pub base_url: String,
    /// Where to keep the access token between runs; not persisted if unset.
    pub token_cache: Option<PathBuf>,
}

impl Default for WeChatSettings {
    fn default() -> Self {
        WeChatSettings {
            base_url: DEFAULT_BASE_URL.to_string(),
            token_cache: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PathSettings {
    /// Directory holding the media caches.
    pub cache_dir: PathBuf,
    /// Stylesheet embedded at the top of the article.
    pub css_template: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        PathSettings {
            cache_dir: default_cache_dir(),
            css_template: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            level: "info".to_string(),
            log_file: None,
        }
    }
}

/// App credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"***")
            .finish()
    }
}

/// Platform cache dir when there is one, `data/cache` otherwise.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("wechat-draft"))
        .unwrap_or_else(|| PathBuf::from("data/cache"))
}

impl Settings {
    /// Load settings from `path`. `None` means the default location, where a
    /// missing file just yields defaults; an explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        if !path.is_file() {
            if explicit {
                return Err(PublishError::configuration(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Settings::default());
        }

        let text = std::fs::read_to_string(&path)
            .map_err(|e| PublishError::io(format!("failed to read {}", path.display()), e))?;
        let settings = Settings::parse(&text).map_err(|e| match e {
            PublishError::Configuration(msg) => {
                PublishError::configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        info!(path = %path.display(), "configuration loaded");
        Ok(settings)
    }

    pub fn parse(text: &str) -> Result<Settings> {
        toml::from_str(text)
            .map_err(|e| PublishError::configuration(format!("failed to parse config: {e}")))
    }
}

/// Load a `.env` file into the process environment, overriding existing
/// variables. A missing default file is fine; a missing explicit one is
/// only worth a warning since the variables may already be set.
pub fn load_env_file(path: Option<&Path>) {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_ENV_PATH), false),
    };
    if !path.is_file() {
        if explicit {
            warn!(path = %path.display(), ".env file not found, relying on environment");
        }
        return;
    }
    match dotenvy::from_path_override(&path) {
        Ok(()) => info!(path = %path.display(), "loaded environment variables"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to load .env file"),
    }
}

/// Read the credentials from the environment.
pub fn credentials_from_env() -> Result<Credentials> {
    Ok(Credentials {
        app_id: required_var(APP_ID_VAR)?,
        app_secret: required_var(APP_SECRET_VAR)?,
    })
}

fn required_var(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(PublishError::configuration(format!(
            "Required environment variable '{name}' not set"
        ))),
    }
}
