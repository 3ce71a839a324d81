// Library root
// ------------
// Everything the `wechat-draft` binary does lives here so it can be driven
// from tests against a local mock of the API.
//
// Module responsibilities:
// - `api`: blocking HTTP client, response checking, media upload transport.
// - `auth`: access token cache with expiry buffer and optional persistence.
// - `cache`: the on-disk path -> media identifier store.
// - `media`: get-or-upload on top of `api` and `cache`.
// - `article`, `html`: front matter, Markdown rendering, local image rewriting.
// - `draft`: payload model, builder and submit call.
// - `publish`: the workflow tying the above together.
// - `config`, `logging`, `ui`: settings, tracing setup, terminal output.
pub mod api;
pub mod article;
pub mod auth;
pub mod cache;
pub mod config;
pub mod draft;
pub mod error;
pub mod html;
pub mod logging;
pub mod media;
pub mod publish;
pub mod ui;

pub use api::{ApiClient, MediaKind};
pub use auth::{AccessToken, TokenManager};
pub use cache::MediaCache;
pub use error::{ErrorKind, PublishError, Result};
pub use media::{ImageUploader, MediaManager};
pub use publish::{PreparedDraft, PublishOutcome, Publisher};
