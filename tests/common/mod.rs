// Shared helpers: a wiremock server driven from blocking tests, and small
// fixture builders.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A mock API server. The blocking reqwest client cannot run inside an
/// async context, so the server lives on its own runtime and the test
/// thread stays synchronous.
pub struct MockApi {
    // Declared before `rt` so the server is dropped while the runtime lives.
    server: MockServer,
    rt: Runtime,
}

impl MockApi {
    pub fn start() -> Self {
        let rt = Runtime::new().expect("tokio runtime");
        let server = rt.block_on(MockServer::start());
        MockApi { server, rt }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server));
    }

    pub fn received(&self) -> Vec<wiremock::Request> {
        self.rt
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }

    pub fn received_on(&self, endpoint: &str) -> Vec<wiremock::Request> {
        self.received()
            .into_iter()
            .filter(|r| r.url.path() == endpoint)
            .collect()
    }

    /// Panics if any mock's `expect` was not met.
    pub fn verify(&self) {
        self.rt.block_on(self.server.verify());
    }

    pub fn mount_token(&self, token: &str, expected_calls: u64) {
        self.mount(
            Mock::given(method("GET"))
                .and(path("/cgi-bin/token"))
                .and(query_param("grant_type", "client_credential"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": token,
                    "expires_in": 7200
                })))
                .expect(expected_calls),
        );
    }

    pub fn mount_thumb_upload(&self, media_id: &str, expected_calls: u64) {
        self.mount(
            Mock::given(method("POST"))
                .and(path("/cgi-bin/material/add_material"))
                .and(query_param("type", "thumb"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "media_id": media_id,
                    "url": "http://mmbiz.qpic.cn/thumb"
                })))
                .expect(expected_calls),
        );
    }

    pub fn mount_draft_add(&self, media_id: &str, expected_calls: u64) {
        self.mount(
            Mock::given(method("POST"))
                .and(path("/cgi-bin/draft/add"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "errcode": 0,
                    "errmsg": "ok",
                    "media_id": media_id
                })))
                .expect(expected_calls),
        );
    }
}

/// Write `len` bytes to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, vec![0xABu8; len]).unwrap();
    path
}

/// Canonical form of `path`, as used for cache keys.
pub fn abs(path: &Path) -> String {
    std::fs::canonicalize(path).unwrap().to_string_lossy().into_owned()
}

/// Address that refuses connections.
pub fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}")
}
