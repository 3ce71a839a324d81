mod common;

use common::{abs, write_file, MockApi};
use std::collections::BTreeMap;
use std::path::Path;
use wechat_draft_cli::article::ArticleMetadata;
use wechat_draft_cli::config::Credentials;
use wechat_draft_cli::draft::{build_draft_payload, submit, DraftPayload};
use wechat_draft_cli::media::THUMB_CACHE_FILE;
use wechat_draft_cli::{ApiClient, ErrorKind, MediaManager, Publisher, TokenManager};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

fn sample_payload() -> DraftPayload {
    let metadata = ArticleMetadata {
        title: "Test".into(),
        cover_image_path: "cover.jpg".into(),
        author: None,
        digest: Some("Short".into()),
        content_source_url: None,
        need_open_comment: false,
        only_fans_can_comment: false,
    };
    build_draft_payload(&metadata, "<p>你好</p>", "THUMB_ID").unwrap()
}

fn publisher(api: &MockApi, cache_dir: &Path) -> Publisher {
    let client = ApiClient::new(api.uri()).unwrap();
    Publisher::from_parts(
        client.clone(),
        TokenManager::new(client.clone()),
        MediaManager::new(client, cache_dir),
        Credentials {
            app_id: "app".into(),
            app_secret: "secret".into(),
        },
        None,
    )
}

#[test]
fn submit_posts_payload_and_returns_media_id() {
    let api = MockApi::start();
    api.mount(
        Mock::given(method("POST"))
            .and(path("/cgi-bin/draft/add"))
            .and(query_param("access_token", "ACCESS_TOKEN_DRAFT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 0,
                "errmsg": "ok",
                "media_id": "DRAFT_MEDIA_ID_789"
            })))
            .expect(1),
    );

    let client = ApiClient::new(api.uri()).unwrap();
    let payload = sample_payload();
    let id = submit(&client, "ACCESS_TOKEN_DRAFT", &payload).unwrap();
    assert_eq!(id, "DRAFT_MEDIA_ID_789");

    let request = &api.received_on("/cgi-bin/draft/add")[0];
    let sent: DraftPayload = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(sent, payload);
    // Non-ASCII text goes out unescaped.
    assert!(String::from_utf8_lossy(&request.body).contains("你好"));
    api.verify();
}

#[test]
fn submit_surfaces_api_errors() {
    let api = MockApi::start();
    api.mount(
        Mock::given(method("POST"))
            .and(path("/cgi-bin/draft/add"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 40018,
                "errmsg": "invalid button name size"
            }))),
    );

    let err = submit(&ApiClient::new(api.uri()).unwrap(), "token", &sample_payload()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.to_string().contains("40018 - invalid button name size"));
}

#[test]
fn empty_articles_never_reach_the_api() {
    let api = MockApi::start();
    api.mount_draft_add("NEVER", 0);
    let err = submit(
        &ApiClient::new(api.uri()).unwrap(),
        "token",
        &DraftPayload { articles: vec![] },
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(api.received().is_empty());
    api.verify();
}

#[test]
fn publish_uploads_each_image_once_across_runs() {
    let api = MockApi::start();
    api.mount_token("TOKEN", 2);
    api.mount_thumb_upload("COVER_ID", 1);
    api.mount(
        Mock::given(method("POST"))
            .and(path("/cgi-bin/media/uploadimg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": "http://mmbiz.qpic.cn/mmbiz/uploaded"
            })))
            .expect(2),
    );
    api.mount_draft_add("DRAFT_ID", 2);

    let work = tempfile::tempdir().unwrap();
    let cache_dir = work.path().join("cache");
    let cover = write_file(work.path(), "images/cover.jpg", 50 * 1024);
    write_file(work.path(), "images/one.png", 2048);
    write_file(work.path(), "images/two.jpg", 2048);
    let markdown = work.path().join("post.md");
    std::fs::write(
        &markdown,
        "---\ntitle: Hello\ncover: images/cover.jpg\nauthor: Ann\n---\n\
         # Heading\n\n![one](images/one.png)\n\n![two](images/two.jpg)\n\n\
         ![again](images/one.png)\n\n![remote](https://example.com/r.png)\n",
    )
    .unwrap();

    let outcome = publisher(&api, &cache_dir).publish(&markdown).unwrap();
    assert_eq!(outcome.title, "Hello");
    assert_eq!(outcome.draft_media_id, "DRAFT_ID");
    assert_eq!(outcome.thumb_media_id, "COVER_ID");
    assert_eq!(outcome.uploads, 3);

    let thumbs: BTreeMap<String, String> =
        serde_json::from_str(&std::fs::read_to_string(cache_dir.join(THUMB_CACHE_FILE)).unwrap()).unwrap();
    assert_eq!(thumbs.get(&abs(&cover)).map(String::as_str), Some("COVER_ID"));

    let draft_request = &api.received_on("/cgi-bin/draft/add")[0];
    let sent: DraftPayload = serde_json::from_slice(&draft_request.body).unwrap();
    let article = &sent.articles[0];
    assert_eq!(article.thumb_media_id, "COVER_ID");
    assert_eq!(article.author, "Ann");
    assert_eq!(article.content.matches("http://mmbiz.qpic.cn/mmbiz/uploaded").count(), 3);
    assert!(article.content.contains("https://example.com/r.png"));
    assert!(!article.content.contains("images/one.png"));

    // A later run starts with empty in-memory state but finds every image on disk.
    let second = publisher(&api, &cache_dir).publish(&markdown).unwrap();
    assert_eq!(second.uploads, 0);
    assert_eq!(second.thumb_media_id, "COVER_ID");
    api.verify();
}

#[test]
fn failed_run_keeps_uploads_already_made() {
    let api = MockApi::start();
    api.mount_token("TOKEN", 1);
    api.mount_thumb_upload("COVER_ID", 1);
    api.mount_draft_add("NEVER", 0);

    let work = tempfile::tempdir().unwrap();
    let cache_dir = work.path().join("cache");
    let cover = write_file(work.path(), "cover.jpg", 1024);
    let markdown = work.path().join("post.md");
    std::fs::write(
        &markdown,
        "---\ntitle: Hello\ncover_image_path: cover.jpg\n---\n![missing](nowhere.png)\n",
    )
    .unwrap();

    let err = publisher(&api, &cache_dir).publish(&markdown).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let thumbs: BTreeMap<String, String> =
        serde_json::from_str(&std::fs::read_to_string(cache_dir.join(THUMB_CACHE_FILE)).unwrap()).unwrap();
    assert_eq!(thumbs.get(&abs(&cover)).map(String::as_str), Some("COVER_ID"));
    api.verify();
}

#[test]
fn prepare_does_not_submit() {
    let api = MockApi::start();
    api.mount_token("TOKEN", 1);
    api.mount_thumb_upload("COVER_ID", 1);
    api.mount_draft_add("NEVER", 0);

    let work = tempfile::tempdir().unwrap();
    write_file(work.path(), "cover.jpg", 1024);
    let markdown = work.path().join("post.md");
    std::fs::write(&markdown, "---\ntitle: Dry\ncover: cover.jpg\n---\nJust text.\n").unwrap();

    let prepared = publisher(&api, &work.path().join("cache"))
        .prepare(&markdown)
        .unwrap();
    assert_eq!(prepared.title, "Dry");
    assert_eq!(prepared.local_images, 0);
    assert_eq!(prepared.payload.articles[0].digest, "Just text.");
    api.verify();
}
