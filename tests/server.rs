mod common;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt;

use common::{harness, Harness, FABLES};
use jstory::config::Config;
use jstory::models::{SearchResult, StoryChunk};
use jstory::server::router;
use jstory::store::VectorStore;

const BOUNDARY: &str = "jstory-test-boundary";

fn test_harness(data_dir: &std::path::Path) -> Harness {
    let mut config = Config::default();
    config.server.data_dir = data_dir.to_path_buf();
    harness(config)
}

fn multipart_body(files: &[(&str, &str)]) -> String {
    let mut body = String::new();
    for (name, content) in files {
        body.push_str(&format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
             Content-Type: text/plain\r\n\r\n\
             {content}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}

fn upload_request(files: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/ingest")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(files)))
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(h: &Harness, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router(h.services.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

async fn send_json(h: &Harness, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(h, request).await;
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("non-JSON body ({}): {}", e, String::from_utf8_lossy(&bytes)));
    (status, value)
}

#[tokio::test]
async fn test_index_serves_ui() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());

    let (status, body) = send(&h, empty_request("GET", "/")).await;
    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("JStory"));
    assert!(html.contains("/api/ingest"));
    assert!(html.contains("/api/search"));
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());

    let (status, body) = send_json(&h, empty_request("GET", "/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["chunks"], 0);
}

/// A network-backed store whose every operation fails.
struct UnreachableStore;

#[async_trait]
impl VectorStore for UnreachableStore {
    fn backend(&self) -> &'static str {
        "chroma"
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn add_chunks(&self, _chunks: &[StoryChunk]) -> anyhow::Result<()> {
        anyhow::bail!("unreachable")
    }

    async fn search_similar(&self, _q: &[f32], _top_k: usize) -> anyhow::Result<Vec<SearchResult>> {
        anyhow::bail!("unreachable")
    }

    async fn get_chunk(&self, _id: &str) -> anyhow::Result<Option<StoryChunk>> {
        anyhow::bail!("unreachable")
    }

    async fn clear_all(&self) -> anyhow::Result<()> {
        anyhow::bail!("unreachable")
    }

    async fn count(&self) -> anyhow::Result<usize> {
        panic!("health must not count a remote store")
    }
}

#[tokio::test]
async fn test_health_skips_remote_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = test_harness(dir.path());
    h.services.store = Arc::new(UnreachableStore);

    let (status, body) = send_json(&h, empty_request("GET", "/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body.get("chunks").is_none(), "{}", body);
}

#[tokio::test]
async fn test_upload_then_search() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());

    let (status, body) = send_json(&h, upload_request(&[("fables.txt", FABLES)])).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let reports = body.as_array().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["title"], "fables");
    assert_eq!(reports[0]["stories_ingested"], 3);
    assert_eq!(reports[0]["chunks_created"], 3);
    assert!(dir.path().join("fables.txt").exists());

    let (status, body) = send_json(
        &h,
        json_request("POST", "/api/search", json!({ "query": "Tell me about the fox" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["query"], "Tell me about the fox");
    assert!(body["response"].as_str().unwrap().contains("[Source 1]"));

    let citations = body["citations"].as_array().unwrap();
    assert_eq!(citations.len(), 3);
    assert!(citations[0]["content"]
        .as_str()
        .unwrap()
        .starts_with("The Fox and the Crow"));
    assert_eq!(citations[0]["metadata"]["title"], "fables");
    assert_eq!(citations[0]["metadata"]["total_chunks"], 3);
}

#[tokio::test]
async fn test_upload_uses_base_name_only() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());

    let (status, body) =
        send_json(&h, upload_request(&[("../../escape/tales.txt", "Once upon a time.")])).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(dir.path().join("tales.txt").exists());
    assert_eq!(body[0]["title"], "tales");
}

#[tokio::test]
async fn test_upload_rejects_unsupported_type() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());

    let (status, body) = send_json(&h, upload_request(&[("notes.md", "# notes")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["detail"],
        "notes.md is not a supported file type. Supported: .pdf, .txt"
    );
    assert!(!dir.path().join("notes.md").exists());
}

#[tokio::test]
async fn test_failed_upload_removes_saved_file() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());

    let (status, body) = send_json(&h, upload_request(&[("blank.txt", "   ")])).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Error processing blank.txt: No stories found in"), "{}", detail);
    assert!(!dir.path().join("blank.txt").exists());

    let (status, body) = send_json(&h, upload_request(&[("empty.txt", "")])).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Error processing empty.txt: No content extracted from"), "{}", detail);
    assert!(!dir.path().join("empty.txt").exists());
}

#[tokio::test]
async fn test_upload_keeps_files_before_failure() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());

    let files = [("fables.txt", FABLES), ("blank.txt", ""), ("later.txt", "Never read.")];
    let (status, body) = send_json(&h, upload_request(&files)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Error processing blank.txt: "));

    assert_eq!(h.services.store.count().await.unwrap(), 3);
    assert!(dir.path().join("fables.txt").exists());
    assert!(!dir.path().join("blank.txt").exists());
    assert!(!dir.path().join("later.txt").exists());
}

#[tokio::test]
async fn test_upload_over_size_limit_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.server.data_dir = dir.path().to_path_buf();
    config.server.max_upload_mb = 1;
    let h = harness(config);

    let big = "The fox ran. ".repeat(120_000);
    let (status, body) = send_json(&h, upload_request(&[("big.txt", &big)])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE, "{}", body);
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid upload"));
    assert!(!dir.path().join("big.txt").exists());
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);

    let (status, _) = send_json(&h, upload_request(&[("small.txt", "The owl slept.")])).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_search_requires_query() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());

    for body in [json!({}), json!({ "query": "" }), json!({ "query": null })] {
        let (status, resp) = send_json(&h, json_request("POST", "/api/search", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp["detail"], "Query is required");
    }
}

#[tokio::test]
async fn test_whitespace_query_gets_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());
    send_json(&h, upload_request(&[("fables.txt", FABLES)])).await;
    let embeds = h.embedder.calls.load(Ordering::SeqCst);

    let (status, body) =
        send_json(&h, json_request("POST", "/api/search", json!({ "query": "   " }))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["query"], "   ");
    assert_eq!(
        body["response"],
        "I couldn't find any relevant stories to answer your query."
    );
    assert_eq!(body["citations"], json!([]));
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), embeds);
    assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_search_rejects_malformed_json() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());

    let request = Request::builder()
        .method("POST")
        .uri("/api/search")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send_json(&h, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_search_on_empty_store_returns_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());

    let (status, body) =
        send_json(&h, json_request("POST", "/api/search", json!({ "query": "owl" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["response"],
        "I couldn't find any relevant stories to answer your query."
    );
    assert_eq!(body["citations"], json!([]));
}

#[tokio::test]
async fn test_get_and_clear_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());
    send_json(&h, upload_request(&[("fables.txt", FABLES)])).await;

    let (status, body) = send_json(&h, empty_request("GET", "/api/chunks/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "Chunk not found: does-not-exist");

    let hits = h.services.search_stories("owl", 1).await.unwrap();
    let id = hits[0].chunk.id.clone();
    let (status, body) = send_json(&h, empty_request("GET", &format!("/api/chunks/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert!(body["content"].as_str().unwrap().starts_with("The Wise Owl"));
    assert_eq!(body["metadata"]["chunk_id"], id.as_str());

    let (status, body) = send_json(&h, empty_request("DELETE", "/api/chunks")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 3);
    assert_eq!(h.services.store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let dir = tempfile::tempdir().unwrap();
    let h = test_harness(dir.path());

    let request = Request::builder()
        .method("GET")
        .uri("/api/health")
        .header(header::ORIGIN, "http://example.com")
        .body(Body::empty())
        .unwrap();
    let response = router(h.services.clone()).oneshot(request).await.unwrap();
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
