//! Plain HTTP routes, exercised in-process with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use vidscope_core::{testing::MockTranscoder, Config, SessionContext};
use vidscope_server::{api::create_router, state::AppState};

struct TestFixture {
    router: Router,
    temp_dir: TempDir,
}

impl TestFixture {
    fn new(url_prefix: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.analysis.output_root = temp_dir.path().join("runs");
        config.storage.static_dir = temp_dir.path().join("static");
        config.storage.url_prefix = url_prefix.to_string();
        std::fs::create_dir_all(&config.storage.static_dir).unwrap();

        let sessions = Arc::new(SessionContext::from_config(
            &config,
            Arc::new(MockTranscoder::new()),
        ));
        let router = create_router(Arc::new(AppState::new(config, sessions)));
        Self { router, temp_dir }
    }

    async fn get(&self, path: &str) -> (StatusCode, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }
}

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new("/static");
    let (status, body) = fixture.get("/health").await;
    assert_eq!(status, StatusCode::OK);

    let json = tokio_test::assert_ok!(serde_json::from_slice::<serde_json::Value>(&body));
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_exposition() {
    let fixture = TestFixture::new("/static");
    // Produce at least one labelled HTTP sample.
    fixture.get("/health").await;

    let (status, body) = fixture.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("vidscope_http_requests_total"));
    assert!(text.contains("vidscope_lines_suppressed_total"));
}

#[tokio::test]
async fn test_static_results_are_served_by_name() {
    let fixture = TestFixture::new("/static");
    std::fs::write(fixture.temp_dir.path().join("static/output.mp4"), b"mp4 bytes").unwrap();

    let (status, body) = fixture.get("/static/output.mp4").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"mp4 bytes");

    let (status, _) = fixture.get("/static/missing.mp4").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_custom_url_prefix() {
    let fixture = TestFixture::new("/results/");
    std::fs::write(fixture.temp_dir.path().join("static/output.mp4"), b"x").unwrap();

    let (status, _) = fixture.get("/results/output.mp4").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_detect_requires_upgrade() {
    let fixture = TestFixture::new("/static");
    let (status, _) = fixture.get("/detect").await;
    assert!(status.is_client_error());
}
