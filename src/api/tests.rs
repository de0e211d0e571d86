#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::admission::AllowAll;
use crate::guard::StaticResolver;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn create_test_service() -> (Arc<ZipService>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.jobs.temp_dir = temp_dir.path().to_path_buf();
    // Mock upstreams listen on loopback
    config.guard.exempt_addresses = vec!["127.0.0.1".parse().unwrap()];

    let service = ZipService::with_components(
        config,
        Arc::new(StaticResolver::new()),
        Arc::new(AllowAll),
    )
    .await
    .unwrap();
    (Arc::new(service), temp_dir)
}

fn router_for(service: &Arc<ZipService>) -> Router {
    create_router(service.clone(), service.get_config())
}

async fn json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn submit(url: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::json!({ "url": url }).to_string()))
        .unwrap()
}

async fn submit_ok(app: &Router, url: &str) -> String {
    let response = app.clone().oneshot(submit(url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await["job_id"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn poll_until_terminal(app: &Router, id: &str) -> Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let response = app
            .clone()
            .oneshot(get(&format!("/jobs/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let snapshot = json_body(response).await;
        if matches!(snapshot["status"].as_str(), Some("complete" | "failed")) {
            return snapshot;
        }
        assert!(tokio::time::Instant::now() < deadline, "job never finished");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let (service, _temp_dir) = create_test_service().await;
    let app = router_for(&service);

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["accepting_jobs"], true);
}

#[tokio::test]
async fn submit_poll_and_download() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .mount(&upstream)
        .await;

    let (service, _temp_dir) = create_test_service().await;
    let app = router_for(&service);

    let id = submit_ok(&app, &format!("{}/hello.txt", upstream.uri())).await;
    let snapshot = poll_until_terminal(&app, &id).await;

    assert_eq!(snapshot["status"], "complete");
    assert_eq!(snapshot["progress"], 100);
    assert_eq!(snapshot["content_md5"], "5d41402abc4b2a76b9719d911017c592");
    assert_eq!(snapshot["file_name"], "hello.txt");
    assert!(snapshot.get("archive_path").is_none());

    let response = app
        .clone()
        .oneshot(get(&format!("/jobs/{id}/archive")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/zip"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{id}.zip\"").as_str()
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    assert_eq!(archive.len(), 1);
    assert!(archive.file_names().all(|name| name.ends_with(".zip")));
}

#[tokio::test]
async fn blank_url_is_400() {
    let (service, _temp_dir) = create_test_service().await;
    let app = router_for(&service);

    let response = app.oneshot(submit("  ")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"]["code"], "url_required");
}

#[tokio::test]
async fn unsupported_scheme_is_400() {
    let (service, _temp_dir) = create_test_service().await;
    let app = router_for(&service);

    let response = app.oneshot(submit("file:///etc/passwd")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"]["code"],
        "unsupported_scheme"
    );
    assert!(service.registry().is_empty().await);
}

#[tokio::test]
async fn metadata_endpoint_is_422() {
    let (service, _temp_dir) = create_test_service().await;
    let app = router_for(&service);

    let response = app
        .oneshot(submit("http://169.254.169.254/latest/meta-data/"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        json_body(response).await["error"]["code"],
        "blocked_destination"
    );
}

#[tokio::test]
async fn unknown_and_malformed_ids_are_404() {
    let (service, _temp_dir) = create_test_service().await;
    let app = router_for(&service);

    for uri in [
        format!("/jobs/{}", crate::types::JobId::new()),
        "/jobs/not-a-job".to_string(),
        format!("/jobs/{}/archive", crate::types::JobId::new()),
        "/jobs/not-a-job/archive".to_string(),
    ] {
        let response = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(json_body(response).await["error"]["code"], "job_not_found");
    }
}

#[tokio::test]
async fn archive_of_running_job_is_409() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"slow".to_vec())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&upstream)
        .await;

    let (service, _temp_dir) = create_test_service().await;
    let app = router_for(&service);

    let id = submit_ok(&app, &format!("{}/slow.bin", upstream.uri())).await;
    let response = app
        .oneshot(get(&format!("/jobs/{id}/archive")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"]["code"], "job_not_ready");
}

#[tokio::test]
async fn shutting_down_is_503() {
    let (service, _temp_dir) = create_test_service().await;
    let app = router_for(&service);
    service.shutdown().await.unwrap();

    let response = app
        .oneshot(submit("http://example.com/file"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (service, _temp_dir) = create_test_service().await;
    let app = router_for(&service);

    let response = app.oneshot(get("/openapi.json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await;
    assert_eq!(doc["info"]["title"], "zipjit REST API");
    assert!(doc["paths"]["/jobs"].is_object());
}

#[tokio::test]
async fn events_endpoint_streams_sse() {
    let (service, _temp_dir) = create_test_service().await;
    let app = router_for(&service);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/events")
                .header("Accept", "text/event-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    assert!(content_type.contains("text/event-stream"), "{content_type}");
}

#[tokio::test]
async fn cors_headers_when_enabled() {
    let (service, _temp_dir) = create_test_service().await;
    let mut config = (*service.get_config()).clone();
    config.server.api.cors_enabled = true;
    config.server.api.cors_origins = vec!["*".to_string()];
    let app = create_router(service.clone(), Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
    );
}

#[tokio::test]
async fn no_cors_headers_when_disabled() {
    let (service, _temp_dir) = create_test_service().await;
    let app = router_for(&service);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
    );
}

#[test]
fn cors_layer_accepts_specific_origins() {
    // Builds without panicking for both shapes
    let _ = build_cors_layer(&["https://app.example".to_string()]);
    let _ = build_cors_layer(&[]);
}

#[tokio::test]
async fn api_server_stops_on_shutdown() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.jobs.temp_dir = temp_dir.path().to_path_buf();
    // Port 0 = OS assigns a free port
    config.server.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let service = Arc::new(
        ZipService::with_components(config, Arc::new(StaticResolver::new()), Arc::new(AllowAll))
            .await
            .unwrap(),
    );

    let handle = service.spawn_api_server();
    tokio::time::sleep(Duration::from_millis(100)).await;

    service.shutdown().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn stalled_request_body_gets_408() {
    let (service, _temp_dir) = create_test_service().await;
    let mut config = (*service.get_config()).clone();
    config.server.api.request_timeout = Duration::from_millis(100);
    let app = create_router(service.clone(), Arc::new(config));

    let body = Body::from_stream(futures::stream::pending::<
        std::result::Result<axum::body::Bytes, std::io::Error>,
    >());
    let request = Request::builder()
        .method("POST")
        .uri("/jobs")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, "64")
        .body(body)
        .unwrap();

    let response = tokio::time::timeout(Duration::from_secs(5), app.oneshot(request))
        .await
        .expect("request was never cut off")
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert!(service.registry().is_empty().await);
}

#[tokio::test]
async fn unfinished_request_head_is_disconnected() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.jobs.temp_dir = temp_dir.path().to_path_buf();
    config.server.api.bind_address = SocketAddr::from(([127, 0, 0, 1], port));
    config.server.api.header_read_timeout = Duration::from_millis(300);
    let service = Arc::new(
        ZipService::with_components(config, Arc::new(StaticResolver::new()), Arc::new(AllowAll))
            .await
            .unwrap(),
    );
    let server = service.spawn_api_server();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let mut stream = loop {
        match tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => break stream,
            Err(_) => {
                assert!(tokio::time::Instant::now() < deadline, "server never came up");
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    };

    // Headers are never terminated
    stream
        .write_all(b"POST /jobs HTTP/1.1\r\nHost: x\r\n")
        .await
        .unwrap();

    let mut received = Vec::new();
    let closed =
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received)).await;
    assert!(closed.is_ok(), "connection still open after header timeout");

    service.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
