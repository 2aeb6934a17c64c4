use super::*;
use crate::Config;
use crate::api::routes::DownloadUpdate;
use crate::extractor::{Extractor, ScriptedExtractor, Step};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

mod downloads;

/// Relay backed by `extractor`, with its work directory in a temp dir
fn test_relay_with(
    extractor: Arc<dyn Extractor>,
    configure: impl FnOnce(&mut Config),
) -> (Arc<MediaRelay>, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.extractor.work_dir = temp_dir.path().to_path_buf();
    config.session.cancel_grace = Duration::from_secs(2);
    config.server.http.sse_keep_alive = None;
    configure(&mut config);

    let relay = MediaRelay::new(config, extractor).unwrap();
    (Arc::new(relay), temp_dir)
}

fn test_relay(steps: Vec<Step>) -> (Arc<MediaRelay>, TempDir) {
    test_relay_with(Arc::new(ScriptedExtractor::new(steps)), |_| {})
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Parse every `data:` line of an SSE body
fn parse_sse(body: &[u8]) -> Vec<DownloadUpdate> {
    std::str::from_utf8(body)
        .unwrap()
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim_start()).unwrap())
        .collect()
}

/// Poll until no worker threads are alive
async fn wait_for_idle(relay: &MediaRelay) -> bool {
    for _ in 0..150 {
        if relay.live_workers() == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_cors_enabled() {
    let (relay, _temp_dir) = test_relay(vec![]);
    let app = create_router(relay);

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
            .contains_key("access-control-allow-origin"),
        "CORS header should be present"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let (relay, _temp_dir) = test_relay_with(Arc::new(ScriptedExtractor::new(vec![])), |config| {
        config.server.http.cors_enabled = false;
    });
    let app = create_router(relay);

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let (relay, _temp_dir) = test_relay(vec![]);
    let app = create_router(relay);

    let request = Request::builder()
        .uri("/queue")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_server_starts_and_stops_gracefully() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (relay, _temp_dir) = test_relay(vec![]);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(serve_api(listener, relay, async {
        let _ = stop_rx.await;
    }));

    let mut stream = tokio::net::TcpStream::connect(address).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains("healthy"));

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
