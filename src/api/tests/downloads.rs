use super::*;
use futures::StreamExt;

const URL: &str = "https://example.com/watch?v=abc123";

#[tokio::test]
async fn test_download_streams_progress_then_success() {
    let (relay, temp_dir) = test_relay(vec![
        Step::Tick {
            downloaded: 10,
            total: Some(100),
        },
        Step::Tick {
            downloaded: 55,
            total: Some(100),
        },
    ]);
    let app = create_router(relay.clone());

    let response = app
        .oneshot(post_json("/downloads", serde_json::json!({ "video_url": URL })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert!(
        content_type.contains("text/event-stream"),
        "Content-Type should be text/event-stream, got: {content_type}"
    );

    let updates = parse_sse(&body_bytes(response).await);
    assert_eq!(
        updates,
        vec![
            DownloadUpdate::Progress { percentage: 10.0 },
            DownloadUpdate::Progress { percentage: 55.0 },
            DownloadUpdate::Success {
                message: format!("Download of '{URL}' completed successfully."),
            },
        ]
    );

    assert!(wait_for_idle(&relay).await);
    // The per-session work directory is gone once the worker exits
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_download_failure_ends_with_single_error_line() {
    let (relay, _temp_dir) = test_relay(vec![
        Step::Tick {
            downloaded: 1,
            total: Some(4),
        },
        Step::Fail("ERROR: [generic] Unsupported URL".into()),
    ]);
    let app = create_router(relay);

    let response = app
        .oneshot(post_json("/downloads", serde_json::json!({ "video_url": URL })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let updates = parse_sse(&body_bytes(response).await);
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0], DownloadUpdate::Progress { percentage: 25.0 });
    assert_eq!(
        updates[1],
        DownloadUpdate::Error {
            message: format!("Failed to download '{URL}': ERROR: [generic] Unsupported URL"),
        }
    );
}

#[tokio::test]
async fn test_download_without_total_sends_no_percentages() {
    let (relay, _temp_dir) = test_relay(vec![
        Step::Tick {
            downloaded: 10,
            total: None,
        },
        Step::Tick {
            downloaded: 20,
            total: None,
        },
    ]);
    let app = create_router(relay);

    let response = app
        .oneshot(post_json("/downloads", serde_json::json!({ "video_url": URL })))
        .await
        .unwrap();

    let updates = parse_sse(&body_bytes(response).await);
    assert_eq!(updates.len(), 1);
    assert!(matches!(updates[0], DownloadUpdate::Success { .. }));
}

#[tokio::test]
async fn test_download_requires_video_url() {
    let extractor = Arc::new(ScriptedExtractor::new(vec![]));
    let (relay, _temp_dir) = test_relay_with(extractor.clone(), |_| {});
    let app = create_router(relay);

    for body in [
        serde_json::json!({}),
        serde_json::json!({ "video_url": "" }),
        serde_json::json!({ "video_url": null }),
    ] {
        let response = app
            .clone()
            .oneshot(post_json("/downloads", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "error": "video_url is required" })
        );
    }

    // No worker is ever started for a rejected request
    assert_eq!(extractor.downloads_started(), 0);
}

#[tokio::test]
async fn test_download_rejects_missing_or_malformed_body() {
    let (relay, _temp_dir) = test_relay(vec![]);
    let app = create_router(relay);

    let no_body = Request::builder()
        .method("POST")
        .uri("/downloads")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(no_body).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let malformed = Request::builder()
        .method("POST")
        .uri("/downloads")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(malformed).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "error": "video_url is required" })
    );
}

#[tokio::test]
async fn test_download_rejects_invalid_url() {
    let (relay, _temp_dir) = test_relay(vec![]);
    let app = create_router(relay);

    let response = app
        .oneshot(post_json(
            "/downloads",
            serde_json::json!({ "video_url": "ftp://example.com/file" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_client_disconnect_cancels_worker() {
    let (relay, _temp_dir) = test_relay(vec![
        Step::Tick {
            downloaded: 1,
            total: Some(100),
        },
        Step::WaitForCancel,
    ]);
    let app = create_router(relay.clone());

    let response = app
        .oneshot(post_json("/downloads", serde_json::json!({ "video_url": URL })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(std::str::from_utf8(&first).unwrap().contains("progress"));
    assert_eq!(relay.live_workers(), 1);

    drop(body);

    assert!(
        wait_for_idle(&relay).await,
        "worker should stop after the client disconnects"
    );
}

#[tokio::test]
async fn test_download_busy_when_session_limit_reached() {
    let (relay, _temp_dir) = test_relay_with(
        Arc::new(ScriptedExtractor::new(vec![Step::WaitForCancel])),
        |config| config.session.max_sessions = Some(1),
    );
    let app = create_router(relay.clone());

    let first = app
        .clone()
        .oneshot(post_json("/downloads", serde_json::json!({ "video_url": URL })))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app
        .oneshot(post_json("/downloads", serde_json::json!({ "video_url": URL })))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);

    drop(first);
    assert!(wait_for_idle(&relay).await);
}
