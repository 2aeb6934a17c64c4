//! In-process servers on ephemeral ports, plus minimal clients for both transports

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use media_relay::MediaRelay;
use media_relay::rpc::proto::download_service_client::DownloadServiceClient;
use media_relay::rpc::proto::{DownloadChunk, Metadata, Request as MediaRequest};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::codec::Streaming;
use tonic::transport::Channel;

const READ_TIMEOUT: Duration = Duration::from_secs(15);

/// A server task that stops when [`RunningServer::stop`] is called
pub struct RunningServer {
    pub address: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<media_relay::Result<()>>,
}

impl RunningServer {
    /// Trigger graceful shutdown and wait for the server to return
    pub async fn stop(mut self) -> media_relay::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not shut down")
            .expect("server task panicked")
    }
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    (listener, address)
}

/// Serve the HTTP/SSE API for `relay` on an ephemeral port
pub async fn spawn_http(relay: Arc<MediaRelay>) -> RunningServer {
    let (listener, address) = bind().await;
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(media_relay::api::serve_api(listener, relay, async move {
        let _ = rx.await;
    }));
    RunningServer {
        address,
        shutdown: Some(tx),
        handle,
    }
}

/// Serve gRPC for `relay` on an ephemeral port
pub async fn spawn_grpc(relay: Arc<MediaRelay>) -> RunningServer {
    let (listener, address) = bind().await;
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(media_relay::rpc::serve_rpc(listener, relay, async move {
        let _ = rx.await;
    }));
    RunningServer {
        address,
        shutdown: Some(tx),
        handle,
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// POST `body` as JSON to `path`
pub async fn post_json(
    address: SocketAddr,
    path: &str,
    body: &serde_json::Value,
) -> reqwest::Response {
    let request = reqwest::Client::new()
        .post(format!("http://{address}{path}"))
        .json(body)
        .send();
    tokio::time::timeout(READ_TIMEOUT, request)
        .await
        .expect("no response headers")
        .unwrap()
}

/// Read an event stream to its end and decode every event's `data:` payload
pub async fn read_sse(response: reqwest::Response) -> Vec<serde_json::Value> {
    let body = tokio::time::timeout(READ_TIMEOUT, response.text())
        .await
        .expect("event stream did not end")
        .unwrap();
    parse_sse(&body)
}

/// Split an event-stream body into events and parse each one's data as JSON
///
/// Comment lines (keep-alives) and events without data are skipped.
pub fn parse_sse(body: &str) -> Vec<serde_json::Value> {
    body.split("\n\n")
        .filter_map(|event| {
            let data: Vec<&str> = event
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|data| data.strip_prefix(' ').unwrap_or(data))
                .collect();
            (!data.is_empty()).then(|| serde_json::from_str(&data.join("\n")).unwrap())
        })
        .collect()
}

/// Start a download stream and return it once the first complete event arrived
///
/// Dropping the returned stream closes the connection.
pub async fn open_sse(
    address: SocketAddr,
    path: &str,
    body: &serde_json::Value,
) -> (BoxStream<'static, reqwest::Result<Bytes>>, serde_json::Value) {
    let response = post_json(address, path, body).await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let mut stream = response.bytes_stream().boxed();
    let mut received = String::new();
    loop {
        let complete = received.rfind("\n\n").map_or("", |end| &received[..end]);
        if let Some(first) = parse_sse(complete).into_iter().next() {
            return (stream, first);
        }
        let chunk = tokio::time::timeout(READ_TIMEOUT, stream.next())
            .await
            .expect("no SSE event arrived")
            .expect("stream ended before the first event")
            .unwrap();
        received.push_str(&String::from_utf8_lossy(&chunk));
    }
}

// ---------------------------------------------------------------------------
// gRPC
// ---------------------------------------------------------------------------

/// Connect a `DownloadService` client to `address`
pub async fn grpc_client(address: SocketAddr) -> DownloadServiceClient<Channel> {
    DownloadServiceClient::connect(format!("http://{address}"))
        .await
        .unwrap()
}

/// Call `GetFile`
pub async fn get_file(
    client: &mut DownloadServiceClient<Channel>,
    url: &str,
) -> Result<tonic::Response<Streaming<DownloadChunk>>, tonic::Status> {
    client
        .get_file(MediaRequest {
            url: url.to_string(),
        })
        .await
}

/// Call `GetMetadata`
pub async fn get_metadata(
    client: &mut DownloadServiceClient<Channel>,
    url: &str,
) -> Result<tonic::Response<Metadata>, tonic::Status> {
    client
        .get_metadata(MediaRequest {
            url: url.to_string(),
        })
        .await
}

/// Drain a `GetFile` stream into its chunks and the terminal status (None on success)
pub async fn collect_chunks(
    mut stream: Streaming<DownloadChunk>,
) -> (Vec<DownloadChunk>, Option<tonic::Status>) {
    let mut chunks = Vec::new();
    loop {
        match tokio::time::timeout(READ_TIMEOUT, stream.message())
            .await
            .expect("stream stalled")
        {
            Ok(Some(chunk)) => chunks.push(chunk),
            Ok(None) => return (chunks, None),
            Err(status) => return (chunks, Some(status)),
        }
    }
}
