//! gRPC server module
//!
//! Serves `download.DownloadService` (see `proto/download.proto`):
//! - `GetMetadata` (unary): metadata or `NOT_FOUND`
//! - `GetFile` (server streaming): progress chunks, then the file's bytes,
//!   or an `INTERNAL` status when the download fails

use crate::error::Error;
use crate::{MediaRelay, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

pub mod proto;
mod service;

pub use proto::download_service_server::{DownloadService, DownloadServiceServer};
pub use service::{ChunkStream, DownloadRpc, EXTRACTION_TIME_KEY};

/// Start the gRPC server on the configured bind address
///
/// Runs until `shutdown` resolves.
pub async fn start_rpc_server<F>(relay: Arc<MediaRelay>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let bind_address = relay.config().server.rpc.bind_address;

    tracing::info!(address = %bind_address, "Starting gRPC server");

    let listener = TcpListener::bind(bind_address).await.map_err(Error::Io)?;

    serve_rpc(listener, relay, shutdown).await
}

/// Serve gRPC on an already bound listener
pub async fn serve_rpc<F>(listener: TcpListener, relay: Arc<MediaRelay>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(address) = listener.local_addr() {
        tracing::info!(address = %address, "gRPC server listening");
    }

    let service = DownloadServiceServer::new(DownloadRpc::new(relay));

    tonic::transport::Server::builder()
        .add_service(service)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .map_err(|e| Error::RpcServerError(e.to_string()))?;

    tracing::info!("gRPC server stopped");
    Ok(())
}
