//! gRPC handlers for `download.DownloadService`

use super::proto::download_service_server::DownloadService;
use super::proto::{DownloadChunk, Metadata, Request as MediaRequest};
use crate::error::Error;
use crate::session::{Frame, StreamStatus};
use crate::types::{Delivery, DownloadRequest};
use crate::MediaRelay;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::StreamExt;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::{Request, Response, Status};

/// Metadata key carrying the extraction time of `GetMetadata`, in seconds
pub const EXTRACTION_TIME_KEY: &str = "extraction-time-seconds";

/// Response stream of `GetFile`
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<DownloadChunk, Status>> + Send>>;

impl From<Error> for Status {
    fn from(error: Error) -> Self {
        let message = error.to_string();
        match error {
            Error::Validation(_) | Error::Config { .. } => Status::invalid_argument(message),
            Error::Extraction(_) => Status::not_found(message),
            Error::Busy { .. } | Error::ExternalTool(_) => Status::unavailable(message),
            Error::Cancelled => Status::cancelled(message),
            Error::ChannelProtocol(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::ApiServerError(_)
            | Error::RpcServerError(_)
            | Error::Other(_) => Status::internal(message),
        }
    }
}

/// Handlers behind [`super::DownloadServiceServer`]
#[derive(Debug, Clone)]
pub struct DownloadRpc {
    relay: Arc<MediaRelay>,
}

impl DownloadRpc {
    /// Serve requests with `relay`
    pub fn new(relay: Arc<MediaRelay>) -> Self {
        Self { relay }
    }
}

#[tonic::async_trait]
impl DownloadService for DownloadRpc {
    type GetFileStream = ChunkStream;

    /// `GetMetadata`: describe a media item without downloading it
    ///
    /// Fails with `NOT_FOUND` when nothing can be extracted. The elapsed
    /// extraction time is attached as `extraction-time-seconds` metadata.
    async fn get_metadata(
        &self,
        request: Request<MediaRequest>,
    ) -> Result<Response<Metadata>, Status> {
        let request = DownloadRequest::new(&request.into_inner().url)?;
        let started = Instant::now();

        let result = self.relay.metadata(&request).await;
        let elapsed = format!("{:.3}", started.elapsed().as_secs_f64());
        tracing::info!(url = %request, elapsed_secs = %elapsed, "GetMetadata finished");

        let elapsed: Option<MetadataValue<Ascii>> = elapsed.parse().ok();
        match result {
            Ok(metadata) => {
                let mut response = Response::new(Metadata::from(metadata));
                if let Some(value) = elapsed {
                    response.metadata_mut().insert(EXTRACTION_TIME_KEY, value);
                }
                Ok(response)
            }
            Err(e) => {
                let mut status = Status::from(e);
                if let Some(value) = elapsed {
                    status.metadata_mut().insert(EXTRACTION_TIME_KEY, value);
                }
                Err(status)
            }
        }
    }

    /// `GetFile`: stream progress, then the file's bytes
    ///
    /// A failed download ends the stream with an `INTERNAL` status carrying the
    /// worker's message. Dropping the stream cancels the download.
    async fn get_file(
        &self,
        request: Request<MediaRequest>,
    ) -> Result<Response<Self::GetFileStream>, Status> {
        let request = DownloadRequest::new(&request.into_inner().url)?;

        let delivery = if self.relay.config().server.rpc.stream_file_bytes {
            Delivery::ProgressAndData
        } else {
            Delivery::ProgressOnly
        };

        let frames = self.relay.stream(request, delivery)?;
        let chunks = frames.filter_map(download_chunk);

        Ok(Response::new(Box::pin(chunks) as ChunkStream))
    }
}

/// Map a session frame to a stream item; a successful finish just ends the stream
fn download_chunk(frame: Frame) -> Option<Result<DownloadChunk, Status>> {
    match frame {
        Frame::Progress(progress) => Some(Ok(DownloadChunk::progress(progress))),
        Frame::Data(bytes) => Some(Ok(DownloadChunk::data(bytes))),
        Frame::Finished(StreamStatus::Ok { .. }) => None,
        Frame::Finished(StreamStatus::Failed { message }) => Some(Err(Status::internal(message))),
    }
}
