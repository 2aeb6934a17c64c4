//! Streamed download handler: progress over Server-Sent Events.

use super::{DownloadUpdate, VideoRequest, parse_video_request};
use crate::api::AppState;
use crate::session::{Frame, StreamStatus};
use crate::types::Delivery;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::{
        IntoResponse, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use std::convert::Infallible;
use tokio_stream::StreamExt;

/// POST /downloads - Download a media item, streaming progress as SSE
///
/// Each event's `data:` line holds one JSON [`DownloadUpdate`]. The stream ends
/// with exactly one `success` or `error` update, after which the connection
/// closes. Closing the connection early cancels the download.
#[utoipa::path(
    post,
    path = "/downloads",
    tag = "downloads",
    request_body = VideoRequest,
    responses(
        (status = 200, description = "Progress stream (text/event-stream)", content_type = "text/event-stream", body = DownloadUpdate),
        (status = 400, description = "video_url missing or invalid", body = crate::error::ApiError),
        (status = 503, description = "All download sessions are in use", body = crate::error::ApiError)
    )
)]
pub async fn start_download(
    State(state): State<AppState>,
    payload: Result<Json<VideoRequest>, JsonRejection>,
) -> Response {
    let request = match parse_video_request(payload) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    let frames = match state.relay.stream(request, Delivery::ProgressOnly) {
        Ok(frames) => frames,
        Err(e) => return e.into_response(),
    };

    let events = frames.filter_map(|frame| {
        let update = download_update(frame)?;
        match SseEvent::default().json_data(&update) {
            Ok(event) => Some(Ok::<_, Infallible>(event)),
            Err(e) => {
                tracing::warn!("Failed to serialize download update to JSON: {}", e);
                None
            }
        }
    });

    let mut sse = Sse::new(events);
    if let Some(interval) = state.relay.config().server.http.sse_keep_alive {
        sse = sse.keep_alive(KeepAlive::new().interval(interval));
    }

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        sse,
    )
        .into_response()
}

/// Map a session frame to the update sent to the browser
///
/// Progress without a known total and artifact bytes are not sent.
fn download_update(frame: Frame) -> Option<DownloadUpdate> {
    match frame {
        Frame::Progress(progress) => progress
            .percentage()
            .map(|percentage| DownloadUpdate::Progress { percentage }),
        Frame::Data(_) => None,
        Frame::Finished(StreamStatus::Ok { message }) => Some(DownloadUpdate::Success {
            message: message.unwrap_or_else(|| "Download finished.".to_string()),
        }),
        Frame::Finished(StreamStatus::Failed { message }) => {
            Some(DownloadUpdate::Error { message })
        }
    }
}
