//! Metadata handler.

use super::{MetadataResponse, VideoRequest, parse_video_request};
use crate::api::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// POST /metadata - Describe a media item without downloading it
#[utoipa::path(
    post,
    path = "/metadata",
    tag = "metadata",
    request_body = VideoRequest,
    responses(
        (status = 200, description = "Metadata extracted", body = MetadataResponse),
        (status = 400, description = "video_url missing or invalid", body = crate::error::ApiError),
        (status = 404, description = "Nothing could be extracted from the URL", body = crate::error::ApiError)
    )
)]
pub async fn get_metadata(
    State(state): State<AppState>,
    payload: Result<Json<VideoRequest>, JsonRejection>,
) -> Response {
    let request = match parse_video_request(payload) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    match state.relay.metadata(&request).await {
        Ok(metadata) => (StatusCode::OK, Json(MetadataResponse::from(metadata))).into_response(),
        Err(e) => e.into_response(),
    }
}
