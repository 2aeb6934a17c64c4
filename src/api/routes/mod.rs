//! Route handlers for the REST API
//!
//! Handlers are organized by domain:
//! - [`downloads`]: streamed downloads over Server-Sent Events
//! - [`metadata`]: metadata lookups
//! - [`system`]: health and OpenAPI

use crate::error::{Error, Result};
use crate::types::{DownloadRequest, Metadata};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

mod downloads;
mod metadata;
mod system;

pub use downloads::*;
pub use metadata::*;
pub use system::*;

// ============================================================================
// Request/Response Types (shared across handlers)
// ============================================================================

/// Body of `POST /downloads` and `POST /metadata`
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct VideoRequest {
    /// Media URL (or an identifier the extractor understands)
    #[serde(default)]
    pub video_url: Option<String>,
}

/// Response body of `POST /metadata`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct MetadataResponse {
    /// Title ("N/A" when the source has none)
    pub title: String,
    /// Duration in whole seconds
    pub duration: u64,
    /// Thumbnail URL
    pub thumbnail_url: String,
    /// Expected size in bytes, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
}

impl From<Metadata> for MetadataResponse {
    fn from(metadata: Metadata) -> Self {
        Self {
            title: metadata.title,
            duration: metadata.duration_seconds,
            thumbnail_url: metadata.thumbnail_url,
            total_bytes: metadata.total_bytes,
        }
    }
}

/// One `data:` payload of the `POST /downloads` event stream
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadUpdate {
    /// Progress, only sent while the total size is known
    Progress {
        /// Completion percentage rounded to two decimals
        percentage: f64,
    },
    /// The download finished; always the last line
    Success {
        /// Human-readable message
        message: String,
    },
    /// The download failed; always the last line
    Error {
        /// Human-readable cause
        message: String,
    },
}

/// Response body of `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"healthy"`
    pub status: String,
    /// Service name
    pub service: String,
}

/// Turn an extracted JSON body into a validated request
///
/// A missing, unparseable or empty body is reported the same way as a missing
/// `video_url`.
pub(crate) fn parse_video_request(
    payload: std::result::Result<Json<VideoRequest>, JsonRejection>,
) -> Result<DownloadRequest> {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable request body");
            VideoRequest::default()
        }
    };

    let url = body
        .video_url
        .ok_or_else(|| Error::Validation("video_url is required".to_string()))?;
    DownloadRequest::new(url)
}
