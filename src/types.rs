//! Core types and events

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Longest URL accepted from a caller
pub const MAX_URL_LEN: usize = 2048;

/// Unique identifier for a streaming session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        SessionId(id)
    }
}

/// A validated request to acquire one media item
///
/// Created by a transport from caller input; immutable for the session's lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadRequest {
    url: String,
}

impl DownloadRequest {
    /// Validate caller input and build a request
    ///
    /// Accepts full `http`/`https` URLs as well as bare identifiers the extractor
    /// can resolve on its own (e.g. a video id). Anything starting with `-` is
    /// rejected so it can never reach the extractor's command line as an option.
    pub fn new(url: impl AsRef<str>) -> Result<Self> {
        let url = url.as_ref().trim();

        if url.is_empty() {
            return Err(Error::Validation("video_url is required".to_string()));
        }
        if url.len() > MAX_URL_LEN {
            return Err(Error::Validation(format!(
                "video_url is too long ({} characters, max {MAX_URL_LEN})",
                url.len()
            )));
        }
        if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::Validation(
                "video_url must not contain whitespace or control characters".to_string(),
            ));
        }
        if url.starts_with('-') {
            return Err(Error::Validation(
                "video_url must not start with '-'".to_string(),
            ));
        }
        if url.contains("://") {
            let parsed = url::Url::parse(url)
                .map_err(|e| Error::Validation(format!("invalid video_url: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(Error::Validation(format!(
                    "unsupported URL scheme '{}', expected http or https",
                    parsed.scheme()
                )));
            }
        }

        Ok(Self {
            url: url.to_string(),
        })
    }

    /// The validated URL or identifier
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for DownloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Descriptive information about a media item, fetched without downloading it
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Metadata {
    /// Title ("N/A" when the source has none)
    pub title: String,
    /// Duration in whole seconds (0 when unknown)
    pub duration_seconds: u64,
    /// Thumbnail URL (empty when unknown)
    pub thumbnail_url: String,
    /// Expected size in bytes, when the source reports one
    pub total_bytes: Option<u64>,
}

/// A progress measurement taken from the external operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Progress {
    /// Bytes acquired so far; never decreases within a session
    pub bytes_downloaded: u64,
    /// Total bytes expected, when known
    pub total_bytes: Option<u64>,
}

impl Progress {
    /// Completion percentage rounded to two decimals, when the total is known
    pub fn percentage(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                let pct = self.bytes_downloaded as f64 / total as f64 * 100.0;
                Some((pct * 100.0).round() / 100.0)
            }
            _ => None,
        }
    }
}

/// Event emitted by a worker during one session
///
/// `Progress` and `Data` may repeat; exactly one of `Completion` or `Error`
/// closes the sequence and nothing follows it.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Download progress update
    Progress(Progress),
    /// A chunk of the finished artifact, in file order
    Data(Bytes),
    /// The operation finished successfully
    Completion {
        /// Human-readable success message
        message: String,
    },
    /// The operation failed
    Error {
        /// Human-readable cause
        message: String,
    },
}

impl Event {
    /// Whether this event closes the session's sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Completion { .. } | Event::Error { .. })
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Progress(_) => "progress",
            Event::Data(_) => "data",
            Event::Completion { .. } => "completion",
            Event::Error { .. } => "error",
        }
    }
}

/// What a session delivers besides progress
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Delivery {
    /// Progress only; the artifact is discarded once the operation succeeds
    #[default]
    ProgressOnly,
    /// Progress, then the artifact's bytes as `Data` events
    ProgressAndData,
}
