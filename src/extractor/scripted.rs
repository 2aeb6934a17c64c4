//! Scripted extractor that replays a fixed sequence of steps
//!
//! Used by tests and the demo server to exercise the streaming pipeline
//! without yt-dlp or network access.

use super::traits::{Artifact, Extractor, ProgressHook, ProgressTick};
use crate::error::Error;
use crate::types::{DownloadRequest, Metadata};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Interval between heartbeat ticks while waiting to be cancelled
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(20);

/// One step of a scripted download
#[derive(Debug, Clone)]
pub enum Step {
    /// Report progress through the hook
    Tick {
        /// Bytes downloaded so far
        downloaded: u64,
        /// Total bytes, when known
        total: Option<u64>,
    },
    /// Sleep without checking for cancellation
    Sleep(Duration),
    /// Fail with an extraction error
    Fail(String),
    /// Panic with the given message
    Panic(String),
    /// Write the artifact file (`<work_dir>/scripted.bin`) with these contents
    Produce(Vec<u8>),
    /// Repeat the last tick until the hook asks to stop
    WaitForCancel,
}

/// Extractor that replays a scripted sequence of [`Step`]s
///
/// # Examples
///
/// ```
/// use media_relay::extractor::{Extractor, ScriptedExtractor, Step};
///
/// let extractor = ScriptedExtractor::new(vec![
///     Step::Tick { downloaded: 10, total: Some(100) },
///     Step::Tick { downloaded: 100, total: Some(100) },
/// ]);
/// assert_eq!(extractor.name(), "scripted");
/// ```
#[derive(Debug)]
pub struct ScriptedExtractor {
    steps: Vec<Step>,
    metadata: Result<Metadata, String>,
    downloads: AtomicUsize,
}

impl ScriptedExtractor {
    /// Create an extractor that runs `steps` for every download
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            metadata: Ok(Metadata {
                title: "Scripted media".to_string(),
                duration_seconds: 60,
                thumbnail_url: String::new(),
                total_bytes: None,
            }),
            downloads: AtomicUsize::new(0),
        }
    }

    /// Answer metadata lookups with `metadata`
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Ok(metadata);
        self
    }

    /// Fail metadata lookups with `message`
    pub fn with_metadata_error(mut self, message: impl Into<String>) -> Self {
        self.metadata = Err(message.into());
        self
    }

    /// Number of downloads started so far
    pub fn downloads_started(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

impl Extractor for ScriptedExtractor {
    fn metadata(&self, _url: &str, _cancel: &CancellationToken) -> crate::Result<Metadata> {
        self.metadata.clone().map_err(Error::Extraction)
    }

    fn download(
        &self,
        request: &DownloadRequest,
        work_dir: &Path,
        on_progress: &mut ProgressHook<'_>,
    ) -> crate::Result<Artifact> {
        self.downloads.fetch_add(1, Ordering::SeqCst);

        let mut artifact = Artifact::default();
        let mut last_tick = ProgressTick::default();

        for step in &self.steps {
            match step {
                Step::Tick { downloaded, total } => {
                    last_tick = ProgressTick {
                        downloaded_bytes: *downloaded,
                        total_bytes: *total,
                        total_bytes_estimate: None,
                    };
                    if on_progress(last_tick).is_break() {
                        return Err(Error::Cancelled);
                    }
                }
                Step::Sleep(duration) => thread::sleep(*duration),
                Step::Fail(message) => return Err(Error::Extraction(message.clone())),
                Step::Panic(message) => panic!("{message}"),
                Step::Produce(contents) => {
                    let path = work_dir.join("scripted.bin");
                    std::fs::write(&path, contents)?;
                    artifact.path = Some(path);
                }
                Step::WaitForCancel => loop {
                    if on_progress(last_tick).is_break() {
                        tracing::debug!(url = %request, "scripted download cancelled");
                        return Err(Error::Cancelled);
                    }
                    thread::sleep(HEARTBEAT_INTERVAL);
                },
            }
        }

        Ok(artifact)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
