//! Traits and types for media extraction

use crate::types::{DownloadRequest, Metadata};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// A raw progress report from the external operation
///
/// Mirrors what yt-dlp reports per downloaded file: a byte count plus an exact
/// or estimated total when the source provides one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressTick {
    /// Bytes of the current file acquired so far
    pub downloaded_bytes: u64,
    /// Exact size of the current file, when known
    pub total_bytes: Option<u64>,
    /// Estimated size of the current file, when no exact size is known
    pub total_bytes_estimate: Option<u64>,
}

impl ProgressTick {
    /// Exact total, falling back to the estimate. Zero counts as unknown.
    pub fn best_total(&self) -> Option<u64> {
        self.total_bytes
            .or(self.total_bytes_estimate)
            .filter(|total| *total > 0)
    }
}

/// Progress callback handed to [`Extractor::download`]
///
/// Returning [`ControlFlow::Break`] asks the extractor to stop as soon as it
/// can and return [`crate::Error::Cancelled`].
pub type ProgressHook<'a> = dyn FnMut(ProgressTick) -> ControlFlow<()> + 'a;

/// What a finished download left on disk
#[must_use]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifact {
    /// Final file path, if the extractor reported one
    pub path: Option<PathBuf>,
}

/// Blocking media extraction backend
///
/// Both operations block the calling thread for their whole duration and must
/// only be called from a dedicated worker thread or `spawn_blocking`.
///
/// # Examples
///
/// ```no_run
/// use media_relay::extractor::{Extractor, YtDlpExtractor};
/// use tokio_util::sync::CancellationToken;
///
/// let extractor = YtDlpExtractor::from_path().expect("yt-dlp not found in PATH");
/// let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
/// let metadata = extractor.metadata(url, &CancellationToken::new())?;
/// println!("{} ({}s)", metadata.title, metadata.duration_seconds);
/// # Ok::<(), media_relay::Error>(())
/// ```
pub trait Extractor: Send + Sync {
    /// Fetch descriptive information without downloading the media
    ///
    /// Once `cancel` fires the lookup should stop any process it started and
    /// return [`crate::Error::Cancelled`].
    fn metadata(&self, url: &str, cancel: &CancellationToken) -> crate::Result<Metadata>;

    /// Download the media into `work_dir`, reporting progress through `on_progress`
    ///
    /// Files written outside `work_dir` are not cleaned up by the caller.
    fn download(
        &self,
        request: &DownloadRequest,
        work_dir: &Path,
        on_progress: &mut ProgressHook<'_>,
    ) -> crate::Result<Artifact>;

    /// Get the name of this implementation
    fn name(&self) -> &'static str;
}
