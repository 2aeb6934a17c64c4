//! yt-dlp backed extractor using the external `yt-dlp` binary

use super::parser::{
    FILEPATH_TEMPLATE, OutputLine, PROGRESS_TEMPLATE, ProgressStatus, parse_error_output,
    parse_metadata_json, parse_output_line,
};
use super::traits::{Artifact, Extractor, ProgressHook};
use crate::config::ExtractorConfig;
use crate::error::Error;
use crate::types::{DownloadRequest, Metadata};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best/bestvideo+bestaudio";

/// How often a metadata lookup checks for exit or cancellation
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Extractor that shells out to `yt-dlp`
///
/// # Examples
///
/// ```no_run
/// use media_relay::extractor::{Extractor, YtDlpExtractor};
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let extractor = YtDlpExtractor::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or auto-discover from PATH
/// let extractor = YtDlpExtractor::from_path().expect("yt-dlp not found in PATH");
/// assert_eq!(extractor.name(), "yt-dlp");
/// ```
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary_path: PathBuf,
    format: String,
    merge_output_format: String,
}

impl YtDlpExtractor {
    /// Create an extractor with an explicit binary path and default format selection
    pub fn new(binary_path: PathBuf) -> Self {
        Self {
            binary_path,
            format: DEFAULT_FORMAT.to_string(),
            merge_output_format: "mp4".to_string(),
        }
    }

    /// Attempt to find yt-dlp in PATH
    ///
    /// Returns `None` if no `yt-dlp` binary is found.
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    /// Build from configuration, discovering the binary when no path is set
    pub fn from_config(config: &ExtractorConfig) -> crate::Result<Self> {
        let binary_path = match &config.binary_path {
            Some(path) => path.clone(),
            None => which::which("yt-dlp").map_err(|e| {
                Error::ExternalTool(format!("yt-dlp not found in PATH: {e}"))
            })?,
        };

        Ok(Self {
            binary_path,
            format: config.format.clone(),
            merge_output_format: config.merge_output_format.clone(),
        })
    }

    /// Path of the binary this extractor runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary_path);
        command
            .args(["--quiet", "--no-warnings", "--no-playlist"])
            .stdin(Stdio::null());
        command
    }
}

/// Kills and reaps the child unless it has already been waited on
struct ChildGuard(Option<Child>);

impl ChildGuard {
    fn wait(&mut self) -> std::io::Result<ExitStatus> {
        match self.0.take() {
            Some(mut child) => child.wait(),
            None => Err(std::io::Error::other("child already reaped")),
        }
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        let Some(child) = self.0.as_mut() else {
            return Err(std::io::Error::other("child already reaped"));
        };
        let status = child.try_wait()?;
        if status.is_some() {
            self.0 = None;
        }
        Ok(status)
    }
}

/// Read a pipe to the end on its own thread so the child never stalls on a full pipe
fn drain_pipe<R>(name: &str, mut pipe: R) -> std::io::Result<thread::JoinHandle<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new().name(name.into()).spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.0.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Extractor for YtDlpExtractor {
    fn metadata(&self, url: &str, cancel: &CancellationToken) -> crate::Result<Metadata> {
        let mut child = self
            .command()
            .args(["--dump-single-json", "--skip-download", "--"])
            .arg(url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut child = ChildGuard(Some(child));

        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            return Err(Error::ExternalTool("yt-dlp output pipes unavailable".into()));
        };
        let stdout_reader = drain_pipe("yt-dlp-stdout", stdout)?;
        let stderr_reader = drain_pipe("yt-dlp-stderr", stderr)?;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if cancel.is_cancelled() {
                // Dropping the guard kills and reaps the child
                tracing::debug!(url, "metadata lookup cancelled, stopping yt-dlp");
                return Err(Error::Cancelled);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(Error::Extraction(parse_error_output(&stderr, status)));
        }

        parse_metadata_json(&stdout)
    }

    fn download(
        &self,
        request: &DownloadRequest,
        work_dir: &Path,
        on_progress: &mut ProgressHook<'_>,
    ) -> crate::Result<Artifact> {
        let mut child = self
            .command()
            .args([
                "--newline",
                "--progress",
                "--progress-template",
                PROGRESS_TEMPLATE,
                "--no-simulate",
                "--print",
                FILEPATH_TEMPLATE,
                "-f",
                self.format.as_str(),
                "--merge-output-format",
                self.merge_output_format.as_str(),
                "-o",
            ])
            .arg(work_dir.join("%(id)s.%(ext)s"))
            .arg("--")
            .arg(request.url())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {e}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut child = ChildGuard(Some(child));

        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            return Err(Error::ExternalTool("yt-dlp output pipes unavailable".into()));
        };
        let stderr_reader = drain_pipe("yt-dlp-stderr", stderr)?;

        let mut artifact = Artifact::default();
        for line in BufReader::new(stdout).lines() {
            let line = line?;
            match parse_output_line(&line) {
                OutputLine::Progress {
                    tick,
                    status: ProgressStatus::Downloading,
                } => {
                    if on_progress(tick).is_break() {
                        tracing::debug!(url = %request, "progress hook asked yt-dlp to stop");
                        return Err(Error::Cancelled);
                    }
                }
                OutputLine::File(path) => artifact.path = Some(path),
                _ => {}
            }
        }

        let status = child.wait()?;
        let stderr = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(Error::Extraction(parse_error_output(&stderr, status)));
        }

        Ok(artifact)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
