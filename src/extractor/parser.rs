//! Parser for yt-dlp command output

use super::traits::ProgressTick;
use crate::types::Metadata;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::str;
use std::sync::LazyLock;

/// `--progress-template` passed to yt-dlp so progress arrives one parseable line at a time
pub const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.downloaded_bytes)s \
     %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.status)s";

/// `--print` template that reports the final path after merging and moving
pub const FILEPATH_TEMPLATE: &str = "after_move:[file] %(filepath)s";

static PROGRESS_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\[progress\]\s+(\S+)\s+(\S+)\s+(\S+)\s+(\S+)\s*$").ok()
});

/// State yt-dlp reports alongside each progress line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    /// Bytes are still arriving
    Downloading,
    /// The current file is complete
    Finished,
    /// Anything else (`error`, `NA`, ...)
    Other,
}

/// One classified line of yt-dlp stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// A progress report
    Progress {
        /// Byte counts for the current file
        tick: ProgressTick,
        /// Reported status
        status: ProgressStatus,
    },
    /// The final output path
    File(PathBuf),
    /// Anything we don't care about
    Other,
}

/// Classify one line of yt-dlp stdout
pub fn parse_output_line(line: &str) -> OutputLine {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(path) = line.strip_prefix("[file] ") {
        let path = path.trim();
        if !path.is_empty() && path != "NA" {
            return OutputLine::File(PathBuf::from(path));
        }
        return OutputLine::Other;
    }

    let Some(regex) = PROGRESS_LINE.as_ref() else {
        return OutputLine::Other;
    };
    let Some(caps) = regex.captures(line) else {
        return OutputLine::Other;
    };

    let Some(downloaded_bytes) = parse_byte_count(&caps[1]) else {
        return OutputLine::Other;
    };
    let status = match &caps[4] {
        "downloading" => ProgressStatus::Downloading,
        "finished" => ProgressStatus::Finished,
        _ => ProgressStatus::Other,
    };

    OutputLine::Progress {
        tick: ProgressTick {
            downloaded_bytes,
            total_bytes: parse_byte_count(&caps[2]),
            total_bytes_estimate: parse_byte_count(&caps[3]),
        },
        status,
    }
}

/// Parse a byte count that yt-dlp may print as an integer, a float or `NA`
fn parse_byte_count(field: &str) -> Option<u64> {
    if let Ok(value) = field.parse::<u64>() {
        return Some(value);
    }
    let value = field.parse::<f64>().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value as u64)
    } else {
        None
    }
}

/// Subset of the `--dump-single-json` document we read
#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

/// Parse yt-dlp `--dump-single-json` output into [`Metadata`]
///
/// Missing fields fall back to `"N/A"` for the title, `0` for the duration and
/// an empty thumbnail URL. The size is the exact file size if present, else
/// the approximate one.
pub fn parse_metadata_json(stdout: &[u8]) -> crate::Result<Metadata> {
    let info: InfoJson = serde_json::from_slice(stdout)?;

    let size = |value: Option<f64>| value.filter(|v| v.is_finite() && *v > 0.0).map(|v| v as u64);

    Ok(Metadata {
        title: info
            .title
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "N/A".to_string()),
        duration_seconds: info
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d as u64)
            .unwrap_or(0),
        thumbnail_url: info.thumbnail.unwrap_or_default(),
        total_bytes: size(info.filesize).or_else(|| size(info.filesize_approx)),
    })
}

/// Pick the most useful error message out of yt-dlp's stderr
///
/// Prefers the last `ERROR:` line, then the last non-empty line, then a
/// generic message naming the exit status.
pub fn parse_error_output(stderr: &[u8], status: ExitStatus) -> String {
    let text = str::from_utf8(stderr).unwrap_or_default();
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    if let Some(line) = lines.clone().filter(|l| l.starts_with("ERROR:")).last() {
        return line.to_string();
    }
    if let Some(line) = lines.next_back() {
        return line.to_string();
    }
    format!("yt-dlp exited with {status}")
}
