//! Media extraction backends
//!
//! An [`Extractor`] wraps the blocking external media tool. The default
//! implementation drives the `yt-dlp` binary; [`ScriptedExtractor`] replays a
//! fixed script for tests and local demos.

mod parser;
mod scripted;
mod traits;
mod ytdlp;

pub use parser::{
    FILEPATH_TEMPLATE, OutputLine, PROGRESS_TEMPLATE, ProgressStatus, parse_metadata_json,
    parse_output_line,
};
pub use scripted::{ScriptedExtractor, Step};
pub use traits::{Artifact, Extractor, ProgressHook, ProgressTick};
pub use ytdlp::YtDlpExtractor;
