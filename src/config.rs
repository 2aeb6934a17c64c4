//! Configuration types for media-relay

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

/// External media operation settings (yt-dlp binary, output format, work directory)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Path to the yt-dlp executable (auto-detected from PATH if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Directory where per-session artifacts are written (default: "./downloads")
    ///
    /// Every session gets its own subdirectory which is removed when the
    /// session's worker finishes.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// yt-dlp format selector
    #[serde(default = "default_format")]
    pub format: String,

    /// Container used when yt-dlp merges separate video and audio streams (default: "mp4")
    #[serde(default = "default_merge_output_format")]
    pub merge_output_format: String,

    /// Upper bound for a single metadata extraction (default: 60 seconds)
    #[serde(default = "default_metadata_timeout", with = "duration_serde")]
    pub metadata_timeout: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            work_dir: default_work_dir(),
            format: default_format(),
            merge_output_format: default_merge_output_format(),
            metadata_timeout: default_metadata_timeout(),
        }
    }
}

/// Streaming session settings
///
/// `channel_capacity` is the single knob trading worker latency against memory:
/// progress ticks arrive in bursts, so a very small channel stalls the worker,
/// while a large one lets a slow client pin up to `channel_capacity * chunk_size`
/// bytes of file data per session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bounded event channel capacity per session (default: 32)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Longest the coordinator waits for the next event before declaring the
    /// producer broken (default: 900 seconds)
    #[serde(default = "default_event_timeout", with = "duration_serde")]
    pub event_timeout: Duration,

    /// Grace period for the worker to wind down after cancellation or after the
    /// terminal event (default: 5 seconds)
    #[serde(default = "default_cancel_grace", with = "duration_serde")]
    pub cancel_grace: Duration,

    /// Size of each `Data` event when file bytes are streamed (default: 1 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum concurrent download sessions (default: 10, None = unlimited)
    #[serde(default = "default_max_sessions")]
    pub max_sessions: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            event_timeout: default_event_timeout(),
            cancel_grace: default_cancel_grace(),
            chunk_size: default_chunk_size(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Transport selected at startup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP with Server-Sent Events
    #[default]
    Http,
    /// gRPC server streaming
    Grpc,
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "rest" | "sse" => Ok(Protocol::Http),
            "grpc" => Ok(Protocol::Grpc),
            other => Err(Error::Config {
                message: format!("unknown protocol '{other}', expected 'http' or 'grpc'"),
                key: Some("protocol".to_string()),
            }),
        }
    }
}

/// HTTP/SSE transport configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Address to bind to (default: 0.0.0.0:5002)
    #[serde(default = "default_http_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Interval for SSE keep-alive comments (None = disabled, default: 15 seconds)
    #[serde(default = "default_sse_keep_alive", with = "optional_duration_serde")]
    pub sse_keep_alive: Option<Duration>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_http_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            sse_keep_alive: default_sse_keep_alive(),
        }
    }
}

/// gRPC transport configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Address to bind to (default: 0.0.0.0:50052)
    #[serde(default = "default_rpc_bind_address")]
    pub bind_address: SocketAddr,

    /// Stream the finished file as `data` chunks after progress (default: true)
    ///
    /// When false, `GetFile` only reports progress and the artifact is discarded.
    #[serde(default = "default_true")]
    pub stream_file_bytes: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            bind_address: default_rpc_bind_address(),
            stream_file_bytes: true,
        }
    }
}

/// Transport settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Which transport `serve` starts (default: http)
    #[serde(default)]
    pub protocol: Protocol,

    /// HTTP/SSE transport
    #[serde(default)]
    pub http: HttpConfig,

    /// gRPC transport
    #[serde(default)]
    pub rpc: RpcConfig,
}

/// Main configuration for MediaRelay
///
/// Every field has a default, so `Config::default()` is a working setup that
/// serves HTTP on port 5002 and looks up `yt-dlp` on the PATH.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// External media operation settings
    #[serde(default)]
    pub extractor: ExtractorConfig,

    /// Streaming session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Transport settings
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.session.channel_capacity == 0 {
            return Err(config_error(
                "channel_capacity",
                "channel capacity must be at least 1",
            ));
        }
        if self.session.chunk_size == 0 {
            return Err(config_error("chunk_size", "chunk size must be at least 1"));
        }
        if self.session.event_timeout.is_zero() {
            return Err(config_error(
                "event_timeout",
                "event timeout must be greater than zero",
            ));
        }
        if self.session.cancel_grace.is_zero() {
            return Err(config_error(
                "cancel_grace",
                "cancellation grace period must be greater than zero",
            ));
        }
        if self.session.max_sessions == Some(0) {
            return Err(config_error(
                "max_sessions",
                "max_sessions must be at least 1 (omit it for no limit)",
            ));
        }
        Ok(())
    }
}

fn config_error(key: &str, message: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

// Default value functions
fn default_work_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_format() -> String {
    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best/bestvideo+bestaudio".to_string()
}

fn default_merge_output_format() -> String {
    "mp4".to_string()
}

fn default_metadata_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_channel_capacity() -> usize {
    32
}

fn default_event_timeout() -> Duration {
    Duration::from_secs(15 * 60) // 15 minutes
}

fn default_cancel_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_chunk_size() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_max_sessions() -> Option<usize> {
    Some(10)
}

fn default_true() -> bool {
    true
}

fn default_http_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5002))
}

fn default_rpc_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 50052))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

fn default_sse_keep_alive() -> Option<Duration> {
    Some(Duration::from_secs(15))
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
