//! Error types for media-relay
//!
//! This module provides the error taxonomy shared by the streaming core and
//! both transports:
//! - Validation errors are raised before any session or worker exists
//! - Extraction errors come from the external media operation
//! - Channel protocol errors flag a broken producer/consumer contract
//! - HTTP status and machine-readable code mapping for the REST surface
//!
//! gRPC status mapping lives next to the RPC service in [`crate::rpc`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for media-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-relay
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed request URL, rejected before a session is created
    #[error("{0}")]
    Validation(String),

    /// The external media operation failed (bad URL, network, unsupported source)
    #[error("{0}")]
    Extraction(String),

    /// The event channel broke its contract (terminal marker never arrived)
    #[error("channel protocol violation: {0}")]
    ChannelProtocol(String),

    /// The session was abandoned because the caller went away
    #[error("operation cancelled")]
    Cancelled,

    /// Every session slot is taken
    #[error("server busy: all {limit} download sessions are in use")]
    Busy {
        /// The configured session limit
        limit: usize,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "channel_capacity")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool execution failed (yt-dlp missing, could not be spawned)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// HTTP API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// gRPC server error
    #[error("RPC server error: {0}")]
    RpcServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// API error response body
///
/// Every failing HTTP endpoint answers with this shape:
///
/// ```json
/// { "error": "video_url is required" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Human-readable error message
    pub error: String,
}

impl ApiError {
    /// Create a new API error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Validation(_) => 400,
            Error::Config { .. } => 400,

            // 404 Not Found - nothing could be extracted from the URL
            Error::Extraction(_) => 404,

            // 499-style cancellations are reported as 500 on the rare path where
            // a response is still being written
            Error::Cancelled => 500,

            // 500 Internal Server Error - Server-side issues
            Error::ChannelProtocol(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::RpcServerError(_) => 500,
            Error::Other(_) => 500,

            // 503 Service Unavailable
            Error::Busy { .. } => 503,
            Error::ExternalTool(_) => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::Extraction(_) => "extraction_error",
            Error::ChannelProtocol(_) => "channel_protocol_error",
            Error::Cancelled => "cancelled",
            Error::Busy { .. } => "busy",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ExternalTool(_) => "external_tool_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::RpcServerError(_) => "rpc_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError::new(error.to_string())
    }
}
