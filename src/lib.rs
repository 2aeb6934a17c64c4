//! # media-relay
//!
//! Streams blocking media downloads (yt-dlp) to remote callers over gRPC
//! server streaming or HTTP Server-Sent Events.
//!
//! ## How it works
//!
//! Every request gets its own session:
//! - a **worker** thread runs the blocking extractor and pushes events into a
//!   bounded channel, blocking when the channel is full
//! - a **coordinator** task drains the channel and forwards each event to the
//!   transport as soon as it arrives
//! - exactly one terminal event (success or error) closes the stream, followed
//!   by an end marker; a caller that disconnects cancels its worker
//!
//! Metadata lookups bypass sessions entirely.
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_relay::{Config, Protocol, serve};
//! use media_relay::extractor::YtDlpExtractor;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.server.protocol = Protocol::Grpc;
//!
//!     let extractor = YtDlpExtractor::from_config(&config.extractor)?;
//!
//!     // Serve until SIGTERM/SIGINT
//!     serve(config, Arc::new(extractor)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module (HTTP + Server-Sent Events)
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Media extraction backends
pub mod extractor;
/// Metadata prefetching
pub mod metadata;
/// Session management entry point
pub mod relay;
/// gRPC server module
pub mod rpc;
/// Streaming sessions: worker, channel, coordinator
pub mod session;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{
    Config, ExtractorConfig, HttpConfig, Protocol, RpcConfig, ServerConfig, SessionConfig,
};
pub use error::{ApiError, Error, Result, ToHttpStatus};
pub use extractor::{Extractor, ScriptedExtractor, YtDlpExtractor};
pub use metadata::MetadataPrefetcher;
pub use relay::MediaRelay;
pub use session::{Frame, SessionOutcome, SessionReport, StreamSession, StreamStatus, Teardown};
pub use types::{Delivery, DownloadRequest, Event, Metadata, Progress, SessionId};

use std::future::Future;
use std::sync::Arc;

/// Build a relay from `config` and serve the configured protocol until a
/// termination signal arrives.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn serve(config: Config, extractor: Arc<dyn Extractor>) -> Result<()> {
    let relay = Arc::new(MediaRelay::new(config, extractor)?);
    serve_with_shutdown(relay, wait_for_signal()).await
}

/// Serve the configured protocol until `shutdown` resolves
pub async fn serve_with_shutdown<F>(relay: Arc<MediaRelay>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let protocol = relay.config().server.protocol;
    tracing::info!(?protocol, "serving");

    let result = match protocol {
        Protocol::Http => api::start_api_server(Arc::clone(&relay), shutdown).await,
        Protocol::Grpc => rpc::start_rpc_server(Arc::clone(&relay), shutdown).await,
    };

    let live = relay.live_workers();
    if live > 0 {
        tracing::warn!(live_workers = live, "server stopped with workers still running");
    }
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
