//! Relay server example
//!
//! Runs media-relay with either transport. Uses yt-dlp when it is on the
//! PATH, otherwise a scripted extractor that fakes a short download.
//!
//! ```text
//! PROTOCOL=http cargo run --example relay_server
//! PROTOCOL=grpc cargo run --example relay_server
//! ```
//!
//! After starting with HTTP, you can:
//! - Stream a download via POST http://localhost:5002/downloads
//! - Fetch metadata via POST http://localhost:5002/metadata
//! - Read the OpenAPI document at http://localhost:5002/openapi.json

use media_relay::extractor::{Extractor, ScriptedExtractor, Step, YtDlpExtractor};
use media_relay::{Config, Protocol, serve};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("media_relay=info")),
        )
        .init();

    let mut config = Config::default();
    if let Ok(protocol) = std::env::var("PROTOCOL") {
        config.server.protocol = protocol.parse::<Protocol>()?;
    }

    let extractor: Arc<dyn Extractor> = match YtDlpExtractor::from_config(&config.extractor) {
        Ok(ytdlp) => {
            println!("Using yt-dlp at {}", ytdlp.binary_path().display());
            Arc::new(ytdlp)
        }
        Err(e) => {
            println!("{e}; falling back to a scripted demo extractor");
            Arc::new(demo_extractor())
        }
    };

    match config.server.protocol {
        Protocol::Http => {
            let address = config.server.http.bind_address;
            println!("Starting media-relay HTTP server on {address}");
            println!();
            println!("Example commands:");
            println!("  curl -N -X POST http://localhost:{}/downloads \\", address.port());
            println!("    -H 'Content-Type: application/json' \\");
            println!("    -d '{{\"video_url\": \"https://www.youtube.com/watch?v=dQw4w9WgXcQ\"}}'");
            println!();
            println!("  curl -X POST http://localhost:{}/metadata \\", address.port());
            println!("    -H 'Content-Type: application/json' \\");
            println!("    -d '{{\"video_url\": \"https://www.youtube.com/watch?v=dQw4w9WgXcQ\"}}'");
        }
        Protocol::Grpc => {
            let address = config.server.rpc.bind_address;
            println!("Starting media-relay gRPC server on {address}");
            println!("Service: download.DownloadService (proto/download.proto)");
        }
    }
    println!();
    println!("Press Ctrl+C to stop");

    serve(config, extractor).await?;
    Ok(())
}

/// Ten progress ticks a quarter second apart, then a small file
fn demo_extractor() -> ScriptedExtractor {
    let total = 1_000_000;
    let mut steps = Vec::new();
    for i in 1..=10 {
        steps.push(Step::Sleep(Duration::from_millis(250)));
        steps.push(Step::Tick {
            downloaded: total / 10 * i,
            total: Some(total),
        });
    }
    steps.push(Step::Produce(b"demo media bytes".to_vec()));
    ScriptedExtractor::new(steps)
}
