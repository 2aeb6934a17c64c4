//! MediaRelay: the entry point shared by both transports
//!
//! Owns the extractor, hands out sessions under a concurrency limit and
//! answers metadata lookups.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extractor::{Extractor, YtDlpExtractor};
use crate::metadata::MetadataPrefetcher;
use crate::session::worker::{WorkerContext, spawn_worker};
use crate::session::{Frame, StreamSession, event_channel};
use crate::types::{Delivery, DownloadRequest, Metadata, SessionId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Semaphore, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Frames buffered between a session and its transport
const OUTBOUND_BUFFER: usize = 1;

/// Streams blocking media downloads to async callers
///
/// # Examples
///
/// ```no_run
/// use media_relay::{Config, Delivery, DownloadRequest, MediaRelay};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let relay = MediaRelay::with_yt_dlp(Config::default())?;
/// let request = DownloadRequest::new("https://www.youtube.com/watch?v=jNQXAC9IVRw")?;
///
/// let mut frames = relay.stream(request, Delivery::ProgressOnly)?;
/// while let Some(frame) = frames.next().await {
///     println!("{frame:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct MediaRelay {
    config: Config,
    extractor: Arc<dyn Extractor>,
    prefetcher: MetadataPrefetcher,
    sessions: Option<Arc<Semaphore>>,
    next_session_id: AtomicU64,
    live_workers: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MediaRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaRelay")
            .field("extractor", &self.extractor.name())
            .field("live_workers", &self.live_workers())
            .finish_non_exhaustive()
    }
}

impl MediaRelay {
    /// Create a relay around `extractor`
    ///
    /// Validates the configuration; fails with [`Error::Config`] on invalid values.
    pub fn new(config: Config, extractor: Arc<dyn Extractor>) -> Result<Self> {
        config.validate()?;

        let prefetcher =
            MetadataPrefetcher::new(Arc::clone(&extractor), config.extractor.metadata_timeout);
        let sessions = config
            .session
            .max_sessions
            .map(|limit| Arc::new(Semaphore::new(limit)));

        tracing::info!(
            extractor = extractor.name(),
            max_sessions = ?config.session.max_sessions,
            channel_capacity = config.session.channel_capacity,
            "media relay ready"
        );

        Ok(Self {
            config,
            extractor,
            prefetcher,
            sessions,
            next_session_id: AtomicU64::new(1),
            live_workers: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Create a relay that drives the `yt-dlp` binary
    pub fn with_yt_dlp(config: Config) -> Result<Self> {
        let extractor = YtDlpExtractor::from_config(&config.extractor)?;
        Self::new(config, Arc::new(extractor))
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Worker threads currently alive, including abandoned ones
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    /// Start a worker for `request` and return the session that will stream it
    ///
    /// Fails with [`Error::Busy`] when every session slot is taken.
    pub fn open_session(&self, request: DownloadRequest, delivery: Delivery) -> Result<StreamSession> {
        let permit = match &self.sessions {
            Some(sessions) => Some(Arc::clone(sessions).try_acquire_owned().map_err(|_| {
                Error::Busy {
                    limit: self.config.session.max_sessions.unwrap_or_default(),
                }
            })?),
            None => None,
        };

        let id = SessionId(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let cancel = CancellationToken::new();
        let (sink, source) = event_channel(self.config.session.channel_capacity);

        let ctx = WorkerContext {
            id,
            request: request.clone(),
            delivery,
            work_dir: self.config.extractor.work_dir.join(id.to_string()),
            chunk_size: self.config.session.chunk_size,
            extractor: Arc::clone(&self.extractor),
            cancel: cancel.clone(),
            live_workers: Arc::clone(&self.live_workers),
            permit,
        };
        let worker = spawn_worker(ctx, sink)?;

        tracing::info!(session_id = %id, url = %request, ?delivery, "session opened");

        Ok(StreamSession::new(
            id,
            request,
            source,
            worker,
            cancel,
            self.config.session.event_timeout,
            self.config.session.cancel_grace,
        ))
    }

    /// Open a session and run it on the runtime, returning its frames as a stream
    ///
    /// Dropping the stream counts as a caller disconnect and cancels the session.
    pub fn stream(&self, request: DownloadRequest, delivery: Delivery) -> Result<ReceiverStream<Frame>> {
        let session = self.open_session(request, delivery)?;
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);

        tokio::spawn(async move {
            let report = session.run(tx).await;
            tracing::debug!(session_id = %report.id, outcome = ?report.outcome, "session task finished");
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Fetch metadata for `request` without downloading it
    pub async fn metadata(&self, request: &DownloadRequest) -> Result<Metadata> {
        self.prefetcher.fetch_async(request).await
    }
}
