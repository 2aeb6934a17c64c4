//! Blocking download worker
//!
//! Each session runs its extractor on a dedicated OS thread. The thread owns
//! the [`EventSink`]; it reports progress as [`Event::Progress`], optionally
//! streams the artifact as [`Event::Data`], pushes exactly one terminal event
//! and finally the end marker. The per-session work directory is removed
//! before the end marker goes out, on every path.

use super::channel::{ChannelClosed, EventSink};
use crate::error::{Error, Result};
use crate::extractor::{Extractor, ProgressTick};
use crate::types::{Delivery, DownloadRequest, Event, Progress, SessionId};
use bytes::Bytes;
use std::any::Any;
use std::io::Read;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, oneshot};
use tokio_util::sync::CancellationToken;

/// How a worker was released during teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// The worker finished within the grace period and its thread was joined
    Joined,
    /// The worker was still running after the grace period and was left behind
    Abandoned,
}

/// Everything a worker thread needs, moved into the thread at spawn
pub(crate) struct WorkerContext {
    pub id: SessionId,
    pub request: DownloadRequest,
    pub delivery: Delivery,
    pub work_dir: PathBuf,
    pub chunk_size: usize,
    pub extractor: Arc<dyn Extractor>,
    pub cancel: CancellationToken,
    pub live_workers: Arc<AtomicUsize>,
    pub permit: Option<OwnedSemaphorePermit>,
}

/// Handle to a running worker thread
#[derive(Debug)]
pub struct WorkerHandle {
    id: SessionId,
    thread: Option<JoinHandle<()>>,
    finished: oneshot::Receiver<()>,
}

/// Released when the worker thread exits, however it exits
struct WorkerGuard {
    live_workers: Arc<AtomicUsize>,
    finished: Option<oneshot::Sender<()>>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.live_workers.fetch_sub(1, Ordering::SeqCst);
        if let Some(finished) = self.finished.take() {
            let _ = finished.send(());
        }
    }
}

/// Start a worker thread for one session
pub(crate) fn spawn_worker(mut ctx: WorkerContext, sink: EventSink) -> Result<WorkerHandle> {
    let id = ctx.id;
    let (finished_tx, finished_rx) = oneshot::channel();

    ctx.live_workers.fetch_add(1, Ordering::SeqCst);
    let guard = WorkerGuard {
        live_workers: Arc::clone(&ctx.live_workers),
        finished: Some(finished_tx),
        _permit: ctx.permit.take(),
    };

    let thread = thread::Builder::new()
        .name(format!("media-worker-{id}"))
        .spawn(move || {
            let _guard = guard;
            run_worker(ctx, sink);
        })
        .map_err(|e| Error::Other(format!("failed to spawn worker thread: {e}")))?;

    Ok(WorkerHandle {
        id,
        thread: Some(thread),
        finished: finished_rx,
    })
}

impl WorkerHandle {
    /// Run `body` on a plain thread in place of an extractor-driven worker
    #[cfg(test)]
    pub(crate) fn spawn_with<F>(id: SessionId, body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (finished_tx, finished) = oneshot::channel();
        let thread = thread::spawn(move || {
            body();
            let _ = finished_tx.send(());
        });
        Self {
            id,
            thread: Some(thread),
            finished,
        }
    }

    /// Wait up to `grace` for the worker to exit, then join it
    ///
    /// A worker still running after `grace` is abandoned: its thread is
    /// detached and keeps counting towards the live-worker total until the
    /// external operation returns.
    pub async fn join(mut self, grace: Duration) -> Teardown {
        if tokio::time::timeout(grace, &mut self.finished).await.is_err() {
            tracing::warn!(
                session_id = %self.id,
                grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                "worker did not stop within grace period; abandoning thread"
            );
            return Teardown::Abandoned;
        }

        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    tracing::error!(session_id = %self.id, "worker thread panicked outside the extractor");
                }
                Err(e) => {
                    tracing::error!(session_id = %self.id, error = %e, "failed to join worker thread");
                }
            }
        }

        Teardown::Joined
    }
}

fn run_worker(ctx: WorkerContext, sink: EventSink) {
    let span = tracing::info_span!("worker", session_id = %ctx.id);
    let _enter = span.enter();
    tracing::debug!(url = %ctx.request, extractor = ctx.extractor.name(), "worker started");

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| acquire(&ctx, &sink)));

    let terminal = match outcome {
        Ok(Ok(())) => {
            tracing::info!(url = %ctx.request, "download completed");
            Event::Completion {
                message: format!("Download of '{}' completed successfully.", ctx.request),
            }
        }
        Ok(Err(Error::Cancelled)) => {
            tracing::info!(url = %ctx.request, "download cancelled");
            Event::Error {
                message: format!("Failed to download '{}': {}", ctx.request, Error::Cancelled),
            }
        }
        Ok(Err(e)) => {
            tracing::warn!(url = %ctx.request, error = %e, "download failed");
            Event::Error {
                message: format!("Failed to download '{}': {e}", ctx.request),
            }
        }
        Err(payload) => {
            let cause = panic_message(payload.as_ref());
            tracing::error!(url = %ctx.request, panic = %cause, "extractor panicked");
            Event::Error {
                message: format!(
                    "Failed to download '{}': extractor panicked: {cause}",
                    ctx.request
                ),
            }
        }
    };

    if sink.put(terminal).is_err() {
        tracing::debug!("consumer gone before the terminal event");
    }

    remove_work_dir(&ctx.work_dir);
    sink.finish();
}

/// Run the extractor and, when requested, stream the artifact
fn acquire(ctx: &WorkerContext, sink: &EventSink) -> Result<()> {
    std::fs::create_dir_all(&ctx.work_dir)?;

    let mut tracker = ProgressTracker::default();
    let mut on_progress = |tick: ProgressTick| -> ControlFlow<()> {
        if ctx.cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        match sink.put(Event::Progress(tracker.observe(tick))) {
            Ok(()) => ControlFlow::Continue(()),
            Err(ChannelClosed) => ControlFlow::Break(()),
        }
    };

    let artifact = ctx
        .extractor
        .download(&ctx.request, &ctx.work_dir, &mut on_progress)?;

    if ctx.cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    if ctx.delivery == Delivery::ProgressAndData {
        let path = artifact
            .path
            .ok_or_else(|| Error::Extraction("extractor reported no output file".into()))?;
        stream_file(&path, ctx.chunk_size, sink, &ctx.cancel)?;
    }

    Ok(())
}

/// Push the file's contents as `Data` events of at most `chunk_size` bytes
fn stream_file(
    path: &Path,
    chunk_size: usize,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut sent = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sink.put(Event::Data(Bytes::copy_from_slice(&buf[..n])))
            .map_err(|_| Error::Cancelled)?;
        sent += n as u64;
    }

    tracing::debug!(path = %path.display(), bytes = sent, "artifact streamed");
    Ok(())
}

fn remove_work_dir(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => tracing::debug!(dir = %dir.display(), "work directory removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "failed to remove work directory"),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Folds raw per-file ticks into a session-wide, non-decreasing byte count
///
/// yt-dlp downloads video and audio as separate files and restarts its byte
/// counter for each one. A drop in the counter is taken as the start of a new
/// file; the previous file's size is carried forward.
#[derive(Debug, Default)]
pub(crate) struct ProgressTracker {
    finished_bytes: u64,
    current_bytes: u64,
    current_total: Option<u64>,
    last_emitted: u64,
}

impl ProgressTracker {
    pub(crate) fn observe(&mut self, tick: ProgressTick) -> Progress {
        if tick.downloaded_bytes < self.current_bytes {
            let finished = self
                .current_total
                .unwrap_or(self.current_bytes)
                .max(self.current_bytes);
            self.finished_bytes = self.finished_bytes.saturating_add(finished);
        }
        self.current_bytes = tick.downloaded_bytes;
        self.current_total = tick.best_total();

        let bytes_downloaded = self
            .finished_bytes
            .saturating_add(self.current_bytes)
            .max(self.last_emitted);
        self.last_emitted = bytes_downloaded;

        let total_bytes = self
            .current_total
            .map(|total| self.finished_bytes.saturating_add(total).max(bytes_downloaded));

        Progress {
            bytes_downloaded,
            total_bytes,
        }
    }
}
