//! Streaming sessions
//!
//! A session pairs one blocking worker with one transport stream:
//!
//! ```text
//! worker thread --put--> [bounded channel, capacity C] --get--> coordinator --> FrameSink
//! ```
//!
//! The worker blocks when the channel is full, so a slow caller slows the
//! download instead of growing memory. Sessions share nothing; a failure in one
//! never reaches another.

pub mod channel;
pub mod coordinator;
pub mod worker;

pub use channel::{ChannelClosed, ChannelItem, Discarded, EventSink, EventSource, event_channel};
pub use coordinator::{Disconnected, Frame, FrameSink, SessionOutcome, StreamStatus, drain};
pub use worker::{Teardown, WorkerHandle};

use crate::types::{DownloadRequest, SessionId};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Summary of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Session identifier
    pub id: SessionId,
    /// How the stream ended
    pub outcome: SessionOutcome,
    /// How the worker was released
    pub teardown: Teardown,
    /// Wall-clock time from start of streaming to teardown
    pub elapsed: Duration,
    /// Events left in the channel at teardown, dropped without being sent
    pub discarded_events: usize,
}

/// One in-flight request: a running worker plus the consumer half of its channel
///
/// Created by [`crate::MediaRelay::open_session`]; consumed by [`StreamSession::run`].
#[derive(Debug)]
pub struct StreamSession {
    id: SessionId,
    request: DownloadRequest,
    source: EventSource,
    worker: WorkerHandle,
    cancel: CancellationToken,
    event_timeout: Duration,
    cancel_grace: Duration,
}

impl StreamSession {
    pub(crate) fn new(
        id: SessionId,
        request: DownloadRequest,
        source: EventSource,
        worker: WorkerHandle,
        cancel: CancellationToken,
        event_timeout: Duration,
        cancel_grace: Duration,
    ) -> Self {
        Self {
            id,
            request,
            source,
            worker,
            cancel,
            event_timeout,
            cancel_grace,
        }
    }

    /// Session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Stream frames into `sink` until the session ends, then tear it down
    ///
    /// `sink` is dropped as soon as the last frame is sent, so the transport
    /// closes without waiting for the worker to be joined.
    pub async fn run<S>(mut self, mut sink: S) -> SessionReport
    where
        S: FrameSink,
    {
        let id = self.id;
        let url = self.request.to_string();
        let started = Instant::now();
        let outcome = drain(id, &mut self.source, &mut sink, self.event_timeout).await;
        drop(sink);

        let (teardown, discarded) = self.teardown(&outcome).await;
        let elapsed = started.elapsed();

        match &outcome {
            SessionOutcome::Completed { .. } => {
                tracing::info!(
                    session_id = %id,
                    url = %url,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "session completed"
                );
            }
            SessionOutcome::Failed { message } => {
                tracing::info!(session_id = %id, url = %url, error = %message, "session failed");
            }
            SessionOutcome::CompletedWithoutResult => {
                tracing::warn!(session_id = %id, "session ended without a terminal event");
            }
            SessionOutcome::Disconnected => {
                tracing::info!(session_id = %id, ?teardown, "session cancelled by caller");
            }
            SessionOutcome::ProtocolViolation { reason } => {
                tracing::error!(session_id = %id, reason = %reason, ?teardown, "session aborted");
            }
        }

        SessionReport {
            id,
            outcome,
            teardown,
            elapsed,
            discarded_events: discarded.events,
        }
    }

    async fn teardown(mut self, outcome: &SessionOutcome) -> (Teardown, Discarded) {
        // no-op once the worker has finished
        self.cancel.cancel();

        let discarded = match outcome {
            SessionOutcome::Completed { .. }
            | SessionOutcome::Failed { .. }
            | SessionOutcome::CompletedWithoutResult => {
                let discarded = self.source.discard_until_end(self.cancel_grace).await;
                if discarded.events > 0 {
                    tracing::error!(
                        session_id = %self.id,
                        events = discarded.events,
                        "worker produced events after its terminal event"
                    );
                }
                discarded
            }
            SessionOutcome::Disconnected | SessionOutcome::ProtocolViolation { .. } => {
                self.source.close();
                self.source.discard_buffered()
            }
        };
        tracing::debug!(
            session_id = %self.id,
            discarded = discarded.events,
            saw_end = discarded.saw_end,
            "event channel drained"
        );

        (self.worker.join(self.cancel_grace).await, discarded)
    }
}
