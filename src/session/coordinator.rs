//! Stream coordinator: drains the event channel into a transport
//!
//! The coordinator forwards worker events as transport-neutral [`Frame`]s
//! until a terminal event, the end marker, a transport disconnect or the
//! event timeout, and reports which of those ended the stream.

use super::channel::{ChannelItem, EventSource};
use crate::error::Error;
use crate::types::{Event, Progress, SessionId};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::sync::mpsc;

/// A transport-neutral item produced for the remote caller
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Download progress
    Progress(Progress),
    /// A chunk of the artifact
    Data(Bytes),
    /// Final status; the last frame of every stream that is not cut short by a disconnect
    Finished(StreamStatus),
}

/// How a stream ended, as told to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    /// The operation succeeded
    Ok {
        /// Success message, absent when the worker ended without a terminal event
        message: Option<String>,
    },
    /// The operation or the pipeline failed
    Failed {
        /// Human-readable cause
        message: String,
    },
}

/// How a session ended, as seen by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The worker reported success
    Completed {
        /// Success message sent to the caller
        message: String,
    },
    /// The worker reported failure
    Failed {
        /// Failure message sent to the caller
        message: String,
    },
    /// The end marker arrived without a terminal event
    CompletedWithoutResult,
    /// The caller disconnected before the stream finished
    Disconnected,
    /// The channel went silent or closed without its end marker
    ProtocolViolation {
        /// What went wrong
        reason: String,
    },
}

/// The transport is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
#[error("transport disconnected")]
pub struct Disconnected;

/// Transport side of a session
///
/// Implemented by whatever carries frames to the remote caller.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Deliver one frame, waiting while the transport applies backpressure
    async fn send(&mut self, frame: Frame) -> Result<(), Disconnected>;

    /// Resolve once the transport is gone
    async fn closed(&self);
}

#[async_trait]
impl FrameSink for mpsc::Sender<Frame> {
    async fn send(&mut self, frame: Frame) -> Result<(), Disconnected> {
        mpsc::Sender::send(self, frame)
            .await
            .map_err(|_| Disconnected)
    }

    async fn closed(&self) {
        mpsc::Sender::closed(self).await
    }
}

/// Forward events from `source` to `sink` until the stream ends
pub async fn drain<S>(
    id: SessionId,
    source: &mut EventSource,
    sink: &mut S,
    event_timeout: Duration,
) -> SessionOutcome
where
    S: FrameSink + ?Sized,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = sink.closed() => {
                tracing::info!(session_id = %id, "caller disconnected");
                return SessionOutcome::Disconnected;
            }
            next = tokio::time::timeout(event_timeout, source.get()) => next,
        };

        let item = match next {
            Ok(Some(item)) => item,
            Ok(None) => {
                return protocol_violation(
                    id,
                    sink,
                    "event channel closed without an end marker".to_string(),
                )
                .await;
            }
            Err(_) => {
                return protocol_violation(
                    id,
                    sink,
                    format!("no event within {}s", event_timeout.as_secs_f64()),
                )
                .await;
            }
        };

        if let ChannelItem::Event(event) = &item {
            tracing::debug!(
                session_id = %id,
                kind = event.kind(),
                terminal = event.is_terminal(),
                "forwarding event"
            );
        }

        let (frame, outcome) = match item {
            ChannelItem::Event(Event::Progress(progress)) => (Frame::Progress(progress), None),
            ChannelItem::Event(Event::Data(bytes)) => (Frame::Data(bytes), None),
            ChannelItem::Event(Event::Completion { message }) => (
                Frame::Finished(StreamStatus::Ok {
                    message: Some(message.clone()),
                }),
                Some(SessionOutcome::Completed { message }),
            ),
            ChannelItem::Event(Event::Error { message }) => (
                Frame::Finished(StreamStatus::Failed {
                    message: message.clone(),
                }),
                Some(SessionOutcome::Failed { message }),
            ),
            ChannelItem::End => {
                tracing::error!(
                    session_id = %id,
                    "end marker arrived without a terminal event; worker broke its contract"
                );
                (
                    Frame::Finished(StreamStatus::Ok { message: None }),
                    Some(SessionOutcome::CompletedWithoutResult),
                )
            }
        };

        if sink.send(frame).await.is_err() {
            tracing::info!(session_id = %id, "caller disconnected");
            return SessionOutcome::Disconnected;
        }
        if let Some(outcome) = outcome {
            return outcome;
        }
    }
}

async fn protocol_violation<S>(id: SessionId, sink: &mut S, reason: String) -> SessionOutcome
where
    S: FrameSink + ?Sized,
{
    let error = Error::ChannelProtocol(reason.clone());
    tracing::error!(session_id = %id, error = %error, "event channel broke its contract");

    let frame = Frame::Finished(StreamStatus::Failed {
        message: error.to_string(),
    });
    if sink.send(frame).await.is_err() {
        return SessionOutcome::Disconnected;
    }
    SessionOutcome::ProtocolViolation { reason }
}
