//! Bounded event channel between a blocking worker and an async coordinator
//!
//! The producer half ([`EventSink`]) is used from the worker thread and blocks
//! when the channel is full. The consumer half ([`EventSource`]) is awaited by
//! the coordinator. Every item is wrapped in [`ChannelItem`] so the end of the
//! stream is an explicit, typed [`ChannelItem::End`] marker, pushed exactly
//! once as the producer's last act, including when it unwinds from a panic.

use crate::types::Event;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// One slot in the event channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelItem {
    /// A worker event
    Event(Event),
    /// End-of-stream marker; nothing follows it
    End,
}

/// The consumer stopped accepting events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("event channel closed by the consumer")]
pub struct ChannelClosed;

/// Create a bounded event channel holding at most `capacity` items
///
/// A capacity of zero is treated as one.
pub fn event_channel(capacity: usize) -> (EventSink, EventSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSink { tx: Some(tx) }, EventSource { rx })
}

/// Producer half of the event channel, owned by exactly one worker
///
/// Dropping the sink pushes [`ChannelItem::End`], so the marker is delivered
/// whether the worker returns normally, returns early or panics.
#[derive(Debug)]
pub struct EventSink {
    tx: Option<mpsc::Sender<ChannelItem>>,
}

impl EventSink {
    /// Push an event, blocking the calling thread while the channel is full
    ///
    /// Must not be called from inside an async runtime.
    pub fn put(&self, event: Event) -> Result<(), ChannelClosed> {
        match &self.tx {
            Some(tx) => tx
                .blocking_send(ChannelItem::Event(event))
                .map_err(|_| ChannelClosed),
            None => Err(ChannelClosed),
        }
    }

    /// Whether the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(|tx| tx.is_closed())
    }

    /// Push the end marker and release the producer
    pub fn finish(mut self) {
        self.push_end();
    }

    fn push_end(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };

        match tx.try_send(ChannelItem::End) {
            Ok(()) => {}
            Err(TrySendError::Closed(_)) => {
                tracing::trace!("consumer gone; end marker not delivered");
            }
            Err(TrySendError::Full(_)) => match tokio::runtime::Handle::try_current() {
                // blocking inside a runtime thread would panic, so hand the send to the runtime
                Ok(handle) => {
                    handle.spawn(async move {
                        let _ = tx.send(ChannelItem::End).await;
                    });
                }
                Err(_) => {
                    if tx.blocking_send(ChannelItem::End).is_err() {
                        tracing::trace!("consumer gone; end marker not delivered");
                    }
                }
            },
        }
    }
}

impl Drop for EventSink {
    fn drop(&mut self) {
        self.push_end();
    }
}

/// What [`EventSource::discard_until_end`] threw away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Discarded {
    /// Events dropped without being delivered
    pub events: usize,
    /// Whether the end marker was observed
    pub saw_end: bool,
}

/// Consumer half of the event channel
#[derive(Debug)]
pub struct EventSource {
    rx: mpsc::Receiver<ChannelItem>,
}

impl EventSource {
    /// Wait for the next item
    ///
    /// Returns `None` only if the producer vanished without pushing the end
    /// marker, which is a protocol violation.
    pub async fn get(&mut self) -> Option<ChannelItem> {
        self.rx.recv().await
    }

    /// Stop accepting events; blocked and future `put`s fail with [`ChannelClosed`]
    pub fn close(&mut self) {
        self.rx.close();
    }

    /// Drop everything already buffered without waiting for more
    pub fn discard_buffered(&mut self) -> Discarded {
        let mut discarded = Discarded::default();
        loop {
            match self.rx.try_recv() {
                Ok(ChannelItem::Event(_)) => discarded.events += 1,
                Ok(ChannelItem::End) => {
                    discarded.saw_end = true;
                    return discarded;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return discarded,
            }
        }
    }

    /// Drain until the end marker arrives, giving up after `grace`
    ///
    /// On timeout the channel is closed so a producer blocked on a full
    /// channel is released, and whatever is still buffered is dropped.
    pub async fn discard_until_end(&mut self, grace: Duration) -> Discarded {
        let mut discarded = Discarded::default();
        let deadline = tokio::time::Instant::now() + grace;

        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(ChannelItem::Event(_))) => discarded.events += 1,
                Ok(Some(ChannelItem::End)) => {
                    discarded.saw_end = true;
                    return discarded;
                }
                Ok(None) => return discarded,
                Err(_) => {
                    self.close();
                    let rest = self.discard_buffered();
                    discarded.events += rest.events;
                    discarded.saw_end = rest.saw_end;
                    return discarded;
                }
            }
        }
    }
}
