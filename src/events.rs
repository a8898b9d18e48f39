//! Progress events for the UI collaborator.
//!
//! The core never renders anything. It emits [`HubEvent`]s through an
//! [`EventSink`]; the front end decides how to show retry progress and commit
//! outcomes.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    /// A transient failure will be retried after `delay_ms`.
    RetryScheduled {
        path: String,
        attempt: u32,
        max_retries: u32,
        delay_ms: u64,
        reason: String,
    },

    /// The retry budget ran out; the failure is surfaced to the caller.
    RetryExhausted {
        path: String,
        attempts: u32,
        reason: String,
    },

    CommitStarted {
        repo: String,
        branch: String,
        operations: usize,
    },

    CommitCompleted {
        repo: String,
        branch: String,
        commit_id: String,
    },

    CommitFailed {
        repo: String,
        branch: String,
        error: String,
    },

    /// A cached file tree was dropped and will be refetched on next read.
    CacheInvalidated { repo: String, branch: String },

    LfsUploadCompleted { path: String, size: u64 },

    /// Bytes of `path` written so far; `total` is `None` when unannounced.
    DownloadProgress {
        path: String,
        downloaded: u64,
        total: Option<u64>,
    },
}

/// Destination for [`HubEvent`]s.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: HubEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: HubEvent) {}
}

/// Forwards events over an unbounded channel.
pub struct ChannelSink {
    event_tx: mpsc::UnboundedSender<HubEvent>,
}

impl ChannelSink {
    pub fn new(event_tx: mpsc::UnboundedSender<HubEvent>) -> Self {
        Self { event_tx }
    }

    /// Create a sink plus the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HubEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self::new(event_tx), event_rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: HubEvent) {
        // A closed receiver means nobody is rendering progress any more.
        if self.event_tx.send(event).is_err() {
            tracing::trace!("Event receiver closed, dropping event");
        }
    }
}

/// Keeps every event in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: parking_lot::Mutex<Vec<HubEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HubEvent> {
        self.events.lock().clone()
    }
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn emit(&self, event: HubEvent) {
        self.events.lock().push(event);
    }
}
