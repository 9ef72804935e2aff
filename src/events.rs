//! Drive lifecycle events.
//!
//! Events are fanned out on a bounded broadcast channel; sends never block
//! and lagged subscribers drop events. Readiness has no event; it is the
//! return of `Drive::new`.

use tokio::sync::broadcast;
use tracing::debug;

use crate::constants::EVENT_CHANNEL_CAPACITY;

/// An event emitted by a drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveEvent {
    /// The metadata feed was appended; `version` is the new trie version.
    Update {
        /// Trie version after the mutation.
        version: u64,
    },
    /// A write session on `name` is about to append its first byte.
    Appending {
        /// The path being written.
        name: String,
    },
    /// The stat for `name` was committed to the trie.
    Append {
        /// The path that was written.
        name: String,
    },
    /// An asynchronous failure observed by the drive.
    Error {
        /// Human-readable description of the failure.
        message: String,
    },
}

/// Broadcaster for drive events.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<DriveEvent>,
}

impl EventBroadcaster {
    /// Create a broadcaster with the default bounded channel.
    pub fn new() -> Self {
        Self {
            sender: broadcast::Sender::new(EVENT_CHANNEL_CAPACITY),
        }
    }

    /// Subscribe to drive events.
    pub fn subscribe(&self) -> broadcast::Receiver<DriveEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub(crate) fn emit_update(&self, version: u64) {
        self.send(DriveEvent::Update { version });
    }

    pub(crate) fn emit_appending(&self, name: &str) {
        self.send(DriveEvent::Appending { name: name.to_string() });
    }

    pub(crate) fn emit_append(&self, name: &str) {
        self.send(DriveEvent::Append { name: name.to_string() });
    }

    pub(crate) fn emit_error(&self, message: &str) {
        self.send(DriveEvent::Error {
            message: message.to_string(),
        });
    }

    fn send(&self, event: DriveEvent) {
        // No subscribers is not an error, just nobody listening.
        if self.sender.send(event).is_err() {
            debug!("drive event dropped (no receivers)");
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
