use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::id::RecordId;

/// Which path closed a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// `SessionHandle::close` ran (sign-out or explicit teardown).
    Explicit,
    /// The store's disconnect-triggered mutation had already closed it.
    ConnectionLost,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    SessionOpened {
        uid: String,
        session_id: RecordId,
    },
    SessionClosed {
        uid: String,
        session_id: RecordId,
        reason: CloseReason,
    },
    PresenceChanged {
        uid: String,
        online: bool,
    },
    ConsistencyViolation {
        uid: String,
        detail: String,
    },
    Error {
        uid: String,
        message: String,
    },
    #[serde(other)]
    Unknown,
}

/// Fan-out of engine events to any number of observers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
