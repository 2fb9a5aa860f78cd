//! Connection registry.
//!
//! Holds one outbound channel per live connection. Sending never awaits the
//! network: messages are queued on an unbounded channel and written to the
//! socket by that connection's send task.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use whiteboard_core::{ConnectionId, ServerMessage};

use super::{SyncError, SyncResult};

/// A single live connection
pub struct Participant {
    pub id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Participant {
    pub fn new(id: impl Into<ConnectionId>, tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id: id.into(),
            tx,
        }
    }

    /// Queue a message for this participant
    pub fn send(&self, msg: ServerMessage) -> SyncResult<()> {
        self.tx
            .send(msg)
            .map_err(|_| SyncError::ChannelClosed(self.id.clone()))
    }
}

/// The set of currently connected participants
#[derive(Default)]
pub struct ConnectionRegistry {
    participants: DashMap<ConnectionId, Participant>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, participant: Participant) {
        debug!("Registering participant {}", participant.id);
        self.participants.insert(participant.id.clone(), participant);
    }

    /// Remove a participant; returns whether it was present
    pub fn unregister(&self, id: &str) -> bool {
        self.participants.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.participants.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.participants.iter().map(|p| p.key().clone()).collect()
    }

    /// Send to a single participant
    pub fn send_to(&self, id: &str, msg: ServerMessage) -> SyncResult<()> {
        let participant = self
            .participants
            .get(id)
            .ok_or_else(|| SyncError::PeerNotFound(id.to_string()))?;
        participant.send(msg)
    }

    /// Send `msg` to every participant except `exclude`.
    ///
    /// A failed send only means that connection is closing; its own
    /// teardown will unregister it.
    pub fn broadcast(&self, exclude: Option<&str>, msg: &ServerMessage) -> usize {
        let mut delivered = 0;
        for participant in self.participants.iter() {
            if Some(participant.key().as_str()) == exclude {
                continue;
            }
            match participant.send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Dropping {} event: {}", msg.event_name(), e),
            }
        }
        delivered
    }
}
