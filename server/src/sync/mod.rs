//! Synchronization of the shared whiteboard.
//!
//! - [`registry`] tracks live connections and fans events out to them
//! - [`server`] owns the authoritative document and applies client events
//!
//! Every accepted mutation is applied and relayed while the document lock is
//! held, so all participants observe mutations in the order they were applied.

pub mod registry;
pub mod server;

pub use registry::{ConnectionRegistry, Participant};
pub use server::{ServerStats, SyncServer, SyncServerConfig};

use whiteboard_core::{ConnectionId, ProtocolError};

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during synchronization
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Rejected client payload
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// No live connection with this id
    #[error("Peer not found: {0}")]
    PeerNotFound(ConnectionId),

    /// The connection's outbound channel is gone
    #[error("Channel closed for peer {0}")]
    ChannelClosed(ConnectionId),
}
