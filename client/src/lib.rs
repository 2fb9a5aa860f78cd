//! Client side of the shared whiteboard.
//!
//! A [`Replica`] mirrors the server's pages, applies local gestures
//! optimistically and folds in remote events. [`SyncClient`] keeps a
//! replica connected to the server over WebSocket.

pub mod connection;
pub mod event;
pub mod gesture;
pub mod replica;

pub use connection::{ClientConfig, ClientError, ConnectionState, SyncClient, SyncEvent};
pub use event::MirrorEvent;
pub use gesture::{DrawingTool, Gesture, Point};
pub use replica::{next_shape_id, Replica, Style, DEFAULT_PAGE_COUNT};
