//! Shared model for the collaborative whiteboard.
//!
//! Both the server and every client hold a [`Document`]: an ordered list of
//! pages, each with an append-only list of freehand strokes and a collection
//! of shapes addressed by id. This crate provides:
//! - The page/stroke/shape data model
//! - Store operations (ensure, append, upsert, merge, clear, append page)
//! - The field-level shape merge used for partial updates
//! - The JSON wire protocol exchanged over the WebSocket
//!
//! Server and client apply remote mutations through the very same
//! [`Document`] methods, which is what keeps their views converging.

pub mod document;
pub mod merge;
pub mod protocol;
pub mod shape;
pub mod stroke;

pub use document::{Document, Page};
pub use merge::ShapePatch;
pub use protocol::{ClientMessage, ProtocolError, ServerMessage, SyncProtocol};
pub use shape::{Shape, ShapeId, ShapeKind, IMAGE_DISPLAY_WIDTH};
pub use stroke::{Stroke, Tool};

/// Server-assigned identifier of one connected participant
pub type ConnectionId = String;

/// Position of a page within the document; the index is the page's identity
pub type PageIndex = usize;
