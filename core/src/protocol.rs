//! JSON WebSocket protocol.
//!
//! Every frame is a text frame holding one event object:
//!
//! ```json
//! { "event": "draw", "data": { "page": 0, "stroke": { "points": [1, 1, 2, 2] } } }
//! { "event": "addPage" }
//! ```
//!
//! Decoding validates the payload so that a malformed message is rejected
//! as a whole before anything is applied.

use serde::{Deserialize, Serialize};

use crate::document::Page;
use crate::merge::ShapePatch;
use crate::shape::Shape;
use crate::stroke::Stroke;
use crate::{ConnectionId, PageIndex};

/// Protocol errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    InvalidFormat(String),

    #[error("Page index {0} is out of bounds (max: {1})")]
    PageOutOfBounds(PageIndex, usize),

    #[error("Invalid stroke: {0}")]
    InvalidStroke(String),

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Binary frames are not supported")]
    UnsupportedFrame,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    /// A finished freehand stroke
    Draw {
        page: PageIndex,
        #[serde(alias = "line")]
        stroke: Stroke,
    },

    /// A newly created shape
    Shape { page: PageIndex, shape: Shape },

    /// Partial fields of an existing shape
    ShapeUpdate { page: PageIndex, shape: ShapePatch },

    /// Wipe a page
    ClearCanvas { page: PageIndex },

    /// The sender navigated to another page
    ChangePage { page: PageIndex },

    /// Append a page to the shared document
    AddPage,

    /// Ask for a fresh full snapshot
    RequestState,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full document snapshot
    InitialState { pages: Vec<Page> },

    UserJoined {
        #[serde(rename = "userId")]
        user_id: ConnectionId,
    },

    UserLeft {
        #[serde(rename = "userId")]
        user_id: ConnectionId,
    },

    Draw {
        page: PageIndex,
        stroke: Stroke,
        #[serde(rename = "userId")]
        user_id: ConnectionId,
    },

    Shape {
        page: PageIndex,
        shape: Shape,
        #[serde(rename = "userId")]
        user_id: ConnectionId,
    },

    /// The partial fields as received, not the merged shape
    ShapeUpdate {
        page: PageIndex,
        shape: ShapePatch,
        #[serde(rename = "userId")]
        user_id: ConnectionId,
    },

    ClearCanvas { page: PageIndex },

    PageChanged {
        page: PageIndex,
        #[serde(rename = "userId")]
        user_id: ConnectionId,
    },

    PageAdded {
        #[serde(rename = "totalPages")]
        total_pages: usize,
    },
}

impl ClientMessage {
    /// Event name as it appears on the wire
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::Draw { .. } => "draw",
            ClientMessage::Shape { .. } => "shape",
            ClientMessage::ShapeUpdate { .. } => "shapeUpdate",
            ClientMessage::ClearCanvas { .. } => "clearCanvas",
            ClientMessage::ChangePage { .. } => "changePage",
            ClientMessage::AddPage => "addPage",
            ClientMessage::RequestState => "requestState",
        }
    }

    /// Page the message refers to, if any
    pub fn page(&self) -> Option<PageIndex> {
        match self {
            ClientMessage::Draw { page, .. }
            | ClientMessage::Shape { page, .. }
            | ClientMessage::ShapeUpdate { page, .. }
            | ClientMessage::ClearCanvas { page }
            | ClientMessage::ChangePage { page } => Some(*page),
            ClientMessage::AddPage | ClientMessage::RequestState => None,
        }
    }

    /// Check payload contents that the JSON schema alone cannot express.
    ///
    /// `max_pages` bounds the page indices a client may reference.
    pub fn validate(&self, max_pages: usize) -> Result<(), ProtocolError> {
        if let Some(page) = self.page() {
            if page >= max_pages {
                return Err(ProtocolError::PageOutOfBounds(page, max_pages));
            }
        }
        match self {
            ClientMessage::Draw { stroke, .. } => stroke.validate(),
            ClientMessage::Shape { shape, .. } => shape.validate(),
            ClientMessage::ShapeUpdate { shape, .. } => shape.validate(),
            _ => Ok(()),
        }
    }
}

impl ServerMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::InitialState { .. } => "initialState",
            ServerMessage::UserJoined { .. } => "userJoined",
            ServerMessage::UserLeft { .. } => "userLeft",
            ServerMessage::Draw { .. } => "draw",
            ServerMessage::Shape { .. } => "shape",
            ServerMessage::ShapeUpdate { .. } => "shapeUpdate",
            ServerMessage::ClearCanvas { .. } => "clearCanvas",
            ServerMessage::PageChanged { .. } => "pageChanged",
            ServerMessage::PageAdded { .. } => "pageAdded",
        }
    }
}

/// Protocol codec for encoding/decoding frames
pub struct SyncProtocol;

impl SyncProtocol {
    /// Decode and validate a client frame
    pub fn decode_client(text: &str, max_pages: usize) -> Result<ClientMessage, ProtocolError> {
        let msg: ClientMessage = serde_json::from_str(text)
            .map_err(|e| ProtocolError::InvalidFormat(e.to_string()))?;
        msg.validate(max_pages)?;
        Ok(msg)
    }

    pub fn encode_client(msg: &ClientMessage) -> Result<String, ProtocolError> {
        serde_json::to_string(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode_server(text: &str) -> Result<ServerMessage, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidFormat(e.to_string()))
    }

    pub fn encode_server(msg: &ServerMessage) -> Result<String, ProtocolError> {
        serde_json::to_string(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}
