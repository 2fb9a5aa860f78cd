//! SyncServer implementation for the shared whiteboard.
//!
//! This module implements the core synchronization server:
//! - a single `parking_lot::Mutex` guarding the authoritative [`Document`]
//! - a [`ConnectionRegistry`] for fan-out with sender exclusion
//!
//! Each client event is decoded and validated, applied to the document and
//! queued for the other participants while the document lock is held. Queuing
//! only pushes onto unbounded channels, so the lock is never held across
//! network I/O, and every participant sees mutations in the order the server
//! applied them.

use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use whiteboard_core::{ClientMessage, ConnectionId, Document, Page, ServerMessage, SyncProtocol};

use super::registry::{ConnectionRegistry, Participant};
use super::SyncResult;

/// Configuration for the SyncServer
#[derive(Debug, Clone, PartialEq)]
pub struct SyncServerConfig {
    /// Pages the document starts with
    pub initial_pages: usize,
    /// Exclusive upper bound for page indices clients may reference
    pub max_pages: usize,
}

impl Default for SyncServerConfig {
    fn default() -> Self {
        Self {
            initial_pages: 1,
            max_pages: 1000,
        }
    }
}

/// Server statistics
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStats {
    pub participants: usize,
    pub pages: usize,
    pub strokes: usize,
    pub shapes: usize,
    pub uptime_seconds: u64,
}

/// Owner of the shared document and the set of live connections
pub struct SyncServer {
    document: Mutex<Document>,
    registry: ConnectionRegistry,
    config: SyncServerConfig,
    started_at: Instant,
}

impl SyncServer {
    pub fn new(config: SyncServerConfig) -> Self {
        Self {
            document: Mutex::new(Document::new(config.initial_pages)),
            registry: ConnectionRegistry::new(),
            config,
            started_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &SyncServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register a new connection.
    ///
    /// The new participant gets `initialState` before any later mutation,
    /// and everyone else is told it joined.
    pub fn connect(&self, tx: mpsc::UnboundedSender<ServerMessage>) -> ConnectionId {
        let id = uuid::Uuid::new_v4().to_string();
        let participant = Participant::new(id.clone(), tx);

        let doc = self.document.lock();
        if let Err(e) = participant.send(ServerMessage::InitialState {
            pages: doc.snapshot(),
        }) {
            warn!("Failed to queue initial state: {}", e);
        }
        self.registry.register(participant);
        self.registry.broadcast(
            Some(&id),
            &ServerMessage::UserJoined {
                user_id: id.clone(),
            },
        );
        drop(doc);

        info!(
            "Participant {} connected ({} online)",
            id,
            self.registry.len()
        );
        id
    }

    /// Remove a connection and tell the remaining participants
    pub fn disconnect(&self, id: &str) {
        let _doc = self.document.lock();
        if self.registry.unregister(id) {
            self.registry.broadcast(
                None,
                &ServerMessage::UserLeft {
                    user_id: id.to_string(),
                },
            );
            info!(
                "Participant {} disconnected ({} online)",
                id,
                self.registry.len()
            );
        }
    }

    /// Decode, validate and apply one text frame from `from`.
    ///
    /// A rejected frame changes nothing; the caller keeps the connection.
    pub fn handle_frame(&self, from: &str, text: &str) -> SyncResult<()> {
        let msg = SyncProtocol::decode_client(text, self.config.max_pages)?;
        self.apply_valid(from, msg)
    }

    /// Validate and apply a client event that did not come through
    /// [`handle_frame`](Self::handle_frame), then relay it.
    pub fn apply(&self, from: &str, msg: ClientMessage) -> SyncResult<()> {
        msg.validate(self.config.max_pages)?;
        self.apply_valid(from, msg)
    }

    fn apply_valid(&self, from: &str, msg: ClientMessage) -> SyncResult<()> {
        let user_id = from.to_string();

        let mut doc = self.document.lock();
        match msg {
            ClientMessage::Draw { page, stroke } => {
                doc.append_stroke(page, stroke.clone());
                debug!("draw from {} on page {} ({} points)", from, page, stroke.point_count());
                self.registry.broadcast(
                    Some(from),
                    &ServerMessage::Draw {
                        page,
                        stroke,
                        user_id,
                    },
                );
            }

            ClientMessage::Shape { page, mut shape } => {
                shape.normalize_image();
                if !doc.upsert_shape(page, shape.clone()) {
                    debug!("Duplicate shape {} from {} on page {}", shape.id, from, page);
                }
                self.registry.broadcast(
                    Some(from),
                    &ServerMessage::Shape {
                        page,
                        shape,
                        user_id,
                    },
                );
            }

            ClientMessage::ShapeUpdate { page, shape } => {
                doc.merge_shape(page, &shape);
                self.registry.broadcast(
                    Some(from),
                    &ServerMessage::ShapeUpdate {
                        page,
                        shape,
                        user_id,
                    },
                );
            }

            ClientMessage::ClearCanvas { page } => {
                doc.clear_page(page);
                debug!("Page {} cleared by {}", page, from);
                self.registry
                    .broadcast(Some(from), &ServerMessage::ClearCanvas { page });
            }

            ClientMessage::ChangePage { page } => {
                self.registry
                    .broadcast(Some(from), &ServerMessage::PageChanged { page, user_id });
            }

            ClientMessage::AddPage => {
                if doc.len() >= self.config.max_pages {
                    warn!(
                        "Ignoring addPage from {}: page limit {} reached",
                        from, self.config.max_pages
                    );
                    return Ok(());
                }
                let total_pages = doc.append_page();
                info!("Page added by {} ({} pages)", from, total_pages);
                self.registry
                    .broadcast(None, &ServerMessage::PageAdded { total_pages });
            }

            ClientMessage::RequestState => {
                self.registry.send_to(
                    from,
                    ServerMessage::InitialState {
                        pages: doc.snapshot(),
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Deep copy of the current document
    pub fn snapshot(&self) -> Vec<Page> {
        self.document.lock().snapshot()
    }

    /// Get server statistics
    pub fn stats(&self) -> ServerStats {
        let doc = self.document.lock();
        ServerStats {
            participants: self.registry.len(),
            pages: doc.len(),
            strokes: doc.stroke_count(),
            shapes: doc.shape_count(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for SyncServer {
    fn default() -> Self {
        Self::new(SyncServerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whiteboard_core::{ProtocolError, Shape, ShapePatch, Stroke, Tool};

    use crate::sync::SyncError;

    type Rx = mpsc::UnboundedReceiver<ServerMessage>;

    fn join(server: &SyncServer) -> (ConnectionId, Rx) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = server.connect(tx);
        (id, rx)
    }

    fn drain(rx: &mut Rx) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn stroke() -> Stroke {
        let mut stroke = Stroke::begin(Tool::Pen, "#000000", 5.0, 1.0, 1.0);
        stroke.push_point(2.0, 2.0);
        stroke
    }

    #[test]
    fn test_first_connect_gets_single_empty_page() {
        let server = SyncServer::default();
        let (_a, mut rx_a) = join(&server);
        assert_eq!(
            drain(&mut rx_a),
            vec![ServerMessage::InitialState {
                pages: vec![Page::new()]
            }]
        );
    }

    #[test]
    fn test_user_joined_goes_to_others_only() {
        let server = SyncServer::default();
        let (_a, mut rx_a) = join(&server);
        drain(&mut rx_a);

        let (b, mut rx_b) = join(&server);
        assert_eq!(drain(&mut rx_a), vec![ServerMessage::UserJoined { user_id: b }]);
        let b_msgs = drain(&mut rx_b);
        assert_eq!(b_msgs.len(), 1);
        assert_eq!(b_msgs[0].event_name(), "initialState");
    }

    #[test]
    fn test_draw_relayed_with_sender_id() {
        let server = SyncServer::default();
        let (a, mut rx_a) = join(&server);
        let (_b, mut rx_b) = join(&server);
        drain(&mut rx_a);
        drain(&mut rx_b);

        server
            .handle_frame(&a, r#"{"event":"draw","data":{"page":0,"stroke":{"points":[1,1,2,2]}}}"#)
            .unwrap();

        assert!(drain(&mut rx_a).is_empty());
        match drain(&mut rx_b).as_slice() {
            [ServerMessage::Draw { page, stroke, user_id }] => {
                assert_eq!(*page, 0);
                assert_eq!(stroke.points, vec![1.0, 1.0, 2.0, 2.0]);
                assert_eq!(user_id, &a);
            }
            other => panic!("Unexpected messages: {:?}", other),
        }
        assert_eq!(server.snapshot()[0].strokes.len(), 1);
    }

    #[test]
    fn test_shape_then_update_scenario() {
        let server = SyncServer::default();
        let (a, _rx_a) = join(&server);
        let (_b, mut rx_b) = join(&server);
        drain(&mut rx_b);

        server
            .handle_frame(
                &a,
                r#"{"event":"shape","data":{"page":0,"shape":{"id":"s1","type":"rect","x":10,"y":10,"width":0,"height":0}}}"#,
            )
            .unwrap();
        server
            .handle_frame(
                &a,
                r#"{"event":"shapeUpdate","data":{"page":0,"shape":{"id":"s1","width":50,"height":30}}}"#,
            )
            .unwrap();

        let pages = server.snapshot();
        let shape = pages[0].shape("s1").unwrap();
        assert_eq!((shape.x, shape.y, shape.width, shape.height), (10.0, 10.0, 50.0, 30.0));

        let relayed = drain(&mut rx_b);
        assert_eq!(relayed.len(), 2);
        match &relayed[1] {
            ServerMessage::ShapeUpdate { shape, .. } => {
                assert_eq!(shape, &ShapePatch::new("s1").with_size(50.0, 30.0));
            }
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_image_normalized_before_store_and_relay() {
        let server = SyncServer::default();
        let (a, _rx_a) = join(&server);
        let (_b, mut rx_b) = join(&server);
        drain(&mut rx_b);

        let mut image = Shape::image("img", 0.0, 0.0, 300.0, 300.0, "data:").unwrap();
        image.width = 1200.0;
        image.height = 900.0;
        server
            .apply(&a, ClientMessage::Shape { page: 0, shape: image })
            .unwrap();

        let stored = server.snapshot()[0].shape("img").cloned().unwrap();
        assert_eq!(stored.width, 300.0);
        assert!((stored.height - 225.0).abs() < 1e-9);
        match drain(&mut rx_b).as_slice() {
            [ServerMessage::Shape { shape, .. }] => assert_eq!(shape, &stored),
            other => panic!("Unexpected messages: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_shape_not_stored_twice() {
        let server = SyncServer::default();
        let (a, _rx_a) = join(&server);
        let shape = Shape::rectangle("s1", 1.0, 1.0);
        server.apply(&a, ClientMessage::Shape { page: 0, shape: shape.clone() }).unwrap();
        server.apply(&a, ClientMessage::Shape { page: 0, shape }).unwrap();
        assert_eq!(server.stats().shapes, 1);
    }

    #[test]
    fn test_update_for_missing_shape_changes_nothing() {
        let server = SyncServer::default();
        let (a, _rx_a) = join(&server);
        let before = server.snapshot();
        server
            .apply(
                &a,
                ClientMessage::ShapeUpdate {
                    page: 3,
                    shape: ShapePatch::new("ghost").with_position(1.0, 1.0),
                },
            )
            .unwrap();
        assert_eq!(server.snapshot(), before);
    }

    #[test]
    fn test_clear_canvas_propagates() {
        let server = SyncServer::default();
        let (a, _rx_a) = join(&server);
        let (_b, mut rx_b) = join(&server);
        server.apply(&a, ClientMessage::Draw { page: 0, stroke: stroke() }).unwrap();
        server
            .apply(&a, ClientMessage::Shape { page: 0, shape: Shape::circle("c", 1.0, 1.0) })
            .unwrap();
        drain(&mut rx_b);

        server.apply(&a, ClientMessage::ClearCanvas { page: 0 }).unwrap();

        assert!(server.snapshot()[0].is_empty());
        assert_eq!(drain(&mut rx_b), vec![ServerMessage::ClearCanvas { page: 0 }]);
    }

    #[test]
    fn test_change_page_is_relay_only() {
        let server = SyncServer::default();
        let (a, mut rx_a) = join(&server);
        let (_b, mut rx_b) = join(&server);
        drain(&mut rx_a);
        drain(&mut rx_b);

        server.apply(&a, ClientMessage::ChangePage { page: 4 }).unwrap();

        assert_eq!(server.stats().pages, 1);
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(
            drain(&mut rx_b),
            vec![ServerMessage::PageChanged { page: 4, user_id: a }]
        );
    }

    #[test]
    fn test_add_page_reaches_sender() {
        let server = SyncServer::default();
        let (a, mut rx_a) = join(&server);
        let (_b, mut rx_b) = join(&server);
        drain(&mut rx_a);
        drain(&mut rx_b);

        server.apply(&a, ClientMessage::AddPage).unwrap();

        let expected = vec![ServerMessage::PageAdded { total_pages: 2 }];
        assert_eq!(drain(&mut rx_a), expected);
        assert_eq!(drain(&mut rx_b), expected);
        assert!(server.snapshot()[1].is_empty());
    }

    #[test]
    fn test_add_page_respects_limit() {
        let server = SyncServer::new(SyncServerConfig {
            initial_pages: 2,
            max_pages: 2,
        });
        let (a, mut rx_a) = join(&server);
        drain(&mut rx_a);
        server.apply(&a, ClientMessage::AddPage).unwrap();
        assert_eq!(server.stats().pages, 2);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_disconnect_broadcasts_user_left() {
        let server = SyncServer::default();
        let (a, _rx_a) = join(&server);
        let (_b, mut rx_b) = join(&server);
        drain(&mut rx_b);

        server.disconnect(&a);
        server.disconnect(&a);

        assert_eq!(drain(&mut rx_b), vec![ServerMessage::UserLeft { user_id: a }]);
        assert_eq!(server.stats().participants, 1);
    }

    #[test]
    fn test_malformed_frame_rejected_without_effect() {
        let server = SyncServer::default();
        let (a, _rx_a) = join(&server);
        let (_b, mut rx_b) = join(&server);
        drain(&mut rx_b);

        let result = server.handle_frame(&a, r#"{"event":"draw","data":{"page":0}}"#);
        assert!(matches!(
            result,
            Err(SyncError::Protocol(ProtocolError::InvalidFormat(_)))
        ));

        let result = server.handle_frame(&a, r#"{"event":"draw","data":{"page":0,"stroke":{"points":[1,2,3]}}}"#);
        assert!(matches!(
            result,
            Err(SyncError::Protocol(ProtocolError::InvalidStroke(_)))
        ));

        assert_eq!(server.stats().strokes, 0);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_hostile_page_index_rejected() {
        let server = SyncServer::default();
        let (a, _rx_a) = join(&server);
        let result = server.apply(&a, ClientMessage::ClearCanvas { page: 1_000_000 });
        assert!(matches!(
            result,
            Err(SyncError::Protocol(ProtocolError::PageOutOfBounds(1_000_000, 1000)))
        ));
        assert_eq!(server.stats().pages, 1);
    }

    #[test]
    fn test_apply_validates_decoded_message() {
        let server = SyncServer::default();
        let (a, _rx_a) = join(&server);
        let (_b, mut rx_b) = join(&server);
        drain(&mut rx_b);

        let mut bad = stroke();
        bad.points.push(3.0);
        let result = server.apply(&a, ClientMessage::Draw { page: 0, stroke: bad });
        assert!(matches!(
            result,
            Err(SyncError::Protocol(ProtocolError::InvalidStroke(_)))
        ));
        assert_eq!(server.stats().strokes, 0);
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_draw_on_missing_page_creates_it() {
        let server = SyncServer::default();
        let (a, _rx_a) = join(&server);
        server.apply(&a, ClientMessage::Draw { page: 3, stroke: stroke() }).unwrap();
        let pages = server.snapshot();
        assert_eq!(pages.len(), 4);
        assert_eq!(pages[3].strokes.len(), 1);
    }

    #[test]
    fn test_request_state_answers_requester_only() {
        let server = SyncServer::default();
        let (a, mut rx_a) = join(&server);
        let (_b, mut rx_b) = join(&server);
        server.apply(&a, ClientMessage::Draw { page: 0, stroke: stroke() }).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        server.apply(&a, ClientMessage::RequestState).unwrap();

        match drain(&mut rx_a).as_slice() {
            [ServerMessage::InitialState { pages }] => assert_eq!(pages[0].strokes.len(), 1),
            other => panic!("Unexpected messages: {:?}", other),
        }
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_late_joiner_sees_current_state() {
        let server = SyncServer::default();
        let (a, _rx_a) = join(&server);
        server.apply(&a, ClientMessage::Draw { page: 0, stroke: stroke() }).unwrap();
        server.apply(&a, ClientMessage::AddPage).unwrap();

        let (_b, mut rx_b) = join(&server);
        match drain(&mut rx_b).as_slice() {
            [ServerMessage::InitialState { pages }] => {
                assert_eq!(pages.len(), 2);
                assert_eq!(pages[0].strokes.len(), 1);
            }
            other => panic!("Unexpected messages: {:?}", other),
        }
    }
}
