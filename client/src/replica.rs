//! Local replica of the shared document.
//!
//! Local edits are applied immediately and turned into a protocol message
//! only when the discrete action completes. Remote events go through the
//! same [`Document`] operations the server uses, so every replica ends up
//! where the server is.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;
use whiteboard_core::{
    ClientMessage, ConnectionId, Document, PageIndex, ProtocolError, ServerMessage, Shape, ShapeId,
    ShapePatch, Stroke,
};

use crate::event::MirrorEvent;
use crate::gesture::{DrawingTool, Gesture, Point};

/// Pages a client keeps regardless of how many the server reports
pub const DEFAULT_PAGE_COUNT: usize = 12;

const IMAGE_ORIGIN: Point = Point { x: 50.0, y: 50.0 };

static SHAPE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Shape id from the wall clock in milliseconds plus a per-process counter
pub fn next_shape_id() -> ShapeId {
    let seq = SHAPE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), seq)
}

/// Outline used for new strokes and shapes
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub color: String,
    pub width: f64,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            color: "#000000".to_string(),
            width: 5.0,
        }
    }
}

/// A client's view of the whiteboard plus its in-progress gesture
#[derive(Debug, Clone)]
pub struct Replica {
    document: Document,
    page_count: usize,
    current_page: PageIndex,
    tool: DrawingTool,
    style: Style,
    gesture: Gesture,
    participants: BTreeSet<ConnectionId>,
    follow_remote: bool,
}

impl Default for Replica {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_COUNT)
    }
}

impl Replica {
    pub fn new(page_count: usize) -> Self {
        let page_count = page_count.max(1);
        Self {
            document: Document::new(page_count),
            page_count,
            current_page: 0,
            tool: DrawingTool::default(),
            style: Style::default(),
            gesture: Gesture::Idle,
            participants: BTreeSet::new(),
            follow_remote: true,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn current_page(&self) -> PageIndex {
        self.current_page
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn tool(&self) -> DrawingTool {
        self.tool
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    /// Participants whose `userJoined` arrived after the last snapshot.
    ///
    /// `userJoined` only goes to connections that already exist, and a
    /// snapshot resets this set, so peers connected before this replica's
    /// session began are never listed here.
    pub fn participants(&self) -> &BTreeSet<ConnectionId> {
        &self.participants
    }

    pub fn set_tool(&mut self, tool: DrawingTool) {
        self.tool = tool;
    }

    pub fn set_style(&mut self, color: impl Into<String>, width: f64) {
        self.style = Style {
            color: color.into(),
            width,
        };
    }

    /// Whether remote `pageChanged` moves the displayed page
    pub fn set_follow_remote(&mut self, follow: bool) {
        self.follow_remote = follow;
    }

    // ------------------------------------------------------------------
    // Local intents
    // ------------------------------------------------------------------

    /// Pointer down. Ignored while another gesture is active.
    pub fn press(&mut self, at: Point) {
        if !self.gesture.is_idle() {
            return;
        }
        let page = self.current_page;

        if let Some(tool) = self.tool.stroke_tool() {
            let stroke = Stroke::begin(tool, self.style.color.clone(), self.style.width, at.x, at.y);
            let strokes = &mut self.document.ensure_page(page).strokes;
            strokes.push(stroke);
            let index = strokes.len() - 1;
            self.gesture = Gesture::Drawing { page, index };
            return;
        }

        let shape = match self.tool {
            DrawingTool::Rectangle => Shape::rectangle(next_shape_id(), at.x, at.y),
            DrawingTool::Circle => Shape::circle(next_shape_id(), at.x, at.y),
            DrawingTool::Select => {
                if let Some(shape_id) = self.hit_test(at) {
                    self.begin_transform(&shape_id, at);
                }
                return;
            }
            DrawingTool::Pen | DrawingTool::Eraser => return,
        }
        .with_outline(self.style.color.clone(), self.style.width);

        let shape_id = shape.id.clone();
        self.document.upsert_shape(page, shape);
        self.gesture = Gesture::Shaping { page, shape_id };
    }

    /// Pointer move. Local only; nothing is sent per frame.
    pub fn drag(&mut self, to: Point) {
        match &self.gesture {
            Gesture::Idle => {}
            Gesture::Drawing { page, index } => {
                if let Some(stroke) = self.document.stroke_mut(*page, *index) {
                    stroke.push_point(to.x, to.y);
                }
            }
            Gesture::Shaping { page, shape_id } => {
                let Some(shape) = self.document.shape(*page, shape_id) else {
                    return;
                };
                let patch = ShapePatch::new(shape_id.clone()).with_size(to.x - shape.x, to.y - shape.y);
                self.document.merge_shape(*page, &patch);
            }
            Gesture::Transforming {
                page,
                shape_id,
                grab,
            } => {
                let patch = ShapePatch::new(shape_id.clone()).with_position(to.x - grab.x, to.y - grab.y);
                self.document.merge_shape(*page, &patch);
            }
        }
    }

    /// Pointer up: finish the gesture and return the one message describing it.
    pub fn release(&mut self) -> Option<ClientMessage> {
        match std::mem::take(&mut self.gesture) {
            Gesture::Idle => None,
            Gesture::Drawing { page, index } => self
                .document
                .page(page)
                .and_then(|p| p.strokes.get(index))
                .cloned()
                .map(|stroke| ClientMessage::Draw { page, stroke }),
            Gesture::Shaping { page, shape_id } => self
                .document
                .shape(page, &shape_id)
                .cloned()
                .map(|shape| ClientMessage::Shape { page, shape }),
            Gesture::Transforming { page, shape_id, .. } => {
                self.document
                    .shape(page, &shape_id)
                    .map(|shape| ClientMessage::ShapeUpdate {
                        page,
                        shape: ShapePatch::resolved(shape),
                    })
            }
        }
    }

    /// Topmost shape on the current page whose bounding box contains `at`
    pub fn hit_test(&self, at: Point) -> Option<ShapeId> {
        let page = self.document.page(self.current_page)?;
        page.shapes
            .iter()
            .rev()
            .find(|s| {
                let (x0, x1) = (s.x.min(s.x + s.width), s.x.max(s.x + s.width));
                let (y0, y1) = (s.y.min(s.y + s.height), s.y.max(s.y + s.height));
                (x0..=x1).contains(&at.x) && (y0..=y1).contains(&at.y)
            })
            .map(|s| s.id.clone())
    }

    /// Select a shape on the current page for moving or resizing.
    ///
    /// Returns `false` if another gesture is active or the shape is unknown.
    pub fn begin_transform(&mut self, shape_id: &str, at: Point) -> bool {
        if !self.gesture.is_idle() {
            return false;
        }
        let page = self.current_page;
        let Some(shape) = self.document.shape(page, shape_id) else {
            return false;
        };
        self.gesture = Gesture::Transforming {
            page,
            shape_id: shape.id.clone(),
            grab: Point::new(at.x - shape.x, at.y - shape.y),
        };
        true
    }

    /// Live geometry from a transform handle
    pub fn transform(&mut self, x: f64, y: f64, width: f64, height: f64, rotation: f64) {
        if let Gesture::Transforming { page, shape_id, .. } = &self.gesture {
            let patch = ShapePatch::new(shape_id.clone())
                .with_position(x, y)
                .with_size(width, height)
                .with_rotation(rotation);
            self.document.merge_shape(*page, &patch);
        }
    }

    /// Place an image on the current page, sized from its natural dimensions.
    pub fn insert_image(
        &mut self,
        natural_width: f64,
        natural_height: f64,
        image_url: impl Into<String>,
    ) -> Result<ClientMessage, ProtocolError> {
        let shape = Shape::image(
            next_shape_id(),
            IMAGE_ORIGIN.x,
            IMAGE_ORIGIN.y,
            natural_width,
            natural_height,
            image_url,
        )?;
        let page = self.current_page;
        self.document.upsert_shape(page, shape.clone());
        Ok(ClientMessage::Shape { page, shape })
    }

    pub fn clear_page(&mut self) -> ClientMessage {
        let page = self.current_page;
        if self.gesture.page() == Some(page) {
            self.gesture = Gesture::Idle;
        }
        self.document.clear_page(page);
        ClientMessage::ClearCanvas { page }
    }

    /// Navigate to `page`; out-of-range pages are refused.
    pub fn change_page(&mut self, page: PageIndex) -> Option<ClientMessage> {
        if page >= self.document.len() {
            return None;
        }
        self.current_page = page;
        Some(ClientMessage::ChangePage { page })
    }

    /// Ask for a new page. The replica grows when `pageAdded` comes back.
    pub fn add_page(&self) -> ClientMessage {
        ClientMessage::AddPage
    }

    pub fn request_state(&self) -> ClientMessage {
        ClientMessage::RequestState
    }

    // ------------------------------------------------------------------
    // Remote events
    // ------------------------------------------------------------------

    /// Apply one server event and report what changed.
    pub fn apply_remote(&mut self, msg: ServerMessage) -> Vec<MirrorEvent> {
        let mut events = Vec::new();
        match msg {
            ServerMessage::InitialState { pages } => {
                if let Some(page) = self.cancel_gesture() {
                    events.push(MirrorEvent::GestureCancelled { page });
                }
                self.document = Document::from_pages(pages);
                self.document.resize(self.page_count);
                self.current_page = self.current_page.min(self.page_count - 1);
                self.participants.clear();
                events.push(MirrorEvent::SnapshotReplaced {
                    pages: self.document.len(),
                });
            }

            ServerMessage::UserJoined { user_id } => {
                self.participants.insert(user_id.clone());
                events.push(MirrorEvent::ParticipantJoined { user_id });
            }

            ServerMessage::UserLeft { user_id } => {
                self.participants.remove(&user_id);
                events.push(MirrorEvent::ParticipantLeft { user_id });
            }

            ServerMessage::Draw {
                page,
                stroke,
                user_id,
            } => {
                self.document.append_stroke(page, stroke);
                events.push(MirrorEvent::StrokeAdded { page, user_id });
            }

            ServerMessage::Shape {
                page,
                shape,
                user_id,
            } => {
                let shape_id = shape.id.clone();
                if self.document.upsert_shape(page, shape) {
                    events.push(MirrorEvent::ShapeAdded {
                        page,
                        shape_id,
                        user_id,
                    });
                }
            }

            ServerMessage::ShapeUpdate {
                page,
                shape,
                user_id,
            } => {
                if self.document.merge_shape(page, &shape) {
                    events.push(MirrorEvent::ShapeMerged {
                        page,
                        shape_id: shape.id,
                        user_id,
                    });
                }
            }

            ServerMessage::ClearCanvas { page } => {
                if self.gesture.page() == Some(page) {
                    self.cancel_gesture();
                    events.push(MirrorEvent::GestureCancelled { page });
                }
                self.document.clear_page(page);
                events.push(MirrorEvent::PageCleared { page });
            }

            ServerMessage::PageChanged { page, user_id } => {
                if self.follow_remote && page < self.document.len() {
                    self.current_page = page;
                    events.push(MirrorEvent::PageFollowed { page, user_id });
                }
            }

            ServerMessage::PageAdded { total_pages } => {
                if total_pages > self.document.len() {
                    self.document.resize(total_pages);
                    events.push(MirrorEvent::PageCountChanged { total_pages });
                } else {
                    debug!(
                        "pageAdded reports {} pages, replica already holds {}",
                        total_pages,
                        self.document.len()
                    );
                }
            }
        }
        events
    }

    fn cancel_gesture(&mut self) -> Option<PageIndex> {
        std::mem::take(&mut self.gesture).page()
    }
}
