//! Pointer gestures.
//!
//! A gesture runs `idle -> active (press) -> active (move)* -> idle (release)`.
//! Only the release produces a network message; intermediate geometry stays
//! in the local replica.

use whiteboard_core::{PageIndex, ShapeId, Tool};

/// Pointer position in canvas coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Tool selected in the toolbar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawingTool {
    #[default]
    Pen,
    Eraser,
    Rectangle,
    Circle,
    Select,
}

impl DrawingTool {
    /// Stroke mode for freehand tools
    pub fn stroke_tool(self) -> Option<Tool> {
        match self {
            DrawingTool::Pen => Some(Tool::Pen),
            DrawingTool::Eraser => Some(Tool::Eraser),
            _ => None,
        }
    }
}

/// The gesture in progress, if any
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    /// Accumulating points into the stroke at `index` on `page`
    Drawing { page: PageIndex, index: usize },
    /// Dragging open a freshly created rectangle or circle
    Shaping { page: PageIndex, shape_id: ShapeId },
    /// Moving or resizing an existing shape with the select tool
    Transforming {
        page: PageIndex,
        shape_id: ShapeId,
        /// Pointer offset from the shape origin at grab time
        grab: Point,
    },
}

impl Gesture {
    pub fn is_idle(&self) -> bool {
        matches!(self, Gesture::Idle)
    }

    /// Page the gesture is editing
    pub fn page(&self) -> Option<PageIndex> {
        match self {
            Gesture::Idle => None,
            Gesture::Drawing { page, .. }
            | Gesture::Shaping { page, .. }
            | Gesture::Transforming { page, .. } => Some(*page),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stroke_tools() {
        assert_eq!(DrawingTool::Pen.stroke_tool(), Some(Tool::Pen));
        assert_eq!(DrawingTool::Eraser.stroke_tool(), Some(Tool::Eraser));
        assert_eq!(DrawingTool::Circle.stroke_tool(), None);
    }

    #[test]
    fn test_gesture_page() {
        assert_eq!(Gesture::Idle.page(), None);
        assert_eq!(Gesture::Drawing { page: 2, index: 0 }.page(), Some(2));
    }
}
