//! Freehand strokes.
//!
//! A stroke grows point by point while the pointer is down and is frozen
//! once the gesture ends. Frozen strokes are only ever appended to a page.

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

/// Color painted by the eraser (the canvas background)
pub const ERASER_COLOR: &str = "#ffffff";

/// Fixed width of eraser strokes
pub const ERASER_WIDTH: f64 = 20.0;

const DEFAULT_COLOR: &str = "#000000";
const DEFAULT_WIDTH: f64 = 5.0;

/// Drawing mode of a stroke
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Pen,
    Eraser,
}

/// One freehand gesture.
///
/// `points` is a flat list of coordinate pairs: `[x0, y0, x1, y1, ...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    #[serde(default)]
    pub tool: Tool,
    pub points: Vec<f64>,
    #[serde(rename = "stroke", default = "default_color")]
    pub color: String,
    #[serde(rename = "strokeWidth", default = "default_width")]
    pub width: f64,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_width() -> f64 {
    DEFAULT_WIDTH
}

impl Stroke {
    /// Start a stroke at the pointer-down position.
    ///
    /// The eraser ignores the requested style and paints with the
    /// background color at a fixed width.
    pub fn begin(tool: Tool, color: impl Into<String>, width: f64, x: f64, y: f64) -> Self {
        let (color, width) = match tool {
            Tool::Pen => (color.into(), width),
            Tool::Eraser => (ERASER_COLOR.to_string(), ERASER_WIDTH),
        };
        Self {
            tool,
            points: vec![x, y],
            color,
            width,
        }
    }

    /// Extend an in-progress stroke
    pub fn push_point(&mut self, x: f64, y: f64) {
        self.points.push(x);
        self.points.push(y);
    }

    /// Iterate the stroke as `(x, y)` pairs
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.chunks_exact(2).map(|pair| (pair[0], pair[1]))
    }

    pub fn point_count(&self) -> usize {
        self.points.len() / 2
    }

    /// Reject strokes that cannot be rendered consistently on every client.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.points.len() % 2 != 0 {
            return Err(ProtocolError::InvalidStroke(format!(
                "odd number of coordinates ({})",
                self.points.len()
            )));
        }
        if self.points.iter().any(|v| !v.is_finite()) {
            return Err(ProtocolError::InvalidStroke(
                "non-finite coordinate".to_string(),
            ));
        }
        if !self.width.is_finite() || self.width < 0.0 {
            return Err(ProtocolError::InvalidStroke(format!(
                "invalid width {}",
                self.width
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eraser_overrides_style() {
        let stroke = Stroke::begin(Tool::Eraser, "#ff0000", 3.0, 1.0, 2.0);
        assert_eq!(stroke.color, ERASER_COLOR);
        assert_eq!(stroke.width, ERASER_WIDTH);
        assert_eq!(stroke.points, vec![1.0, 2.0]);
    }

    #[test]
    fn test_points_are_paired() {
        let mut stroke = Stroke::begin(Tool::Pen, "#000000", 5.0, 1.0, 1.0);
        stroke.push_point(2.0, 2.0);
        let pairs: Vec<_> = stroke.points().collect();
        assert_eq!(pairs, vec![(1.0, 1.0), (2.0, 2.0)]);
        assert_eq!(stroke.point_count(), 2);
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let stroke: Stroke = serde_json::from_str(r#"{"points":[1,1,2,2]}"#).unwrap();
        assert_eq!(stroke.tool, Tool::Pen);
        assert_eq!(stroke.color, "#000000");
        assert_eq!(stroke.width, 5.0);
        assert!(stroke.validate().is_ok());
    }

    #[test]
    fn test_odd_points_rejected() {
        let stroke: Stroke = serde_json::from_str(r#"{"points":[1,1,2]}"#).unwrap();
        assert!(matches!(
            stroke.validate(),
            Err(ProtocolError::InvalidStroke(_))
        ));
    }

    #[test]
    fn test_wire_field_names() {
        let stroke = Stroke::begin(Tool::Pen, "#123456", 4.0, 0.0, 0.0);
        let json = serde_json::to_value(&stroke).unwrap();
        assert_eq!(json["tool"], "pen");
        assert_eq!(json["stroke"], "#123456");
        assert_eq!(json["strokeWidth"], 4.0);
    }
}
