//! Field-level merge of partial shape updates.
//!
//! A [`ShapePatch`] names a shape by id and carries any subset of its
//! fields. Applying it overwrites exactly the fields present and leaves
//! every other field untouched. There is no versioning: when two
//! participants touch the same field concurrently, whichever patch the
//! server applies last wins, and every client converges on that order
//! because the server relays patches in the order it applied them.

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;
use crate::shape::{Shape, ShapeId, ShapeKind};

/// A partial shape record.
///
/// Absent (or `null`) fields mean "leave as is". The optional `type` is
/// carried through relays unchanged but never changes a stored shape's
/// variant, and variant-specific fields that do not apply to the stored
/// variant (e.g. `fill` on an image) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapePatch {
    pub id: ShapeId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ShapePatch {
    pub fn new(id: impl Into<ShapeId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_rotation(mut self, rotation: f64) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// Every field of `shape`, as sent when a transform completes.
    pub fn resolved(shape: &Shape) -> Self {
        let (fill, image_url) = match &shape.kind {
            ShapeKind::Rectangle { fill } | ShapeKind::Circle { fill } => (Some(fill.clone()), None),
            ShapeKind::Image { image_url } => (None, Some(image_url.clone())),
        };
        Self {
            id: shape.id.clone(),
            kind: Some(shape.kind.type_name().to_string()),
            x: Some(shape.x),
            y: Some(shape.y),
            width: Some(shape.width),
            height: Some(shape.height),
            rotation: Some(shape.rotation),
            stroke: shape.stroke.clone(),
            stroke_width: shape.stroke_width,
            fill,
            image_url,
        }
    }

    /// Numeric fields that are present must be finite; the id must be set.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.id.is_empty() {
            return Err(ProtocolError::InvalidShape("empty shape id".to_string()));
        }
        let numbers = [
            self.x,
            self.y,
            self.width,
            self.height,
            self.rotation,
            self.stroke_width,
        ];
        if numbers.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ProtocolError::InvalidShape(format!(
                "non-finite field in update for {}",
                self.id
            )));
        }
        Ok(())
    }
}

impl Shape {
    /// Shallow-overwrite the fields present in `patch`.
    pub fn apply_patch(&mut self, patch: &ShapePatch) {
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(width) = patch.width {
            self.width = width;
        }
        if let Some(height) = patch.height {
            self.height = height;
        }
        if let Some(rotation) = patch.rotation {
            self.rotation = rotation;
        }
        if let Some(stroke) = &patch.stroke {
            self.stroke = Some(stroke.clone());
        }
        if let Some(stroke_width) = patch.stroke_width {
            self.stroke_width = Some(stroke_width);
        }
        match &mut self.kind {
            ShapeKind::Rectangle { fill } | ShapeKind::Circle { fill } => {
                if let Some(new_fill) = &patch.fill {
                    *fill = new_fill.clone();
                }
            }
            ShapeKind::Image { image_url } => {
                if let Some(new_url) = &patch.image_url {
                    *image_url = new_url.clone();
                }
            }
        }
    }
}

/// Merge `patch` into the shape with the same id.
///
/// Returns `false` without touching anything when no such shape exists; a
/// partial record never creates a shape.
pub fn merge_into(shapes: &mut [Shape], patch: &ShapePatch) -> bool {
    match shapes.iter_mut().find(|s| s.id == patch.id) {
        Some(shape) => {
            shape.apply_patch(patch);
            true
        }
        None => {
            tracing::debug!("Merge target {} not found, ignoring update", patch.id);
            false
        }
    }
}
