//! Shapes placed on a page.
//!
//! A shape is a sum type over rectangle, circle and image sharing one set of
//! geometry and outline fields. The variant is fixed when the shape is
//! created; later partial updates only touch field values (see
//! [`crate::merge`]).

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

/// Per-page unique identifier chosen by the creating client
pub type ShapeId = String;

/// Width every image is normalized to when it is placed
pub const IMAGE_DISPLAY_WIDTH: f64 = 300.0;

const DEFAULT_FILL: &str = "transparent";

/// A mutable object on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    pub id: ShapeId,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(flatten)]
    pub kind: ShapeKind,
}

/// Variant-specific part of a shape, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShapeKind {
    #[serde(rename = "rect", alias = "rectangle")]
    Rectangle {
        #[serde(default = "default_fill")]
        fill: String,
    },
    #[serde(rename = "circle")]
    Circle {
        #[serde(default = "default_fill")]
        fill: String,
    },
    #[serde(rename = "image")]
    Image {
        #[serde(rename = "imageUrl")]
        image_url: String,
    },
}

fn default_fill() -> String {
    DEFAULT_FILL.to_string()
}

impl ShapeKind {
    /// Wire tag of the variant
    pub fn type_name(&self) -> &'static str {
        match self {
            ShapeKind::Rectangle { .. } => "rect",
            ShapeKind::Circle { .. } => "circle",
            ShapeKind::Image { .. } => "image",
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ShapeKind::Image { .. })
    }
}

impl Shape {
    /// A zero-sized rectangle anchored at `(x, y)`, ready to be dragged open
    pub fn rectangle(id: impl Into<ShapeId>, x: f64, y: f64) -> Self {
        Self::outlined(id, x, y, ShapeKind::Rectangle { fill: default_fill() })
    }

    /// A zero-sized circle anchored at `(x, y)`
    pub fn circle(id: impl Into<ShapeId>, x: f64, y: f64) -> Self {
        Self::outlined(id, x, y, ShapeKind::Circle { fill: default_fill() })
    }

    /// An image placed at `(x, y)` and sized from its natural dimensions.
    pub fn image(
        id: impl Into<ShapeId>,
        x: f64,
        y: f64,
        natural_width: f64,
        natural_height: f64,
        image_url: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        let mut shape = Self {
            id: id.into(),
            x,
            y,
            width: natural_width,
            height: natural_height,
            rotation: 0.0,
            stroke: None,
            stroke_width: None,
            kind: ShapeKind::Image {
                image_url: image_url.into(),
            },
        };
        shape.validate()?;
        shape.normalize_image();
        Ok(shape)
    }

    fn outlined(id: impl Into<ShapeId>, x: f64, y: f64, kind: ShapeKind) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            stroke: None,
            stroke_width: None,
            kind,
        }
    }

    pub fn with_outline(mut self, color: impl Into<String>, width: f64) -> Self {
        self.stroke = Some(color.into());
        self.stroke_width = Some(width);
        self
    }

    /// Scale an image to [`IMAGE_DISPLAY_WIDTH`] keeping its aspect ratio.
    ///
    /// The ratio is taken from the dimensions the shape carries on entry,
    /// so it must be called on the original size. Non-image shapes are left
    /// untouched.
    pub fn normalize_image(&mut self) {
        if self.kind.is_image() {
            let aspect_ratio = self.height / self.width;
            self.width = IMAGE_DISPLAY_WIDTH;
            self.height = IMAGE_DISPLAY_WIDTH * aspect_ratio;
        }
    }

    /// Boundary checks applied before a shape enters any store.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.id.is_empty() {
            return Err(ProtocolError::InvalidShape("empty shape id".to_string()));
        }
        let geometry = [self.x, self.y, self.width, self.height, self.rotation];
        if geometry.iter().any(|v| !v.is_finite()) {
            return Err(ProtocolError::InvalidShape(format!(
                "non-finite geometry on shape {}",
                self.id
            )));
        }
        if self.kind.is_image() && (self.width <= 0.0 || self.height <= 0.0) {
            return Err(ProtocolError::InvalidShape(format!(
                "image {} has no usable size ({}x{})",
                self.id, self.width, self.height
            )));
        }
        Ok(())
    }
}
