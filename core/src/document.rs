//! The page store.
//!
//! [`Document`] is the authoritative state on the server and the local
//! mirror on each client. It is a plain value with no interior locking:
//! whoever owns it is responsible for serializing mutations.

use serde::{Deserialize, Serialize};

use crate::merge::{self, ShapePatch};
use crate::shape::Shape;
use crate::stroke::Stroke;
use crate::PageIndex;

/// One canvas surface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default, alias = "lines")]
    pub strokes: Vec<Stroke>,
    #[serde(default)]
    pub shapes: Vec<Shape>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.shapes.is_empty()
    }

    pub fn shape(&self, id: &str) -> Option<&Shape> {
        self.shapes.iter().find(|s| s.id == id)
    }

    pub fn contains_shape(&self, id: &str) -> bool {
        self.shape(id).is_some()
    }
}

/// Ordered collection of pages.
///
/// Pages are only ever appended; a page's index is its identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pages: Vec<Page>,
}

impl Document {
    /// Create a document with `initial_pages` empty pages
    pub fn new(initial_pages: usize) -> Self {
        Self {
            pages: vec![Page::new(); initial_pages],
        }
    }

    /// Rebuild a document from a received snapshot
    pub fn from_pages(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: PageIndex) -> Option<&Page> {
        self.pages.get(index)
    }

    /// Guarantee a page exists at `index`, creating empty pages up to it.
    pub fn ensure_page(&mut self, index: PageIndex) -> &mut Page {
        if index >= self.pages.len() {
            self.pages.resize_with(index + 1, Page::new);
        }
        &mut self.pages[index]
    }

    pub fn append_stroke(&mut self, index: PageIndex, stroke: Stroke) {
        self.ensure_page(index).strokes.push(stroke);
    }

    /// Add `shape` unless a shape with the same id already exists on the page.
    ///
    /// A repeated id is neither duplicated nor merged; returns whether the
    /// shape was added.
    pub fn upsert_shape(&mut self, index: PageIndex, shape: Shape) -> bool {
        let page = self.ensure_page(index);
        if page.contains_shape(&shape.id) {
            tracing::debug!("Shape {} already on page {}, ignoring create", shape.id, index);
            return false;
        }
        page.shapes.push(shape);
        true
    }

    /// Merge a partial update into an existing shape.
    ///
    /// A missing page or shape leaves the document untouched.
    pub fn merge_shape(&mut self, index: PageIndex, patch: &ShapePatch) -> bool {
        match self.pages.get_mut(index) {
            Some(page) => merge::merge_into(&mut page.shapes, patch),
            None => false,
        }
    }

    /// Replace the page's strokes and shapes with empty containers
    pub fn clear_page(&mut self, index: PageIndex) {
        *self.ensure_page(index) = Page::new();
    }

    /// Append an empty page and return the new page count
    pub fn append_page(&mut self) -> usize {
        self.pages.push(Page::new());
        self.pages.len()
    }

    /// Deep copy of every page, as sent to a newly connected participant
    pub fn snapshot(&self) -> Vec<Page> {
        self.pages.clone()
    }

    /// Pad with empty pages or truncate to exactly `len` pages
    pub fn resize(&mut self, len: usize) {
        self.pages.resize_with(len, Page::new);
    }

    /// Mutable access for in-progress local gestures
    pub fn stroke_mut(&mut self, index: PageIndex, stroke: usize) -> Option<&mut Stroke> {
        self.pages.get_mut(index)?.strokes.get_mut(stroke)
    }

    pub fn shape(&self, index: PageIndex, id: &str) -> Option<&Shape> {
        self.pages.get(index)?.shape(id)
    }

    pub fn stroke_count(&self) -> usize {
        self.pages.iter().map(|p| p.strokes.len()).sum()
    }

    pub fn shape_count(&self) -> usize {
        self.pages.iter().map(|p| p.shapes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::Tool;

    fn stroke(x: f64) -> Stroke {
        Stroke::begin(Tool::Pen, "#000000", 5.0, x, x)
    }

    #[test]
    fn test_ensure_page_fills_gaps() {
        let mut doc = Document::new(1);
        doc.ensure_page(3);
        assert_eq!(doc.len(), 4);
        assert!(doc.pages().iter().all(Page::is_empty));
    }

    #[test]
    fn test_strokes_keep_arrival_order() {
        let mut doc = Document::new(1);
        for i in 0..5 {
            doc.append_stroke(0, stroke(i as f64));
        }
        let xs: Vec<f64> = doc.pages()[0].strokes.iter().map(|s| s.points[0]).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_append_stroke_creates_missing_page() {
        let mut doc = Document::new(1);
        doc.append_stroke(2, stroke(1.0));
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.pages()[2].strokes.len(), 1);
    }

    #[test]
    fn test_upsert_does_not_duplicate() {
        let mut doc = Document::new(1);
        assert!(doc.upsert_shape(0, Shape::rectangle("s1", 1.0, 1.0)));
        assert!(!doc.upsert_shape(0, Shape::rectangle("s1", 9.0, 9.0)));
        assert_eq!(doc.pages()[0].shapes.len(), 1);
        assert_eq!(doc.shape(0, "s1").map(|s| s.x), Some(1.0));
    }

    #[test]
    fn test_same_id_on_different_pages() {
        let mut doc = Document::new(2);
        assert!(doc.upsert_shape(0, Shape::rectangle("s1", 1.0, 1.0)));
        assert!(doc.upsert_shape(1, Shape::circle("s1", 1.0, 1.0)));
        assert_eq!(doc.shape_count(), 2);
    }

    #[test]
    fn test_create_then_resize_scenario() {
        let mut doc = Document::new(1);
        doc.upsert_shape(0, Shape::rectangle("s1", 10.0, 10.0));
        doc.merge_shape(0, &ShapePatch::new("s1").with_size(50.0, 30.0));
        let shape = doc.shape(0, "s1").unwrap();
        assert_eq!((shape.x, shape.y, shape.width, shape.height), (10.0, 10.0, 50.0, 30.0));
    }

    #[test]
    fn test_merge_on_missing_page_changes_nothing() {
        let mut doc = Document::new(1);
        let before = doc.clone();
        assert!(!doc.merge_shape(5, &ShapePatch::new("s1").with_size(1.0, 1.0)));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_clear_page_resets_only_that_page() {
        let mut doc = Document::new(2);
        doc.append_stroke(0, stroke(1.0));
        doc.upsert_shape(0, Shape::rectangle("s1", 1.0, 1.0));
        doc.append_stroke(1, stroke(2.0));

        doc.clear_page(0);

        assert!(doc.pages()[0].is_empty());
        assert_eq!(doc.pages()[1].strokes.len(), 1);
    }

    #[test]
    fn test_append_page_returns_count() {
        let mut doc = Document::new(1);
        assert_eq!(doc.append_page(), 2);
        assert!(doc.pages()[1].is_empty());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut doc = Document::new(1);
        doc.append_stroke(0, stroke(1.0));
        let snapshot = doc.snapshot();
        doc.append_stroke(0, stroke(2.0));
        assert_eq!(snapshot[0].strokes.len(), 1);
    }

    #[test]
    fn test_resize_pads_and_truncates() {
        let mut doc = Document::from_pages(vec![Page::new(); 3]);
        doc.resize(12);
        assert_eq!(doc.len(), 12);
        doc.resize(2);
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_page_accepts_lines_alias() {
        let page: Page =
            serde_json::from_str(r#"{"lines":[{"points":[0,0]}],"shapes":[]}"#).unwrap();
        assert_eq!(page.strokes.len(), 1);
        let json = serde_json::to_value(&page).unwrap();
        assert!(json.get("strokes").is_some());
    }
}
