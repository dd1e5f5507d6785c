//! Mapping between classifier pixels, document coordinates and viewport
//! coordinates. Driver rects are document-relative; pointer events are not.
use crate::driver::query::Viewport;
use crate::geometry::{BBox, CoordinateScale};

/// Classifier-space box → document-relative driver box. The box is scaled
/// down by the multiplier, then shifted by the scroll offset (driver space)
/// that was in effect when the source capture was taken.
pub fn predicted_to_driver(predicted: &BBox, scale: CoordinateScale, scroll_offset: f64) -> BBox {
    scale.to_driver(predicted).translate_y(scroll_offset)
}

/// Document point → viewport point for pointer dispatch.
pub fn document_to_viewport(point: (f64, f64), scroll_offset: f64) -> (f64, f64) {
    (point.0, point.1 - scroll_offset)
}

/// Centre of a document rect, in viewport coordinates.
pub fn viewport_center(rect: &BBox, scroll_offset: f64) -> (f64, f64) {
    document_to_viewport(rect.center(), scroll_offset)
}

/// Whether the top edge of a document rect lies in the visible band.
pub fn top_in_viewport(rect: &BBox, scroll_offset: f64, viewport: Viewport) -> bool {
    rect.y >= scroll_offset && rect.y <= scroll_offset + viewport.height
}
