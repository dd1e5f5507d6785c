//! Rectangle arithmetic shared by the resolver, the template matcher and the
//! geographic disambiguator.
//!
//! Boxes carry no coordinate-space tag of their own; callers keep every box
//! used in a comparison in the same space (classifier pixels, driver logical
//! pixels, or screen fractions) and convert with [`CoordinateScale`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Zero-area boxes can never be matched.
    pub fn is_degenerate(&self) -> bool {
        self.area() <= 0.0
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn translate_y(self, dy: f64) -> Self {
        Self { y: self.y + dy, ..self }
    }

    /// Divide every coordinate by the screen dimensions, yielding [0,1] fractions.
    pub fn to_screen_fraction(&self, screen_w: f64, screen_h: f64) -> Self {
        if screen_w <= 0.0 || screen_h <= 0.0 {
            return *self;
        }
        Self {
            x: self.x / screen_w,
            y: self.y / screen_h,
            width: self.width / screen_w,
            height: self.height / screen_h,
        }
    }

    /// True when the whole box lies within a `w` × `h` raster.
    pub fn fits_within(&self, w: f64, h: f64) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.right() <= w && self.bottom() <= h
    }
}

pub fn overlap_area(a: &BBox, b: &BBox) -> f64 {
    let dx = a.right().min(b.right()) - a.x.max(b.x);
    let dy = a.bottom().min(b.bottom()) - a.y.max(b.y);
    if dx >= 0.0 && dy >= 0.0 {
        dx * dy
    } else {
        0.0
    }
}

/// Intersection over union. Returns 0 instead of dividing by zero when both
/// boxes are degenerate.
pub fn iou(a: &BBox, b: &BBox) -> f64 {
    let overlap = overlap_area(a, b);
    let union = a.area() + b.area() - overlap;
    if union <= 0.0 {
        0.0
    } else {
        overlap / union
    }
}

/// Whether the centre of `inner` lies strictly inside `outer`.
pub fn center_contained(inner: &BBox, outer: &BBox) -> bool {
    let (cx, cy) = inner.center();
    cx > outer.x && cx < outer.right() && cy > outer.y && cy < outer.bottom()
}

/// Euclidean distance between two points.
pub fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Classifier pixels per driver pixel. Never below 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateScale {
    multiplier: f64,
}

impl CoordinateScale {
    pub fn new(multiplier: f64) -> Self {
        let multiplier = if multiplier.is_finite() { multiplier.max(1.0) } else { 1.0 };
        Self { multiplier }
    }

    /// Derive the scale from a capture width and the driver's logical viewport width.
    pub fn from_widths(screenshot_width: u32, viewport_width: f64) -> Self {
        if viewport_width <= 0.0 {
            return Self::new(1.0);
        }
        Self::new(screenshot_width as f64 / viewport_width)
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Classifier space → driver space.
    pub fn to_driver(&self, b: &BBox) -> BBox {
        let m = self.multiplier;
        BBox::new(b.x / m, b.y / m, b.width / m, b.height / m)
    }

    /// Driver space → classifier space.
    pub fn to_classifier(&self, b: &BBox) -> BBox {
        let m = self.multiplier;
        BBox::new(b.x * m, b.y * m, b.width * m, b.height * m)
    }

    pub fn offset_to_driver(&self, offset: f64) -> f64 {
        offset / self.multiplier
    }

    pub fn offset_to_classifier(&self, offset: f64) -> f64 {
        offset * self.multiplier
    }
}

impl Default for CoordinateScale {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn iou_of_box_with_itself_is_one() {
        let a = BBox::new(10.0, 20.0, 30.0, 40.0);
        assert!((iou(&a, &a) - 1.0).abs() < EPS);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(50.0, 50.0, 10.0, 10.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn iou_of_degenerate_boxes_does_not_divide_by_zero() {
        let a = BBox::new(5.0, 5.0, 0.0, 0.0);
        assert_eq!(iou(&a, &a), 0.0);
        assert!(a.is_degenerate());
    }

    #[test]
    fn iou_partial_overlap() {
        let a = BBox::new(50.0, 25.0, 20.0, 10.0);
        let b = BBox::new(40.0, 20.0, 40.0, 20.0);
        assert!((iou(&a, &b) - 0.25).abs() < EPS);
    }

    #[test]
    fn center_containment_is_exclusive() {
        let outer = BBox::new(0.0, 0.0, 10.0, 10.0);
        assert!(center_contained(&BBox::new(4.0, 4.0, 2.0, 2.0), &outer));
        // centre (10,5) sits on the right edge
        assert!(!center_contained(&BBox::new(8.0, 4.0, 4.0, 2.0), &outer));
    }

    #[test]
    fn center_containment_and_iou_are_distinct_predicates() {
        let target = BBox::new(100.0, 100.0, 10.0, 10.0);
        let container = BBox::new(0.0, 0.0, 1000.0, 1000.0);
        assert!(center_contained(&target, &container));
        assert!(iou(&target, &container) < 0.001);
    }

    #[test]
    fn coordinate_round_trip() {
        let b = BBox::new(13.0, 7.5, 101.25, 3.0);
        for m in [1.0, 1.5, 2.0, 3.0, 2.625] {
            let scale = CoordinateScale::new(m);
            let back = scale.to_driver(&scale.to_classifier(&b));
            assert!((back.x - b.x).abs() < EPS);
            assert!((back.y - b.y).abs() < EPS);
            assert!((back.width - b.width).abs() < EPS);
            assert!((back.height - b.height).abs() < EPS);
        }
    }

    #[test]
    fn multiplier_never_below_one() {
        assert_eq!(CoordinateScale::new(0.0).multiplier(), 1.0);
        assert_eq!(CoordinateScale::new(0.5).multiplier(), 1.0);
        assert_eq!(CoordinateScale::from_widths(2560, 1280.0).multiplier(), 2.0);
        assert_eq!(CoordinateScale::from_widths(800, 0.0).multiplier(), 1.0);
    }

    #[test]
    fn fits_within_rejects_partial_boxes() {
        assert!(BBox::new(0.0, 0.0, 10.0, 10.0).fits_within(10.0, 10.0));
        assert!(!BBox::new(5.0, 0.0, 10.0, 10.0).fits_within(10.0, 10.0));
        assert!(!BBox::new(-1.0, 0.0, 5.0, 5.0).fits_within(10.0, 10.0));
    }
}
