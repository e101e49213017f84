//! Planar point geometry for card corners.

use serde::{Deserialize, Serialize};

/// A 2-D point in image coordinates (x grows right, y grows down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    /// Horizontal coordinate in pixels.
    pub x: f64,
    /// Vertical coordinate in pixels.
    pub y: f64,
}

impl Point2 {
    /// Creates a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl<T: Into<f64>> From<imageproc::point::Point<T>> for Point2 {
    fn from(p: imageproc::point::Point<T>) -> Self {
        Self::new(p.x.into(), p.y.into())
    }
}

/// Orders four corners as top-left, top-right, bottom-right, bottom-left.
///
/// The point with the smallest `x + y` is top-left and the largest is
/// bottom-right; the smallest `x - y` is top-right and the largest is
/// bottom-left. This only holds for convex, roughly upright quadrilaterals.
/// Heavily skewed input produces a degenerate order, which [`CornerSet::validate`]
/// rejects downstream.
#[must_use]
pub fn order_points(points: [Point2; 4]) -> [Point2; 4] {
    let pick = |key: fn(&Point2) -> f64, want_max: bool| -> Point2 {
        let mut best = points[0];
        for p in &points[1..] {
            let better = if want_max {
                key(p) > key(&best)
            } else {
                key(p) < key(&best)
            };
            if better {
                best = *p;
            }
        }
        best
    };

    let sum = |p: &Point2| p.x + p.y;
    let diff = |p: &Point2| p.x - p.y;

    [
        pick(sum, false),
        pick(diff, true),
        pick(sum, true),
        pick(diff, false),
    ]
}

/// Shoelace area of a closed polygon. Positive for clockwise order in image
/// coordinates.
#[must_use]
pub fn signed_area(polygon: &[Point2]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for (i, a) in polygon.iter().enumerate() {
        let b = polygon[(i + 1) % polygon.len()];
        acc += a.x * b.y - b.x * a.y;
    }
    acc / 2.0
}

/// Four card corners in top-left, top-right, bottom-right, bottom-left order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CornerSet([Point2; 4]);

impl CornerSet {
    /// Canonicalizes four detected corners with [`order_points`].
    #[must_use]
    pub fn from_unordered(points: [Point2; 4]) -> Self {
        Self(order_points(points))
    }

    /// The corners of an axis-aligned `width` x `height` image, inclusive of
    /// the last pixel row and column.
    #[must_use]
    pub fn of_rect(width: u32, height: u32) -> Self {
        let w = f64::from(width.max(1) - 1);
        let h = f64::from(height.max(1) - 1);
        Self([
            Point2::new(0.0, 0.0),
            Point2::new(w, 0.0),
            Point2::new(w, h),
            Point2::new(0.0, h),
        ])
    }

    /// The ordered corners.
    #[must_use]
    pub const fn points(&self) -> &[Point2; 4] {
        &self.0
    }

    /// Absolute polygon area.
    #[must_use]
    pub fn area(&self) -> f64 {
        signed_area(&self.0).abs()
    }

    /// True when every turn has the same orientation and no edge collapses.
    #[must_use]
    pub fn is_convex(&self) -> bool {
        let mut sign = 0.0_f64;
        for i in 0..4 {
            let a = self.0[i];
            let b = self.0[(i + 1) % 4];
            let c = self.0[(i + 2) % 4];
            let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
            if cross.abs() < f64::EPSILON {
                return false;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }

    /// Checks that the corners span a usable convex quadrilateral.
    ///
    /// # Errors
    ///
    /// Returns a description of the defect when the area is below
    /// `min_area` or the polygon is not convex.
    pub fn validate(&self, min_area: f64) -> Result<(), String> {
        let area = self.area();
        if !area.is_finite() || area < min_area {
            return Err(format!("corner polygon area {area:.1} is below {min_area:.1}"));
        }
        if !self.is_convex() {
            return Err("corner polygon is not convex".to_string());
        }
        Ok(())
    }
}
