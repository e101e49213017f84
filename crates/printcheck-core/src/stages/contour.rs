//! Contour extraction and polygon approximation.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

use crate::domain::{signed_area, Point2};

/// Traced outer border of a foreground region.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    points: Vec<Point<i32>>,
}

impl Contour {
    /// Wraps traced border pixels.
    #[must_use]
    pub fn new(points: Vec<Point<i32>>) -> Self {
        Self { points }
    }

    /// Border pixels in tracing order.
    #[must_use]
    pub fn points(&self) -> &[Point<i32>] {
        &self.points
    }

    /// Enclosed area by the shoelace formula.
    #[must_use]
    pub fn area(&self) -> f64 {
        signed_area(&self.as_point2()).abs()
    }

    /// Closed perimeter length.
    #[must_use]
    pub fn perimeter(&self) -> f64 {
        imageproc::geometry::arc_length(&self.points, true)
    }

    /// Points converted to floating point.
    #[must_use]
    pub fn as_point2(&self) -> Vec<Point2> {
        self.points.iter().copied().map(Point2::from).collect()
    }
}

/// The outermost contour enclosing the largest area, if the image has any
/// foreground at all.
#[must_use]
pub fn largest_external_contour(binary: &GrayImage) -> Option<Contour> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Contour::new(c.points))
        .max_by(|a, b| a.area().total_cmp(&b.area()))
}

/// Douglas-Peucker simplification of a closed curve.
///
/// The curve is split at its two mutually farthest points so the result does
/// not depend on where tracing started. `epsilon` is an absolute distance.
///
/// `imageproc::geometry::approximate_polygon_dp` anchors a closed curve at its
/// first point, which keeps the traced start pixel as a vertex and changes
/// the vertex set with the start; quadrilateral detection needs it stable.
#[must_use]
pub fn approx_polygon(curve: &[Point2], epsilon: f64) -> Vec<Point2> {
    let n = curve.len();
    if n < 3 {
        return curve.to_vec();
    }

    let farthest_from = |i: usize| -> usize {
        (0..n)
            .max_by(|&a, &b| {
                curve[i]
                    .distance(curve[a])
                    .total_cmp(&curve[i].distance(curve[b]))
            })
            .unwrap_or(i)
    };
    let a = farthest_from(0);
    let b = farthest_from(a);
    if a == b {
        return vec![curve[a]];
    }

    let chain = |from: usize, to: usize| -> Vec<Point2> {
        let len = (to + n - from) % n;
        (0..=len).map(|k| curve[(from + k) % n]).collect()
    };

    let mut polygon = simplify_open(&chain(a, b), epsilon);
    polygon.pop();
    let mut back = simplify_open(&chain(b, a), epsilon);
    back.pop();
    polygon.extend(back);
    polygon
}

/// Douglas-Peucker on an open chain, keeping both endpoints.
fn simplify_open(chain: &[Point2], epsilon: f64) -> Vec<Point2> {
    if chain.len() < 3 {
        return chain.to_vec();
    }
    let mut keep = vec![false; chain.len()];
    keep[0] = true;
    keep[chain.len() - 1] = true;

    let mut stack = vec![(0, chain.len() - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (index, dist) = (start + 1..end)
            .map(|i| (i, segment_distance(chain[i], chain[start], chain[end])))
            .max_by(|x, y| x.1.total_cmp(&y.1))
            .unwrap_or((start, 0.0));
        if dist > epsilon {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }

    chain
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Perpendicular distance from `p` to the line through `a` and `b`, or the
/// distance to `a` when they coincide.
fn segment_distance(p: Point2, a: Point2, b: Point2) -> f64 {
    let len = a.distance(b);
    if len < f64::EPSILON {
        return p.distance(a);
    }
    ((b.x - a.x) * (a.y - p.y) - (a.x - p.x) * (b.y - a.y)).abs() / len
}
