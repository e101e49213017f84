//! 3x3 projective transforms estimated with a normalized DLT.

use nalgebra::{Matrix3, SMatrix, SVector, SymmetricEigen, Vector3};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::Point2;

const EPS: f64 = 1e-12;

/// A planar projective transform mapping source coordinates to target
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(Matrix3<f64>);

impl Homography {
    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    /// Wraps an existing matrix.
    #[must_use]
    pub const fn from_matrix(m: Matrix3<f64>) -> Self {
        Self(m)
    }

    /// Pure scaling about the origin.
    #[must_use]
    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self(Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0))
    }

    /// The underlying matrix.
    #[must_use]
    pub const fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    /// Applies `self` first, then `next`.
    #[must_use]
    pub fn then(&self, next: &Self) -> Self {
        Self(next.0 * self.0)
    }

    /// The inverse transform, if the matrix is invertible.
    #[must_use]
    pub fn inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    /// Maps a point, or `None` when it lands on the line at infinity.
    #[must_use]
    pub fn apply(&self, p: Point2) -> Option<Point2> {
        let v = self.0 * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() <= EPS || !v[0].is_finite() || !v[1].is_finite() {
            return None;
        }
        Some(Point2::new(v[0] / w, v[1] / w))
    }

    /// Distance between `dst` and the image of `src`.
    #[must_use]
    pub fn reprojection_error(&self, src: Point2, dst: Point2) -> f64 {
        self.apply(src).map_or(f64::INFINITY, |p| p.distance(dst))
    }

    /// Estimates the transform mapping each `src[i]` onto `dst[i]`.
    ///
    /// Uses the direct linear transform on Hartley-normalized coordinates and
    /// takes the eigenvector of the smallest eigenvalue of `AᵀA`. Exactly four
    /// correspondences give an exact fit; more give a least-squares fit.
    /// Returns `None` for fewer than four pairs or a degenerate configuration.
    #[must_use]
    pub fn from_correspondences(src: &[Point2], dst: &[Point2]) -> Option<Self> {
        if src.len() < 4 || src.len() != dst.len() {
            return None;
        }
        let (t_src, src_n) = normalize(src)?;
        let (t_dst, dst_n) = normalize(dst)?;

        let mut ata = SMatrix::<f64, 9, 9>::zeros();
        for (s, d) in src_n.iter().zip(&dst_n) {
            let rows = [
                SVector::<f64, 9>::from_row_slice(&[
                    0.0,
                    0.0,
                    0.0,
                    -s.x,
                    -s.y,
                    -1.0,
                    d.y * s.x,
                    d.y * s.y,
                    d.y,
                ]),
                SVector::<f64, 9>::from_row_slice(&[
                    s.x,
                    s.y,
                    1.0,
                    0.0,
                    0.0,
                    0.0,
                    -d.x * s.x,
                    -d.x * s.y,
                    -d.x,
                ]),
            ];
            for row in &rows {
                ata += row * row.transpose();
            }
        }

        let eig = SymmetricEigen::new(ata);
        let (min_idx, _) = eig
            .eigenvalues
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))?;
        let h = eig.eigenvectors.column(min_idx);
        let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        let h = t_dst.try_inverse()? * h_norm * t_src;
        let scale = h[(2, 2)];
        if !scale.is_finite() || scale.abs() < EPS {
            return None;
        }
        let h = h / scale;
        if h.determinant().abs() < EPS || h.iter().any(|v| !v.is_finite()) {
            return None;
        }
        Some(Self(h))
    }
}

impl Serialize for Homography {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let m = &self.0;
        let rows: [[f64; 3]; 3] =
            std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]));
        rows.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Homography {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = <[[f64; 3]; 3]>::deserialize(deserializer)?;
        Ok(Self(Matrix3::from_fn(|r, c| rows[r][c])))
    }
}

/// Translates the centroid to the origin and scales the mean distance to
/// sqrt(2).
#[allow(clippy::cast_precision_loss)]
fn normalize(points: &[Point2]) -> Option<(Matrix3<f64>, Vec<Point2>)> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| (p.x - cx).hypot(p.y - cy))
        .sum::<f64>()
        / n;
    if mean_dist <= EPS {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;

    // All points on one line leave the fit underdetermined.
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for p in points {
        let (dx, dy) = (s * (p.x - cx), s * (p.y - cy));
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    let trace = sxx + syy;
    let det = sxx * syy - sxy * sxy;
    let min_eig = trace / 2.0 - ((trace / 2.0).powi(2) - det).max(0.0).sqrt();
    if min_eig / n < 1e-6 {
        return None;
    }

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| Point2::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    Some((t, normalized))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn reference() -> Homography {
        Homography::from_matrix(Matrix3::new(
            1.2, 0.05, 30.0, -0.04, 1.1, 12.0, 0.0002, -0.0001, 1.0,
        ))
    }

    #[test]
    fn test_exact_four_point_fit() {
        let h_true = reference();
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(399.0, 0.0),
            Point2::new(399.0, 559.0),
            Point2::new(0.0, 559.0),
        ];
        let dst: Vec<Point2> = src.iter().map(|&p| h_true.apply(p).unwrap()).collect();
        let h = Homography::from_correspondences(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            assert!(h.reprojection_error(*s, *d) < 1e-6);
        }
    }

    #[test]
    fn test_overdetermined_fit() {
        let h_true = reference();
        let mut src = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                src.push(Point2::new(f64::from(i) * 40.0, f64::from(j) * 55.0));
            }
        }
        let dst: Vec<Point2> = src.iter().map(|&p| h_true.apply(p).unwrap()).collect();
        let h = Homography::from_correspondences(&src, &dst).unwrap();
        let sample = Point2::new(77.0, 131.0);
        assert!(h.apply(sample).unwrap().distance(h_true.apply(sample).unwrap()) < 1e-6);
    }

    #[test]
    fn test_identity_fit() {
        let corners = [
            Point2::new(0.0, 0.0),
            Point2::new(9.0, 0.0),
            Point2::new(9.0, 9.0),
            Point2::new(0.0, 9.0),
        ];
        let h = Homography::from_correspondences(&corners, &corners).unwrap();
        assert!((h.matrix() - Matrix3::identity()).abs().max() < 1e-9);
    }

    #[test]
    fn test_collinear_points_rejected() {
        let line: Vec<Point2> = (0..4).map(|i| Point2::new(f64::from(i), f64::from(i))).collect();
        let dst = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        assert!(Homography::from_correspondences(&line, &dst).is_none());
    }

    #[test]
    fn test_too_few_points() {
        let p = [Point2::new(0.0, 0.0); 3];
        assert!(Homography::from_correspondences(&p, &p).is_none());
    }

    #[test]
    fn test_then_composes_in_order() {
        let shift = Homography::from_matrix(Matrix3::new(1.0, 0.0, 5.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0));
        let double = Homography::scaling(2.0, 2.0);
        let p = shift.then(&double).apply(Point2::new(1.0, 1.0)).unwrap();
        assert_eq!(p, Point2::new(12.0, 2.0));
    }

    #[test]
    fn test_inverse_round_trip() {
        let h = reference();
        let p = Point2::new(100.0, 200.0);
        let back = h.inverse().unwrap().apply(h.apply(p).unwrap()).unwrap();
        assert!(back.distance(p) < 1e-9);
    }
}
