//! Perspective rectification onto the canonical card frame.

use image::{Rgb, RgbImage};

use crate::config::CardSize;
use crate::domain::{CornerSet, Homography, Point2};
use crate::error::PipelineError;

/// Lanczos window half-width in pixels.
const LANCZOS_A: i64 = 3;

/// Warps source images so that a card's ordered corners land on the corners
/// of the canonical rectangle.
#[derive(Debug, Clone, Copy)]
pub struct PerspectiveRectifier {
    size: CardSize,
}

impl PerspectiveRectifier {
    /// Creates a rectifier for the given canonical size.
    #[must_use]
    pub const fn new(size: CardSize) -> Self {
        Self { size }
    }

    /// Source-to-card homography for ordered `corners`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DegenerateCorners`] for zero-area or
    /// non-convex corner sets.
    pub fn homography(&self, corners: &CornerSet) -> Result<Homography, PipelineError> {
        corners
            .validate(1.0)
            .map_err(PipelineError::DegenerateCorners)?;
        let dst = CornerSet::of_rect(self.size.width, self.size.height);
        Homography::from_correspondences(corners.points(), dst.points()).ok_or_else(|| {
            PipelineError::DegenerateCorners("corners admit no homography".to_string())
        })
    }

    /// Rectifies `image` into a canonical-size card.
    ///
    /// # Errors
    ///
    /// See [`Self::homography`].
    pub fn rectify(
        &self,
        image: &RgbImage,
        corners: &CornerSet,
    ) -> Result<(RgbImage, Homography), PipelineError> {
        let h = self.homography(corners)?;
        let out = warp_perspective(image, &h, self.size.width, self.size.height)
            .ok_or_else(|| PipelineError::DegenerateCorners("homography is singular".to_string()))?;
        Ok((out, h))
    }
}

/// Resamples `image` through `h` (source to output) into a `width` x `height`
/// image with Lanczos-3 interpolation.
///
/// Output pixels whose preimage falls more than half a pixel outside the
/// source are black; samples near the edge clamp to the border. Returns
/// `None` when `h` is not invertible.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn warp_perspective(
    image: &RgbImage,
    h: &Homography,
    width: u32,
    height: u32,
) -> Option<RgbImage> {
    let inv = h.inverse()?;
    let (src_w, src_h) = (f64::from(image.width()), f64::from(image.height()));
    let mut out = RgbImage::new(width, height);

    for v in 0..height {
        for u in 0..width {
            let Some(p) = inv.apply(Point2::new(f64::from(u), f64::from(v))) else {
                continue;
            };
            if p.x < -0.5 || p.y < -0.5 || p.x > src_w - 0.5 || p.y > src_h - 0.5 {
                continue;
            }
            out.put_pixel(u, v, sample_lanczos(image, p.x, p.y));
        }
    }
    Some(out)
}

fn lanczos(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        return 1.0;
    }
    let a = LANCZOS_A as f64;
    if x.abs() >= a {
        return 0.0;
    }
    let px = std::f64::consts::PI * x;
    a * px.sin() * (px / a).sin() / (px * px)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
fn sample_lanczos(image: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (w, h) = (i64::from(image.width()), i64::from(image.height()));
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;

    let taps = (2 * LANCZOS_A) as usize;
    let mut wx = [0.0; 6];
    let mut wy = [0.0; 6];
    for i in 0..taps {
        let offset = i as i64 - LANCZOS_A + 1;
        wx[i] = lanczos(x - (x0 + offset) as f64);
        wy[i] = lanczos(y - (y0 + offset) as f64);
    }

    let mut acc = [0.0_f64; 3];
    let mut total = 0.0;
    for (j, wyj) in wy.iter().enumerate() {
        let sy = (y0 + j as i64 - LANCZOS_A + 1).clamp(0, h - 1) as u32;
        for (i, wxi) in wx.iter().enumerate() {
            let sx = (x0 + i as i64 - LANCZOS_A + 1).clamp(0, w - 1) as u32;
            let weight = wxi * wyj;
            let px = image.get_pixel(sx, sy);
            for c in 0..3 {
                acc[c] += weight * f64::from(px[c]);
            }
            total += weight;
        }
    }
    if total.abs() < 1e-12 {
        return *image.get_pixel(x0.clamp(0, w - 1) as u32, y0.clamp(0, h - 1) as u32);
    }
    Rgb(acc.map(|v| (v / total).round().clamp(0.0, 255.0) as u8))
}
