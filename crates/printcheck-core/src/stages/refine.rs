//! ROI refinement by exhaustive normalized cross-correlation search.

use image::{GrayImage, RgbImage};

use crate::domain::RoiBox;

/// Best placement of the ROI near its nominal position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Refinement {
    /// Refined box.
    pub roi: RoiBox,
    /// Offset from the nominal box.
    pub offset: (i32, i32),
    /// Zero-mean NCC in `[-1, 1]`.
    pub score: f32,
}

/// Matches a fixed reference crop against candidate placements.
#[derive(Debug, Clone)]
pub struct RoiRefiner {
    reference: Vec<f32>,
    ref_mean: f64,
    ref_norm: f64,
    width: u32,
    height: u32,
    radius: u32,
}

impl RoiRefiner {
    /// Prepares a refiner for `reference` searched within `radius` pixels.
    #[must_use]
    pub fn new(reference: &RgbImage, radius: u32) -> Self {
        let gray = image::imageops::grayscale(reference);
        let values: Vec<f32> = gray.as_raw().iter().copied().map(f32::from).collect();
        let (ref_mean, ref_norm) = mean_and_norm(values.iter().copied());
        Self {
            reference: values,
            ref_mean,
            ref_norm,
            width: reference.width(),
            height: reference.height(),
            radius,
        }
    }

    /// Reference width and height.
    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Scans every offset in `[-radius, radius]²`, `dy` outer and `dx` inner,
    /// and keeps the first best score. Candidates crossing the image edge are
    /// skipped. Returns `None` only when no candidate fits.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub fn refine(&self, card: &RgbImage, nominal: RoiBox) -> Option<Refinement> {
        let gray = image::imageops::grayscale(card);
        let r = self.radius as i32;
        let mut best: Option<Refinement> = None;

        for dy in -r..=r {
            for dx in -r..=r {
                let Some(candidate) = nominal.shifted(dx, dy) else {
                    continue;
                };
                let Some(score) = self.score(&gray, candidate) else {
                    continue;
                };
                if best.is_none_or(|b| score > b.score) {
                    best = Some(Refinement {
                        roi: candidate,
                        offset: (dx, dy),
                        score,
                    });
                }
            }
        }
        best
    }

    /// Zero-mean NCC between the reference and `region` of `gray`.
    ///
    /// Returns `None` unless `region` has the reference's size and lies inside
    /// `gray`. A flat patch on either side has no defined correlation and
    /// scores 0.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn score(&self, gray: &GrayImage, region: RoiBox) -> Option<f32> {
        if (region.width, region.height) != (self.width, self.height)
            || !region.fits_within(gray.width(), gray.height())
        {
            return None;
        }
        let patch = (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| f32::from(gray.get_pixel(region.x + x, region.y + y)[0]))
        });
        let (mean, norm) = mean_and_norm(patch.clone());
        if norm < 1e-9 || self.ref_norm < 1e-9 {
            return Some(0.0);
        }
        let cross: f64 = patch
            .zip(&self.reference)
            .map(|(p, r)| (f64::from(p) - mean) * (f64::from(*r) - self.ref_mean))
            .sum();
        Some((cross / (norm * self.ref_norm)).clamp(-1.0, 1.0) as f32)
    }
}

/// Mean and centered L2 norm.
#[allow(clippy::cast_precision_loss)]
fn mean_and_norm(values: impl Iterator<Item = f32> + Clone) -> (f64, f64) {
    let (sum, count) = values
        .clone()
        .fold((0.0, 0_usize), |(s, n), v| (s + f64::from(v), n + 1));
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let ss: f64 = values.map(|v| (f64::from(v) - mean).powi(2)).sum();
    (mean, ss.sqrt())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn noise_card(width: u32, height: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbImage::from_fn(width, height, |_, _| {
            let v: u8 = rng.random();
            Rgb([v, v, v])
        })
    }

    fn crop(card: &RgbImage, roi: RoiBox) -> RgbImage {
        image::imageops::crop_imm(card, roi.x, roi.y, roi.width, roi.height).to_image()
    }

    #[test]
    fn test_exact_copy_refines_to_zero_offset() {
        let card = noise_card(200, 200, 7);
        let nominal = RoiBox::new(60, 70, 40, 30);
        let refiner = RoiRefiner::new(&crop(&card, nominal), 8);
        let result = refiner.refine(&card, nominal).unwrap();
        assert_eq!(result.offset, (0, 0));
        assert_eq!(result.roi, nominal);
        assert!((result.score - 1.0).abs() < 1e-5, "{}", result.score);
    }

    #[test]
    fn test_shifted_reference_is_recovered() {
        let card = noise_card(200, 200, 11);
        let nominal = RoiBox::new(60, 70, 40, 30);
        let actual = nominal.shifted(3, -2).unwrap();
        let refiner = RoiRefiner::new(&crop(&card, actual), 8);
        let result = refiner.refine(&card, nominal).unwrap();
        assert_eq!(result.offset, (3, -2));
        assert!(result.score > 0.99);
    }

    #[test]
    fn test_out_of_bounds_offsets_skipped() {
        let card = noise_card(60, 50, 3);
        let nominal = RoiBox::new(0, 0, 20, 20);
        let refiner = RoiRefiner::new(&crop(&card, nominal), 8);
        let result = refiner.refine(&card, nominal).unwrap();
        assert_eq!(result.offset, (0, 0));
    }

    #[test]
    fn test_ties_resolve_to_first_scanned_offset() {
        // A flat card scores 0 everywhere; the first candidate in raster order wins.
        let card = RgbImage::from_pixel(100, 100, Rgb([90, 90, 90]));
        let nominal = RoiBox::new(40, 40, 10, 10);
        let refiner = RoiRefiner::new(&noise_card(10, 10, 5), 4);
        let result = refiner.refine(&card, nominal).unwrap();
        assert_eq!(result.offset, (-4, -4));
        assert!(result.score.abs() < f32::EPSILON);
    }

    #[test]
    fn test_unrelated_noise_scores_low() {
        let card = noise_card(120, 120, 1);
        let nominal = RoiBox::new(40, 40, 32, 32);
        let refiner = RoiRefiner::new(&noise_card(32, 32, 99), 8);
        let result = refiner.refine(&card, nominal).unwrap();
        assert!(result.score < 0.6, "{}", result.score);
    }

    #[test]
    fn test_inverted_patch_scores_minus_one() {
        let card = noise_card(50, 50, 21);
        let nominal = RoiBox::new(10, 10, 16, 16);
        let mut inverted = crop(&card, nominal);
        image::imageops::invert(&mut inverted);
        let refiner = RoiRefiner::new(&inverted, 0);
        let gray = image::imageops::grayscale(&card);
        assert!((refiner.score(&gray, nominal).unwrap() + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_score_rejects_regions_outside_or_mismatched() {
        let card = noise_card(40, 40, 4);
        let gray = image::imageops::grayscale(&card);
        let refiner = RoiRefiner::new(&noise_card(16, 16, 8), 2);
        assert!(refiner.score(&gray, RoiBox::new(24, 24, 16, 16)).is_some());
        assert!(refiner.score(&gray, RoiBox::new(25, 10, 16, 16)).is_none());
        assert!(refiner.score(&gray, RoiBox::new(10, 30, 16, 16)).is_none());
        assert!(refiner.score(&gray, RoiBox::new(0, 0, 8, 8)).is_none());
    }

    #[test]
    fn test_no_candidate_fits() {
        let card = noise_card(20, 20, 2);
        let refiner = RoiRefiner::new(&noise_card(30, 30, 2), 2);
        assert!(refiner.refine(&card, RoiBox::new(0, 0, 30, 30)).is_none());
    }
}
