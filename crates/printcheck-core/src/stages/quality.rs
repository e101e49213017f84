//! Contrast normalization and the ROI quality gate.

use image::{GrayImage, Rgb, RgbImage};

use super::color::{rgb_to_ycrcb, ycrcb_to_rgb};
use crate::config::QualityConfig;
use crate::domain::Verdict;

/// 256-bin histogram of luminance values.
#[derive(Debug, Clone)]
pub struct Histogram {
    bins: [u64; 256],
    total: u64,
}

impl Histogram {
    /// Compute histogram from grayscale image.
    #[must_use]
    pub fn from_luma(image: &GrayImage) -> Self {
        Self::from_region(image, 0..image.width(), 0..image.height())
    }

    /// Histogram of the pixels in `xs` x `ys`.
    #[must_use]
    pub fn from_region(
        image: &GrayImage,
        xs: std::ops::Range<u32>,
        ys: std::ops::Range<u32>,
    ) -> Self {
        let mut bins = [0u64; 256];
        for y in ys {
            for x in xs.clone() {
                bins[usize::from(image.get_pixel(x, y)[0])] += 1;
            }
        }
        let total = bins.iter().sum();
        Self { bins, total }
    }

    /// Returns the total pixel count.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Caps every bin at `limit` and spreads the excess evenly over all bins.
    pub fn clip(&mut self, limit: u64) {
        let mut excess = 0;
        for bin in &mut self.bins {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let per_bin = excess / 256;
        let residual = excess % 256;
        for (i, bin) in self.bins.iter_mut().enumerate() {
            *bin += per_bin + u64::from((i as u64) < residual);
        }
    }

    /// Cumulative-distribution lookup table mapping luminance to `0..=255`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn equalization_lut(&self) -> [u8; 256] {
        let mut lut = [0u8; 256];
        if self.total == 0 {
            for (i, v) in lut.iter_mut().enumerate() {
                *v = i as u8;
            }
            return lut;
        }
        let scale = 255.0 / self.total as f64;
        let mut acc = 0u64;
        for (bin, v) in self.bins.iter().zip(lut.iter_mut()) {
            acc += bin;
            *v = (acc as f64 * scale).round().min(255.0) as u8;
        }
        lut
    }
}

/// Contrast-limited adaptive histogram equalization of a grayscale image.
///
/// `tiles` per side (reduced for tiny images); per-tile lookup tables are
/// bilinearly blended between tile centers.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]
pub fn clahe(gray: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let tile_w = width.div_ceil(tiles.clamp(1, width));
    let tile_h = height.div_ceil(tiles.clamp(1, height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let xs = tx * tile_w..((tx + 1) * tile_w).min(width);
            let ys = ty * tile_h..((ty + 1) * tile_h).min(height);
            let mut hist = Histogram::from_region(gray, xs, ys);
            let limit = ((f64::from(clip_limit) * hist.total() as f64 / 256.0) as u64).max(1);
            hist.clip(limit);
            luts.push(hist.equalization_lut());
        }
    }

    let lut_at = |tx: i64, ty: i64| &luts[(ty as u32 * tiles_x + tx as u32) as usize];
    let (last_x, last_y) = (i64::from(tiles_x) - 1, i64::from(tiles_y) - 1);

    GrayImage::from_fn(width, height, |x, y| {
        let v = usize::from(gray.get_pixel(x, y)[0]);
        let fx = f64::from(x) / f64::from(tile_w) - 0.5;
        let fy = f64::from(y) / f64::from(tile_h) - 0.5;
        let (x1, y1) = (fx.floor() as i64, fy.floor() as i64);
        let (ax, ay) = (fx - x1 as f64, fy - y1 as f64);
        let (x1c, x2c) = (x1.clamp(0, last_x), (x1 + 1).clamp(0, last_x));
        let (y1c, y2c) = (y1.clamp(0, last_y), (y1 + 1).clamp(0, last_y));

        let top = f64::from(lut_at(x1c, y1c)[v]) * (1.0 - ax) + f64::from(lut_at(x2c, y1c)[v]) * ax;
        let bottom =
            f64::from(lut_at(x1c, y2c)[v]) * (1.0 - ax) + f64::from(lut_at(x2c, y2c)[v]) * ax;
        image::Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

/// Variance of the 4-neighbour Laplacian, with mirrored borders.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (width, height) = gray.dimensions();
    if width < 2 || height < 2 {
        return 0.0;
    }
    let reflect = |i: i64, n: u32| -> u32 {
        let n = i64::from(n);
        let r = if i < 0 {
            -i
        } else if i >= n {
            2 * n - 2 - i
        } else {
            i
        };
        r as u32
    };
    let at = |x: i64, y: i64| f64::from(gray.get_pixel(reflect(x, width), reflect(y, height))[0]);

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for y in 0..i64::from(height) {
        for x in 0..i64::from(width) {
            let lap = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }
    let n = f64::from(width) * f64::from(height);
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

/// Outcome of the quality gate.
#[derive(Debug, Clone)]
pub struct Assessment {
    /// Contrast-normalized crop.
    pub crop: RgbImage,
    /// Laplacian variance of the crop before normalization.
    pub sharpness: f64,
    /// Verdict.
    pub verdict: Verdict,
}

/// Normalizes ROI crops and classifies their usability.
#[derive(Debug, Clone, Copy)]
pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    /// Creates a gate.
    #[must_use]
    pub const fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Equalizes the luminance channel with CLAHE, leaving chroma untouched.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn normalize(&self, crop: &RgbImage) -> RgbImage {
        let ycrcb: Vec<[f32; 3]> = crop.pixels().map(|p| rgb_to_ycrcb(p.0)).collect();
        let luma = GrayImage::from_fn(crop.width(), crop.height(), |x, y| {
            let y_val = ycrcb[(y * crop.width() + x) as usize][0];
            image::Luma([y_val.round().clamp(0.0, 255.0) as u8])
        });
        let equalized = clahe(&luma, self.config.clahe_clip_limit, self.config.clahe_tiles);
        RgbImage::from_fn(crop.width(), crop.height(), |x, y| {
            let [_, cr, cb] = ycrcb[(y * crop.width() + x) as usize];
            Rgb(ycrcb_to_rgb([f32::from(equalized.get_pixel(x, y)[0]), cr, cb]))
        })
    }

    /// Applies the checks in order: blur first, then match score.
    #[must_use]
    pub fn verdict(&self, sharpness: f64, match_score: f32) -> Verdict {
        if sharpness < self.config.blur_threshold {
            Verdict::Blurry
        } else if match_score < self.config.match_threshold {
            Verdict::LowMatch
        } else {
            Verdict::Ok
        }
    }

    /// Gates `crop` and normalizes it. The crop is returned whatever the verdict.
    ///
    /// Sharpness is measured on the crop as captured: CLAHE stretches faint
    /// sensor noise into strong edges.
    #[must_use]
    pub fn assess(&self, crop: &RgbImage, match_score: f32) -> Assessment {
        let sharpness = laplacian_variance(&image::imageops::grayscale(crop));
        Assessment {
            verdict: self.verdict(sharpness, match_score),
            crop: self.normalize(crop),
            sharpness,
        }
    }
}

#[cfg(test)]
#[allow(clippy::cast_possible_truncation)]
mod tests {
    use super::*;
    use image::Luma;

    fn checkerboard(width: u32, height: u32, cell: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Rgb([220, 210, 60])
            } else {
                Rgb([20, 40, 90])
            }
        })
    }

    #[test]
    fn test_histogram_clip_preserves_total() {
        let img = GrayImage::from_fn(16, 16, |x, _| Luma([if x < 12 { 10 } else { 200 }]));
        let mut hist = Histogram::from_luma(&img);
        assert_eq!(hist.total(), 256);
        hist.clip(4);
        let lut = hist.equalization_lut();
        assert_eq!(lut[255], 255);
        assert!(lut[10] < lut[200]);
    }

    #[test]
    fn test_empty_histogram_lut_is_identity() {
        let hist = Histogram::from_region(&GrayImage::new(4, 4), 0..0, 0..0);
        assert_eq!(hist.equalization_lut()[77], 77);
    }

    #[test]
    fn test_clahe_flat_stays_flat() {
        let flat = GrayImage::from_pixel(64, 48, Luma([128]));
        let out = clahe(&flat, 2.0, 8);
        let first = out.get_pixel(0, 0)[0];
        assert!(out.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn test_clahe_does_not_reduce_contrast() {
        let img = GrayImage::from_fn(256, 256, |x, y| {
            Luma([100 + u8::from((x / 4 + y / 4) % 2 == 0) * 10])
        });
        let out = clahe(&img, 2.0, 8);
        let (min, max) = out
            .pixels()
            .fold((255, 0), |(lo, hi), p| (p[0].min(lo), p[0].max(hi)));
        assert!(max - min >= 10, "range {min}..{max}");
    }

    #[test]
    fn test_clahe_tiny_image() {
        let img = GrayImage::from_fn(3, 2, |x, _| Luma([x as u8 * 50]));
        assert_eq!(clahe(&img, 2.0, 8).dimensions(), (3, 2));
    }

    #[test]
    fn test_laplacian_variance_flat_is_zero() {
        let flat = GrayImage::from_pixel(32, 32, Luma([77]));
        assert!(laplacian_variance(&flat) < f64::EPSILON);
    }

    #[test]
    fn test_laplacian_variance_checkerboard_is_high() {
        let board = image::imageops::grayscale(&checkerboard(32, 32, 4));
        assert!(laplacian_variance(&board) > 1000.0);
    }

    #[test]
    fn test_flat_crop_is_blurry() {
        let gate = QualityGate::new(QualityConfig::default());
        let flat = RgbImage::from_pixel(40, 30, Rgb([128, 128, 128]));
        let assessment = gate.assess(&flat, 1.0);
        assert_eq!(assessment.verdict, Verdict::Blurry);
        assert_eq!(assessment.crop.dimensions(), (40, 30));
    }

    #[test]
    fn test_near_flat_noise_is_blurry() {
        let gate = QualityGate::new(QualityConfig::default());
        let noise = RgbImage::from_fn(110, 90, |x, y| {
            let v = if (x * 7 + y * 13 + x * y) % 3 == 0 { 128 } else { 127 };
            Rgb([v, v, v])
        });
        let assessment = gate.assess(&noise, 0.9);
        assert!(assessment.sharpness < 20.0, "sharpness {}", assessment.sharpness);
        assert_eq!(assessment.verdict, Verdict::Blurry);
        assert_eq!(assessment.crop.dimensions(), (110, 90));
    }

    #[test]
    fn test_sharp_crop_with_low_score_is_low_match() {
        let gate = QualityGate::new(QualityConfig::default());
        let assessment = gate.assess(&checkerboard(40, 30, 4), 0.12);
        assert_eq!(assessment.verdict, Verdict::LowMatch);
    }

    #[test]
    fn test_sharp_crop_with_good_score_is_ok() {
        let gate = QualityGate::new(QualityConfig::default());
        let assessment = gate.assess(&checkerboard(40, 30, 4), 0.95);
        assert_eq!(assessment.verdict, Verdict::Ok);
        assert!(assessment.sharpness > 20.0);
    }

    #[test]
    fn test_blur_check_precedes_match_check() {
        let gate = QualityGate::new(QualityConfig::default());
        assert_eq!(gate.verdict(5.0, 0.1), Verdict::Blurry);
        assert_eq!(gate.verdict(50.0, 0.1), Verdict::LowMatch);
        assert_eq!(gate.verdict(50.0, 0.6), Verdict::Ok);
    }

    #[test]
    fn test_normalize_keeps_gray_neutral() {
        let gate = QualityGate::new(QualityConfig::default());
        let img = RgbImage::from_fn(16, 16, |x, _| {
            let v = 90 + x as u8;
            Rgb([v, v, v])
        });
        for p in gate.normalize(&img).pixels() {
            assert!(p[0].abs_diff(p[1]) <= 2 && p[1].abs_diff(p[2]) <= 2, "{p:?}");
        }
    }
}
