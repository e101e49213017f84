//! Color space conversions on the 8-bit OpenCV scales.

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::config::HsvRange;

/// Converts RGB to HSV with hue halved into `0..=180`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(i32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max == 0 {
        0
    } else {
        (255 * delta + max / 2) / max
    };

    let h = if delta == 0 {
        0.0
    } else {
        let d = delta as f32;
        let h = if max == r {
            60.0 * (g - b) as f32 / d
        } else if max == g {
            120.0 + 60.0 * (b - r) as f32 / d
        } else {
            240.0 + 60.0 * (r - g) as f32 / d
        };
        if h < 0.0 {
            h + 360.0
        } else {
            h
        }
    };

    [(h / 2.0).round().min(180.0) as u8, s as u8, max as u8]
}

/// Binary mask (255 inside) of pixels whose HSV value lies in `range`.
#[must_use]
pub fn hsv_mask(image: &RgbImage, range: &HsvRange) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgb(rgb) = *image.get_pixel(x, y);
        if range.contains(rgb_to_hsv(rgb)) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// RGB to full-range YCrCb.
#[must_use]
pub fn rgb_to_ycrcb(rgb: [u8; 3]) -> [f32; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cr = (r - y) * 0.713 + 128.0;
    let cb = (b - y) * 0.564 + 128.0;
    [y, cr, cb]
}

/// Full-range YCrCb back to RGB, saturating.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn ycrcb_to_rgb(ycrcb: [f32; 3]) -> [u8; 3] {
    let [y, cr, cb] = ycrcb;
    let r = y + 1.403 * (cr - 128.0);
    let g = y - 0.714 * (cr - 128.0) - 0.344 * (cb - 128.0);
    let b = y + 1.773 * (cb - 128.0);
    [r, g, b].map(|v| v.round().clamp(0.0, 255.0) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
        assert_eq!(rgb_to_hsv([128, 128, 128]), [0, 0, 128]);
    }

    #[test]
    fn test_hsv_card_yellow_in_default_range() {
        let hsv = rgb_to_hsv([240, 200, 30]);
        assert_eq!(hsv[0], 24);
        assert!(HsvRange::default().contains(hsv));
    }

    #[test]
    fn test_hsv_mask_selects_yellow() {
        let mut img = RgbImage::from_pixel(4, 1, Rgb([30, 60, 140]));
        img.put_pixel(2, 0, Rgb([240, 200, 30]));
        let mask = hsv_mask(&img, &HsvRange::default());
        assert_eq!(mask.as_raw(), &vec![0, 0, 255, 0]);
    }

    #[test]
    fn test_ycrcb_round_trip() {
        for rgb in [[0, 0, 0], [255, 255, 255], [240, 200, 30], [30, 60, 140], [12, 250, 99]] {
            let back = ycrcb_to_rgb(rgb_to_ycrcb(rgb));
            for c in 0..3 {
                assert!(
                    (i16::from(back[c]) - i16::from(rgb[c])).abs() <= 2,
                    "{rgb:?} -> {back:?}"
                );
            }
        }
    }

    #[test]
    fn test_gray_has_neutral_chroma() {
        let [y, cr, cb] = rgb_to_ycrcb([100, 100, 100]);
        assert!((y - 100.0).abs() < 0.01);
        assert!((cr - 128.0).abs() < 0.01);
        assert!((cb - 128.0).abs() < 0.01);
    }
}
