//! Synthetic card photographs for testing.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::point::Point;
use printcheck_core::domain::{Point2, RawImage, RoiBox};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Border color inside the default HSV window.
pub const CARD_YELLOW: Rgb<u8> = Rgb([240, 200, 30]);

/// Border width of generated card faces.
pub const BORDER_WIDTH: u32 = 18;

/// Side of the square blocks that texture the card interior.
const BLOCK: u32 = 12;

/// Interior colors, all well outside the yellow window.
const PALETTE: [Rgb<u8>; 8] = [
    Rgb([25, 40, 120]),
    Rgb([60, 90, 200]),
    Rgb([140, 170, 230]),
    Rgb([20, 20, 20]),
    Rgb([90, 90, 90]),
    Rgb([170, 170, 170]),
    Rgb([235, 235, 235]),
    Rgb([120, 30, 90]),
];

/// Builder for creating synthetic card images.
///
/// A card face is a yellow frame around a seeded mosaic, which gives the
/// border localizer a clean color target and gives the keypoint and
/// correlation stages plenty of structure.
pub struct SyntheticCardBuilder;

impl SyntheticCardBuilder {
    // === Card faces ===

    /// Card face of the given size, deterministic for a seed.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn card_face(width: u32, height: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let cols = width.div_ceil(BLOCK) as usize;
        let rows = height.div_ceil(BLOCK) as usize;
        let blocks: Vec<Rgb<u8>> = (0..cols * rows)
            .map(|_| PALETTE[rng.random_range(0..PALETTE.len())])
            .collect();

        RgbImage::from_fn(width, height, |x, y| {
            let inside = x >= BORDER_WIDTH
                && y >= BORDER_WIDTH
                && x + BORDER_WIDTH < width
                && y + BORDER_WIDTH < height;
            if inside {
                blocks[(y / BLOCK) as usize * cols + (x / BLOCK) as usize]
            } else {
                CARD_YELLOW
            }
        })
    }

    /// The 400x560 face used by most tests.
    #[must_use]
    pub fn default_card_face() -> RgbImage {
        Self::card_face(400, 560, 7)
    }

    /// The exact pixels of `roi` on a face.
    #[must_use]
    pub fn reference_crop(face: &RgbImage, roi: RoiBox) -> RgbImage {
        image::imageops::crop_imm(face, roi.x, roi.y, roi.width, roi.height).to_image()
    }

    // === Photographs ===

    /// Places `face` on a plain background, rotated by `angle_deg` about its
    /// center, with at least `margin` pixels of background on every side.
    #[must_use]
    pub fn photo(face: &RgbImage, angle_deg: f32, margin: u32, background: Rgb<u8>) -> RgbImage {
        let (canvas_w, canvas_h) = Self::canvas_size(face, angle_deg, margin);
        let mut canvas = RgbImage::from_pixel(canvas_w, canvas_h, background);
        warp_into(
            face,
            &Self::placement(face, angle_deg, canvas_w, canvas_h),
            Interpolation::Bilinear,
            background,
            &mut canvas,
        );
        canvas
    }

    /// Where the face's outer corners land in [`Self::photo`], clockwise
    /// from top-left.
    #[must_use]
    pub fn photo_corners(face: &RgbImage, angle_deg: f32, margin: u32) -> [Point2; 4] {
        let (canvas_w, canvas_h) = Self::canvas_size(face, angle_deg, margin);
        let projection = Self::placement(face, angle_deg, canvas_w, canvas_h);
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (face.width() as f32, face.height() as f32);
        [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)].map(|(x, y)| {
            let (px, py) = projection * (x, y);
            Point2::new(f64::from(px), f64::from(py))
        })
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn canvas_size(face: &RgbImage, angle_deg: f32, margin: u32) -> (u32, u32) {
        let (w, h) = (face.width() as f32, face.height() as f32);
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        let bw = w * cos.abs() + h * sin.abs();
        let bh = w * sin.abs() + h * cos.abs();
        (bw.ceil() as u32 + 2 * margin, bh.ceil() as u32 + 2 * margin)
    }

    #[allow(clippy::cast_precision_loss)]
    fn placement(face: &RgbImage, angle_deg: f32, canvas_w: u32, canvas_h: u32) -> Projection {
        Projection::translate(canvas_w as f32 / 2.0, canvas_h as f32 / 2.0)
            * Projection::rotate(angle_deg.to_radians())
            * Projection::translate(-(face.width() as f32) / 2.0, -(face.height() as f32) / 2.0)
    }

    // === Shapes and degenerate inputs ===

    /// Filled quadrilateral on a plain background.
    #[must_use]
    pub fn quadrilateral(
        width: u32,
        height: u32,
        corners: [(i32, i32); 4],
        fill: Rgb<u8>,
        background: Rgb<u8>,
    ) -> RgbImage {
        let mut img = RgbImage::from_pixel(width, height, background);
        let poly: Vec<Point<i32>> = corners.iter().map(|&(x, y)| Point::new(x, y)).collect();
        draw_polygon_mut(&mut img, &poly, fill);
        img
    }

    /// A white page with nothing on it.
    #[must_use]
    pub fn blank_page(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
    }

    /// Uniform random noise, deterministic for a seed.
    #[must_use]
    pub fn noise(width: u32, height: u32, seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut img = RgbImage::new(width, height);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([rng.random(), rng.random(), rng.random()]);
        }
        img
    }

    /// A single flat color.
    #[must_use]
    pub fn flat(width: u32, height: u32, color: Rgb<u8>) -> RgbImage {
        RgbImage::from_pixel(width, height, color)
    }

    // === Encoding ===

    /// PNG bytes of an image.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_png(img: &RgbImage) -> anyhow::Result<Vec<u8>> {
        Self::encode(img, ImageFormat::Png)
    }

    /// JPEG bytes of an image.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_jpeg(img: &RgbImage) -> anyhow::Result<Vec<u8>> {
        Self::encode(img, ImageFormat::Jpeg)
    }

    fn encode(img: &RgbImage, format: ImageFormat) -> anyhow::Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.clone()).write_to(&mut buf, format)?;
        Ok(buf.into_inner())
    }

    /// Wraps pixels as an in-memory source image.
    #[must_use]
    pub fn raw(title: &str, img: RgbImage) -> RawImage {
        RawImage::in_memory(title, DynamicImage::ImageRgb8(img))
    }
}
