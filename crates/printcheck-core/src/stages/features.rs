//! Oriented FAST keypoints with steered binary descriptors.

use image::GrayImage;
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Radius of the disc used for the intensity-centroid orientation.
const ORIENTATION_RADIUS: i32 = 15;
/// Radius of the disc the test pairs are drawn from.
const PATTERN_RADIUS: i32 = 12;
/// Keypoints closer than this to the image edge are dropped.
const BORDER: u32 = 16;
/// Fixed so descriptors from different runs are comparable.
const PATTERN_SEED: u64 = 0x5eed_0f0b;
const PAIRS: usize = 256;
const SMOOTHING_SIGMA: f32 = 2.0;

/// An oriented corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Orientation in radians.
    pub angle: f32,
    /// FAST corner score.
    pub response: f32,
}

/// 256-bit binary descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor([u64; 4]);

impl Descriptor {
    /// Number of differing bits.
    #[must_use]
    pub fn hamming(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// A nearest-neighbour correspondence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch {
    /// Index into the query set.
    pub query: usize,
    /// Index into the train set.
    pub train: usize,
    /// Hamming distance.
    pub distance: u32,
}

/// Detects keypoints and computes rotation-steered descriptors.
#[derive(Debug, Clone)]
pub struct OrbExtractor {
    max_features: usize,
    fast_threshold: u8,
    pattern: Vec<[(i32, i32); 2]>,
}

impl OrbExtractor {
    /// Creates an extractor keeping at most `max_features` keypoints.
    #[must_use]
    pub fn new(max_features: usize, fast_threshold: u8) -> Self {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let mut point = || loop {
            let x = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            let y = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            if x * x + y * y <= PATTERN_RADIUS * PATTERN_RADIUS {
                return (x, y);
            }
        };
        let pattern = (0..PAIRS).map(|_| [point(), point()]).collect();
        Self {
            max_features,
            fast_threshold,
            pattern,
        }
    }

    /// Keypoints and their descriptors, strongest first.
    #[must_use]
    pub fn extract(&self, gray: &GrayImage) -> (Vec<Keypoint>, Vec<Descriptor>) {
        let keypoints = self.detect(gray);
        let descriptors = self.describe(gray, &keypoints);
        (keypoints, descriptors)
    }

    /// FAST-9 corners after 3x3 non-maximum suppression, clear of the
    /// border, strongest first, with orientations.
    #[must_use]
    pub fn detect(&self, gray: &GrayImage) -> Vec<Keypoint> {
        let (width, height) = gray.dimensions();
        if width <= 2 * BORDER || height <= 2 * BORDER {
            return Vec::new();
        }
        let corners: Vec<_> = corners_fast9(gray, self.fast_threshold)
            .into_iter()
            .filter(|c| {
                (BORDER..width - BORDER).contains(&c.x) && (BORDER..height - BORDER).contains(&c.y)
            })
            .collect();

        let index = |x: u32, y: u32| (y * width + x) as usize;
        let mut scores = vec![0.0_f32; (width * height) as usize];
        for c in &corners {
            scores[index(c.x, c.y)] = c.score;
        }

        let mut keypoints: Vec<Keypoint> = corners
            .iter()
            .filter(|c| {
                (c.y - 1..=c.y + 1).all(|y| {
                    (c.x - 1..=c.x + 1).all(|x| (x, y) == (c.x, c.y) || scores[index(x, y)] <= c.score)
                })
            })
            .map(|c| Keypoint {
                x: c.x,
                y: c.y,
                angle: orientation(gray, c.x, c.y),
                response: c.score,
            })
            .collect();

        keypoints.sort_by(|a, b| b.response.total_cmp(&a.response));
        keypoints.truncate(self.max_features);
        keypoints
    }

    /// Steered binary tests on a smoothed copy of `gray`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss
    )]
    pub fn describe(&self, gray: &GrayImage, keypoints: &[Keypoint]) -> Vec<Descriptor> {
        let smoothed = gaussian_blur_f32(gray, SMOOTHING_SIGMA);
        keypoints
            .iter()
            .map(|kp| {
                let (sin, cos) = kp.angle.sin_cos();
                let sample = |(px, py): (i32, i32)| -> u8 {
                    let (fx, fy) = (px as f32, py as f32);
                    let rx = (cos * fx - sin * fy).round() as i32;
                    let ry = (sin * fx + cos * fy).round() as i32;
                    let x = (kp.x as i32 + rx) as u32;
                    let y = (kp.y as i32 + ry) as u32;
                    smoothed.get_pixel(x, y)[0]
                };
                let mut bits = [0u64; 4];
                for (i, [a, b]) in self.pattern.iter().enumerate() {
                    if sample(*a) < sample(*b) {
                        bits[i / 64] |= 1 << (i % 64);
                    }
                }
                Descriptor(bits)
            })
            .collect()
    }
}

/// Angle of the intensity centroid within the orientation disc.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn orientation(gray: &GrayImage, cx: u32, cy: u32) -> f32 {
    let (mut m10, mut m01) = (0.0_f32, 0.0_f32);
    let r = ORIENTATION_RADIUS;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy > r * r {
                continue;
            }
            let x = (cx as i32 + dx) as u32;
            let y = (cy as i32 + dy) as u32;
            let v = f32::from(gray.get_pixel(x, y)[0]);
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}

/// Nearest train descriptor for every query descriptor, sorted by distance.
#[must_use]
pub fn match_descriptors(query: &[Descriptor], train: &[Descriptor]) -> Vec<DescriptorMatch> {
    let mut matches: Vec<DescriptorMatch> = query
        .iter()
        .enumerate()
        .filter_map(|(qi, q)| {
            train
                .iter()
                .enumerate()
                .map(|(ti, t)| (ti, q.hamming(t)))
                .min_by_key(|&(_, d)| d)
                .map(|(ti, distance)| DescriptorMatch {
                    query: qi,
                    train: ti,
                    distance,
                })
        })
        .collect();
    matches.sort_by_key(|m| m.distance);
    matches
}
