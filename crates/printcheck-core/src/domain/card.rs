//! Per-image artifacts flowing through the pipeline.

use std::path::PathBuf;

use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

use super::{CornerSet, Homography};

/// Where a decoded image came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Loaded from a file on disk.
    Path(PathBuf),
    /// Downloaded from a URL.
    Url(String),
    /// Decoded from an in-memory buffer.
    InMemory,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
            Self::InMemory => f.write_str("in-memory"),
        }
    }
}

/// A decoded source photograph.
#[derive(Debug, Clone)]
pub struct RawImage {
    /// Logical title used for file naming and reporting.
    pub title: String,
    /// Origin of the pixels.
    pub provenance: Provenance,
    /// Decoded pixels.
    pub image: DynamicImage,
    /// Pre-created per-image diagnostic directory, when diagnostics are on.
    pub scratch_dir: Option<PathBuf>,
}

impl RawImage {
    /// Creates an in-memory image without a scratch directory.
    #[must_use]
    pub fn in_memory(title: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            title: title.into(),
            provenance: Provenance::InMemory,
            image,
            scratch_dir: None,
        }
    }

    /// Sets the diagnostic directory.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Image width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Image height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Integer rectangle in aligned-card coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiBox {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl RoiBox {
    /// Creates a box.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The box shifted by `(dx, dy)`, or `None` if it would cross the
    /// top or left edge.
    #[must_use]
    pub fn shifted(&self, dx: i32, dy: i32) -> Option<Self> {
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        Some(Self { x, y, ..*self })
    }

    /// True when the box lies entirely inside a `width` x `height` image.
    #[must_use]
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }
}

/// How the card was located in the source photograph.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalizationStrategy {
    /// Border color segmentation produced a quadrilateral.
    ColorMask,
    /// Edge contour approximated at the given fraction of its perimeter.
    EdgePolygon {
        /// Approximation tolerance as a fraction of perimeter.
        tolerance: f64,
    },
    /// Convex hull of the edge contour.
    ConvexHull,
    /// Minimum-area bounding rectangle, best effort.
    MinAreaRect,
    /// Keypoint correspondence against a card template.
    FeatureMatch {
        /// RANSAC inliers supporting the homography.
        inliers: usize,
    },
}

impl LocalizationStrategy {
    /// False only for the bounding-rectangle last resort, which is not
    /// perspective-correct.
    #[must_use]
    pub const fn is_precise(&self) -> bool {
        !matches!(self, Self::MinAreaRect)
    }
}

/// A perspective-rectified card at the canonical size.
#[derive(Debug, Clone)]
pub struct AlignedCard {
    /// Canonical-size pixels.
    pub image: RgbImage,
    /// Source-to-card transform.
    pub homography: Homography,
    /// Strategy that produced the alignment.
    pub strategy: LocalizationStrategy,
    /// Ordered source corners, when geometric localization was used.
    pub corners: Option<CornerSet>,
}

/// Usability verdict for an ROI crop.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Sharp and well matched.
    Ok,
    /// Laplacian variance below the blur threshold.
    Blurry,
    /// Match score below the match threshold.
    LowMatch,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::Blurry => "blurry",
            Self::LowMatch => "low_match",
        })
    }
}

/// Terminal per-image artifact handed to the classifier.
#[derive(Debug, Clone)]
pub struct RoiResult {
    /// Contrast-normalized crop, an independent copy.
    pub crop: RgbImage,
    /// Refined box in aligned-card coordinates.
    pub roi: RoiBox,
    /// Offset of the refined box from the nominal one.
    pub offset: (i32, i32),
    /// Zero-mean normalized cross-correlation in `[-1, 1]`.
    pub match_score: f32,
    /// Variance of the Laplacian of the crop before normalization.
    pub sharpness: f64,
    /// Quality gate outcome.
    pub verdict: Verdict,
    /// Localization strategy of the underlying alignment.
    pub strategy: LocalizationStrategy,
    /// Ordered source corners, when geometric localization was used.
    pub corners: Option<CornerSet>,
    /// Source-to-card transform of the underlying alignment.
    pub homography: Homography,
}
