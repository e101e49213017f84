//! Typed pipeline configuration with documented defaults.
//!
//! The defaults are tuned for one card line (yellow border, 63x88 mm
//! aspect) and existing reference crops depend on them.

use serde::{Deserialize, Serialize};

use crate::domain::RoiBox;
use crate::error::ConfigError;

/// Canonical size every card is warped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Default for CardSize {
    fn default() -> Self {
        Self {
            width: 400,
            height: 560,
        }
    }
}

/// Nominal ROI and its refinement search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiConfig {
    /// Nominal box in aligned-card coordinates.
    pub nominal: RoiBox,
    /// Maximum shift in each direction during refinement.
    pub search_radius: u32,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            nominal: RoiBox::new(30, 48, 110, 90),
            search_radius: 8,
        }
    }
}

/// An inclusive HSV range on the 8-bit scale (hue 0..=180, saturation and
/// value 0..=255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    /// Lower bound `[h, s, v]`.
    pub lower: [u8; 3],
    /// Upper bound `[h, s, v]`.
    pub upper: [u8; 3],
}

impl HsvRange {
    /// True when `hsv` lies inside the range on every channel.
    #[must_use]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| self.lower[i] <= hsv[i] && hsv[i] <= self.upper[i])
    }
}

impl Default for HsvRange {
    fn default() -> Self {
        Self {
            lower: [20, 80, 80],
            upper: [40, 255, 255],
        }
    }
}

/// Border localization parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BorderConfig {
    /// Border color range.
    pub hsv: HsvRange,
    /// Side of the square closing kernel (odd).
    pub close_kernel: u8,
    /// Side of the square dilation kernel (odd).
    pub dilate_kernel: u8,
    /// Polygon tolerance for the color mask contour, as a fraction of perimeter.
    pub color_tolerance: f64,
    /// Polygon tolerances tried on the edge contour, in order.
    pub edge_tolerances: Vec<f64>,
    /// Gaussian sigma applied before edge detection.
    pub blur_sigma: f32,
    /// Canny hysteresis low threshold.
    pub canny_low: f32,
    /// Canny hysteresis high threshold.
    pub canny_high: f32,
}

impl Default for BorderConfig {
    fn default() -> Self {
        Self {
            hsv: HsvRange::default(),
            close_kernel: 5,
            dilate_kernel: 3,
            color_tolerance: 0.02,
            edge_tolerances: vec![0.02, 0.015, 0.01, 0.005],
            // A 5x5 Gaussian with automatic sigma.
            blur_sigma: 1.1,
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }
}

/// Keypoint alignment parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureConfig {
    /// Maximum keypoints kept per image.
    pub max_features: usize,
    /// FAST corner threshold.
    pub fast_threshold: u8,
    /// Best matches kept for estimation.
    pub keep_matches: usize,
    /// Fewer matches than this fails alignment.
    pub min_matches: usize,
    /// RANSAC inlier reprojection threshold in pixels.
    pub ransac_threshold: f64,
    /// RANSAC iteration cap.
    pub ransac_iterations: usize,
    /// Minimum RANSAC support.
    pub min_inliers: usize,
    /// Seed for sampling, fixed for reproducible results.
    pub seed: u64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            max_features: 1500,
            fast_threshold: 20,
            keep_matches: 200,
            min_matches: 10,
            ransac_threshold: 5.0,
            ransac_iterations: 2000,
            min_inliers: 8,
            seed: 0,
        }
    }
}

/// Quality gate and normalization parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityConfig {
    /// Laplacian variance below this is blurry.
    pub blur_threshold: f64,
    /// Match score below this is a low match.
    pub match_threshold: f32,
    /// CLAHE clip limit, relative to a uniform histogram.
    pub clahe_clip_limit: f32,
    /// CLAHE tiles per side.
    pub clahe_tiles: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            blur_threshold: 20.0,
            match_threshold: 0.6,
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
        }
    }
}

/// How the card is brought into canonical coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMode {
    /// Border localization and perspective rectification.
    #[default]
    Geometric,
    /// Keypoint alignment against the card template only.
    Feature,
    /// Keypoint alignment, falling back to geometric on failure.
    FeatureFallback,
    /// Geometric alignment refined by keypoints when they agree.
    GeometricRefine,
}

impl AlignmentMode {
    /// True when a card template is needed.
    #[must_use]
    pub const fn uses_features(self) -> bool {
        !matches!(self, Self::Geometric)
    }
}

impl std::str::FromStr for AlignmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "geometric" => Ok(Self::Geometric),
            "feature" => Ok(Self::Feature),
            "feature_fallback" => Ok(Self::FeatureFallback),
            "geometric_refine" => Ok(Self::GeometricRefine),
            _ => Err(format!(
                "unknown alignment mode '{s}' (expected geometric, feature, feature-fallback or geometric-refine)"
            )),
        }
    }
}

/// Complete configuration of a [`crate::CardPipeline`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineConfig {
    /// Canonical card size.
    pub card: CardSize,
    /// ROI box and search radius.
    pub roi: RoiConfig,
    /// Border localization.
    pub border: BorderConfig,
    /// Keypoint alignment.
    pub features: FeatureConfig,
    /// Quality gate.
    pub quality: QualityConfig,
    /// Alignment strategy.
    pub alignment: AlignmentMode,
    /// Write stage snapshots into each image's scratch directory.
    pub diagnostics: bool,
}

impl PipelineConfig {
    /// Validates every field.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let CardSize { width, height } = self.card;
        if width < 16 || height < 16 {
            return Err(ConfigError::new(
                "card",
                format!("canonical size {width}x{height} is smaller than 16x16"),
            ));
        }

        let roi = self.roi.nominal;
        if roi.width == 0 || roi.height == 0 {
            return Err(ConfigError::new("roi", "box must have a positive size"));
        }
        if !roi.fits_within(width, height) {
            return Err(ConfigError::new(
                "roi",
                format!(
                    "box {}x{}+{}+{} exceeds the {width}x{height} card",
                    roi.width, roi.height, roi.x, roi.y
                ),
            ));
        }
        if self.roi.search_radius > 64 {
            return Err(ConfigError::new("roi.search_radius", "must be at most 64"));
        }

        let border = &self.border;
        for i in 0..3 {
            if border.hsv.lower[i] > border.hsv.upper[i] {
                return Err(ConfigError::new("border.hsv", "lower bound exceeds upper bound"));
            }
        }
        if border.hsv.upper[0] > 180 {
            return Err(ConfigError::new("border.hsv", "hue must be within 0..=180"));
        }
        if border.close_kernel % 2 == 0 || border.dilate_kernel % 2 == 0 {
            return Err(ConfigError::new("border.kernel", "kernel sizes must be odd"));
        }
        let tolerance_ok = |t: f64| t > 0.0 && t < 0.5;
        if !tolerance_ok(border.color_tolerance) {
            return Err(ConfigError::new("border.color_tolerance", "must be in (0, 0.5)"));
        }
        if border.edge_tolerances.is_empty()
            || !border.edge_tolerances.iter().copied().all(tolerance_ok)
        {
            return Err(ConfigError::new(
                "border.edge_tolerances",
                "must be a non-empty list of values in (0, 0.5)",
            ));
        }
        if border.blur_sigma <= 0.0 {
            return Err(ConfigError::new("border.blur_sigma", "must be positive"));
        }
        if border.canny_low < 0.0 || border.canny_low > border.canny_high {
            return Err(ConfigError::new(
                "border.canny",
                "thresholds must satisfy 0 <= low <= high",
            ));
        }

        let features = &self.features;
        if features.min_matches < 4 {
            return Err(ConfigError::new("features.min_matches", "must be at least 4"));
        }
        if features.keep_matches < features.min_matches {
            return Err(ConfigError::new(
                "features.keep_matches",
                "must not be below min_matches",
            ));
        }
        if features.max_features < features.min_matches {
            return Err(ConfigError::new(
                "features.max_features",
                "must not be below min_matches",
            ));
        }
        if features.min_inliers < 4 {
            return Err(ConfigError::new("features.min_inliers", "must be at least 4"));
        }
        if features.ransac_threshold <= 0.0 || features.ransac_iterations == 0 {
            return Err(ConfigError::new(
                "features.ransac",
                "threshold and iterations must be positive",
            ));
        }

        let quality = &self.quality;
        if quality.blur_threshold < 0.0 {
            return Err(ConfigError::new("quality.blur_threshold", "must not be negative"));
        }
        if !(-1.0..=1.0).contains(&quality.match_threshold) {
            return Err(ConfigError::new(
                "quality.match_threshold",
                "must be within -1.0..=1.0",
            ));
        }
        if quality.clahe_clip_limit <= 0.0 {
            return Err(ConfigError::new("quality.clahe_clip_limit", "must be positive"));
        }
        if quality.clahe_tiles == 0 || quality.clahe_tiles > 64 {
            return Err(ConfigError::new("quality.clahe_tiles", "must be within 1..=64"));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(PipelineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_load_bearing_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.border.hsv.lower, [20, 80, 80]);
        assert_eq!(config.border.hsv.upper, [40, 255, 255]);
        assert_eq!(config.border.edge_tolerances, vec![0.02, 0.015, 0.01, 0.005]);
        assert_eq!(config.roi.search_radius, 8);
        assert!((config.quality.blur_threshold - 20.0).abs() < f64::EPSILON);
        assert!((config.quality.match_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.features.max_features, 1500);
        assert_eq!(config.features.keep_matches, 200);
        assert_eq!(config.features.min_matches, 10);
    }

    #[test]
    fn test_roi_outside_card_rejected() {
        let mut config = PipelineConfig::default();
        config.roi.nominal = RoiBox::new(350, 0, 100, 50);
        let err = config.validate().unwrap_err();
        assert_eq!(err.field, "roi");
    }

    #[test]
    fn test_inverted_hsv_rejected() {
        let mut config = PipelineConfig::default();
        config.border.hsv.lower[1] = 200;
        config.border.hsv.upper[1] = 100;
        assert_eq!(config.validate().unwrap_err().field, "border.hsv");
    }

    #[test]
    fn test_even_kernel_rejected() {
        let mut config = PipelineConfig::default();
        config.border.close_kernel = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_match_threshold_range() {
        let mut config = PipelineConfig::default();
        config.quality.match_threshold = 1.5;
        assert_eq!(config.validate().unwrap_err().field, "quality.match_threshold");
    }

    #[test]
    fn test_empty_edge_tolerances_rejected() {
        let mut config = PipelineConfig::default();
        config.border.edge_tolerances.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hsv_range_contains() {
        let range = HsvRange::default();
        assert!(range.contains([24, 223, 240]));
        assert!(!range.contains([60, 223, 240]));
        assert!(!range.contains([24, 40, 240]));
    }

    #[test]
    fn test_alignment_mode_parse() {
        assert_eq!("geometric".parse(), Ok(AlignmentMode::Geometric));
        assert_eq!("feature-fallback".parse(), Ok(AlignmentMode::FeatureFallback));
        assert_eq!("GEOMETRIC_REFINE".parse(), Ok(AlignmentMode::GeometricRefine));
        assert!("orb".parse::<AlignmentMode>().is_err());
        assert!(!AlignmentMode::Geometric.uses_features());
        assert!(AlignmentMode::Feature.uses_features());
    }
}
