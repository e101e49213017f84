//! Configuration file support for printcheck.
//!
//! Supports TOML configuration from:
//! - XDG config: `~/.config/printcheck/config.toml` (lowest priority)
//! - Project-local: `.printcheck.toml` (searched up directory tree)
//! - CLI flags (highest priority, applied separately)

use std::path::{Path, PathBuf};

use printcheck_core::config::{AlignmentMode, PipelineConfig};
use printcheck_core::RoiBox;
use serde::Deserialize;
use tracing::{debug, info};

/// Top-level configuration structure.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General options.
    pub general: GeneralConfig,
    /// Canonical card size.
    pub card: CardConfig,
    /// Region of interest.
    pub roi: RoiConfig,
    /// Border localization.
    pub border: BorderConfig,
    /// Keypoint alignment.
    pub features: FeaturesConfig,
    /// Quality gate.
    pub quality: QualityConfig,
    /// Alignment strategy.
    pub align: AlignConfig,
    /// Reference templates.
    pub templates: TemplatesConfig,
    /// Diagnostic snapshots.
    pub debug: DebugConfig,
    /// Output formatting settings.
    pub output: OutputConfig,
}

/// General configuration options.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Recurse into subdirectories by default.
    pub recursive: Option<bool>,
    /// Worker threads for batch processing.
    pub jobs: Option<usize>,
}

/// Canonical card size.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    /// Width in pixels.
    pub width: Option<u32>,
    /// Height in pixels.
    pub height: Option<u32>,
}

/// Nominal ROI box and search radius.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    /// Left edge.
    pub x: Option<u32>,
    /// Top edge.
    pub y: Option<u32>,
    /// Width.
    pub width: Option<u32>,
    /// Height.
    pub height: Option<u32>,
    /// Refinement search radius in pixels.
    pub search_radius: Option<u32>,
}

/// Border localization configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct BorderConfig {
    /// HSV lower bound, hue on the 0-180 scale.
    pub hsv_lower: Option<[u8; 3]>,
    /// HSV upper bound.
    pub hsv_upper: Option<[u8; 3]>,
    /// Morphological close kernel size (odd).
    pub close_kernel: Option<u8>,
    /// Dilation kernel size (odd).
    pub dilate_kernel: Option<u8>,
    /// Polygon tolerance for the color mask, as a fraction of perimeter.
    pub color_tolerance: Option<f64>,
    /// Polygon tolerances tried on the edge contour, in order.
    pub edge_tolerances: Option<Vec<f64>>,
    /// Gaussian sigma before Canny.
    pub blur_sigma: Option<f32>,
    /// Canny low threshold.
    pub canny_low: Option<f32>,
    /// Canny high threshold.
    pub canny_high: Option<f32>,
}

/// Keypoint alignment configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Keypoints detected per image.
    pub max_features: Option<usize>,
    /// FAST intensity threshold.
    pub fast_threshold: Option<u8>,
    /// Best matches kept for estimation.
    pub keep_matches: Option<usize>,
    /// Minimum matches required.
    pub min_matches: Option<usize>,
    /// RANSAC inlier distance in pixels.
    pub ransac_threshold: Option<f64>,
    /// RANSAC iterations.
    pub ransac_iterations: Option<usize>,
    /// Minimum inliers for an accepted homography.
    pub min_inliers: Option<usize>,
    /// RANSAC seed.
    pub seed: Option<u64>,
}

/// Quality gate configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Laplacian variance below which a crop is blurry.
    pub blur_threshold: Option<f64>,
    /// NCC score below which a crop is a low match (-1.0-1.0).
    pub match_threshold: Option<f32>,
    /// CLAHE clip limit.
    pub clahe_clip_limit: Option<f32>,
    /// CLAHE tiles per side.
    pub clahe_tiles: Option<u32>,
}

/// Alignment strategy configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// `geometric`, `feature`, `feature_fallback` or `geometric_refine`.
    pub mode: Option<AlignmentMode>,
}

/// Reference template configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Custom templates directory path.
    pub dir: Option<PathBuf>,
    /// Default template set.
    pub defect: Option<String>,
}

/// Diagnostic snapshot configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Root directory for per-image snapshots.
    pub dir: Option<PathBuf>,
}

/// Output formatting configuration.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "json" or "jsonl".
    pub format: Option<String>,
    /// Pretty-print JSON output.
    pub pretty: Option<bool>,
    /// Show progress bar.
    pub progress: Option<bool>,
    /// Directory for final ROI crops.
    pub crop_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from XDG and project-local files.
    ///
    /// Priority (lowest to highest):
    /// 1. XDG config: `~/.config/printcheck/config.toml`
    /// 2. Project-local: `.printcheck.toml` (searched up from cwd)
    ///
    /// Missing files are silently ignored. Invalid values are logged as warnings.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load XDG config (lowest priority)
        if let Some(xdg_path) = xdg_config_path() {
            if xdg_path.exists() {
                info!("Loading XDG config: {}", xdg_path.display());
                if let Some(xdg_config) = load_file(&xdg_path) {
                    config = xdg_config;
                }
            } else {
                debug!("XDG config not found: {}", xdg_path.display());
            }
        }

        // Load project-local config (higher priority, merged)
        if let Some(project_path) = find_project_config() {
            info!("Loading project config: {}", project_path.display());
            if let Some(project_config) = load_file(&project_path) {
                config.merge(project_config);
            }
        }

        if let Err(e) = config.validate() {
            tracing::warn!("{e}");
        }

        config
    }

    /// Validate configuration values are within acceptable ranges.
    fn validate(&self) -> Result<(), String> {
        if let Some(t) = self.quality.match_threshold {
            if !(-1.0..=1.0).contains(&t) {
                return Err(format!("quality.match_threshold must be -1.0-1.0, got {t}"));
            }
        }
        if let Some(t) = self.quality.blur_threshold {
            if t < 0.0 {
                return Err(format!("quality.blur_threshold must be non-negative, got {t}"));
            }
        }
        if let Some(j) = self.general.jobs {
            if j == 0 {
                return Err("general.jobs must be at least 1".to_string());
            }
        }
        for (name, kernel) in [
            ("border.close_kernel", self.border.close_kernel),
            ("border.dilate_kernel", self.border.dilate_kernel),
        ] {
            if let Some(k) = kernel {
                if k % 2 == 0 {
                    return Err(format!("{name} must be odd, got {k}"));
                }
            }
        }

        // Output format validation
        if let Some(ref f) = self.output.format {
            if f != "json" && f != "jsonl" {
                return Err(format!(
                    "output.format must be 'json' or 'jsonl', got '{f}'"
                ));
            }
        }

        Ok(())
    }

    /// Merge another config into this one.
    /// Values from `other` override values in `self` when present.
    fn merge(&mut self, other: Self) {
        // General
        self.general.recursive = other.general.recursive.or(self.general.recursive);
        self.general.jobs = other.general.jobs.or(self.general.jobs);

        // Card
        self.card.width = other.card.width.or(self.card.width);
        self.card.height = other.card.height.or(self.card.height);

        // ROI
        self.roi.x = other.roi.x.or(self.roi.x);
        self.roi.y = other.roi.y.or(self.roi.y);
        self.roi.width = other.roi.width.or(self.roi.width);
        self.roi.height = other.roi.height.or(self.roi.height);
        self.roi.search_radius = other.roi.search_radius.or(self.roi.search_radius);

        // Border
        self.border.hsv_lower = other.border.hsv_lower.or(self.border.hsv_lower);
        self.border.hsv_upper = other.border.hsv_upper.or(self.border.hsv_upper);
        self.border.close_kernel = other.border.close_kernel.or(self.border.close_kernel);
        self.border.dilate_kernel = other.border.dilate_kernel.or(self.border.dilate_kernel);
        self.border.color_tolerance = other.border.color_tolerance.or(self.border.color_tolerance);
        self.border.edge_tolerances = other
            .border
            .edge_tolerances
            .or_else(|| self.border.edge_tolerances.take());
        self.border.blur_sigma = other.border.blur_sigma.or(self.border.blur_sigma);
        self.border.canny_low = other.border.canny_low.or(self.border.canny_low);
        self.border.canny_high = other.border.canny_high.or(self.border.canny_high);

        // Features
        let (f, o) = (&mut self.features, other.features);
        f.max_features = o.max_features.or(f.max_features);
        f.fast_threshold = o.fast_threshold.or(f.fast_threshold);
        f.keep_matches = o.keep_matches.or(f.keep_matches);
        f.min_matches = o.min_matches.or(f.min_matches);
        f.ransac_threshold = o.ransac_threshold.or(f.ransac_threshold);
        f.ransac_iterations = o.ransac_iterations.or(f.ransac_iterations);
        f.min_inliers = o.min_inliers.or(f.min_inliers);
        f.seed = o.seed.or(f.seed);

        // Quality
        self.quality.blur_threshold = other.quality.blur_threshold.or(self.quality.blur_threshold);
        self.quality.match_threshold = other
            .quality
            .match_threshold
            .or(self.quality.match_threshold);
        self.quality.clahe_clip_limit = other
            .quality
            .clahe_clip_limit
            .or(self.quality.clahe_clip_limit);
        self.quality.clahe_tiles = other.quality.clahe_tiles.or(self.quality.clahe_tiles);

        // Align
        self.align.mode = other.align.mode.or(self.align.mode);

        // Templates
        self.templates.dir = other.templates.dir.or_else(|| self.templates.dir.take());
        self.templates.defect = other
            .templates
            .defect
            .or_else(|| self.templates.defect.take());

        // Debug
        self.debug.dir = other.debug.dir.or_else(|| self.debug.dir.take());

        // Output
        self.output.format = other.output.format.or_else(|| self.output.format.take());
        self.output.pretty = other.output.pretty.or(self.output.pretty);
        self.output.progress = other.output.progress.or(self.output.progress);
        self.output.crop_dir = other.output.crop_dir.or_else(|| self.output.crop_dir.take());
    }

    /// Applies file values over the pipeline defaults. CLI flags are applied
    /// afterwards by the caller.
    pub fn apply_to(&self, pipeline: &mut PipelineConfig) {
        let card = &mut pipeline.card;
        card.width = self.card.width.unwrap_or(card.width);
        card.height = self.card.height.unwrap_or(card.height);

        let nominal = pipeline.roi.nominal;
        pipeline.roi.nominal = RoiBox::new(
            self.roi.x.unwrap_or(nominal.x),
            self.roi.y.unwrap_or(nominal.y),
            self.roi.width.unwrap_or(nominal.width),
            self.roi.height.unwrap_or(nominal.height),
        );
        pipeline.roi.search_radius = self.roi.search_radius.unwrap_or(pipeline.roi.search_radius);

        let border = &mut pipeline.border;
        border.hsv.lower = self.border.hsv_lower.unwrap_or(border.hsv.lower);
        border.hsv.upper = self.border.hsv_upper.unwrap_or(border.hsv.upper);
        border.close_kernel = self.border.close_kernel.unwrap_or(border.close_kernel);
        border.dilate_kernel = self.border.dilate_kernel.unwrap_or(border.dilate_kernel);
        border.color_tolerance = self.border.color_tolerance.unwrap_or(border.color_tolerance);
        if let Some(ref tolerances) = self.border.edge_tolerances {
            border.edge_tolerances.clone_from(tolerances);
        }
        border.blur_sigma = self.border.blur_sigma.unwrap_or(border.blur_sigma);
        border.canny_low = self.border.canny_low.unwrap_or(border.canny_low);
        border.canny_high = self.border.canny_high.unwrap_or(border.canny_high);

        let features = &mut pipeline.features;
        let f = &self.features;
        features.max_features = f.max_features.unwrap_or(features.max_features);
        features.fast_threshold = f.fast_threshold.unwrap_or(features.fast_threshold);
        features.keep_matches = f.keep_matches.unwrap_or(features.keep_matches);
        features.min_matches = f.min_matches.unwrap_or(features.min_matches);
        features.ransac_threshold = f.ransac_threshold.unwrap_or(features.ransac_threshold);
        features.ransac_iterations = f.ransac_iterations.unwrap_or(features.ransac_iterations);
        features.min_inliers = f.min_inliers.unwrap_or(features.min_inliers);
        features.seed = f.seed.unwrap_or(features.seed);

        let quality = &mut pipeline.quality;
        quality.blur_threshold = self.quality.blur_threshold.unwrap_or(quality.blur_threshold);
        quality.match_threshold = self.quality.match_threshold.unwrap_or(quality.match_threshold);
        quality.clahe_clip_limit = self
            .quality
            .clahe_clip_limit
            .unwrap_or(quality.clahe_clip_limit);
        quality.clahe_tiles = self.quality.clahe_tiles.unwrap_or(quality.clahe_tiles);

        pipeline.alignment = self.align.mode.unwrap_or(pipeline.alignment);
    }
}

/// Get the XDG config file path.
fn xdg_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("printcheck").join("config.toml"))
}

/// Find project-local config by searching up from current directory.
fn find_project_config() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    find_config_in_parents(&cwd)
}

/// Search for `.printcheck.toml` in the given directory and its parents.
fn find_config_in_parents(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);

    while let Some(dir) = current {
        let config_path = dir.join(".printcheck.toml");
        if config_path.exists() {
            return Some(config_path);
        }
        current = dir.parent();
    }

    None
}

/// Load and parse a TOML config file.
fn load_file(path: &Path) -> Option<AppConfig> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Failed to read config file {}: {}", path.display(), e);
            return None;
        }
    };

    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
            None
        }
    }
}
