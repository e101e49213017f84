//! Per-image orchestration of the alignment and extraction stages.

use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::config::{AlignmentMode, PipelineConfig};
use crate::domain::{AlignedCard, CornerSet, LocalizationStrategy, Point2, RawImage, RoiResult};
use crate::error::{ConfigError, PipelineError};
use crate::ports::{SnapshotSink, Stage};
use crate::stages::{
    BorderLocalizer, FeatureAligner, PerspectiveRectifier, QualityGate, RoiRefiner,
};

const CONTOUR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const ROI_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Turns one photograph into an ROI crop with a verdict.
///
/// Holds no per-image state; a single pipeline can process images from
/// several threads at once.
pub struct CardPipeline {
    config: PipelineConfig,
    localizer: BorderLocalizer,
    rectifier: PerspectiveRectifier,
    aligner: Option<FeatureAligner>,
    refiner: RoiRefiner,
    gate: QualityGate,
    snapshots: Option<Arc<dyn SnapshotSink>>,
}

impl std::fmt::Debug for CardPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardPipeline")
            .field("config", &self.config)
            .field("has_template", &self.aligner.is_some())
            .field("has_snapshots", &self.snapshots.is_some())
            .finish_non_exhaustive()
    }
}

impl CardPipeline {
    /// Validates `config` and prepares every stage.
    ///
    /// `reference` is the expected appearance of the nominal ROI and must
    /// have the ROI's size. `template` is the full card used for keypoint
    /// alignment; it is required by every mode except
    /// [`AlignmentMode::Geometric`] and ignored by it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for invalid settings or a missing or
    /// mis-sized reference, and [`PipelineError::Alignment`] when the template
    /// is too plain to extract features from.
    pub fn new(
        config: PipelineConfig,
        reference: &RgbImage,
        template: Option<&RgbImage>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let roi = config.roi.nominal;
        if reference.dimensions() != (roi.width, roi.height) {
            return Err(ConfigError::new(
                "roi.reference",
                format!(
                    "reference crop is {}x{} but the ROI box is {}x{}",
                    reference.width(),
                    reference.height(),
                    roi.width,
                    roi.height
                ),
            )
            .into());
        }

        let aligner = match (config.alignment.uses_features(), template) {
            (false, _) => None,
            (true, Some(template)) => Some(FeatureAligner::new(
                &image::imageops::grayscale(template),
                config.features,
            )?),
            (true, None) => {
                return Err(ConfigError::new(
                    "alignment",
                    format!("mode {:?} requires a card template", config.alignment),
                )
                .into())
            }
        };

        Ok(Self {
            localizer: BorderLocalizer::new(config.border.clone()),
            rectifier: PerspectiveRectifier::new(config.card),
            refiner: RoiRefiner::new(reference, config.roi.search_radius),
            gate: QualityGate::new(config.quality),
            aligner,
            snapshots: None,
            config,
        })
    }

    /// Attaches a snapshot sink, used when diagnostics are enabled.
    #[must_use]
    pub fn with_snapshots(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.snapshots = Some(sink);
        self
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Aligns, refines and gates one image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] when no contour exists,
    /// [`PipelineError::DegenerateCorners`] when the corners cannot be
    /// rectified, and [`PipelineError::Alignment`] when keypoint alignment
    /// fails without a fallback.
    pub fn process(&self, raw: &RawImage) -> Result<RoiResult, PipelineError> {
        self.snapshot(raw, Stage::Original, || raw.image.clone());

        let rgb = raw.image.to_rgb8();
        let card = self.align(raw, &rgb)?;
        debug!(title = %raw.title, strategy = ?card.strategy, "card aligned");
        self.snapshot(raw, Stage::Aligned, || {
            DynamicImage::ImageRgb8(card.image.clone())
        });

        let nominal = self.config.roi.nominal;
        let refinement = self.refiner.refine(&card.image, nominal).ok_or_else(|| {
            ConfigError::new("roi", "box does not fit the aligned card")
        })?;
        let roi = refinement.roi;
        let crop = image::imageops::crop_imm(&card.image, roi.x, roi.y, roi.width, roi.height)
            .to_image();
        let assessment = self.gate.assess(&crop, refinement.score);

        self.snapshot(raw, Stage::AlignedWithRoi, || {
            let mut boxed = card.image.clone();
            #[allow(clippy::cast_possible_wrap)]
            let rect = Rect::at(roi.x as i32, roi.y as i32).of_size(roi.width, roi.height);
            draw_hollow_rect_mut(&mut boxed, rect, ROI_COLOR);
            if roi.width > 2 && roi.height > 2 {
                #[allow(clippy::cast_possible_wrap)]
                let inner =
                    Rect::at(roi.x as i32 + 1, roi.y as i32 + 1).of_size(roi.width - 2, roi.height - 2);
                draw_hollow_rect_mut(&mut boxed, inner, ROI_COLOR);
            }
            DynamicImage::ImageRgb8(boxed)
        });
        self.snapshot(raw, Stage::Roi, || {
            DynamicImage::ImageRgb8(assessment.crop.clone())
        });

        debug!(
            title = %raw.title,
            score = refinement.score,
            sharpness = assessment.sharpness,
            verdict = %assessment.verdict,
            "roi gated"
        );

        Ok(RoiResult {
            crop: assessment.crop,
            roi,
            offset: refinement.offset,
            match_score: refinement.score,
            sharpness: assessment.sharpness,
            verdict: assessment.verdict,
            strategy: card.strategy,
            corners: card.corners,
            homography: card.homography,
        })
    }

    /// Brings the card into canonical coordinates according to the mode.
    ///
    /// # Errors
    ///
    /// See [`Self::process`].
    pub fn align(&self, raw: &RawImage, rgb: &RgbImage) -> Result<AlignedCard, PipelineError> {
        match self.config.alignment {
            AlignmentMode::Geometric => self.align_geometric(raw, rgb),
            AlignmentMode::Feature => self.align_features(rgb),
            AlignmentMode::FeatureFallback => match self.align_features(rgb) {
                Err(PipelineError::Alignment(err)) => {
                    debug!(title = %raw.title, %err, "feature alignment failed, using border");
                    self.align_geometric(raw, rgb)
                }
                other => other,
            },
            AlignmentMode::GeometricRefine => {
                let coarse = self.align_geometric(raw, rgb)?;
                match self.align_features(&coarse.image) {
                    Ok(fine) => Ok(AlignedCard {
                        image: fine.image,
                        homography: coarse.homography.then(&fine.homography),
                        strategy: fine.strategy,
                        corners: coarse.corners,
                    }),
                    Err(PipelineError::Alignment(err)) => {
                        debug!(title = %raw.title, %err, "feature refinement failed, keeping border alignment");
                        Ok(coarse)
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    fn align_geometric(&self, raw: &RawImage, rgb: &RgbImage) -> Result<AlignedCard, PipelineError> {
        let detection = self.localizer.locate(&raw.image)?;
        self.snapshot(raw, Stage::Edges, || {
            DynamicImage::ImageLuma8(detection.stage_map.clone())
        });

        let corners = CornerSet::from_unordered(detection.corners);
        self.snapshot(raw, Stage::Contour, || {
            DynamicImage::ImageRgb8(draw_quad(rgb, &corners))
        });
        if !detection.strategy.is_precise() {
            debug!(title = %raw.title, "using best-effort bounding rectangle");
        }

        let (image, homography) = self.rectifier.rectify(rgb, &corners)?;
        Ok(AlignedCard {
            image,
            homography,
            strategy: detection.strategy,
            corners: Some(corners),
        })
    }

    fn align_features(&self, rgb: &RgbImage) -> Result<AlignedCard, PipelineError> {
        let aligner = self
            .aligner
            .as_ref()
            .ok_or_else(|| ConfigError::new("alignment", "no card template loaded"))?;
        let aligned = aligner.align(rgb, self.config.card)?;
        Ok(AlignedCard {
            image: aligned.image,
            homography: aligned.homography,
            strategy: LocalizationStrategy::FeatureMatch {
                inliers: aligned.inliers,
            },
            corners: None,
        })
    }

    fn snapshot(&self, raw: &RawImage, stage: Stage, render: impl FnOnce() -> DynamicImage) {
        if !self.config.diagnostics {
            return;
        }
        let (Some(sink), Some(dir)) = (&self.snapshots, raw.scratch_dir.as_deref()) else {
            return;
        };
        save_snapshot(sink.as_ref(), dir, stage, &render());
    }
}

fn save_snapshot(sink: &dyn SnapshotSink, dir: &Path, stage: Stage, image: &DynamicImage) {
    if let Err(e) = sink.save(dir, stage, image) {
        warn!(stage = stage.file_name(), dir = %dir.display(), "failed to write snapshot: {e:#}");
    }
}

/// Copy of `image` with the quadrilateral outlined three pixels wide.
#[allow(clippy::cast_possible_truncation)]
fn draw_quad(image: &RgbImage, corners: &CornerSet) -> RgbImage {
    let mut canvas = image.clone();
    let pts = corners.points();
    for i in 0..4 {
        let (a, b): (Point2, Point2) = (pts[i], pts[(i + 1) % 4]);
        for offset in -1..=1 {
            let o = f64::from(offset);
            for (dx, dy) in [(o, 0.0), (0.0, o)] {
                draw_line_segment_mut(
                    &mut canvas,
                    ((a.x + dx) as f32, (a.y + dy) as f32),
                    ((b.x + dx) as f32, (b.y + dy) as f32),
                    CONTOUR_COLOR,
                );
            }
        }
    }
    canvas
}
