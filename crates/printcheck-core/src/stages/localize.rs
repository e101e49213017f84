//! Border localization: find the card quadrilateral in a photograph.
//!
//! Color segmentation of the border runs first. When it does not yield a
//! quadrilateral, the largest edge contour is passed through a fixed,
//! ordered list of [`EdgeStrategy`] values until one produces four corners.

use image::{DynamicImage, GrayImage};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{convex_hull, min_area_rect};
use imageproc::morphology::{close, dilate};
use tracing::debug;

use super::color::hsv_mask;
use super::contour::{approx_polygon, largest_external_contour, Contour};
use crate::config::BorderConfig;
use crate::domain::{LocalizationStrategy, Point2};
use crate::error::PipelineError;

/// Four unordered corners and how they were found.
#[derive(Debug, Clone)]
pub struct BorderDetection {
    /// Corners as detected, not yet ordered.
    pub corners: [Point2; 4],
    /// Which strategy produced them.
    pub strategy: LocalizationStrategy,
    /// The binary map the winning contour came from (mask or edges).
    pub stage_map: GrayImage,
}

/// One step of the edge-contour fallback chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeStrategy {
    /// Polygon approximation at a fraction of the perimeter.
    Polygon(f64),
    /// Convex hull, approximated at the first edge tolerance.
    ConvexHull(f64),
    /// Minimum-area bounding rectangle.
    MinAreaRect,
}

impl EdgeStrategy {
    /// Attempts to reduce `contour` to exactly four corners.
    #[must_use]
    pub fn apply(self, contour: &Contour) -> Option<[Point2; 4]> {
        match self {
            Self::Polygon(tolerance) => {
                let eps = tolerance * contour.perimeter();
                quad(&approx_polygon(&contour.as_point2(), eps))
            }
            Self::ConvexHull(tolerance) => {
                let hull = Contour::new(convex_hull(contour.points()));
                let eps = tolerance * hull.perimeter();
                quad(&approx_polygon(&hull.as_point2(), eps))
            }
            Self::MinAreaRect => {
                if contour.points().is_empty() {
                    return None;
                }
                Some(min_area_rect(contour.points()).map(Point2::from))
            }
        }
    }

    /// Metadata label for a successful step.
    #[must_use]
    pub const fn label(self) -> LocalizationStrategy {
        match self {
            Self::Polygon(tolerance) => LocalizationStrategy::EdgePolygon { tolerance },
            Self::ConvexHull(_) => LocalizationStrategy::ConvexHull,
            Self::MinAreaRect => LocalizationStrategy::MinAreaRect,
        }
    }
}

fn quad(polygon: &[Point2]) -> Option<[Point2; 4]> {
    <[Point2; 4]>::try_from(polygon).ok()
}

/// Finds the card boundary in a source image.
#[derive(Debug, Clone)]
pub struct BorderLocalizer {
    config: BorderConfig,
}

impl BorderLocalizer {
    /// Creates a localizer.
    #[must_use]
    pub const fn new(config: BorderConfig) -> Self {
        Self { config }
    }

    /// The edge fallback chain in the order it is tried.
    #[must_use]
    pub fn edge_chain(&self) -> Vec<EdgeStrategy> {
        let first = self.config.edge_tolerances.first().copied().unwrap_or(0.02);
        self.config
            .edge_tolerances
            .iter()
            .copied()
            .map(EdgeStrategy::Polygon)
            .chain([EdgeStrategy::ConvexHull(first), EdgeStrategy::MinAreaRect])
            .collect()
    }

    /// Locates the card.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] when the edge map has no contour.
    pub fn locate(&self, image: &DynamicImage) -> Result<BorderDetection, PipelineError> {
        let rgb = image.to_rgb8();
        let mask = self.border_mask(&rgb);
        if let Some(contour) = largest_external_contour(&mask) {
            let eps = self.config.color_tolerance * contour.perimeter();
            let polygon = approx_polygon(&contour.as_point2(), eps);
            if let Some(corners) = quad(&polygon) {
                return Ok(BorderDetection {
                    corners,
                    strategy: LocalizationStrategy::ColorMask,
                    stage_map: mask,
                });
            }
            debug!(vertices = polygon.len(), "color mask contour is not a quadrilateral");
        } else {
            debug!("no border-colored region");
        }

        let edges = self.edge_map(&image.to_luma8());
        let contour = largest_external_contour(&edges).ok_or(PipelineError::NotFound)?;
        for strategy in self.edge_chain() {
            if let Some(corners) = strategy.apply(&contour) {
                debug!(?strategy, "edge contour reduced to four corners");
                return Ok(BorderDetection {
                    corners,
                    strategy: strategy.label(),
                    stage_map: edges,
                });
            }
        }
        Err(PipelineError::NotFound)
    }

    /// Thresholded, closed and dilated border color mask.
    #[must_use]
    pub fn border_mask(&self, rgb: &image::RgbImage) -> GrayImage {
        let mask = hsv_mask(rgb, &self.config.hsv);
        let mask = close(&mask, Norm::LInf, self.config.close_kernel / 2);
        dilate(&mask, Norm::LInf, self.config.dilate_kernel / 2)
    }

    /// Blurred Canny edge map.
    #[must_use]
    pub fn edge_map(&self, gray: &GrayImage) -> GrayImage {
        let blurred = gaussian_blur_f32(gray, self.config.blur_sigma);
        canny(&blurred, self.config.canny_low, self.config.canny_high)
    }
}
