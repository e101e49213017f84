//! Keypoint alignment of a photograph against a known card template.

use image::{GrayImage, RgbImage};
use tracing::debug;

use super::features::{match_descriptors, Descriptor, Keypoint, OrbExtractor};
use super::ransac::fit_homography_ransac;
use super::rectify::warp_perspective;
use crate::config::{CardSize, FeatureConfig};
use crate::domain::{Homography, Point2};
use crate::error::AlignmentError;

/// A source image warped into the template frame.
#[derive(Debug, Clone)]
pub struct FeatureAlignment {
    /// Warped pixels at the target size.
    pub image: RgbImage,
    /// Source-to-target transform.
    pub homography: Homography,
    /// RANSAC inliers.
    pub inliers: usize,
}

/// Aligns images to a template whose features are extracted once.
#[derive(Debug, Clone)]
pub struct FeatureAligner {
    config: FeatureConfig,
    extractor: OrbExtractor,
    keypoints: Vec<Keypoint>,
    descriptors: Vec<Descriptor>,
    template_size: (u32, u32),
}

impl FeatureAligner {
    /// Extracts template features.
    ///
    /// # Errors
    ///
    /// Returns [`AlignmentError::TooFewKeypoints`] when the template is too
    /// plain to align against.
    pub fn new(template: &GrayImage, config: FeatureConfig) -> Result<Self, AlignmentError> {
        let extractor = OrbExtractor::new(config.max_features, config.fast_threshold);
        let (keypoints, descriptors) = extractor.extract(template);
        if keypoints.len() < config.min_matches {
            return Err(AlignmentError::TooFewKeypoints {
                found: keypoints.len(),
                required: config.min_matches,
            });
        }
        debug!(keypoints = keypoints.len(), "template features extracted");
        Ok(Self {
            config,
            extractor,
            keypoints,
            descriptors,
            template_size: template.dimensions(),
        })
    }

    /// Estimates the source-to-template homography.
    ///
    /// # Errors
    ///
    /// Fails when keypoints, matches or RANSAC support fall short.
    pub fn estimate(&self, source: &GrayImage) -> Result<(Homography, usize), AlignmentError> {
        let (keypoints, descriptors) = self.extractor.extract(source);
        if keypoints.len() < self.config.min_matches {
            return Err(AlignmentError::TooFewKeypoints {
                found: keypoints.len(),
                required: self.config.min_matches,
            });
        }

        let mut matches = match_descriptors(&descriptors, &self.descriptors);
        matches.truncate(self.config.keep_matches);
        if matches.len() < self.config.min_matches {
            return Err(AlignmentError::TooFewMatches {
                found: matches.len(),
                required: self.config.min_matches,
            });
        }

        let to_point = |kp: &Keypoint| Point2::new(f64::from(kp.x), f64::from(kp.y));
        let (src, dst): (Vec<Point2>, Vec<Point2>) = matches
            .iter()
            .map(|m| {
                (
                    to_point(&keypoints[m.query]),
                    to_point(&self.keypoints[m.train]),
                )
            })
            .unzip();

        let fit = fit_homography_ransac(&src, &dst, &self.config)?;
        debug!(
            matches = matches.len(),
            inliers = fit.inlier_count,
            "feature homography estimated"
        );
        Ok((fit.homography, fit.inlier_count))
    }

    /// Warps `source` into the template frame, scaled to `target`.
    ///
    /// # Errors
    ///
    /// See [`Self::estimate`]; also [`AlignmentError::Degenerate`] when the
    /// homography cannot be inverted.
    pub fn align(
        &self,
        source: &RgbImage,
        target: CardSize,
    ) -> Result<FeatureAlignment, AlignmentError> {
        let (to_template, inliers) = self.estimate(&image::imageops::grayscale(source))?;
        let (tw, th) = self.template_size;
        let scale = Homography::scaling(
            f64::from(target.width.max(2) - 1) / f64::from(tw.max(2) - 1),
            f64::from(target.height.max(2) - 1) / f64::from(th.max(2) - 1),
        );
        let homography = to_template.then(&scale);
        let image = warp_perspective(source, &homography, target.width, target.height)
            .ok_or(AlignmentError::Degenerate)?;
        Ok(FeatureAlignment {
            image,
            homography,
            inliers,
        })
    }
}
