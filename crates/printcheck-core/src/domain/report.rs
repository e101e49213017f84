//! Serializable per-image reports.

use serde::{Deserialize, Serialize};

use super::{CornerSet, Homography, LocalizationStrategy, RoiBox, RoiResult, Verdict};

/// Image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Report for a single input image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardReport {
    /// Logical title of the image.
    pub title: String,
    /// File path, URL, or `in-memory`.
    pub source: String,
    /// Timestamp of processing (RFC 3339).
    pub timestamp: String,
    /// Source image dimensions, when it decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<ImageDimensions>,
    /// What happened.
    pub outcome: Outcome,
}

impl CardReport {
    /// True when the card was processed and passed the quality gate.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(&self.outcome, Outcome::Processed(summary) if summary.verdict == Verdict::Ok)
    }
}

/// Processed or skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// An ROI crop was produced.
    Processed(RoiSummary),
    /// The image was skipped.
    Skipped {
        /// Machine-readable category.
        kind: SkipKind,
        /// Human-readable reason.
        reason: String,
    },
}

/// Why an image was skipped.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    /// The image was missing or undecodable.
    LoadError,
    /// No card contour at all.
    NotFound,
    /// Corners did not form a usable quadrilateral.
    DegenerateCorners,
    /// Feature alignment failed and no fallback was configured.
    AlignmentError,
}

/// Metadata of an [`RoiResult`] without the pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoiSummary {
    /// Quality gate outcome.
    pub verdict: Verdict,
    /// Normalized cross-correlation against the reference crop.
    pub match_score: f32,
    /// Laplacian variance of the crop before normalization.
    pub sharpness: f64,
    /// Refined ROI box.
    pub roi: RoiBox,
    /// Refinement offset `[dx, dy]`.
    pub offset: [i32; 2],
    /// Localization strategy used.
    pub strategy: LocalizationStrategy,
    /// False for best-effort bounding-rectangle localization.
    pub precise: bool,
    /// Ordered source corners, for geometric localization.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corners: Option<CornerSet>,
    /// Source-to-card transform, row major.
    pub homography: Homography,
    /// Where the crop was written, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_path: Option<String>,
}

impl From<&RoiResult> for RoiSummary {
    fn from(result: &RoiResult) -> Self {
        Self {
            verdict: result.verdict,
            match_score: result.match_score,
            sharpness: result.sharpness,
            roi: result.roi,
            offset: [result.offset.0, result.offset.1],
            strategy: result.strategy,
            precise: result.strategy.is_precise(),
            corners: result.corners,
            homography: result.homography,
            crop_path: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn summary(verdict: Verdict) -> RoiSummary {
        RoiSummary {
            verdict,
            match_score: 0.93,
            sharpness: 812.5,
            roi: RoiBox::new(30, 48, 110, 90),
            offset: [1, -2],
            strategy: LocalizationStrategy::ColorMask,
            precise: true,
            corners: None,
            homography: Homography::identity(),
            crop_path: None,
        }
    }

    #[test]
    fn test_processed_report_json_shape() {
        let report = CardReport {
            title: "charizard".to_string(),
            source: "in-memory".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            dimensions: Some(ImageDimensions {
                width: 640,
                height: 800,
            }),
            outcome: Outcome::Processed(summary(Verdict::Ok)),
        };
        let value: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"]["status"], "processed");
        assert_eq!(value["outcome"]["verdict"], "ok");
        assert_eq!(value["outcome"]["strategy"]["kind"], "color_mask");
        assert!(value["outcome"].get("corners").is_none());
        assert_eq!(value["outcome"]["homography"][0][0], 1.0);
        assert_eq!(value["outcome"]["homography"][2].as_array().unwrap().len(), 3);
        assert!(report.is_ok());
    }

    #[test]
    fn test_skipped_report_json_shape() {
        let report = CardReport {
            title: "blank".to_string(),
            source: "blank.jpg".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            dimensions: None,
            outcome: Outcome::Skipped {
                kind: SkipKind::NotFound,
                reason: "no card-like contour found".to_string(),
            },
        };
        let value: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"]["status"], "skipped");
        assert_eq!(value["outcome"]["kind"], "not_found");
        assert!(value.get("dimensions").is_none());
        assert!(!report.is_ok());
    }

    #[test]
    fn test_report_round_trip() {
        let report = CardReport {
            title: "t".to_string(),
            source: "s".to_string(),
            timestamp: "ts".to_string(),
            dimensions: None,
            outcome: Outcome::Processed(summary(Verdict::Blurry)),
        };
        let json = serde_json::to_string(&report).unwrap();
        let parsed: CardReport = serde_json::from_str(&json).unwrap();
        assert!(!parsed.is_ok());
    }
}
