//! Error taxonomy for the alignment pipeline.
//!
//! Quality verdicts are not errors; a blurry or poorly matched crop is still a
//! successful [`crate::RoiResult`].

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::SkipKind;

/// The image could not be obtained or decoded.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No file at the resolved path.
    #[error("image file not found: {}", .path.display())]
    Missing {
        /// Resolved path.
        path: PathBuf,
    },
    /// The bytes are not a decodable image.
    #[error("failed to decode {source_name}: {reason}")]
    Decode {
        /// Path, URL, or title of the buffer.
        source_name: String,
        /// Decoder message.
        reason: String,
    },
    /// Reading the file failed.
    #[error("failed to read {}", .path.display())]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The per-image diagnostic directory could not be created.
    #[error("failed to create scratch directory {}", .path.display())]
    ScratchDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Downloading the buffer failed.
    #[error("failed to fetch {url}: {reason}")]
    Fetch {
        /// Requested URL.
        url: String,
        /// Transport or status message.
        reason: String,
    },
}

/// Keypoint-based alignment could not produce a homography.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignmentError {
    /// One of the images yielded too few keypoints to describe.
    #[error("too few keypoints: found {found}, need {required}")]
    TooFewKeypoints {
        /// Keypoints found.
        found: usize,
        /// Minimum required.
        required: usize,
    },
    /// Descriptor matching produced too few pairs.
    #[error("too few descriptor matches: found {found}, need {required}")]
    TooFewMatches {
        /// Matches found.
        found: usize,
        /// Minimum required.
        required: usize,
    },
    /// RANSAC found no model with enough support.
    #[error("no homography consensus: {inliers} inliers, need {required}")]
    NoConsensus {
        /// Best inlier count.
        inliers: usize,
        /// Minimum required.
        required: usize,
    },
    /// The estimated transform is singular or non-finite.
    #[error("estimated homography is degenerate")]
    Degenerate,
}

/// An invalid pipeline configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message}")]
pub struct ConfigError {
    /// Dotted field name, e.g. `roi.width`.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: String,
}

impl ConfigError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Per-image pipeline failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// See [`LoadError`].
    #[error(transparent)]
    Load(#[from] LoadError),
    /// No contour at all was found in the image.
    #[error("no card-like contour found")]
    NotFound,
    /// The localized corners cannot be rectified.
    #[error("degenerate card corners: {0}")]
    DegenerateCorners(String),
    /// See [`AlignmentError`].
    #[error("feature alignment failed: {0}")]
    Alignment(#[from] AlignmentError),
    /// See [`ConfigError`].
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Skip category for reporting, or `None` for configuration errors,
    /// which are fatal for the whole run rather than one image.
    #[must_use]
    pub const fn skip_kind(&self) -> Option<SkipKind> {
        match self {
            Self::Load(_) => Some(SkipKind::LoadError),
            Self::NotFound => Some(SkipKind::NotFound),
            Self::DegenerateCorners(_) => Some(SkipKind::DegenerateCorners),
            Self::Alignment(_) => Some(SkipKind::AlignmentError),
            Self::Config(_) => None,
        }
    }

    /// Stable short name of the failure category.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Load(_) => "load_error",
            Self::NotFound => "not_found",
            Self::DegenerateCorners(_) => "degenerate_corners",
            Self::Alignment(_) => "alignment_error",
            Self::Config(_) => "config_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_kinds() {
        assert_eq!(PipelineError::NotFound.skip_kind(), Some(SkipKind::NotFound));
        assert_eq!(
            PipelineError::from(AlignmentError::Degenerate).skip_kind(),
            Some(SkipKind::AlignmentError)
        );
        assert_eq!(
            PipelineError::from(ConfigError::new("card.width", "must be positive")).skip_kind(),
            None
        );
    }

    #[test]
    fn test_kind_matches_skip_kind_serialization() {
        assert_eq!(PipelineError::NotFound.kind(), "not_found");
        assert_eq!(
            PipelineError::DegenerateCorners("collinear".into()).kind(),
            "degenerate_corners"
        );
        assert_eq!(
            PipelineError::from(ConfigError::new("roi", "too big")).kind(),
            "config_error"
        );
    }

    #[test]
    fn test_messages() {
        let err = LoadError::Missing {
            path: PathBuf::from("in/card.jpg"),
        };
        assert_eq!(err.to_string(), "image file not found: in/card.jpg");
        let err = ConfigError::new("roi.width", "must be positive");
        assert_eq!(err.to_string(), "invalid roi.width: must be positive");
        assert_eq!(
            PipelineError::NotFound.to_string(),
            "no card-like contour found"
        );
    }
}
