//! Core domain types for card alignment and ROI extraction.

mod card;
mod geometry;
mod homography;
mod report;

pub use card::{
    AlignedCard, LocalizationStrategy, Provenance, RawImage, RoiBox, RoiResult, Verdict,
};
pub use geometry::{order_points, signed_area, CornerSet, Point2};
pub use homography::Homography;
pub use report::{CardReport, ImageDimensions, Outcome, RoiSummary, SkipKind};
