//! Printcheck Core - card alignment and ROI extraction
//!
//! This crate contains the domain types, the ports the pipeline talks
//! through, and the image stages: border localization, perspective
//! rectification, keypoint alignment, ROI refinement and the quality gate.

pub mod config;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod stages;

pub use config::{AlignmentMode, CardSize, PipelineConfig};
pub use domain::{
    AlignedCard, CardReport, CornerSet, Homography, LocalizationStrategy, Outcome, Point2,
    RawImage, RoiBox, RoiResult, RoiSummary, SkipKind, Verdict,
};
pub use error::{AlignmentError, ConfigError, LoadError, PipelineError};
pub use pipeline::CardPipeline;
pub use ports::{ImageSource, ProgressEvent, ProgressSink, ResultOutput, SnapshotSink, Stage};
