//! Diagnostic snapshot port.

use std::path::Path;

use image::DynamicImage;

/// Numbered pipeline stages that can be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Decoded source image.
    Original,
    /// Border mask or edge map that yielded the corners.
    Edges,
    /// Source image with the detected quadrilateral drawn on it.
    Contour,
    /// Rectified card.
    Aligned,
    /// Rectified card with the refined ROI box drawn on it.
    AlignedWithRoi,
    /// Final normalized crop.
    Roi,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 6] = [
        Self::Original,
        Self::Edges,
        Self::Contour,
        Self::Aligned,
        Self::AlignedWithRoi,
        Self::Roi,
    ];

    /// Fixed file name, numbered by stage.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Original => "1_original.jpg",
            Self::Edges => "2_edges.jpg",
            Self::Contour => "3_contour.jpg",
            Self::Aligned => "4_aligned.jpg",
            Self::AlignedWithRoi => "5_aligned_with_roi.jpg",
            Self::Roi => "6_roi.jpg",
        }
    }
}

/// Port for persisting stage snapshots into a per-image scratch directory.
pub trait SnapshotSink: Send + Sync {
    /// Writes one snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written. The pipeline
    /// logs and ignores it.
    fn save(&self, scratch_dir: &Path, stage: Stage, image: &DynamicImage) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_file_names_are_numbered_in_order() {
        for (i, stage) in Stage::ALL.iter().enumerate() {
            assert!(stage.file_name().starts_with(&format!("{}_", i + 1)));
            assert!(stage.file_name().ends_with(".jpg"));
        }
    }
}
