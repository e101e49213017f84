//! Writes diagnostic stage snapshots and final ROI crops to disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, RgbImage};
use printcheck_core::ports::{SnapshotSink, Stage};

use crate::fs::sanitize_title;

/// Saves each stage as a JPEG named by its numeric prefix.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSnapshotWriter;

impl FsSnapshotWriter {
    /// Creates a writer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SnapshotSink for FsSnapshotWriter {
    fn save(&self, scratch_dir: &Path, stage: Stage, image: &DynamicImage) -> Result<()> {
        let path = scratch_dir.join(stage.file_name());
        // JPEG has no alpha or 16-bit support
        DynamicImage::ImageRgb8(image.to_rgb8())
            .save_with_format(&path, ImageFormat::Jpeg)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))
    }
}

/// Writes final crops as `<sanitized title>.png` for the classifier.
#[derive(Debug, Clone)]
pub struct CropWriter {
    dir: PathBuf,
}

impl CropWriter {
    /// Creates the output directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create crop directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Path a crop for `title` is written to.
    #[must_use]
    pub fn path_for(&self, title: &str) -> PathBuf {
        self.dir.join(format!("{}.png", sanitize_title(title)))
    }

    /// Writes a crop and returns its path.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn write(&self, title: &str, crop: &RgbImage) -> Result<PathBuf> {
        let path = self.path_for(title);
        crop.save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("Failed to write crop {}", path.display()))?;
        Ok(path)
    }
}
