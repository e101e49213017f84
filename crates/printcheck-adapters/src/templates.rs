//! Reference template store.
//!
//! A template set is a directory named after a defect, holding the ROI
//! reference crop and optionally a full card template for keypoint
//! alignment.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::debug;

/// ROI reference crop file name.
pub const ROI_FILE: &str = "roi.png";

/// Card template file name.
pub const CARD_FILE: &str = "card.png";

/// Returns the default templates directory.
///
/// Uses `XDG_DATA_HOME/printcheck/templates` or
/// `~/.local/share/printcheck/templates`.
#[must_use]
pub fn default_templates_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("printcheck")
        .join("templates")
}

/// Files of one template set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSet {
    /// Defect name.
    pub name: String,
    /// ROI reference crop.
    pub reference: PathBuf,
    /// Card template, when present.
    pub card: Option<PathBuf>,
}

impl TemplateSet {
    /// Resolves the set for `defect` under `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error when the set has no ROI reference.
    pub fn resolve(dir: &Path, defect: &str) -> Result<Self> {
        let root = dir.join(defect);
        let reference = root.join(ROI_FILE);
        if !reference.is_file() {
            anyhow::bail!(
                "Template set '{defect}' has no {ROI_FILE} in {}",
                root.display()
            );
        }
        let card = Some(root.join(CARD_FILE)).filter(|p| p.is_file());
        debug!(defect, has_card = card.is_some(), "resolved template set");
        Ok(Self {
            name: defect.to_string(),
            reference,
            card,
        })
    }
}

/// Lists template sets with whether each has a reference and a card template.
///
/// A missing directory yields an empty list.
#[must_use]
pub fn list_templates(dir: &Path) -> Vec<(String, bool, bool)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut sets: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter_map(|p| {
            let name = p.file_name()?.to_string_lossy().into_owned();
            Some((name, p.join(ROI_FILE).is_file(), p.join(CARD_FILE).is_file()))
        })
        .collect();
    sets.sort();
    sets
}

/// Loads a template image as RGB.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or decoded.
pub fn load_template_image(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)
        .with_context(|| format!("Failed to open template: {}", path.display()))?
        .to_rgb8())
}
