//! Shared fixtures for CLI integration tests.

#![allow(dead_code)]
#![allow(deprecated)] // cargo_bin deprecation

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use printcheck_core::PipelineConfig;
use printcheck_test_support::SyntheticCardBuilder;
use tempfile::TempDir;

/// Table color behind the synthetic cards.
pub const TABLE: Rgb<u8> = Rgb([50, 55, 50]);

/// Template set name used by the fixtures.
pub const DEFECT: &str = "shadowless";

/// A scratch workspace with card photos and a reference crop.
///
/// Layout:
/// - `cards/good.png` - tilted card photo
/// - `reference.png` - ROI reference cut from the same card face
/// - `templates/shadowless/roi.png` and `card.png`
/// - `xdg/` - isolated XDG config home
pub struct Workspace {
    dir: TempDir,
    face: RgbImage,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let face = SyntheticCardBuilder::default_card_face();
        let ws = Self { dir, face };

        fs::create_dir_all(ws.path("cards")).unwrap();
        fs::create_dir_all(ws.path("xdg")).unwrap();
        ws.write_card("good.png", &ws.photo(4.0));

        let reference =
            SyntheticCardBuilder::reference_crop(&ws.face, PipelineConfig::default().roi.nominal);
        ws.write_png("reference.png", &reference);
        ws.write_png(&format!("templates/{DEFECT}/roi.png"), &reference);
        ws.write_png(&format!("templates/{DEFECT}/card.png"), &ws.face);
        ws
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Photo of the fixture card face rotated by `angle_deg`.
    pub fn photo(&self, angle_deg: f32) -> RgbImage {
        SyntheticCardBuilder::photo(&self.face, angle_deg, 40, TABLE)
    }

    pub fn write_png(&self, rel: &str, img: &RgbImage) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, SyntheticCardBuilder::encode_png(img).unwrap()).unwrap();
        path
    }

    /// Writes an image under `cards/`.
    pub fn write_card(&self, name: &str, img: &RgbImage) -> PathBuf {
        self.write_png(&format!("cards/{name}"), img)
    }

    /// `printcheck` running inside the workspace with no user config.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("printcheck").unwrap();
        cmd.current_dir(self.root())
            .env("XDG_CONFIG_HOME", self.path("xdg"))
            .env("HOME", self.root())
            .env_remove("RUST_LOG");
        cmd
    }

    /// `printcheck --reference reference.png`, ready for inputs.
    pub fn check(&self) -> Command {
        let mut cmd = self.command();
        cmd.arg("--reference").arg(self.path("reference.png"));
        cmd
    }
}

/// Parses JSONL stdout into one value per line.
pub fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}
