//! Integration tests for configuration layering.
//!
//! Tests the full priority chain: hardcoded defaults < XDG config < project config < CLI args

#![allow(clippy::unwrap_used)] // Test code uses unwrap for brevity

mod common;

use std::fs;

use common::{json_lines, Workspace, DEFECT};
use predicates::prelude::*;

#[test]
fn test_project_config_applies_format() {
    let ws = Workspace::new();
    fs::write(
        ws.path(".printcheck.toml"),
        r"
[output]
format = 'json'
",
    )
    .unwrap();

    ws.check()
        .arg(ws.path("cards"))
        .assert()
        .code(0)
        .stdout(predicate::str::starts_with("["));
}

#[test]
fn test_cli_overrides_project_config() {
    let ws = Workspace::new();
    fs::write(
        ws.path(".printcheck.toml"),
        r"
[output]
format = 'json'
",
    )
    .unwrap();

    ws.check()
        .args(["--format", "jsonl"])
        .arg(ws.path("cards"))
        .assert()
        .code(0)
        .stdout(predicate::str::starts_with("{"));
}

#[test]
fn test_xdg_config_supplies_template_set() {
    let ws = Workspace::new();
    let templates = ws.path("templates");
    fs::create_dir_all(ws.path("xdg/printcheck")).unwrap();
    fs::write(
        ws.path("xdg/printcheck/config.toml"),
        format!(
            "[templates]\ndir = '{}'\ndefect = '{DEFECT}'\n",
            templates.display()
        ),
    )
    .unwrap();

    ws.command().arg(ws.path("cards")).assert().code(0);
}

#[test]
fn test_project_config_overrides_xdg() {
    let ws = Workspace::new();
    fs::create_dir_all(ws.path("xdg/printcheck")).unwrap();
    fs::write(
        ws.path("xdg/printcheck/config.toml"),
        "[output]\nformat = 'json'\n",
    )
    .unwrap();
    fs::write(ws.path(".printcheck.toml"), "[output]\nformat = 'jsonl'\n").unwrap();

    ws.check()
        .arg(ws.path("cards"))
        .assert()
        .stdout(predicate::str::starts_with("{"));
}

#[test]
fn test_config_match_threshold_applies() {
    let ws = Workspace::new();
    fs::write(
        ws.path(".printcheck.toml"),
        "[quality]\nmatch_threshold = 1.0\n",
    )
    .unwrap();

    let output = ws.check().arg("-q").arg(ws.path("cards")).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(json_lines(&output.stdout)[0]["outcome"]["verdict"], "low_match");
}

#[test]
fn test_cli_threshold_overrides_config() {
    let ws = Workspace::new();
    fs::write(
        ws.path(".printcheck.toml"),
        "[quality]\nmatch_threshold = 1.0\n",
    )
    .unwrap();

    ws.check()
        .args(["--match-threshold", "0.5"])
        .arg(ws.path("cards"))
        .assert()
        .code(0);
}

#[test]
fn test_config_roi_is_applied() {
    let ws = Workspace::new();
    // A shrunken ROI no longer matches the 110x90 reference crop
    fs::write(
        ws.path(".printcheck.toml"),
        "[roi]\nx = 30\ny = 48\nwidth = 100\nheight = 90\n",
    )
    .unwrap();

    ws.check()
        .arg(ws.path("cards"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("roi.reference"));
}

#[test]
fn test_invalid_config_value_warns() {
    let ws = Workspace::new();
    fs::write(ws.path(".printcheck.toml"), "[general]\njobs = 0\n").unwrap();

    ws.check()
        .arg(ws.path("cards"))
        .assert()
        .stderr(predicate::str::contains("general.jobs must be at least 1"));
}
