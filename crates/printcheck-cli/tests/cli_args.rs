//! CLI argument validation tests.
//!
//! Tests command-line argument parsing, validation, and error handling.

#![allow(clippy::unwrap_used)]

mod common;

use common::{json_lines, Workspace, DEFECT};
use predicates::prelude::*;

// === Missing Inputs / References ===

#[test]
fn test_missing_inputs_shows_error() {
    let ws = Workspace::new();
    ws.command()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No inputs specified"));
}

#[test]
fn test_missing_reference_is_fatal() {
    let ws = Workspace::new();
    ws.command()
        .arg(ws.path("cards"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No ROI reference"));
}

#[test]
fn test_unknown_defect_is_fatal() {
    let ws = Workspace::new();
    ws.command()
        .arg("--templates-dir")
        .arg(ws.path("templates"))
        .arg("--defect")
        .arg("nonexistent")
        .arg(ws.path("cards"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Template set 'nonexistent'"));
}

#[test]
fn test_reference_size_mismatch_is_fatal() {
    let ws = Workspace::new();
    ws.check()
        .arg("--roi")
        .arg("30,48,100,90")
        .arg(ws.path("cards"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("roi.reference"));
}

#[test]
fn test_feature_mode_without_template_is_fatal() {
    let ws = Workspace::new();
    ws.check()
        .arg("--align")
        .arg("feature")
        .arg(ws.path("cards"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("alignment"));
}

// === Missing Images ===

#[test]
fn test_nonexistent_image_is_reported_as_skipped() {
    let ws = Workspace::new();
    let output = ws.check().arg(ws.path("cards/missing.jpg")).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));

    let reports = json_lines(&output.stdout);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["outcome"]["status"], "skipped");
    assert_eq!(reports[0]["outcome"]["kind"], "load_error");
}

#[test]
fn test_empty_directory() {
    let ws = Workspace::new();
    let empty = ws.path("empty");
    std::fs::create_dir_all(&empty).unwrap();

    ws.check()
        .arg(&empty)
        .assert()
        .code(0)
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_unreachable_url_is_skipped() {
    let ws = Workspace::new();
    let output = ws
        .check()
        .arg("-q")
        .arg("http://127.0.0.1:9/card.jpg")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let reports = json_lines(&output.stdout);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["title"], "http://127.0.0.1:9/card.jpg");
    assert_eq!(reports[0]["outcome"]["kind"], "load_error");
}

// === Value Validation ===

#[test]
fn test_invalid_format_rejected() {
    let ws = Workspace::new();
    ws.check()
        .arg("--format")
        .arg("xml")
        .arg(ws.path("cards"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("json").and(predicate::str::contains("jsonl")));
}

#[test]
fn test_match_threshold_out_of_range() {
    let ws = Workspace::new();
    ws.check()
        .arg("--match-threshold")
        .arg("1.5")
        .arg(ws.path("cards"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("1.5 is not in -1.0..=1.0"));
}

#[test]
fn test_negative_blur_threshold_rejected() {
    let ws = Workspace::new();
    ws.check()
        .arg("--blur-threshold=-3")
        .arg(ws.path("cards"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be non-negative"));
}

#[test]
fn test_malformed_roi_rejected() {
    let ws = Workspace::new();
    ws.check()
        .arg("--roi")
        .arg("30,48,110")
        .arg(ws.path("cards"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("X,Y,WIDTH,HEIGHT"));
}

#[test]
fn test_malformed_card_size_rejected() {
    let ws = Workspace::new();
    ws.check()
        .arg("--card-size")
        .arg("400by560")
        .arg(ws.path("cards"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("WIDTHxHEIGHT"));
}

#[test]
fn test_zero_jobs_rejected() {
    let ws = Workspace::new();
    ws.check()
        .arg("--jobs")
        .arg("0")
        .arg(ws.path("cards"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 1"));
}

#[test]
fn test_unknown_alignment_mode_rejected() {
    let ws = Workspace::new();
    ws.check()
        .arg("--align")
        .arg("magic")
        .arg(ws.path("cards"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown alignment mode"));
}

// === Subcommands ===

#[test]
fn test_check_subcommand_matches_default() {
    let ws = Workspace::new();
    ws.command()
        .arg("check")
        .arg("--reference")
        .arg(ws.path("reference.png"))
        .arg(ws.path("cards"))
        .assert()
        .code(0);
}

#[test]
fn test_templates_path_prints_dir() {
    let ws = Workspace::new();
    ws.command()
        .args(["templates", "path", "--templates-dir"])
        .arg(ws.path("templates"))
        .assert()
        .success()
        .stdout(predicate::str::contains("templates"));
}

#[test]
fn test_templates_list_shows_sets() {
    let ws = Workspace::new();
    ws.command()
        .args(["templates", "list", "--templates-dir"])
        .arg(ws.path("templates"))
        .assert()
        .success()
        .stdout(predicate::str::contains(DEFECT).and(predicate::str::contains("card.png")));
}

#[test]
fn test_templates_list_empty_dir() {
    let ws = Workspace::new();
    ws.command()
        .args(["templates", "list", "--templates-dir"])
        .arg(ws.path("no-templates"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No template sets"));
}

#[test]
fn test_help_lists_subcommands() {
    let ws = Workspace::new();
    ws.command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check").and(predicate::str::contains("templates")));
}
