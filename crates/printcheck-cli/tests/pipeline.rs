//! End-to-end batch tests through the binary.

#![allow(clippy::unwrap_used)]

mod common;

use common::{json_lines, Workspace, DEFECT};
use printcheck_test_support::SyntheticCardBuilder;

#[test]
fn test_good_card_exits_zero() {
    let ws = Workspace::new();
    ws.check().arg(ws.path("cards")).assert().code(0);
}

#[test]
fn test_low_match_exits_one() {
    let ws = Workspace::new();
    let noise = SyntheticCardBuilder::noise(110, 90, 3);
    ws.write_png("noise-reference.png", &noise);

    let output = ws
        .command()
        .arg("--reference")
        .arg(ws.path("noise-reference.png"))
        .arg(ws.path("cards"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let reports = json_lines(&output.stdout);
    assert_eq!(reports[0]["outcome"]["verdict"], "low_match");
}

#[test]
fn test_defect_template_set_resolves_reference() {
    let ws = Workspace::new();
    ws.command()
        .arg("--templates-dir")
        .arg(ws.path("templates"))
        .arg("--defect")
        .arg(DEFECT)
        .arg(ws.path("cards"))
        .assert()
        .code(0);
}

#[test]
fn test_feature_alignment_with_template_set() {
    let ws = Workspace::new();
    let output = ws
        .command()
        .arg("--templates-dir")
        .arg(ws.path("templates"))
        .args(["--defect", DEFECT, "--align", "feature"])
        .arg(ws.path("cards"))
        .output()
        .unwrap();

    let report = &json_lines(&output.stdout)[0];
    assert_eq!(report["outcome"]["status"], "processed");
    assert_eq!(report["outcome"]["strategy"]["kind"], "feature_match");
    assert!(report["outcome"]["strategy"]["inliers"].as_u64().unwrap() >= 8);
    assert!(report["outcome"].get("corners").is_none());
}

#[test]
fn test_crop_dir_receives_png_crops() {
    let ws = Workspace::new();
    let crops = ws.path("crops");

    let output = ws
        .check()
        .arg("--crop-dir")
        .arg(&crops)
        .arg(ws.path("cards"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let crop_path = crops.join("good.png");
    let crop = image::open(&crop_path).unwrap();
    assert_eq!((crop.width(), crop.height()), (110, 90));

    let report = &json_lines(&output.stdout)[0];
    assert_eq!(
        report["outcome"]["crop_path"].as_str().unwrap(),
        crop_path.display().to_string()
    );
}

#[test]
fn test_debug_dir_receives_stage_snapshots() {
    let ws = Workspace::new();
    let debug = ws.path("debug");

    ws.check()
        .arg("--debug-dir")
        .arg(&debug)
        .arg(ws.path("cards"))
        .assert()
        .code(0);

    let scratch = debug.join("good");
    for name in [
        "1_original.jpg",
        "2_edges.jpg",
        "3_contour.jpg",
        "4_aligned.jpg",
        "5_aligned_with_roi.jpg",
        "6_roi.jpg",
    ] {
        assert!(scratch.join(name).is_file(), "missing snapshot {name}");
    }
    let aligned = image::open(scratch.join("4_aligned.jpg")).unwrap();
    assert_eq!((aligned.width(), aligned.height()), (400, 560));
}

#[test]
fn test_failed_card_keeps_partial_snapshots() {
    let ws = Workspace::new();
    let blank = ws.write_card("blank.png", &SyntheticCardBuilder::blank_page(300, 300));
    let debug = ws.path("debug");

    ws.check()
        .arg("-q")
        .arg("--debug-dir")
        .arg(&debug)
        .arg(&blank)
        .assert()
        .code(1);

    let scratch = debug.join("blank");
    assert!(scratch.join("1_original.jpg").is_file());
    assert!(!scratch.join("4_aligned.jpg").exists());
}

#[test]
fn test_parallel_jobs_preserve_input_order() {
    let ws = Workspace::new();
    for (name, angle) in [("a.png", -5.0), ("b.png", 2.0), ("c.png", 6.0)] {
        ws.write_card(name, &ws.photo(angle));
    }

    let output = ws
        .check()
        .args(["--jobs", "3", "-q"])
        .arg(ws.path("cards"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let titles: Vec<String> = json_lines(&output.stdout)
        .iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, ["a", "b", "c", "good"]);
}

#[test]
fn test_parallel_jobs_write_one_crop_per_same_stem_input() {
    let ws = Workspace::new();
    ws.write_card("set1/front.png", &ws.photo(-3.0));
    ws.write_card("set2/front.png", &ws.photo(5.0));
    let crops = ws.path("crops");
    let debug = ws.path("debug");

    let output = ws
        .check()
        .args(["--jobs", "2", "-q", "-r"])
        .arg("--crop-dir")
        .arg(&crops)
        .arg("--debug-dir")
        .arg(&debug)
        .arg(ws.path("cards"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let reports = json_lines(&output.stdout);
    let titles: Vec<&str> = reports.iter().map(|r| r["title"].as_str().unwrap()).collect();
    assert_eq!(titles, ["good", "front", "front-1"]);

    let crop_paths: Vec<&str> = reports
        .iter()
        .map(|r| r["outcome"]["crop_path"].as_str().unwrap())
        .collect();
    for name in ["good", "front", "front-1"] {
        let path = crops.join(format!("{name}.png"));
        assert!(crop_paths.contains(&path.display().to_string().as_str()), "no report for {name}");
        assert!(path.is_file(), "missing crop {name}");
        assert!(debug.join(name).join("6_roi.jpg").is_file(), "missing scratch {name}");
    }
}

#[test]
fn test_mixed_batch_continues_past_failures() {
    let ws = Workspace::new();
    ws.write_card("blank.png", &SyntheticCardBuilder::blank_page(400, 400));
    std::fs::write(ws.path("cards/corrupt.jpg"), b"not an image").unwrap();

    let output = ws.check().arg("-q").arg(ws.path("cards")).output().unwrap();
    assert_eq!(output.status.code(), Some(1));

    let reports = json_lines(&output.stdout);
    let status: Vec<(&str, &str)> = reports
        .iter()
        .map(|r| {
            let outcome = &r["outcome"];
            let detail = outcome
                .get("kind")
                .or_else(|| outcome.get("verdict"))
                .and_then(serde_json::Value::as_str)
                .unwrap();
            (r["title"].as_str().unwrap(), detail)
        })
        .collect();
    assert_eq!(
        status,
        [
            ("blank", "not_found"),
            ("corrupt", "load_error"),
            ("good", "ok")
        ]
    );
}
