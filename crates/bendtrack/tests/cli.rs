use std::fs;
use std::path::Path;

use assert_cmd::Command;
use bendtrack::{FrameStatus, TrackReport};
use predicates::prelude::*;

/// Gray test frame: smooth blobs on a dark background, translated by `shift`.
fn write_frame(path: &Path, shift: (f64, f64)) {
    let (w, h) = (160u32, 120u32);
    let blobs = [
        (20.0, 50.0, 4.0),
        (32.0, 70.0, 3.0),
        (25.0, 62.0, 2.5),
        (70.0, 40.0, 4.5),
        (82.0, 52.0, 3.0),
        (76.0, 34.0, 2.5),
        (120.0, 55.0, 4.0),
        (130.0, 68.0, 3.0),
        (112.0, 64.0, 2.5),
        (135.0, 48.0, 3.5),
    ];
    let img = image::GrayImage::from_fn(w, h, |x, y| {
        let (px, py) = (x as f64 - shift.0, y as f64 - shift.1);
        let v: f64 = blobs
            .iter()
            .map(|&(cx, cy, s)| (-((px - cx).powi(2) + (py - cy).powi(2)) / (2.0 * s * s)).exp())
            .sum();
        image::Luma([(20.0 + 220.0 * v).min(255.0) as u8])
    });
    img.save(path).unwrap();
}

#[test]
fn help_lists_the_options() {
    Command::cargo_bin("bendtrack")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--on-failure"))
        .stdout(predicate::str::contains("--monitor"));
}

#[test]
fn missing_config_fails_cleanly() {
    Command::cargo_bin("bendtrack")
        .unwrap()
        .arg("does-not-exist.json")
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error:"));
}

#[test]
fn log_level_is_validated() {
    Command::cargo_bin("bendtrack")
        .unwrap()
        .args(["does-not-exist.json", "--log-level", "loud"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value 'loud'"));

    Command::cargo_bin("bendtrack")
        .unwrap()
        .args(["does-not-exist.json", "--log-level", "debug"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn tracks_a_folder_and_writes_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    fs::create_dir(&frames).unwrap();
    write_frame(&frames.join("f000.png"), (0.0, 0.0));
    write_frame(&frames.join("f001.png"), (2.0, 1.0));
    fs::write(frames.join("notes.txt"), "not a frame").unwrap();

    let report_path = dir.path().join("report.json");
    let config = serde_json::json!({
        "frames_dir": frames.display().to_string(),
        "output_path": report_path.display().to_string(),
        "params": { "template_size": 30, "search_radius": 6, "subpixel": false },
        "selection": {
            "free": [125.0, 60.0],
            "attached": [25.0, 60.0],
            "mid": [75.0, 45.0],
            "holder_rect": { "x": 12, "y": 42, "width": 26, "height": 36 }
        }
    });
    let config_path = dir.path().join("track.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    Command::cargo_bin("bendtrack")
        .unwrap()
        .arg(&config_path)
        .args(["--log-level", "warn", "--frame-rate", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 frames measured"));

    let report = TrackReport::load_json(&report_path).unwrap();
    assert_eq!(report.frames.len(), 2);
    assert_eq!(report.frames[0].label.as_deref(), Some("f000.png"));
    let last = &report.frames[1];
    assert_eq!(last.status, FrameStatus::Measured);
    assert!((last.time - 0.1).abs() < 1e-12);
    assert!((last.free.x - 127.0).abs() < 1e-9);
    assert!((last.free.y - 61.0).abs() < 1e-9);
}
