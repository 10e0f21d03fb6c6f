//! Smoke tests for the vistazo CLI

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use image::{Rgba, RgbaImage};
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// Get a command for the vistazo binary, isolated from `VISTAZO_*` variables
fn vistazo() -> Command {
    let mut cmd = Command::cargo_bin("vistazo").expect("vistazo binary should exist");
    for (name, _) in std::env::vars() {
        if name.starts_with("VISTAZO_") {
            cmd.env_remove(name);
        }
    }
    cmd
}

fn write_png(path: &Path, marked: u32) {
    let mut img = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
    for x in 0..marked {
        img.put_pixel(x, 0, Rgba([0, 0, 0, 255]));
    }
    img.save(path).unwrap();
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    vistazo()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    vistazo()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("base-url"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("diff"));
}

#[test]
fn test_no_args_shows_help() {
    vistazo().assert().failure();
}

// ============================================================================
// Settings Tests
// ============================================================================

#[test]
fn test_base_url_from_overrides() {
    vistazo()
        .args(["base-url", "--isolated", "--set", "port=8123", "--set", "path=shop"])
        .assert()
        .success()
        .stdout(predicate::str::diff("http://localhost:8123/shop\n"));
}

#[test]
fn test_base_url_environment_layer() {
    let dir = TempDir::new().unwrap();
    vistazo()
        .env("VISTAZO_HOST", "env-host")
        .current_dir(dir.path())
        .args(["base-url", "--set", "https=true"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://env-host/"));
}

#[test]
fn test_base_url_invalid_port_fails() {
    vistazo()
        .args(["base-url", "--isolated", "--set", "port=99999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("99999"));
}

#[test]
fn test_malformed_override_fails() {
    vistazo()
        .args(["base-url", "--isolated", "--set", "port"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_config_json() {
    let output = vistazo()
        .args(["config", "--isolated", "--set", "screenshots.enabled=false"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["capture"]["enabled"], false);
}

// ============================================================================
// Diff Tests
// ============================================================================

#[test]
fn test_diff_identical() {
    let dir = TempDir::new().unwrap();
    let actual = dir.path().join("actual.png");
    let baseline = dir.path().join("baseline.png");
    write_png(&actual, 0);
    write_png(&baseline, 0);

    vistazo()
        .arg("diff")
        .arg(&actual)
        .arg(&baseline)
        .arg("--fail")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("OK"));
}

#[test]
fn test_diff_verbose_names_inputs() {
    let dir = TempDir::new().unwrap();
    let actual = dir.path().join("actual.png");
    let baseline = dir.path().join("baseline.png");
    write_png(&actual, 0);
    write_png(&baseline, 0);

    vistazo()
        .arg("-v")
        .arg("diff")
        .arg(&actual)
        .arg(&baseline)
        .assert()
        .success()
        .stdout(predicate::str::contains("compared"))
        .stdout(predicate::str::contains("baseline.png"))
        .stdout(predicate::str::contains("color threshold 10"));
}

#[test]
fn test_diff_quiet_is_silent() {
    let dir = TempDir::new().unwrap();
    let actual = dir.path().join("actual.png");
    let baseline = dir.path().join("baseline.png");
    write_png(&actual, 0);
    write_png(&baseline, 0);

    vistazo()
        .arg("-q")
        .arg("diff")
        .arg(&actual)
        .arg(&baseline)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_diff_divergence_fails() {
    let dir = TempDir::new().unwrap();
    let actual = dir.path().join("actual.png");
    let baseline = dir.path().join("baseline.png");
    let diff = dir.path().join("diff.png");
    write_png(&actual, 20);
    write_png(&baseline, 0);

    vistazo()
        .arg("diff")
        .arg(&actual)
        .arg(&baseline)
        .arg("--diff-out")
        .arg(&diff)
        .arg("--fail")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DIVERGED"));
    assert!(diff.exists());
}

#[test]
fn test_diff_within_deviation() {
    let dir = TempDir::new().unwrap();
    let actual = dir.path().join("actual.png");
    let baseline = dir.path().join("baseline.png");
    write_png(&actual, 20);
    write_png(&baseline, 0);

    vistazo()
        .arg("diff")
        .arg(&actual)
        .arg(&baseline)
        .args(["--max-deviation", "0.1", "--fail"])
        .assert()
        .success();
}

#[test]
fn test_diff_missing_file() {
    vistazo()
        .args(["diff", "/nonexistent/a.png", "/nonexistent/b.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}
