//! CLI integration tests for the meerpipe command-line interface.
//!
//! These run without the pulsar tools or a catalog: they cover argument
//! parsing, help output, dry runs and manifest listing.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A meerpipe command isolated inside `dir`.
fn meerpipe(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("meerpipe").unwrap();
    cmd.current_dir(dir)
        .env("MEERPIPE_CONFIG_DIR", dir.join("config"))
        .env_remove("MEERPIPE_CONFIG")
        .env_remove("MEERPIPE_CATALOG_TOKEN");
    cmd
}

fn manifest(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("jobs.csv");
    fs::write(
        &path,
        "pulsar,utc_obs,project_id,band,duration,ephemeris_path,template_path\n\
         J0437-4715,2021-01-01-00:00:00,P001,UHF,64,/eph/J0437-4715.par,/tmpl/J0437-4715.std\n\
         J1909-3744,2021-02-01-00:00:00,PTA,LBAND,256,None,None\n",
    )
    .unwrap();
    path
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let tmp = TempDir::new().unwrap();
    meerpipe(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("MeerPipe"))
        .stdout(predicate::str::contains("pulsar timing pipeline"));
}

#[test]
fn test_version_displays() {
    let tmp = TempDir::new().unwrap();
    meerpipe(tmp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("meerpipe"));
}

#[test]
fn test_help_lists_flags() {
    let tmp = TempDir::new().unwrap();
    let mut assert = meerpipe(tmp.path()).arg("--help").assert().success();
    for flag in [
        "--list_in",
        "--utcs",
        "--utce",
        "--obs_pid",
        "--pulsar",
        "--list_out",
        "--use_edge_subints",
        "--fluxcal",
        "--ephemerides_dir",
        "--templates_dir",
        "--ephemeris",
        "--template",
        "--out_dir",
    ] {
        assert = assert.stdout(predicate::str::contains(flag));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument Validation Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_bad_utc_rejected() {
    let tmp = TempDir::new().unwrap();
    meerpipe(tmp.path())
        .args(["--utcs", "yesterday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--utcs"));
}

#[test]
fn test_unknown_flag_rejected() {
    let tmp = TempDir::new().unwrap();
    meerpipe(tmp.path())
        .arg("--no-such-flag")
        .assert()
        .failure();
}

#[test]
fn test_missing_manifest_fails() {
    let tmp = TempDir::new().unwrap();
    meerpipe(tmp.path())
        .args(["--list_in", "missing.csv", "--dry_run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.csv"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Dry Run and Listing Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_dry_run_prints_plan() {
    let tmp = TempDir::new().unwrap();
    let list = manifest(tmp.path());
    meerpipe(tmp.path())
        .arg("--list_in")
        .arg(&list)
        .arg("--input_dir")
        .arg(tmp.path())
        .arg("--dry_run")
        .assert()
        .success()
        .stdout(predicate::str::contains("J0437-4715"))
        .stdout(predicate::str::contains("combine"))
        .stdout(predicate::str::contains("toas"))
        .stdout(predicate::str::contains("2 jobs planned"));
    assert!(!tmp.path().join("processing_jobs.csv").exists());
}

#[test]
fn test_dry_run_json_with_fluxcal() {
    let tmp = TempDir::new().unwrap();
    let list = manifest(tmp.path());
    let output = meerpipe(tmp.path())
        .arg("--list_in")
        .arg(&list)
        .args(["--dry_run", "--json", "--fluxcal"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let jobs = plan["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["stages"][0]["stage"], "calibrate");
    assert_eq!(jobs[0]["stages"].as_array().unwrap().len(), 6);
    assert_eq!(jobs[0]["job"]["ephemeris"], "/eph/J0437-4715.par");
}

#[test]
fn test_list_out_writes_manifest() {
    let tmp = TempDir::new().unwrap();
    let list = manifest(tmp.path());
    meerpipe(tmp.path())
        .arg("--list_in")
        .arg(&list)
        .args(["--ephemerides_dir", "/ephemerides", "--list_out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("processing_jobs.csv"));

    let written = fs::read_to_string(tmp.path().join("processing_jobs.csv")).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("pulsar,utc_obs"));
    // Null sentinels resolve to the default ephemeris path.
    assert!(lines[2].contains("/ephemerides/PTA/J1909-3744.par"));
}

#[test]
fn test_dry_run_rejects_bad_row_and_keeps_others() {
    let tmp = TempDir::new().unwrap();
    let list = tmp.path().join("jobs.csv");
    fs::write(
        &list,
        "J0437-4715,2021-01-01-00:00:00,P001,UHF,64\n\
         J1909-3744,garbage,PTA,LBAND,256\n\
         J1713+0747,2021-03-01-00:00:00,PTA,LBAND,128\n",
    )
    .unwrap();

    let output = meerpipe(tmp.path())
        .arg("--list_in")
        .arg(&list)
        .args(["--dry_run", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let pulsars: Vec<&str> = plan["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["job"]["pulsar"].as_str().unwrap())
        .collect();
    assert_eq!(pulsars, vec!["J0437-4715", "J1713+0747"]);

    let rejected = plan["rejected"].as_array().unwrap();
    assert_eq!(rejected.len(), 1);
    assert!(rejected[0]["observation"].as_str().unwrap().ends_with("jobs.csv line 2"));
    assert!(rejected[0]["error"].as_str().unwrap().contains("line 2"));
}
