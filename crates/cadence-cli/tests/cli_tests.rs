//! Integration tests for the `cadence` CLI binary.
//!
//! These tests use `assert_cmd` and `predicates` to exercise the validate,
//! expand, and reconcile subcommands through the actual binary, including
//! stdin piping, file output, config loading, and error handling.

// `Command::cargo_bin` was deprecated in assert_cmd 2.1.2 in favor of
// `cargo::cargo_bin_cmd!`. Allow it until we migrate.
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

fn plans_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/plans.json")
}

fn events_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/events.json")
}

fn config_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/cadence.toml")
}

fn invalid_plan_path() -> &'static str {
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/invalid_plan.json")
}

/// Helper: the request flags shared by the expand and reconcile tests.
fn request_args() -> Vec<&'static str> {
    vec![
        "-i",
        plans_path(),
        "--events",
        events_path(),
        "--now",
        "2015-04-12T14:20:56-07:00",
        "--until",
        "2015-04-14T14:20:56-07:00",
        "--zone",
        "America/Los_Angeles",
    ]
}

fn run_json(subcommand: &str, extra: &[&str]) -> Vec<serde_json::Value> {
    let output = Command::cargo_bin("cadence")
        .unwrap()
        .arg(subcommand)
        .args(request_args())
        .args(extra)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Validate subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn validate_lists_plans() {
    Command::cargo_bin("cadence")
        .unwrap()
        .args(["validate", "-i", plans_path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("plan-1: 1 schedule(s)"))
        .stdout(predicate::str::contains("plan-2: 1 schedule(s)"));
}

#[test]
fn validate_reads_stdin() {
    let plans = std::fs::read_to_string(plans_path()).unwrap();
    Command::cargo_bin("cadence")
        .unwrap()
        .arg("validate")
        .write_stdin(plans)
        .assert()
        .success()
        .stdout(predicate::str::contains("plan-1"));
}

#[test]
fn validate_accepts_declared_data_groups() {
    Command::cargo_bin("cadence")
        .unwrap()
        .args(["validate", "-i", plans_path(), "--data-groups", "group1,group2"])
        .assert()
        .success();
}

#[test]
fn validate_rejects_invalid_schedule() {
    Command::cargo_bin("cadence")
        .unwrap()
        .args(["validate", "-i", invalid_plan_path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("times are required"));
}

#[test]
fn validate_rejects_malformed_json() {
    Command::cargo_bin("cadence")
        .unwrap()
        .arg("validate")
        .write_stdin("not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse schedule plans"));
}

#[test]
fn validate_missing_file() {
    Command::cargo_bin("cadence")
        .unwrap()
        .args(["validate", "-i", "/nonexistent/plans.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Expand subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn expand_prints_local_offsets() {
    Command::cargo_bin("cadence")
        .unwrap()
        .arg("expand")
        .args(request_args())
        .assert()
        .success()
        .stdout(predicate::str::contains("2015-04-12T13:00:00-07:00"))
        .stdout(predicate::str::contains("plan-1:activity-1:2015-04-12T13:00:00"));
}

#[test]
fn expand_orders_occurrences() {
    let occurrences = run_json("expand", &[]);
    let guids: Vec<&str> = occurrences.iter().map(|o| o["guid"].as_str().unwrap()).collect();
    assert_eq!(
        guids,
        [
            "plan-2:activity-2:2015-04-10T10:40:34",
            "plan-1:activity-1:2015-04-12T13:00:00",
            "plan-1:activity-1:2015-04-13T13:00:00",
            "plan-1:activity-1:2015-04-14T13:00:00",
        ]
    );
    assert_eq!(occurrences[0]["status"], "available");
    assert_eq!(occurrences[1]["expiresOn"], "2015-04-12T23:00:00-07:00");
    assert_eq!(occurrences[2]["status"], "scheduled");
}

#[test]
fn expand_applies_criteria_to_client() {
    let occurrences = run_json("expand", &["--os", "iPhone OS", "--app-version", "3"]);
    assert_eq!(occurrences.len(), 3);
    assert!(occurrences.iter().all(|o| o["schedulePlanGuid"] == "plan-1"));
}

#[test]
fn expand_without_events_uses_account_creation() {
    let output = Command::cargo_bin("cadence")
        .unwrap()
        .args([
            "expand",
            "-i",
            plans_path(),
            "--now",
            "2015-04-12T14:20:56-07:00",
            "--until",
            "2015-04-14T14:20:56-07:00",
            "--zone",
            "America/Los_Angeles",
            "--account-created-on",
            "2015-04-10T10:40:34-07:00",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let occurrences: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(occurrences.len(), 4);
}

#[test]
fn expand_without_anchor_is_empty() {
    Command::cargo_bin("cadence")
        .unwrap()
        .args(["expand", "-i", plans_path(), "--now", "2015-04-12T14:20:56-07:00"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

#[test]
fn expand_writes_output_file() {
    let dir = std::env::temp_dir().join("cadence_cli_test_expand");
    std::fs::create_dir_all(&dir).unwrap();
    let out_path = dir.join("occurrences.json");

    Command::cargo_bin("cadence")
        .unwrap()
        .arg("expand")
        .args(request_args())
        .args(["-o", out_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let written = std::fs::read_to_string(&out_path).unwrap();
    assert!(written.contains("2015-04-14T13:00:00-07:00"));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn expand_rejects_unknown_zone() {
    Command::cargo_bin("cadence")
        .unwrap()
        .args(["expand", "-i", plans_path(), "--zone", "Mars/Olympus_Mons"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown IANA time zone"));
}

#[test]
fn expand_rejects_bad_timestamp() {
    Command::cargo_bin("cadence")
        .unwrap()
        .args(["expand", "-i", plans_path(), "--now", "yesterday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("RFC 3339"));
}

#[test]
fn expand_rejects_reversed_window() {
    Command::cargo_bin("cadence")
        .unwrap()
        .args([
            "expand",
            "-i",
            plans_path(),
            "--now",
            "2015-04-12T00:00:00Z",
            "--until",
            "2015-04-11T00:00:00Z",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--until must not be before --now"));
}

#[test]
fn app_version_requires_os() {
    Command::cargo_bin("cadence")
        .unwrap()
        .args(["expand", "-i", plans_path(), "--app-version", "4"])
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconcile subcommand
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn reconcile_matches_expand() {
    assert_eq!(run_json("reconcile", &[]), run_json("expand", &[]));
}

#[test]
fn reconcile_rejects_unknown_event_key() {
    let dir = std::env::temp_dir().join("cadence_cli_test_events");
    std::fs::create_dir_all(&dir).unwrap();
    let events = dir.join("events.json");
    std::fs::write(&events, r#"{"question:q1:answered": "2015-04-10T10:40:34Z"}"#).unwrap();

    Command::cargo_bin("cadence")
        .unwrap()
        .args(["reconcile", "-i", plans_path(), "--events", events.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid event key"));

    let _ = std::fs::remove_dir_all(&dir);
}

// ─────────────────────────────────────────────────────────────────────────────
// Config and logging
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn config_limits_window() {
    Command::cargo_bin("cadence")
        .unwrap()
        .args(["--config", config_path(), "reconcile"])
        .args(request_args())
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 days or less"));
}

#[test]
fn missing_config_fails() {
    Command::cargo_bin("cadence")
        .unwrap()
        .args(["--config", "/nonexistent/cadence.toml", "validate", "-i", plans_path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn verbose_logs_to_stderr() {
    Command::cargo_bin("cadence")
        .unwrap()
        .arg("-v")
        .arg("expand")
        .args(request_args())
        .env_remove("RUST_LOG")
        .assert()
        .success()
        .stderr(predicate::str::contains("expanded schedule"));
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("cadence")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("expand"))
        .stdout(predicate::str::contains("reconcile"));
}
