//! ---
//! hm_section: "06-control-tooling"
//! hm_subsection: "tests"
//! hm_type: "source"
//! hm_scope: "code"
//! hm_description: "End-to-end checks of the hostmetricsctl binary."
//! hm_version: "v0.0.0-prealpha"
//! hm_owner: "tbd"
//! ---
use std::fs;

use assert_cmd::Command;
use serde_json::Value;

fn ctl() -> Command {
    let mut cmd = Command::cargo_bin("hostmetricsctl").unwrap();
    cmd.env_remove("HOSTMETRICS_CONFIG");
    cmd
}

#[test]
fn version_flag_prints_package_version() {
    let output = ctl().arg("-V").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn simulate_reports_failures_without_failing_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let output = ctl()
        .current_dir(dir.path())
        .args(["simulate", "--requests", "4", "--fail-every", "2", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["requests"], 4);
    assert_eq!(report["failed_requests"], 2);
    assert_eq!(report["summary"]["handler-exit"]["failures"], 2);
    // Four network requests plus one local request reach the handlers.
    assert_eq!(report["summary"]["handler-enter"]["count"], 5);
    assert!(report["summary"].get("application-starting").is_none());
}

#[test]
fn application_mode_emits_config_step_events() {
    let dir = tempfile::tempdir().unwrap();
    let output = ctl()
        .current_dir(dir.path())
        .args(["simulate", "--application", "--requests", "1", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["summary"]["application-starting"]["count"], 1);
    // Two steps, three phases each.
    assert_eq!(report["summary"]["config-step-finish"]["count"], 6);
}

#[test]
fn config_show_renders_the_given_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hostmetrics.toml");
    fs::write(&path, "[instrumentation]\nrequest_id_attribute = \"edge.id\"\n").unwrap();
    let output = ctl()
        .args(["config", "show", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("request_id_attribute = \"edge.id\""));
}

#[test]
fn invalid_configuration_is_a_hard_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[instrumentation]\nrequest_id_attribute = \"has space\"\n").unwrap();
    let output = ctl()
        .args(["simulate", "--config"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!output.status.success());
}
