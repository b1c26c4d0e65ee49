//! Integration tests for the `adcadence` CLI binary.
//!
//! Scenarios run on tokio's paused clock, so even the half-hour cooldown
//! scenario completes in milliseconds of wall time.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `adcadence` binary with env isolation.
///
/// Clears `ADCADENCE_*` variables and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn adcadence_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("adcadence");
    cmd.env("HOME", "/tmp/adcadence-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/adcadence-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("ADCADENCE_PROFILE")
        .env_remove("ADCADENCE_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn with_config(path: &Path) -> assert_cmd::Command {
    let mut cmd = adcadence_cmd();
    cmd.arg("--config").arg(path);
    cmd
}

fn json_stdout(output: &std::process::Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "command failed:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn outcome<'a>(report: &'a serde_json::Value, step: &str) -> &'a serde_json::Value {
    report["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["step"] == step)
        .unwrap_or_else(|| panic!("no outcome '{step}' in {report:#}"))
}

fn all_as_expected(report: &serde_json::Value) -> bool {
    report["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .all(|o| o["as_expected"] == true)
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = adcadence_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    adcadence_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("simulate")
            .and(predicate::str::contains("config"))
            .and(predicate::str::contains("completions")),
    );
}

#[test]
fn test_version_flag() {
    adcadence_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("adcadence"));
}

#[test]
fn test_completions_zsh() {
    adcadence_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_unknown_scenario_is_a_usage_error() {
    adcadence_cmd()
        .args(["simulate", "meteor-strike"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("meteor-strike"));
}

// ── Simulate ────────────────────────────────────────────────────────

#[test]
fn test_cold_start_scenario_shows_after_the_load() {
    let output = adcadence_cmd()
        .args(["simulate", "cold-start", "--load-delay", "800ms", "-o", "json"])
        .output()
        .unwrap();
    let report = json_stdout(&output);

    assert_eq!(report["scenario"], "cold-start");
    assert_eq!(outcome(&report, "first-launch app-open")["result"], "shown");
    assert_eq!(outcome(&report, "waited for the load")["result"], "800ms");
    assert!(all_as_expected(&report), "{report:#}");
}

#[test]
fn test_cooldown_scenario_skips_inside_the_interval() {
    let output = adcadence_cmd()
        .args(["simulate", "cooldown", "-o", "json"])
        .output()
        .unwrap();
    let report = json_stdout(&output);

    let results: Vec<&str> = report["outcomes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["result"].as_str().unwrap())
        .collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], "shown");
    assert!(results[1].starts_with("skipped (cooling down"), "{results:?}");
    assert_eq!(results[2], "shown");
    assert!(all_as_expected(&report), "{report:#}");
}

#[test]
fn test_retry_exhausted_scenario_gives_up_after_max_retries() {
    let output = adcadence_cmd()
        .args(["simulate", "retry-exhausted", "-o", "json"])
        .output()
        .unwrap();
    let report = json_stdout(&output);

    assert_eq!(outcome(&report, "retries before giving up")["result"], "3");
    assert!(all_as_expected(&report), "{report:#}");
    // Four failed loads (one plus three retries) precede the first give-up.
    let failures_before_give_up = report["timeline"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event"]["event"].as_str().unwrap())
        .take_while(|kind| *kind != "retries_exhausted")
        .filter(|kind| *kind == "load_failed")
        .count();
    assert_eq!(failures_before_give_up, 4);
}

#[test]
fn test_race_scenario_shows_exactly_once() {
    let output = adcadence_cmd()
        .args(["simulate", "race", "-o", "json"])
        .output()
        .unwrap();
    let report = json_stdout(&output);

    assert_eq!(outcome(&report, "requests that showed an ad")["result"], "1");
    assert_eq!(outcome(&report, "sdk show calls")["result"], "1");
}

#[test]
fn test_foreground_debounce_and_fallback_scenarios_pass() {
    for scenario in ["foreground-debounce", "fallback"] {
        let output = adcadence_cmd()
            .args(["simulate", scenario, "-o", "json-compact"])
            .output()
            .unwrap();
        let report = json_stdout(&output);
        assert!(all_as_expected(&report), "{scenario}: {report:#}");
    }
}

#[test]
fn test_table_output_includes_timeline_on_request() {
    adcadence_cmd()
        .args(["simulate", "race", "--timeline"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Scenario race")
                .and(predicate::str::contains("Timeline"))
                .and(predicate::str::contains("show_resolved")),
        );
}

#[test]
fn test_plain_output_is_one_line_per_step() {
    adcadence_cmd()
        .args(["simulate", "fallback", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("served by: categories"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    with_config(&path)
        .args(["config", "init"])
        .assert()
        .success();
    assert!(path.exists());

    with_config(&path)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("# profile: default")
                .and(predicate::str::contains("min_interval_secs = 1800")),
        );
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "default_profile = \"default\"\n").unwrap();

    with_config(&path)
        .args(["config", "init"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("already exists"));

    with_config(&path)
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_unknown_profile_exits_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[profiles.staging]\nshow_deadline_ms = 900\n").unwrap();

    with_config(&path)
        .args(["--profile", "prod", "config", "show"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("staging"));
}

#[test]
fn test_profile_settings_reach_the_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "default_profile = \"strict\"\n\n[profiles.strict.interstitial]\nmax_retries = 1\n",
    )
    .unwrap();

    let output = with_config(&path)
        .args(["simulate", "retry-exhausted", "-o", "json"])
        .output()
        .unwrap();
    let report = json_stdout(&output);

    assert_eq!(report["profile"], "strict");
    assert_eq!(outcome(&report, "retries before giving up")["result"], "1");
}

#[test]
fn test_invalid_profile_value_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[profiles.default]\nshow_deadline_ms = 0\n").unwrap();

    with_config(&path)
        .args(["simulate", "race"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("show_deadline_ms"));
}
