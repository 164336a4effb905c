use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// `quotaguard` pointed at a config file that does not exist, so defaults apply
fn quotaguard(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("quotaguard").unwrap();
    cmd.arg("--config")
        .arg(dir.path().join("missing.toml"))
        .env_remove("QUOTAGUARD_PROFILE")
        .env_remove("QUOTAGUARD_REQUESTS_PER_SECOND")
        .env_remove("QUOTAGUARD_REQUESTS_PER_DAY")
        .env_remove("QUOTAGUARD_QUEUE_REQUESTS")
        .env_remove("QUOTAGUARD_MAX_QUEUE_SIZE")
        .env_remove("QUOTAGUARD_LOG_LEVEL")
        .env_remove("QUOTAGUARD_LOG_FORMAT");
    cmd
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("quotaguard").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("quotaguard 0.1.0"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("quotaguard").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Quota-aware client for rate-limited HTTP APIs",
        ));
}

#[test]
fn test_cli_status_defaults() {
    let dir = TempDir::new().unwrap();
    quotaguard(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("[standard] 0/2 this second, 0/1440 today"))
        .stdout(predicate::str::contains("Queueing: on (max 100 waiters)"));
}

#[test]
fn test_cli_status_json_from_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        "[rate_limit]\nprofile = \"premium\"\nrequests_per_day = 500\n",
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("quotaguard").unwrap();
    cmd.arg("--config")
        .arg(&path)
        .env_remove("QUOTAGUARD_PROFILE")
        .env_remove("QUOTAGUARD_REQUESTS_PER_DAY")
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"profile\": \"premium\""))
        .stdout(predicate::str::contains("\"second_limit\": 16"))
        .stdout(predicate::str::contains("\"day_limit\": 500"));
}

#[test]
fn test_cli_status_disabled() {
    let dir = TempDir::new().unwrap();
    quotaguard(&dir)
        .env("QUOTAGUARD_PROFILE", "disabled")
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("[disabled]"))
        .stdout(predicate::str::contains("never (limits disabled)"));
}

#[test]
fn test_cli_simulate_disabled_admits_all() {
    let dir = TempDir::new().unwrap();
    quotaguard(&dir)
        .args(["simulate", "--requests", "25", "--profile", "disabled"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Admitted 25 of 25 requests"));
}

#[test]
fn test_cli_simulate_rejects_without_queue() {
    let dir = TempDir::new().unwrap();
    quotaguard(&dir)
        .env("QUOTAGUARD_QUEUE_REQUESTS", "false")
        .env("QUOTAGUARD_REQUESTS_PER_SECOND", "100")
        .env("QUOTAGUARD_REQUESTS_PER_DAY", "3")
        .args(["simulate", "--requests", "5", "--concurrency", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Admitted 3 of 5 requests"))
        .stdout(predicate::str::contains("2 rejected"));
}

#[test]
fn test_cli_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[rate_limit]\nrequests_per_second = 0\n").unwrap();

    let mut cmd = Command::cargo_bin("quotaguard").unwrap();
    cmd.arg("--config")
        .arg(&path)
        .env_remove("QUOTAGUARD_REQUESTS_PER_SECOND")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_cli_get_missing_path() {
    let mut cmd = Command::cargo_bin("quotaguard").unwrap();
    cmd.arg("get")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "required arguments were not provided",
        ));
}

#[test]
fn test_cli_get_rejects_bad_query() {
    let mut cmd = Command::cargo_bin("quotaguard").unwrap();
    cmd.args(["get", "/v1/items", "--query", "novalue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected key=value"));
}
