//! Smoke tests -- verify the binary runs and the subcommands exist.

use assert_cmd::Command;
use predicates::prelude::*;

fn sreagent() -> Command {
    let mut cmd = Command::cargo_bin("sreagent").unwrap();
    // Keep the host environment from leaking policy or targets into tests.
    for var in [
        "SRE_AGENT_CONFIG",
        "BACKEND_URL",
        "KB_URL",
        "TO_EMAIL",
        "GOOGLE_API_KEY",
        "ALLOW_CLEAR_TEMP",
        "ALLOW_RESTART_SERVICE",
        "ALLOW_BACKEND_SELF_HEAL",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_cli_help() {
    sreagent()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Policy-gated host incident"));
}

#[test]
fn test_cli_version() {
    sreagent()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sreagent"));
}

#[test]
fn test_subcommands_exist() {
    for args in [
        vec!["run", "--help"],
        vec!["serve", "--help"],
        vec!["demo-backend", "--help"],
        vec!["kb", "lookup", "--help"],
        vec!["action", "restart-service", "--help"],
    ] {
        sreagent().args(&args).assert().success();
    }
}

#[test]
fn test_kb_lookup_uses_builtin_table() {
    sreagent()
        .args(["kb", "lookup", "CPU Spike"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CWE-400"))
        .stdout(predicate::str::contains("LocalFallback"));
}

#[test]
fn test_actions_are_policy_gated() {
    sreagent()
        .args(["action", "restart-service", "--name", "nginx"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("disabled by policy"));

    sreagent()
        .args(["action", "clear-temp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ALLOW_CLEAR_TEMP"));
}

#[test]
fn test_kb_refresh_requires_source() {
    sreagent()
        .args(["kb", "refresh"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KB_URL"));
}

#[test]
fn test_missing_config_file_is_an_error() {
    sreagent()
        .args(["--config", "/definitely/not/here.toml", "kb", "lookup", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}
