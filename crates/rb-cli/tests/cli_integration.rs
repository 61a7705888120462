//! CLI integration tests
//!
//! Tests the relaybus CLI using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn relaybus() -> Command {
    let mut cmd = Command::cargo_bin("relaybus")
        .expect("Failed to locate relaybus binary - ensure it's built before running tests");
    cmd.env_remove("RELAYBUS_CONFIG");
    cmd
}

#[test]
fn test_cli_help() {
    relaybus()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("relaybus"))
        .stdout(predicate::str::contains("Named-endpoint message bus"));
}

#[test]
fn test_cli_version() {
    relaybus()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("relaybus"));
}

#[test]
fn test_cli_serve_help() {
    relaybus()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--bind"))
        .stdout(predicate::str::contains("--cache"));
}

#[test]
fn test_cli_listen_help() {
    relaybus()
        .args(["listen", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--group"))
        .stdout(predicate::str::contains("--topic"));
}

#[test]
fn test_cli_requires_subcommand() {
    relaybus().assert().failure();
}

#[test]
fn test_cli_rejects_bad_event_code() {
    relaybus()
        .args(["call", "tcp://127.0.0.1:1", "ping"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid event code"));
}

#[test]
fn test_cli_rejects_bad_address() {
    relaybus()
        .args(["call", "udp://somewhere", "7", "ping"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to connect"));
}

#[test]
fn test_cli_call_unreachable_server() {
    relaybus()
        .args(["call", "tcp://127.0.0.1:1", "7", "ping", "--timeout", "200"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tcp://127.0.0.1:1"));
}

#[test]
fn test_cli_listen_rejects_wide_group() {
    relaybus()
        .args(["listen", "tcp://127.0.0.1:1", "300", "--group"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not fit in a byte"));
}

#[test]
fn test_cli_config_path_uses_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("relaybus.toml");

    relaybus()
        .args(["config", "path", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("relaybus.toml"));
}

#[test]
fn test_cli_config_init_and_show() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    relaybus()
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());

    relaybus()
        .args(["config", "show"])
        .env("RELAYBUS_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("default_timeout = 5000"))
        .stdout(predicate::str::contains("event_cache = false"));
}

#[test]
fn test_cli_config_rejects_invalid_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "event_cache = \"sometimes\"\n").unwrap();

    relaybus()
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}
