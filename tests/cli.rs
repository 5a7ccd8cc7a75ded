//! End-to-end tests for the tetora binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Replies `{"status":"ok"}` to every request carrying an id
const PING_PLUGIN: &str = r#"#!/bin/sh
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  if [ -n "$id" ]; then
    printf '{"jsonrpc":"2.0","id":%s,"result":{"status":"ok"}}\n' "$id"
  fi
done
"#;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

fn tetora(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tetora").unwrap();
    cmd.env("HOME", home)
        .env_remove("RUST_LOG")
        .env_remove("TETORA_CONFIG")
        .env_remove("TETORA_LOG")
        .env_remove("TETORA_TOOL_TIMEOUT");
    cmd
}

fn ping_config(dir: &TempDir) -> std::path::PathBuf {
    let script = dir.path().join("ping.sh");
    fs::write(&script, PING_PLUGIN).unwrap();
    write_config(
        dir,
        &format!(
            r#"
[plugins.pinger]
type = "tool"
command = "/bin/sh"
args = ['{}']
tools = ["ping_tool"]
"#,
            script.display()
        ),
    )
}

#[test]
fn test_help_lists_plugin_command() {
    let dir = TempDir::new().unwrap();
    tetora(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("plugin"));
}

#[test]
fn test_plugin_list() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"
[plugins.browser]
type = "tool"
command = "tetora-browser"
autoStart = true
tools = ["browser_open"]

[plugins.archive]
type = "memory"
command = "tetora-archive"
"#,
    );

    tetora(dir.path())
        .args(["plugin", "list", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name": "archive""#))
        .stdout(predicate::str::contains(r#""name": "browser""#))
        .stdout(predicate::str::contains(r#""autoStart": true"#))
        .stdout(predicate::str::contains(r#""status": "stopped""#))
        .stdout(predicate::str::contains("running").not());
}

#[test]
fn test_config_from_environment() {
    let dir = TempDir::new().unwrap();
    let config = ping_config(&dir);

    tetora(dir.path())
        .env("TETORA_CONFIG", &config)
        .args(["plugin", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""name": "pinger""#));
}

#[test]
fn test_plugin_call() {
    let dir = TempDir::new().unwrap();
    let config = ping_config(&dir);

    tetora(dir.path())
        .args(["plugin", "call", "pinger", "ping", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""status": "ok""#));
}

#[test]
fn test_plugin_health() {
    let dir = TempDir::new().unwrap();
    let config = ping_config(&dir);

    tetora(dir.path())
        .args(["plugin", "health", "pinger", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""healthy": true"#))
        .stdout(predicate::str::contains(r#""status": "running""#));
}

#[test]
fn test_plugin_call_rejects_bad_params() {
    let dir = TempDir::new().unwrap();
    let config = ping_config(&dir);

    tetora(dir.path())
        .args(["plugin", "call", "pinger", "ping", "{not json", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("params must be valid JSON"));
}

#[test]
fn test_unknown_plugin_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "");

    tetora(dir.path())
        .args(["plugin", "health", "ghost", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found in config"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir, "[plugins.broken\ntype = ");

    tetora(dir.path())
        .args(["plugin", "list", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}
