//! CLI integration tests
//!
//! Drives the `lanpeer` binary with assert_cmd. The loopback tests run a
//! real `respond` process and talk to it with `request`.

mod common;

use std::process::{Child, Command as Process, Stdio};
use std::time::Duration;

use assert_cmd::assert::Assert;
use assert_cmd::Command;
use predicates::prelude::*;

use common::{free_port, loopback_toml, ConfigFixture};

fn lanpeer_cmd() -> Command {
    let mut cmd = Command::cargo_bin("lanpeer").unwrap();
    cmd.env_remove("LANPEER_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn lanpeer(args: &[&str]) -> Assert {
    lanpeer_cmd().args(args).assert()
}

/// `lanpeer respond` child process, killed on drop
struct RunningResponder(Child);

impl RunningResponder {
    fn spawn(config: &str) -> Self {
        let child = Process::new(assert_cmd::cargo::cargo_bin("lanpeer"))
            .args(["respond", "--config", config])
            .env_remove("LANPEER_CONFIG")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        Self(child)
    }
}

impl Drop for RunningResponder {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

// ─────────────────────────────────────────────────────────────────
// Help and Version
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_commands() {
    let assert = lanpeer(&["--help"]).success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    for command in ["respond", "request", "peers", "config", "version"] {
        assert!(stdout.contains(command), "help is missing {}", command);
    }
}

#[test]
fn test_subcommand_help_shows_flags() {
    let cases: &[(&[&str], &[&str])] = &[
        (&["respond"], &["--config", "echo"]),
        (&["request"], &["--timeout-ms", "--target", "random-peer", "--warmup-ms"]),
        (&["peers"], &["--listen-secs"]),
        (&["config", "init"], &["--path", "--force"]),
    ];

    for (command, flags) in cases {
        let mut args = command.to_vec();
        args.push("--help");
        let assert = lanpeer(&args).success();
        let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
        for flag in *flags {
            assert!(stdout.contains(flag), "{:?} help is missing {}", command, flag);
        }
    }
}

#[test]
fn test_version_shows_build_and_wire() {
    lanpeer(&["version"])
        .success()
        .stdout(predicate::str::starts_with("lanpeer "))
        .stdout(predicate::str::contains("Commit:"))
        .stdout(predicate::str::contains("Protocol:"))
        .stdout(predicate::str::contains("ping (heartbeat)"));

    lanpeer(&["--version"])
        .success()
        .stdout(predicate::str::contains("lanpeer"));
}

// ─────────────────────────────────────────────────────────────────
// Config Commands
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_defaults() {
    lanpeer(&["config", "show"])
        .success()
        .stdout(predicate::str::contains("[transport]"))
        .stdout(predicate::str::contains("port = 1024"))
        .stdout(predicate::str::contains("broadcast_address = \"255.255.255.255\""))
        .stdout(predicate::str::contains("[discovery]"))
        .stdout(predicate::str::contains("targeting = \"broadcast\""));
}

#[test]
fn test_config_validate() {
    lanpeer(&["config", "validate"])
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));

    lanpeer(&["config", "validate", "--config", "/nonexistent/path/lanpeer.toml"])
        .failure()
        .code(10)
        .stderr(predicate::str::contains("E100"));
}

// ─────────────────────────────────────────────────────────────────
// Argument Errors
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_request_rejects_bad_json_before_binding() {
    lanpeer(&["request", "echo", "{not json"])
        .failure()
        .code(40)
        .stderr(predicate::str::contains("not valid JSON"));
}

#[test]
fn test_request_rejects_unknown_target() {
    lanpeer(&["request", "echo", "--target", "nearest"])
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_usage_errors() {
    lanpeer(&[]).failure();
    lanpeer(&["request"]).failure();
    lanpeer(&["unknown-command"])
        .failure()
        .stderr(predicate::str::contains("error"));
    lanpeer(&["respond", "--config", "/nonexistent/lanpeer.toml"])
        .failure()
        .code(10);
}

#[test]
fn test_verbosity_flags() {
    let cases: [&[&str]; 3] = [&["-v"], &["-vv"], &["--quiet"]];
    for flags in cases {
        let mut args = flags.to_vec();
        args.push("version");
        lanpeer(&args).success();
    }
}

// ─────────────────────────────────────────────────────────────────
// Loopback Network
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_request_times_out_without_responder() {
    let fixture = ConfigFixture::new();
    fixture.write_config(&loopback_toml(free_port(), "127.0.0.1", "127.0.0.1"));

    lanpeer(&[
        "request",
        "echo",
        "1",
        "--config",
        fixture.path(),
        "--timeout-ms",
        "300",
    ])
    .failure()
    .code(50)
    .stderr(predicate::str::contains("E501"));
}

#[test]
fn test_request_answered_by_respond_process() {
    let fixture = ConfigFixture::new();
    fixture.write_config(&loopback_toml(free_port(), "127.0.0.1", "127.0.0.1"));
    let _responder = RunningResponder::spawn(fixture.path());

    // The responder may still be binding; a lost broadcast just times out
    let mut output = None;
    for _ in 0..10 {
        let out = lanpeer_cmd()
            .args(["request", "echo", r#"{"n": 1}"#])
            .args(["--config", fixture.path(), "--timeout-ms", "500"])
            .output()
            .unwrap();
        if out.status.success() {
            output = Some(out);
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    let output = output.expect("responder never answered");
    let stdout = String::from_utf8(output.stdout).unwrap();
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value, serde_json::json!({"n": 1}));
}
