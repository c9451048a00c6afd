//! Build script for lanpeer
//!
//! Embeds git hash, build timestamp, target, profile and rustc version
//! as `LANPEER_*` compile-time environment variables.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=../.git/HEAD");
    println!("cargo:rerun-if-changed=../.git/index");

    let git_hash = command_output("git", &["rev-parse", "--short=8", "HEAD"]);
    let git_dirty = match Command::new("git").args(["status", "--porcelain"]).output() {
        Ok(output) if output.status.success() => {
            if output.stdout.is_empty() { "false" } else { "true" }
        }
        _ => "unknown",
    };

    let build_timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let rustc_version = command_output("rustc", &["--version"]);

    for (key, value) in [
        ("LANPEER_GIT_HASH", git_hash.as_str()),
        ("LANPEER_GIT_DIRTY", git_dirty),
        ("LANPEER_BUILD_TIMESTAMP", build_timestamp.as_str()),
        ("LANPEER_TARGET", target.as_str()),
        ("LANPEER_PROFILE", profile.as_str()),
        ("LANPEER_RUSTC_VERSION", rustc_version.as_str()),
    ] {
        println!("cargo:rustc-env={}={}", key, value);
    }

    eprintln!("Building lanpeer {} ({}, {})", git_hash, target, profile);
}

/// Trimmed stdout of a command, or "unknown" if it cannot run
fn command_output(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
