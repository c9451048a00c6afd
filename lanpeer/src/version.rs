//! `lanpeer version` output
//!
//! Build facts come from the `LANPEER_*` variables set by `build.rs`; the
//! wire facts are what a peer needs to know to interoperate.

use std::fmt;

use crate::config::TransportSettings;
use crate::protocol::{DEFAULT_MAX_DATAGRAM_SIZE, MAX_UDP_PAYLOAD};

/// Build information embedded at compile time
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Short commit hash, "unknown" outside a git checkout
    pub commit: &'static str,
    dirty: &'static str,
    pub built_at: &'static str,
    pub target: &'static str,
    pub profile: &'static str,
    pub rustc: &'static str,
}

impl BuildInfo {
    pub const fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            commit: env!("LANPEER_GIT_HASH"),
            dirty: env!("LANPEER_GIT_DIRTY"),
            built_at: env!("LANPEER_BUILD_TIMESTAMP"),
            target: env!("LANPEER_TARGET"),
            profile: env!("LANPEER_PROFILE"),
            rustc: env!("LANPEER_RUSTC_VERSION"),
        }
    }

    /// Uncommitted changes were present at build time
    pub fn is_dirty(&self) -> bool {
        self.dirty == "true"
    }

    /// `0.1.0+abc1234`, with `.dirty` appended for dirty trees
    pub fn full_version(&self) -> String {
        let mut full = format!("{}+{}", self.version, self.commit);
        if self.is_dirty() {
            full.push_str(".dirty");
        }
        full
    }
}

/// Wire-level facts shown next to the build
struct WireInfo {
    port: u16,
    broadcast: String,
    datagram: usize,
}

impl WireInfo {
    fn defaults() -> Self {
        let transport = TransportSettings::default();
        Self {
            port: transport.port,
            broadcast: transport.broadcast_address,
            datagram: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wire = WireInfo::defaults();
        let rows: [(&str, String); 10] = [
            ("Commit", self.commit.to_string() + if self.is_dirty() { " (dirty)" } else { "" }),
            ("Built", self.built_at.to_string()),
            ("Profile", self.profile.to_string()),
            ("Target", self.target.to_string()),
            ("Compiler", self.rustc.to_string()),
            ("Envelopes", "ping (heartbeat), message (request/response)".to_string()),
            ("Port", wire.port.to_string()),
            ("Broadcast", wire.broadcast),
            ("Datagram", format!("{} bytes default, {} max", wire.datagram, MAX_UDP_PAYLOAD)),
            ("Correlation", "UUID \"ID\" echoed in replies".to_string()),
        ];

        writeln!(f, "{} {}", self.name, self.full_version())?;
        for (i, (label, value)) in rows.iter().enumerate() {
            match i {
                0 => writeln!(f, "\nBuild:")?,
                5 => writeln!(f, "\nProtocol:")?,
                _ => {}
            }
            writeln!(f, "  {:<12} {}", format!("{}:", label), value)?;
        }
        Ok(())
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo::current()
}

pub fn print_version() {
    print!("{}", build_info());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_version_carries_commit() {
        let info = build_info();
        let full = info.full_version();
        assert!(full.starts_with(&format!("{}+{}", info.version, info.commit)));
        assert_eq!(full.ends_with(".dirty"), info.is_dirty());
        assert_eq!(info.name, "lanpeer");
    }

    #[test]
    fn test_display_lists_wire_defaults() {
        let display = build_info().to_string();
        assert!(display.contains("Build:"));
        assert!(display.contains("Protocol:"));
        assert!(display.contains("Port:        1024"));
        assert!(display.contains("255.255.255.255"));
        assert!(display.contains("1024 bytes default, 65507 max"));
    }
}
