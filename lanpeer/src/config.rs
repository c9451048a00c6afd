//! Configuration system for lanpeer
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (LANPEER_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{DEFAULT_MAX_DATAGRAM_SIZE, MAX_UDP_PAYLOAD};
use crate::rpc::Targeting;

/// Main node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node identity
    pub node: NodeSettings,

    /// UDP transport settings
    pub transport: TransportSettings,

    /// Heartbeat and peer table settings
    pub discovery: DiscoverySettings,

    /// Requester role settings
    pub requester: RequesterSettings,

    /// Responder role settings
    pub responder: ResponderSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Node identity settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSettings {
    /// Fixed peer id (a random UUID is generated per process if not set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Human-readable node name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// UDP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Port to listen on and broadcast to
    pub port: u16,

    /// Local address to bind
    pub bind_address: String,

    /// Segment broadcast address
    pub broadcast_address: String,

    /// Host advertised to peers for replies (defaults to the bind address)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<String>,

    /// Largest datagram sent or received, in bytes
    pub max_datagram_size: usize,
}

/// Discovery engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Interval between heartbeat broadcasts in milliseconds
    pub heartbeat_interval_ms: u64,

    /// Interval between stale-peer sweeps in milliseconds
    pub eviction_interval_ms: u64,

    /// Peers silent for longer than this are evicted (milliseconds)
    pub peer_ttl_ms: u64,

    /// Capacity of the inbound message and error channels
    pub channel_capacity: usize,
}

/// Requester settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequesterSettings {
    /// Time to wait for a reply in milliseconds
    pub timeout_ms: u64,

    /// How requests are addressed
    pub targeting: Targeting,
}

/// Responder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderSettings {
    /// Handlers allowed to run at once (1 = strictly sequential)
    pub max_in_flight: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            port: 1024,
            bind_address: "0.0.0.0".to_string(),
            broadcast_address: "255.255.255.255".to_string(),
            advertise_address: None,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            eviction_interval_ms: 3000,
            peer_ttl_ms: 5000,
            channel_capacity: 64,
        }
    }
}

impl DiscoverySettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }

    pub fn peer_ttl(&self) -> Duration {
        Duration::from_millis(self.peer_ttl_ms)
    }
}

impl Default for RequesterSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            targeting: Targeting::Broadcast,
        }
    }
}

impl RequesterSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self { max_in_flight: 1 }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl NodeConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        let config_file = Self::find_config_file(config_path)?;
        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: e.to_string(),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            } else {
                return Err(Error::ConfigNotFound { path });
            }
        }

        // Search in standard locations
        let search_paths = [
            // Current directory
            PathBuf::from("lanpeer.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("lanpeer").join("lanpeer.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".lanpeer").join("lanpeer.toml"))
                .unwrap_or_default(),
            // System config (Linux)
            PathBuf::from("/etc/lanpeer/lanpeer.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Node settings
        if let Ok(val) = std::env::var("LANPEER_NODE_ID") {
            self.node.id = Some(val);
        }
        if let Ok(val) = std::env::var("LANPEER_NODE_NAME") {
            self.node.name = Some(val);
        }

        // Transport settings
        if let Ok(val) = std::env::var("LANPEER_PORT") {
            if let Ok(n) = val.parse() {
                self.transport.port = n;
            }
        }
        if let Ok(val) = std::env::var("LANPEER_BIND_ADDRESS") {
            self.transport.bind_address = val;
        }
        if let Ok(val) = std::env::var("LANPEER_BROADCAST_ADDRESS") {
            self.transport.broadcast_address = val;
        }
        if let Ok(val) = std::env::var("LANPEER_ADVERTISE_ADDRESS") {
            self.transport.advertise_address = Some(val);
        }
        if let Ok(val) = std::env::var("LANPEER_MAX_DATAGRAM_SIZE") {
            if let Ok(n) = val.parse() {
                self.transport.max_datagram_size = n;
            }
        }

        // Discovery settings
        if let Ok(val) = std::env::var("LANPEER_HEARTBEAT_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.discovery.heartbeat_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("LANPEER_EVICTION_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.discovery.eviction_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("LANPEER_PEER_TTL_MS") {
            if let Ok(n) = val.parse() {
                self.discovery.peer_ttl_ms = n;
            }
        }

        // Requester / responder settings
        if let Ok(val) = std::env::var("LANPEER_REQUEST_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.requester.timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("LANPEER_TARGETING") {
            if let Ok(t) = val.parse() {
                self.requester.targeting = t;
            }
        }
        if let Ok(val) = std::env::var("LANPEER_MAX_IN_FLIGHT") {
            if let Ok(n) = val.parse() {
                self.responder.max_in_flight = n;
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("LANPEER_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("LANPEER_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("LANPEER_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.transport.bind_address.parse::<IpAddr>().is_err() {
            return Err(Error::validation(
                "transport.bind_address",
                format!("'{}' is not an IP address", self.transport.bind_address),
            ));
        }
        if self.transport.broadcast_address.parse::<IpAddr>().is_err() {
            return Err(Error::validation(
                "transport.broadcast_address",
                format!("'{}' is not an IP address", self.transport.broadcast_address),
            ));
        }
        if self.transport.max_datagram_size < 64 || self.transport.max_datagram_size > MAX_UDP_PAYLOAD {
            return Err(Error::validation(
                "transport.max_datagram_size",
                format!("max_datagram_size must be between 64 and {}", MAX_UDP_PAYLOAD),
            ));
        }

        if self.discovery.heartbeat_interval_ms == 0 {
            return Err(Error::validation(
                "discovery.heartbeat_interval_ms",
                "heartbeat_interval_ms must be greater than 0",
            ));
        }
        if self.discovery.eviction_interval_ms == 0 {
            return Err(Error::validation(
                "discovery.eviction_interval_ms",
                "eviction_interval_ms must be greater than 0",
            ));
        }
        // A peer must get at least one heartbeat in before it can be evicted
        if self.discovery.peer_ttl_ms <= self.discovery.heartbeat_interval_ms {
            return Err(Error::validation(
                "discovery.peer_ttl_ms",
                format!(
                    "peer_ttl_ms ({}) must exceed heartbeat_interval_ms ({})",
                    self.discovery.peer_ttl_ms, self.discovery.heartbeat_interval_ms
                ),
            ));
        }
        if self.discovery.channel_capacity == 0 {
            return Err(Error::validation(
                "discovery.channel_capacity",
                "channel_capacity must be greater than 0",
            ));
        }

        if self.requester.timeout_ms == 0 {
            return Err(Error::validation(
                "requester.timeout_ms",
                "timeout_ms must be greater than 0",
            ));
        }
        if self.responder.max_in_flight == 0 {
            return Err(Error::validation(
                "responder.max_in_flight",
                "max_in_flight must be at least 1",
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::validation(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Peer id for this process: the configured one or a fresh UUID
    pub fn node_id(&self) -> String {
        self.node
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".lanpeer")
                .join("lanpeer.toml")
        });

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    // Create parent directories
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# lanpeer configuration

[node]
# Fixed peer id (a random UUID is generated per process if not set)
# id = "7f9c2a1e-0000-4000-8000-000000000001"

# Human-readable node name
# name = "kitchen-pi"

[transport]
# Port to listen on and broadcast to
port = 1024

# Local address to bind
bind_address = "0.0.0.0"

# Segment broadcast address
broadcast_address = "255.255.255.255"

# Host advertised to peers for replies (defaults to the bind address)
# advertise_address = "192.168.1.20"

# Largest datagram sent or received, in bytes (existing peers use 1024)
max_datagram_size = 1024

[discovery]
# Interval between heartbeat broadcasts in milliseconds
heartbeat_interval_ms = 1000

# Interval between stale-peer sweeps in milliseconds
eviction_interval_ms = 3000

# Peers silent for longer than this are evicted (must exceed heartbeat_interval_ms)
peer_ttl_ms = 5000

# Capacity of the inbound message and error channels
channel_capacity = 64

[requester]
# Time to wait for a reply in milliseconds
timeout_ms = 30000

# "broadcast" (every responder, first reply wins) or "random-peer"
targeting = "broadcast"

[responder]
# Handlers allowed to run at once (1 = strictly sequential)
max_in_flight = 1

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.lanpeer/logs/lanpeer.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
