//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for lanpeer.

use clap::{Parser, Subcommand};
use lanpeer::rpc::Targeting;

/// lanpeer - LAN peer discovery and request/response over UDP broadcast
///
/// Nodes on the same broadcast segment find each other through heartbeats;
/// requesters invoke named paths on responders and wait for the result.
#[derive(Parser, Debug)]
#[command(name = "lanpeer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a responder serving the built-in paths (echo, greet, time, peers)
    Respond {
        /// Path to configuration file
        #[arg(short, long, env = "LANPEER_CONFIG")]
        config: Option<String>,
    },

    /// Send one request and print the result as JSON
    Request {
        /// Path to request
        path: String,

        /// Request data as JSON (defaults to null)
        data: Option<String>,

        /// Path to configuration file
        #[arg(short, long, env = "LANPEER_CONFIG")]
        config: Option<String>,

        /// Reply timeout in milliseconds (overrides the configuration)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// How the request reaches responders (overrides the configuration)
        #[arg(long, value_enum)]
        target: Option<Targeting>,

        /// Listen for heartbeats this long before sending
        /// (defaults to two heartbeat intervals for random-peer, 0 otherwise)
        #[arg(long)]
        warmup_ms: Option<u64>,
    },

    /// Listen for heartbeats and list the peers heard
    Peers {
        /// Path to configuration file
        #[arg(short, long, env = "LANPEER_CONFIG")]
        config: Option<String>,

        /// Seconds to listen before printing
        #[arg(short, long, default_value = "3")]
        listen_secs: u64,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
