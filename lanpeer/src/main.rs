//! lanpeer - LAN peer discovery and request/response
//!
//! Entry point for the `lanpeer` binary: run a responder, send a request,
//! list peers, or manage configuration.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use lanpeer::config::{self, NodeConfig};
use lanpeer::error::{Error, Result};
use lanpeer::handlers;
use lanpeer::logging::{self, LogGuards, Session};
use lanpeer::peer::{Discovery, DiscoveryConfig, Role};
use lanpeer::rpc::{Requester, RequesterConfig, Responder, ResponderConfig, Targeting};
use lanpeer::transport::{UdpConfig, UdpTransport};
use lanpeer::version;

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!(error = %e.format_for_log(), "Command failed");
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)
        }
        Commands::Respond { config } => {
            let config = NodeConfig::load(config.as_deref())?;
            let _log_guards = init_logging(&config, Session::Respond, cli.verbose, cli.quiet)?;
            let node_id = config.node_id();
            let span = logging::node_span(&node_id, Role::Responder);
            build_runtime()?.block_on(respond(config, node_id).instrument(span))
        }
        Commands::Request {
            path,
            data,
            config,
            timeout_ms,
            target,
            warmup_ms,
        } => {
            // Bad JSON fails before anything touches the network
            let data = parse_data(data.as_deref())?;

            let mut config = NodeConfig::load(config.as_deref())?;
            if let Some(ms) = timeout_ms {
                config.requester.timeout_ms = ms;
            }
            if let Some(target) = target {
                config.requester.targeting = target;
            }
            config.validate()?;

            let warmup = warmup_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| default_warmup(&config));

            let _log_guards = init_logging(&config, Session::Request, cli.verbose, cli.quiet)?;
            let node_id = config.node_id();
            let span = logging::node_span(&node_id, Role::Requester);
            build_runtime()?.block_on(request(config, node_id, path, data, warmup).instrument(span))
        }
        Commands::Peers {
            config,
            listen_secs,
        } => {
            let config = NodeConfig::load(config.as_deref())?;
            let _log_guards = init_logging(&config, Session::Peers, cli.verbose, cli.quiet)?;
            let node_id = config.node_id();
            let span = logging::node_span(&node_id, Role::Requester);
            let listen = Duration::from_secs(listen_secs);
            build_runtime()?.block_on(list_peers(config, node_id, listen).instrument(span))
        }
    }
}

/// Initialize logging from configuration and log the build
fn init_logging(
    config: &NodeConfig,
    session: Session,
    verbose: u8,
    quiet: bool,
) -> Result<LogGuards> {
    let guards = logging::init_logging(&config.logging, session, verbose, quiet)?;

    let build = version::build_info();
    debug!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting lanpeer"
    );

    Ok(guards)
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(2, 8))
        .thread_name("lanpeer")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))
}

/// Parse the request data argument; absent means `null`
fn parse_data(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(Value::Null),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::malformed(format!("request data is not valid JSON: {}", e))),
    }
}

/// Random-peer requests need the peer table populated first
fn default_warmup(config: &NodeConfig) -> Duration {
    match config.requester.targeting {
        Targeting::RandomPeer => config.discovery.heartbeat_interval() * 2,
        Targeting::Broadcast => Duration::ZERO,
    }
}

fn default_node_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "lanpeer".to_string())
}

/// Cancel `shutdown` on Ctrl+C
fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "Unable to listen for Ctrl+C"),
        }
    });
}

/// Log everything that arrives on a discovery error stream
fn log_errors(mut errors: mpsc::Receiver<Error>) {
    tokio::spawn(
        async move {
            while let Some(e) = errors.recv().await {
                warn!(code = %e.code(), error = %e, "Network error");
            }
        }
        .in_current_span(),
    );
}

/// Run a responder with the built-in paths until Ctrl+C
async fn respond(config: NodeConfig, node_id: String) -> Result<()> {
    let node_name = config.node.name.clone().unwrap_or_else(default_node_name);

    let transport = UdpTransport::bind(UdpConfig::from(&config.transport)).await?;
    let (discovery, streams) = Discovery::new(
        Arc::new(transport),
        node_id,
        Role::Responder,
        DiscoveryConfig::from(&config),
    );

    let responder = Responder::new(Arc::new(discovery), ResponderConfig::from(&config));
    handlers::register_builtin(&responder, &node_name);

    let local = responder.discovery().local();
    info!(
        id = %local.id,
        name = %node_name,
        address = %local.address,
        paths = ?responder.paths(),
        "Responder ready"
    );

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());
    log_errors(streams.errors);

    responder.start(streams.messages, shutdown).await
}

/// Send one request and print the result
async fn request(
    config: NodeConfig,
    node_id: String,
    path: String,
    data: Value,
    warmup: Duration,
) -> Result<()> {
    let udp = config.requester.targeting.udp_config(&config.transport);
    let transport = UdpTransport::bind(udp).await?;
    let (discovery, streams) = Discovery::new(
        Arc::new(transport),
        node_id,
        Role::Requester,
        DiscoveryConfig::from(&config),
    );

    let requester = Requester::new(Arc::new(discovery), RequesterConfig::from(&config));
    let shutdown = CancellationToken::new();
    log_errors(streams.errors);
    let engine = requester.start(streams.messages, shutdown.clone());

    if !warmup.is_zero() {
        debug!(warmup_ms = warmup.as_millis() as u64, "Listening for heartbeats");
        tokio::time::sleep(warmup).await;
    }

    let result = tokio::select! {
        result = requester.request(&path, data) => result,
        _ = tokio::signal::ctrl_c() => Err(Error::Internal("interrupted".to_string())),
    };

    shutdown.cancel();
    if let Err(e) = engine.await {
        warn!(error = %e, "Discovery task ended abnormally");
    }

    let value = result?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Listen for heartbeats and print the peer table
async fn list_peers(config: NodeConfig, node_id: String, listen: Duration) -> Result<()> {
    let transport = UdpTransport::bind(UdpConfig::from(&config.transport)).await?;
    let (discovery, streams) = Discovery::new(
        Arc::new(transport),
        node_id,
        Role::Requester,
        DiscoveryConfig::from(&config),
    );
    let discovery = Arc::new(discovery);

    // Only heartbeats matter here
    drop(streams.messages);
    log_errors(streams.errors);

    let shutdown = CancellationToken::new();
    let engine = {
        let discovery = Arc::clone(&discovery);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { discovery.run(shutdown).await }.in_current_span())
    };

    info!(listen_secs = listen.as_secs(), "Listening for heartbeats");
    tokio::select! {
        _ = tokio::time::sleep(listen) => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    shutdown.cancel();

    engine
        .await
        .map_err(|e| Error::Internal(format!("Discovery task failed: {}", e)))??;

    let peers = discovery.peers().all_peers();
    if peers.is_empty() {
        println!("No peers heard in {}s.", listen.as_secs());
        return Ok(());
    }

    println!("{:<38} {:<24} {:>10}", "ID", "ADDRESS", "LAST SEEN");
    for peer in peers {
        println!(
            "{:<38} {:<24} {:>8}ms",
            peer.id,
            peer.address,
            peer.last_seen.elapsed().as_millis()
        );
    }
    Ok(())
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = NodeConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let created = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", created.display());
        }
        ConfigSubcommand::Validate { config } => {
            NodeConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
