//! Common test utilities and fixtures

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lanpeer::peer::{Discovery, DiscoveryConfig, DiscoveryStreams, Role};
use lanpeer::rpc::{Requester, RequesterConfig, Responder, ResponderConfig, Targeting};
use lanpeer::transport::MemoryNetwork;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Temporary configuration file
pub struct ConfigFixture {
    temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("lanpeer.toml");
        Self {
            temp_dir,
            config_path,
        }
    }

    pub fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    pub fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Discovery timings short enough for tests
pub fn fast_discovery() -> DiscoveryConfig {
    DiscoveryConfig {
        heartbeat_interval: Duration::from_millis(50),
        eviction_interval: Duration::from_millis(100),
        peer_ttl: Duration::from_millis(250),
        ..Default::default()
    }
}

/// A responder running on an in-memory network
pub struct TestResponder {
    pub responder: Arc<Responder>,
    pub shutdown: CancellationToken,
    pub errors: tokio::sync::mpsc::Receiver<lanpeer::Error>,
}

impl TestResponder {
    pub fn id(&self) -> String {
        self.responder.discovery().local().id.clone()
    }
}

/// Start a responder with `setup` applied before it serves
pub fn spawn_responder(
    network: &MemoryNetwork,
    id: &str,
    setup: impl FnOnce(&Responder),
) -> TestResponder {
    let (discovery, DiscoveryStreams { messages, errors }) = Discovery::new(
        Arc::new(network.join()),
        id.to_string(),
        Role::Responder,
        fast_discovery(),
    );
    let responder = Arc::new(Responder::new(Arc::new(discovery), ResponderConfig::default()));
    setup(&responder);

    let shutdown = CancellationToken::new();
    {
        let responder = Arc::clone(&responder);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { responder.start(messages, shutdown).await });
    }

    TestResponder {
        responder,
        shutdown,
        errors,
    }
}

/// A requester running on an in-memory network
pub struct TestRequester {
    pub requester: Requester,
    pub shutdown: CancellationToken,
    pub errors: tokio::sync::mpsc::Receiver<lanpeer::Error>,
}

pub fn spawn_requester(
    network: &MemoryNetwork,
    id: &str,
    timeout: Duration,
    targeting: Targeting,
) -> TestRequester {
    let (discovery, DiscoveryStreams { messages, errors }) = Discovery::new(
        Arc::new(network.join()),
        id.to_string(),
        Role::Requester,
        fast_discovery(),
    );
    let requester = Requester::new(
        Arc::new(discovery),
        RequesterConfig { timeout, targeting },
    );

    let shutdown = CancellationToken::new();
    requester.start(messages, shutdown.clone());

    TestRequester {
        requester,
        shutdown,
        errors,
    }
}

/// A UDP port that was free on 127.0.0.1 a moment ago
pub fn free_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Configuration for a node on loopback, heartbeating every 100ms
pub fn loopback_toml(port: u16, bind: &str, broadcast: &str) -> String {
    format!(
        r#"
[transport]
port = {port}
bind_address = "{bind}"
broadcast_address = "{broadcast}"

[discovery]
heartbeat_interval_ms = 100
eviction_interval_ms = 200
peer_ttl_ms = 1000
"#
    )
}

/// Poll `condition` every 10ms until it holds or `within` elapses
pub async fn wait_until(within: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
