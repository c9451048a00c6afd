//! UDP loopback tests
//!
//! Same wiring as the `respond` and `request` commands, but on 127.0.0.x
//! with short discovery timings. The responder listens on 127.0.0.1; a
//! random-peer requester needs the same port, so it binds 127.0.0.2.

mod common;

use std::sync::Arc;
use std::time::Duration;

use lanpeer::config::NodeConfig;
use lanpeer::handlers::register_builtin;
use lanpeer::peer::{Discovery, DiscoveryConfig, Role};
use lanpeer::rpc::{Requester, RequesterConfig, Responder, ResponderConfig, Targeting};
use lanpeer::transport::{Transport, UdpConfig, UdpTransport};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use common::{free_port, wait_until};

fn loopback_config(port: u16, bind: &str, broadcast: &str) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.transport.port = port;
    config.transport.bind_address = bind.to_string();
    config.transport.broadcast_address = broadcast.to_string();
    config.discovery.heartbeat_interval_ms = 100;
    config.discovery.eviction_interval_ms = 200;
    config.discovery.peer_ttl_ms = 1000;
    config.requester.timeout_ms = 3000;
    config
}

async fn start_responder(config: &NodeConfig, shutdown: CancellationToken) -> String {
    let transport = UdpTransport::bind(UdpConfig::from(&config.transport))
        .await
        .unwrap();
    let address = transport.address();
    let (discovery, streams) = Discovery::new(
        Arc::new(transport),
        "udp-responder".to_string(),
        Role::Responder,
        DiscoveryConfig::from(config),
    );
    let responder = Arc::new(Responder::new(
        Arc::new(discovery),
        ResponderConfig::from(config),
    ));
    register_builtin(&responder, "loopback");

    tokio::spawn(async move { responder.start(streams.messages, shutdown).await });
    address
}

async fn start_requester(config: &NodeConfig, shutdown: CancellationToken) -> Requester {
    let udp = config.requester.targeting.udp_config(&config.transport);
    let transport = UdpTransport::bind(udp).await.unwrap();
    let (discovery, streams) = Discovery::new(
        Arc::new(transport),
        "udp-requester".to_string(),
        Role::Requester,
        DiscoveryConfig::from(config),
    );
    let requester = Requester::new(Arc::new(discovery), RequesterConfig::from(config));
    requester.start(streams.messages, shutdown);
    requester
}

#[tokio::test]
async fn test_broadcast_request_next_to_responder() {
    let port = free_port();
    let shutdown = CancellationToken::new();

    let responder_config = loopback_config(port, "127.0.0.1", "127.0.0.1");
    start_responder(&responder_config, shutdown.clone()).await;

    // Same host, same settings: the requester must not need the responder's port
    let requester = start_requester(&responder_config, shutdown.clone()).await;
    let local = requester.discovery().local().address.clone();
    assert_ne!(local, format!("127.0.0.1:{}", port));

    let result = requester.request("echo", json!({"n": 1})).await.unwrap();
    assert_eq!(result, json!({"n": 1}));

    shutdown.cancel();
}

#[tokio::test]
async fn test_random_peer_hears_heartbeats_and_gets_reply() {
    let port = free_port();
    let shutdown = CancellationToken::new();

    let responder_config = loopback_config(port, "127.0.0.1", "127.0.0.2");
    let responder_address = start_responder(&responder_config, shutdown.clone()).await;

    let mut requester_config = loopback_config(port, "127.0.0.2", "127.0.0.1");
    requester_config.requester.targeting = Targeting::RandomPeer;
    let requester = start_requester(&requester_config, shutdown.clone()).await;
    assert_eq!(
        requester.discovery().local().address,
        format!("127.0.0.2:{}", port)
    );

    let peers = Arc::clone(requester.discovery().peers());
    assert!(wait_until(Duration::from_secs(3), || peers.peer_count() == 1).await);
    assert_eq!(peers.all_peers()[0].address, responder_address);

    let greeting = requester
        .request("greet", json!({"name": "udp"}))
        .await
        .unwrap();
    assert_eq!(greeting["greeting"], "Hello, udp! This is loopback.");

    shutdown.cancel();
}
