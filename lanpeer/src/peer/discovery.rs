//! Discovery engine
//!
//! Owns the peer table and runs, for the lifetime of a node:
//! - the transport receive loop
//! - a classify loop turning datagrams into peer updates or application messages
//! - a stale-peer eviction timer
//! - a heartbeat broadcaster (responder role only)
//!
//! Application messages and non-fatal errors leave the engine through the
//! two receivers in [`DiscoveryStreams`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::protocol::{decode_envelope, encode_envelope, Envelope, EnvelopeKind, Origin, DEFAULT_MAX_DATAGRAM_SIZE};
use crate::transport::{InboundDatagram, Transport, TransportSink};

use super::PeerTable;

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Part a node plays on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Issues requests; does not announce itself
    Requester,
    /// Serves requests; announces itself with heartbeats
    Responder,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Requester => "requester",
            Role::Responder => "responder",
        }
    }
}

/// Discovery engine configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Interval between heartbeat broadcasts
    pub heartbeat_interval: Duration,

    /// Interval between stale-peer sweeps
    pub eviction_interval: Duration,

    /// Peers silent for longer than this are evicted
    pub peer_ttl: Duration,

    /// Capacity of the inbound message and error channels
    pub channel_capacity: usize,

    /// Largest envelope sent in one datagram
    pub max_datagram_size: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(1),
            eviction_interval: Duration::from_secs(3),
            peer_ttl: Duration::from_secs(5),
            channel_capacity: 64,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }
}

impl From<&NodeConfig> for DiscoveryConfig {
    fn from(config: &NodeConfig) -> Self {
        Self {
            heartbeat_interval: config.discovery.heartbeat_interval(),
            eviction_interval: config.discovery.eviction_interval(),
            peer_ttl: config.discovery.peer_ttl(),
            channel_capacity: config.discovery.channel_capacity,
            max_datagram_size: config.transport.max_datagram_size,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Inbound traffic
// ─────────────────────────────────────────────────────────────────

/// Application message delivered to the request/response layer
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Sender identity as written in the envelope
    pub origin: Origin,

    /// Where a point-to-point reply to this message should go
    pub reply_address: String,

    /// Envelope payload
    pub data: Value,
}

/// Single-consumer receivers fed by a running engine.
///
/// Dropping `messages` makes the engine discard application traffic instead
/// of waiting for a consumer.
#[derive(Debug)]
pub struct DiscoveryStreams {
    pub messages: mpsc::Receiver<InboundMessage>,
    pub errors: mpsc::Receiver<Error>,
}

// ─────────────────────────────────────────────────────────────────
// Discovery Engine
// ─────────────────────────────────────────────────────────────────

/// Heartbeat-based peer discovery over a datagram transport
pub struct Discovery {
    config: DiscoveryConfig,
    role: Role,
    local: Origin,
    transport: Arc<dyn Transport>,
    peers: Arc<PeerTable>,
    messages_tx: mpsc::Sender<InboundMessage>,
    errors_tx: mpsc::Sender<Error>,
}

impl Discovery {
    /// Create an engine for the node `node_id` on top of `transport`
    pub fn new(
        transport: Arc<dyn Transport>,
        node_id: String,
        role: Role,
        config: DiscoveryConfig,
    ) -> (Self, DiscoveryStreams) {
        let (messages_tx, messages) = mpsc::channel(config.channel_capacity);
        let (errors_tx, errors) = mpsc::channel(config.channel_capacity);
        let local = Origin::new(node_id, transport.address());

        let discovery = Self {
            config,
            role,
            local,
            transport,
            peers: Arc::new(PeerTable::new()),
            messages_tx,
            errors_tx,
        };

        (discovery, DiscoveryStreams { messages, errors })
    }

    /// Local origin stamped on every outgoing envelope
    pub fn local(&self) -> &Origin {
        &self.local
    }

    /// Role this engine was created for
    pub fn role(&self) -> Role {
        self.role
    }

    /// Peers currently known from heartbeats
    pub fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    /// Run all loops until `shutdown` fires.
    ///
    /// Returns an error only if the transport stops on its own.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let (datagram_tx, datagram_rx) = mpsc::channel(self.config.channel_capacity);
        // Transport errors share the engine's error channel unchanged
        let sink = TransportSink::new(datagram_tx, self.errors_tx.clone());

        info!(
            id = %self.local.id,
            address = %self.local.address,
            role = ?self.role,
            "Discovery started"
        );

        let result = tokio::select! {
            res = self.transport.start(sink) => res,
            _ = self.receive_loop(datagram_rx) => Ok(()),
            _ = self.eviction_loop() => Ok(()),
            _ = self.heartbeat_loop() => Ok(()),
            _ = shutdown.cancelled() => Ok(()),
        };

        match &result {
            Ok(()) => info!(id = %self.local.id, "Discovery stopped"),
            Err(e) => warn!(id = %self.local.id, error = %e, "Discovery stopped on transport failure"),
        }
        result
    }

    /// Broadcast an application payload to every node on the segment
    pub async fn broadcast(&self, data: Value) -> Result<()> {
        let bytes = self.encode_application(data)?;
        self.transport.broadcast(&bytes).await
    }

    /// Send an application payload to one address
    pub async fn send_to(&self, data: Value, address: &str) -> Result<()> {
        let bytes = self.encode_application(data)?;
        self.transport.send(&bytes, address).await
    }

    /// Surface a non-fatal error on the error stream without blocking
    pub fn report_error(&self, error: Error) {
        debug!(error = %error, "Reporting error");
        if let Err(e) = self.errors_tx.try_send(error) {
            warn!(error = %e, "Dropping error, error channel unavailable");
        }
    }

    fn encode_application(&self, data: Value) -> Result<Vec<u8>> {
        let envelope = Envelope::application(self.local.clone(), data);
        encode_envelope(&envelope, self.config.max_datagram_size)
    }

    async fn receive_loop(&self, mut datagrams: mpsc::Receiver<InboundDatagram>) {
        while let Some(datagram) = datagrams.recv().await {
            self.handle_datagram(datagram).await;
        }
    }

    /// Classify one datagram
    pub(crate) async fn handle_datagram(&self, datagram: InboundDatagram) {
        let envelope = match decode_envelope(&datagram.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(from = %datagram.source, "Dropping undecodable datagram");
                self.report_error(e);
                return;
            }
        };

        if envelope.origin.id == self.local.id {
            trace!(kind = envelope.kind.as_str(), "Ignoring own datagram");
            return;
        }

        match envelope.kind {
            EnvelopeKind::Heartbeat => {
                if self.peers.upsert(&envelope.origin.id, &envelope.origin.address) {
                    info!(
                        peer = %envelope.origin.id,
                        address = %envelope.origin.address,
                        "Peer discovered"
                    );
                }
            }
            EnvelopeKind::Application => {
                let reply_address = reply_address(&envelope.origin.address, &datagram.source);
                let message = InboundMessage {
                    origin: envelope.origin,
                    reply_address,
                    data: envelope.data,
                };
                if self.messages_tx.send(message).await.is_err() {
                    trace!("No message consumer, application message dropped");
                }
            }
        }
    }

    async fn eviction_loop(&self) {
        let mut timer = tokio::time::interval(self.config.eviction_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            for id in self.peers.evict_stale(self.config.peer_ttl) {
                info!(peer = %id, "Peer evicted");
            }
        }
    }

    async fn heartbeat_loop(&self) {
        if self.role != Role::Responder {
            return std::future::pending().await;
        }

        let heartbeat = match encode_envelope(
            &Envelope::heartbeat(self.local.clone()),
            self.config.max_datagram_size,
        ) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.report_error(e);
                return std::future::pending().await;
            }
        };

        let mut timer = tokio::time::interval(self.config.heartbeat_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            match self.transport.broadcast(&heartbeat).await {
                Ok(()) => trace!("Sent heartbeat"),
                Err(e) => self.report_error(e),
            }
        }
    }
}

/// Address to reply to for a frame advertising `advertised` that arrived from `source`.
///
/// A node bound to `0.0.0.0` advertises an unspecified host; the observed
/// source IP stands in for it and the advertised port is kept.
pub fn reply_address(advertised: &str, source: &str) -> String {
    match advertised.parse::<SocketAddr>() {
        Ok(addr) if addr.ip().is_unspecified() => match source.parse::<SocketAddr>() {
            Ok(src) => SocketAddr::new(src.ip(), addr.port()).to_string(),
            Err(_) => advertised.to_string(),
        },
        _ => advertised.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
