//! UDP broadcast transport
//!
//! One socket per node, bound to `bind_address:port` with `SO_BROADCAST`
//! enabled. The same socket sends and receives, so replies go back to the
//! port the node listens on.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace};

use crate::config::TransportSettings;
use crate::error::{Error, Result};
use crate::protocol::DEFAULT_MAX_DATAGRAM_SIZE;

use super::{InboundDatagram, Transport, TransportSink};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// UDP transport configuration
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Port to listen on (0 = OS-assigned)
    pub port: u16,

    /// Local address to bind
    pub bind_address: String,

    /// Segment broadcast address
    pub broadcast_address: String,

    /// Host advertised to peers instead of the bind address
    pub advertise_address: Option<String>,

    /// Port broadcasts go to (defaults to the bound port)
    pub broadcast_port: Option<u16>,

    /// Receive buffer size; longer datagrams are truncated
    pub read_buffer_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            port: 1024,
            bind_address: "0.0.0.0".to_string(),
            broadcast_address: "255.255.255.255".to_string(),
            advertise_address: None,
            broadcast_port: None,
            read_buffer_size: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }
}

impl From<&TransportSettings> for UdpConfig {
    fn from(settings: &TransportSettings) -> Self {
        Self {
            port: settings.port,
            bind_address: settings.bind_address.clone(),
            broadcast_address: settings.broadcast_address.clone(),
            advertise_address: settings.advertise_address.clone(),
            broadcast_port: None,
            read_buffer_size: settings.max_datagram_size,
        }
    }
}

impl UdpConfig {
    /// Configuration for a node that only needs replies: it binds an
    /// OS-assigned port and still broadcasts to the configured one, so it can
    /// share a host with a responder.
    pub fn ephemeral(settings: &TransportSettings) -> Self {
        Self {
            port: 0,
            broadcast_port: Some(settings.port),
            ..Self::from(settings)
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// UDP Transport
// ─────────────────────────────────────────────────────────────────

/// Broadcast-capable UDP transport
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    config: UdpConfig,
    local_addr: SocketAddr,
    broadcast_target: SocketAddr,
    advertised: String,
}

impl UdpTransport {
    /// Bind the socket. Failure here is the one fatal error of a node.
    pub async fn bind(config: UdpConfig) -> Result<Self> {
        let bind_addr = format!("{}:{}", config.bind_address, config.port);
        let bind_err = |source| Error::Bind {
            address: bind_addr.clone(),
            source,
        };

        let socket = UdpSocket::bind(&bind_addr).await.map_err(bind_err)?;
        socket.set_broadcast(true).map_err(bind_err)?;
        let local_addr = socket.local_addr().map_err(bind_err)?;

        let broadcast_ip: IpAddr = config.broadcast_address.parse().map_err(|_| {
            Error::validation(
                "transport.broadcast_address",
                format!("'{}' is not an IP address", config.broadcast_address),
            )
        })?;
        let broadcast_port = config.broadcast_port.unwrap_or(local_addr.port());
        let broadcast_target = SocketAddr::new(broadcast_ip, broadcast_port);

        let host = config
            .advertise_address
            .clone()
            .unwrap_or_else(|| local_addr.ip().to_string());
        let advertised = format_address(&host, local_addr.port());

        info!(
            local = %local_addr,
            broadcast = %broadcast_target,
            advertised = %advertised,
            "UDP transport bound"
        );

        Ok(Self {
            socket,
            config,
            local_addr,
            broadcast_target,
            advertised,
        })
    }

    /// Actual bound socket address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send_to_addr(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        self.socket
            .send_to(data, target)
            .await
            .map(|_| ())
            .map_err(|e| Error::Send {
                address: target.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn address(&self) -> String {
        self.advertised.clone()
    }

    async fn send(&self, data: &[u8], address: &str) -> Result<()> {
        let target = resolve(address).await?;
        trace!(to = %target, bytes = data.len(), "Sending datagram");
        self.send_to_addr(data, target).await
    }

    async fn broadcast(&self, data: &[u8]) -> Result<()> {
        trace!(to = %self.broadcast_target, bytes = data.len(), "Broadcasting datagram");
        self.send_to_addr(data, self.broadcast_target).await
    }

    async fn start(&self, sink: TransportSink) -> Result<()> {
        debug!(local = %self.local_addr, "UDP receive loop started");
        loop {
            let mut buf = vec![0u8; self.config.read_buffer_size];
            match self.socket.recv_from(&mut buf).await {
                Ok((len, from)) => {
                    if len == buf.len() {
                        debug!(from = %from, len, "Datagram filled the read buffer, may be truncated");
                    }
                    buf.truncate(len);
                    sink.deliver(InboundDatagram {
                        payload: buf,
                        source: from.to_string(),
                    })
                    .await?;
                }
                Err(e) => {
                    sink.report(Error::Receive { source: e });
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

/// Resolve `host:port` to a socket address
async fn resolve(address: &str) -> Result<SocketAddr> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    tokio::net::lookup_host(address)
        .await
        .map_err(|e| Error::Send {
            address: address.to_string(),
            message: e.to_string(),
        })?
        .next()
        .ok_or_else(|| Error::Send {
            address: address.to_string(),
            message: "address did not resolve".to_string(),
        })
}

/// Join host and port, bracketing IPv6 literals
fn format_address(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{}:{}", host, port),
    }
}
