//! Datagram transports
//!
//! A transport moves opaque byte buffers: point-to-point `send`, segment-wide
//! `broadcast`, and a long-running `start` that feeds every received datagram
//! and every non-fatal I/O error into the channels of a [`TransportSink`].
//! There is no framing and no retry at this layer.
//!
//! - [`UdpTransport`]: tokio UDP socket with broadcast enabled
//! - [`MemoryNetwork`]: in-process hub used by tests and simulations

mod memory;
mod udp;

pub use memory::*;
pub use udp::*;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::{Error, Result};

/// One received datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundDatagram {
    /// Raw payload
    pub payload: Vec<u8>,

    /// Observed source address (`ip:port`)
    pub source: String,
}

/// Channels a running transport delivers into
#[derive(Debug, Clone)]
pub struct TransportSink {
    messages: mpsc::Sender<InboundDatagram>,
    errors: mpsc::Sender<Error>,
}

impl TransportSink {
    pub fn new(messages: mpsc::Sender<InboundDatagram>, errors: mpsc::Sender<Error>) -> Self {
        Self { messages, errors }
    }

    /// Deliver a datagram; fails once the consumer is gone
    pub async fn deliver(&self, datagram: InboundDatagram) -> Result<()> {
        self.messages
            .send(datagram)
            .await
            .map_err(|_| Error::TransportClosed("inbound message channel closed".to_string()))
    }

    /// Report a non-fatal error without blocking the caller
    pub fn report(&self, error: Error) {
        if let Err(e) = self.errors.try_send(error) {
            warn!(error = %e, "Dropping transport error, error channel unavailable");
        }
    }
}

/// Datagram transport contract
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Address this node advertises as its origin
    fn address(&self) -> String;

    /// Send a datagram to one address
    async fn send(&self, data: &[u8], address: &str) -> Result<()>;

    /// Send a datagram to every node on the segment
    async fn broadcast(&self, data: &[u8]) -> Result<()>;

    /// Receive datagrams into `sink` until the future is dropped.
    ///
    /// Read errors are reported on the sink and do not stop the loop.
    /// Returns only when the sink's consumer disappears or on a fatal error.
    async fn start(&self, sink: TransportSink) -> Result<()>;
}
