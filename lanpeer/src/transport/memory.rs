//! In-memory transport
//!
//! A shared [`MemoryNetwork`] routes datagrams between [`MemoryTransport`]
//! instances living in the same process. Every node gets an address
//! `10.0.0.N:1024`; broadcasts reach every node, the sender included, just
//! like a UDP broadcast on a real segment.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

use crate::error::{Error, Result};

use super::{InboundDatagram, Transport, TransportSink};

const MEMORY_PORT: u16 = 1024;

/// Shared broker connecting memory transports
#[derive(Clone, Debug, Default)]
pub struct MemoryNetwork {
    nodes: Arc<RwLock<HashMap<String, mpsc::UnboundedSender<InboundDatagram>>>>,
    next_host: Arc<AtomicU32>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new node that advertises its real address
    pub fn join(&self) -> MemoryTransport {
        let address = self.allocate_address();
        self.attach(address.clone(), address)
    }

    /// Attach a new node that advertises `advertised` instead of its real address
    pub fn join_advertising(&self, advertised: impl Into<String>) -> MemoryTransport {
        let address = self.allocate_address();
        self.attach(address, advertised.into())
    }

    /// Deliver raw bytes to `to` as if sent from `from`
    pub fn inject(&self, from: &str, to: &str, payload: &[u8]) {
        self.route(from, to, payload);
    }

    /// Addresses of every attached node
    pub fn addresses(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self.nodes.read().keys().cloned().collect();
        addrs.sort();
        addrs
    }

    fn allocate_address(&self) -> String {
        let n = self.next_host.fetch_add(1, Ordering::Relaxed) + 1;
        format!("10.0.{}.{}:{}", n / 256, n % 256, MEMORY_PORT)
    }

    fn attach(&self, address: String, advertised: String) -> MemoryTransport {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        self.nodes.write().insert(address.clone(), inbox_tx);
        MemoryTransport {
            network: self.clone(),
            address,
            advertised,
            inbox: Mutex::new(Some(inbox_rx)),
        }
    }

    fn detach(&self, address: &str) {
        self.nodes.write().remove(address);
    }

    fn route(&self, from: &str, to: &str, payload: &[u8]) {
        let nodes = self.nodes.read();
        match nodes.get(to) {
            Some(inbox) => {
                let _ = inbox.send(InboundDatagram {
                    payload: payload.to_vec(),
                    source: from.to_string(),
                });
            }
            // Like UDP: sending to nobody is not an error
            None => trace!(to, "No node at address, datagram dropped"),
        }
    }

    fn route_all(&self, from: &str, payload: &[u8]) {
        for inbox in self.nodes.read().values() {
            let _ = inbox.send(InboundDatagram {
                payload: payload.to_vec(),
                source: from.to_string(),
            });
        }
    }
}

/// Transport endpoint attached to a [`MemoryNetwork`]
#[derive(Debug)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    address: String,
    advertised: String,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<InboundDatagram>>>,
}

impl MemoryTransport {
    /// Real address datagrams from this node carry as their source
    pub fn real_address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn address(&self) -> String {
        self.advertised.clone()
    }

    async fn send(&self, data: &[u8], address: &str) -> Result<()> {
        self.network.route(&self.address, address, data);
        Ok(())
    }

    async fn broadcast(&self, data: &[u8]) -> Result<()> {
        self.network.route_all(&self.address, data);
        Ok(())
    }

    async fn start(&self, sink: TransportSink) -> Result<()> {
        let mut inbox = self
            .inbox
            .lock()
            .await
            .take()
            .ok_or_else(|| Error::TransportClosed("memory transport already started".to_string()))?;

        while let Some(datagram) = inbox.recv().await {
            sink.deliver(datagram).await?;
        }
        Err(Error::TransportClosed("memory network dropped".to_string()))
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.network.detach(&self.address);
    }
}
