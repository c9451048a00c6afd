//! Requester role
//!
//! Sends a request for a path and waits for the matching response. Every
//! request carries a fresh correlation id which responders echo back; a
//! single dispatch loop routes each inbound response to the waiting caller.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn, Instrument};

use crate::config::{NodeConfig, TransportSettings};
use crate::error::{Error, Result};
use crate::peer::{Discovery, InboundMessage};
use crate::protocol::{correlation_id, is_response, RequestBody, ResponseBody};
use crate::transport::UdpConfig;

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// How a request reaches responders
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Targeting {
    /// Broadcast to every node; the first reply wins
    #[default]
    Broadcast,
    /// Send to one peer picked at random from the peer table
    RandomPeer,
}

impl Targeting {
    pub fn as_str(&self) -> &'static str {
        match self {
            Targeting::Broadcast => "broadcast",
            Targeting::RandomPeer => "random-peer",
        }
    }

    /// Socket a requester with this targeting binds.
    ///
    /// Random-peer picks from heartbeats, which only arrive on the shared
    /// discovery port, so it binds that port. Broadcast only waits for
    /// point-to-point replies and takes an OS-assigned port, which lets it
    /// run next to a responder on the same host.
    pub fn udp_config(&self, settings: &TransportSettings) -> UdpConfig {
        match self {
            Targeting::Broadcast => UdpConfig::ephemeral(settings),
            Targeting::RandomPeer => UdpConfig::from(settings),
        }
    }
}

impl fmt::Display for Targeting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Targeting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "broadcast" => Ok(Targeting::Broadcast),
            "random-peer" | "random_peer" => Ok(Targeting::RandomPeer),
            other => Err(Error::validation(
                "requester.targeting",
                format!("unknown targeting '{}', expected broadcast or random-peer", other),
            )),
        }
    }
}

/// Requester configuration
#[derive(Debug, Clone)]
pub struct RequesterConfig {
    /// How long `request` waits for a reply
    pub timeout: Duration,

    /// How requests are addressed
    pub targeting: Targeting,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            targeting: Targeting::Broadcast,
        }
    }
}

impl From<&NodeConfig> for RequesterConfig {
    fn from(config: &NodeConfig) -> Self {
        Self {
            timeout: config.requester.timeout(),
            targeting: config.requester.targeting,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Pending requests
// ─────────────────────────────────────────────────────────────────

struct Pending {
    path: String,
    seq: u64,
    reply: oneshot::Sender<Result<Value>>,
}

/// In-flight requests keyed by correlation id
#[derive(Default)]
struct PendingRequests {
    entries: Mutex<HashMap<String, Pending>>,
    next_seq: AtomicU64,
}

impl PendingRequests {
    fn register(&self, id: &str, path: &str, reply: oneshot::Sender<Result<Value>>) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(
            id.to_string(),
            Pending {
                path: path.to_string(),
                seq,
                reply,
            },
        );
    }

    fn remove(&self, id: &str) -> Option<Pending> {
        self.entries.lock().remove(id)
    }

    /// Oldest in-flight request for `path`, for replies without a correlation id
    fn take_oldest_for_path(&self, path: &str) -> Option<Pending> {
        let mut entries = self.entries.lock();
        let id = entries
            .iter()
            .filter(|(_, p)| p.path == path)
            .min_by_key(|(_, p)| p.seq)
            .map(|(id, _)| id.clone())?;
        entries.remove(&id)
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Removes the pending entry when the request finishes or is dropped
struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

// ─────────────────────────────────────────────────────────────────
// Requester
// ─────────────────────────────────────────────────────────────────

/// Issues path requests over a discovery engine
pub struct Requester {
    discovery: Arc<Discovery>,
    config: RequesterConfig,
    pending: Arc<PendingRequests>,
}

impl Requester {
    pub fn new(discovery: Arc<Discovery>, config: RequesterConfig) -> Self {
        Self {
            discovery,
            config,
            pending: Arc::new(PendingRequests::default()),
        }
    }

    /// Underlying discovery engine
    pub fn discovery(&self) -> &Arc<Discovery> {
        &self.discovery
    }

    /// Number of requests waiting for a reply
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Run the discovery engine and the response dispatch loop until `shutdown` fires.
    ///
    /// `messages` is the message receiver returned alongside the engine.
    pub fn start(
        &self,
        messages: mpsc::Receiver<InboundMessage>,
        shutdown: CancellationToken,
    ) -> JoinHandle<Result<()>> {
        let dispatcher = Dispatcher {
            discovery: Arc::clone(&self.discovery),
            pending: Arc::clone(&self.pending),
        };

        tokio::spawn(
            async move {
                tokio::select! {
                    res = dispatcher.discovery.run(shutdown) => res,
                    _ = dispatcher.run(messages) => Ok(()),
                }
            }
            .in_current_span(),
        )
    }

    /// Request `path` with `data` and wait for the reply.
    ///
    /// Fails with [`Error::RequestTimeout`] when no reply arrives in time,
    /// [`Error::PathNotFound`] or [`Error::Handler`] when the responder
    /// reports so, and [`Error::NoPeers`] in random-peer mode with an empty
    /// peer table.
    pub async fn request(&self, path: &str, data: Value) -> Result<Value> {
        let body = RequestBody::new(path, data);
        let (reply_tx, reply_rx) = oneshot::channel();

        self.pending.register(&body.id, path, reply_tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id: body.id.clone(),
        };

        let payload = serde_json::to_value(&body)?;
        match self.config.targeting {
            Targeting::Broadcast => self.discovery.broadcast(payload).await?,
            Targeting::RandomPeer => {
                let peer = self.discovery.peers().pick_random()?;
                trace!(peer = %peer.id, address = %peer.address, "Picked peer");
                self.discovery.send_to(payload, &peer.address).await?
            }
        }
        debug!(id = %body.id, path, targeting = %self.config.targeting, "Request sent");

        match tokio::time::timeout(self.config.timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Correlation {
                message: format!("dispatch loop stopped before '{}' was answered", path),
            }),
            Err(_) => {
                warn!(id = %body.id, path, "Request timed out");
                Err(Error::RequestTimeout {
                    path: path.to_string(),
                    timeout_ms: self.config.timeout.as_millis() as u64,
                })
            }
        }
    }
}

/// Routes inbound responses to pending requests
struct Dispatcher {
    discovery: Arc<Discovery>,
    pending: Arc<PendingRequests>,
}

impl Dispatcher {
    async fn run(&self, mut messages: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = messages.recv().await {
            self.dispatch(message);
        }
    }

    fn dispatch(&self, message: InboundMessage) {
        // Other requesters' broadcasts reach us too
        if !is_response(&message.data) {
            trace!(from = %message.origin.id, "Ignoring request");
            return;
        }

        let response = match ResponseBody::deserialize(&message.data) {
            Ok(response) => response,
            Err(e) => {
                let err = Error::malformed(format!("response body: {}", e));
                match correlation_id(&message.data).and_then(|id| self.pending.remove(id)) {
                    Some(pending) => {
                        let _ = pending.reply.send(Err(err));
                    }
                    None => self.discovery.report_error(err),
                }
                return;
            }
        };

        let pending = if response.id.is_empty() {
            self.pending.take_oldest_for_path(&response.path)
        } else {
            self.pending.remove(&response.id)
        };

        match pending {
            Some(pending) => {
                trace!(id = %response.id, path = %response.path, from = %message.origin.id, "Response matched");
                let _ = pending.reply.send(response.into_result());
            }
            None => debug!(
                id = %response.id,
                path = %response.path,
                from = %message.origin.id,
                "Dropping uncorrelated response"
            ),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
