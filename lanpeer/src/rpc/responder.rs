//! Responder role
//!
//! Maps paths to handlers, answers every inbound request point-to-point to
//! its sender and announces itself through the discovery engine's heartbeats.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument};

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::peer::{Discovery, InboundMessage, Role};
use crate::protocol::{is_response, RequestBody, ResponseBody};

/// Request handler: takes the request data, returns the response data
pub type Handler = Arc<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

/// Reply text sent when a handler panics
pub const HANDLER_PANICKED: &str = "handler panicked";

/// Responder configuration
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Handlers allowed to run at the same time (1 = strictly in arrival order)
    pub max_in_flight: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self { max_in_flight: 1 }
    }
}

impl From<&NodeConfig> for ResponderConfig {
    fn from(config: &NodeConfig) -> Self {
        Self {
            max_in_flight: config.responder.max_in_flight,
        }
    }
}

/// Serves registered paths over a discovery engine
pub struct Responder {
    discovery: Arc<Discovery>,
    handlers: Arc<RwLock<HashMap<String, Handler>>>,
    in_flight: Arc<Semaphore>,
}

impl Responder {
    pub fn new(discovery: Arc<Discovery>, config: ResponderConfig) -> Self {
        if discovery.role() != Role::Responder {
            warn!(role = ?discovery.role(), "Responder built on a non-responder engine, peers will not see it");
        }
        Self {
            discovery,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
        }
    }

    /// Underlying discovery engine
    pub fn discovery(&self) -> &Arc<Discovery> {
        &self.discovery
    }

    /// Register `handler` for `path`, replacing any earlier one
    pub fn on<F>(&self, path: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let path = path.into();
        if self.handlers.write().insert(path.clone(), Arc::new(handler)).is_some() {
            debug!(path = %path, "Handler replaced");
        } else {
            debug!(path = %path, "Handler registered");
        }
    }

    /// Registered paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.handlers.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Run the discovery engine and serve requests until `shutdown` fires
    pub async fn start(
        &self,
        messages: mpsc::Receiver<InboundMessage>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!(paths = ?self.paths(), "Responder serving");
        tokio::select! {
            res = self.discovery.run(shutdown.clone()) => res,
            _ = self.serve(messages, shutdown) => Ok(()),
        }
    }

    /// Serve loop; handler tasks live in a `JoinSet` owned by this future,
    /// so they are aborted when it returns or is dropped
    async fn serve(
        &self,
        mut messages: mpsc::Receiver<InboundMessage>,
        shutdown: CancellationToken,
    ) {
        let mut tasks = JoinSet::new();
        loop {
            // Wait for capacity before taking the next message so that
            // requests beyond the limit queue up in arrival order
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(_) = tasks.join_next(), if !tasks.is_empty() => continue,
                permit = Arc::clone(&self.in_flight).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = messages.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            self.handle(message, permit, &mut tasks).await;
        }

        if !tasks.is_empty() {
            debug!(abandoned = tasks.len(), "Aborting in-flight handlers");
        }
        tasks.shutdown().await;
    }

    async fn handle(
        &self,
        message: InboundMessage,
        permit: OwnedSemaphorePermit,
        tasks: &mut JoinSet<()>,
    ) {
        if is_response(&message.data) {
            trace!(from = %message.origin.id, "Ignoring response");
            return;
        }

        let mut request = match RequestBody::deserialize(&message.data) {
            Ok(request) => request,
            Err(e) => {
                self.discovery
                    .report_error(Error::malformed(format!("request body: {}", e)));
                return;
            }
        };

        let handler = self.handlers.read().get(&request.path).cloned();
        let Some(handler) = handler else {
            debug!(path = %request.path, from = %message.origin.id, "No handler for path");
            reply(&self.discovery, ResponseBody::not_found(&request), &message.reply_address).await;
            return;
        };

        let discovery = Arc::clone(&self.discovery);
        tasks.spawn(
            async move {
                let data = std::mem::take(&mut request.data);
                let outcome = tokio::task::spawn_blocking(move || handler(data)).await;

                let response = match outcome {
                    Ok(Ok(value)) => ResponseBody::ok(&request, value),
                    Ok(Err(e)) => {
                        warn!(path = %request.path, error = %e, "Handler failed");
                        ResponseBody::error(&request, format!("{:#}", e))
                    }
                    Err(e) if e.is_panic() => {
                        warn!(path = %request.path, "Handler panicked");
                        ResponseBody::error(&request, HANDLER_PANICKED)
                    }
                    Err(e) => ResponseBody::error(&request, e.to_string()),
                };

                reply(&discovery, response, &message.reply_address).await;
                drop(permit);
            }
            .in_current_span(),
        );
    }
}

/// Send `response` to `address`; a reply too large for one datagram is
/// replaced by an error reply
async fn reply(discovery: &Discovery, response: ResponseBody, address: &str) {
    let payload = match serde_json::to_value(&response) {
        Ok(payload) => payload,
        Err(e) => {
            discovery.report_error(Error::from(e));
            return;
        }
    };

    match discovery.send_to(payload, address).await {
        Ok(()) => trace!(path = %response.path, to = address, "Reply sent"),
        Err(err @ Error::PayloadTooLarge { .. }) => {
            let fallback = ResponseBody {
                status: crate::protocol::Status::Error,
                error: err.to_string(),
                data: Value::Null,
                ..response
            };
            discovery.report_error(err);
            if let Ok(payload) = serde_json::to_value(&fallback) {
                if let Err(e) = discovery.send_to(payload, address).await {
                    discovery.report_error(e);
                }
            }
        }
        Err(e) => discovery.report_error(e),
    }
}
