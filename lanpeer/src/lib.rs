//! lanpeer - peer discovery and request/response on a LAN broadcast segment
//!
//! Processes on the same broadcast network find each other without a central
//! registry: responders broadcast heartbeats, every node keeps a table of the
//! peers it hears, and requesters invoke named paths on responders.
//!
//! Layers, bottom up:
//! - [`transport`]: datagram send/broadcast/receive (UDP or in-memory)
//! - [`protocol`]: JSON envelopes and request/response bodies
//! - [`peer`]: peer table and the discovery engine
//! - [`rpc`]: requester and responder roles

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod peer;
pub mod protocol;
pub mod rpc;
pub mod transport;
pub mod version;

pub use error::{Error, ErrorCode, Result};
