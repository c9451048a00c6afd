//! Protocol message definitions
//!
//! Envelope, origin headers, and the request/response bodies carried inside
//! application envelopes. Payloads are `serde_json::Value` so handlers can
//! deserialize into their own shapes without the core knowing about them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────

/// Kind of frame on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeKind {
    /// Liveness announcement
    #[serde(rename = "ping")]
    Heartbeat,

    /// Request or response traffic
    #[serde(rename = "message")]
    Application,
}

impl EnvelopeKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::Heartbeat => "ping",
            EnvelopeKind::Application => "message",
        }
    }
}

/// Sender identity attached to every envelope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    /// Peer id, constant for the sender's process lifetime
    #[serde(rename = "ID")]
    pub id: String,

    /// Address the sender advertises for point-to-point traffic
    #[serde(rename = "Address")]
    pub address: String,
}

impl Origin {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
        }
    }
}

/// Outer wire message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "Type")]
    pub kind: EnvelopeKind,

    #[serde(rename = "Headers")]
    pub origin: Origin,

    #[serde(rename = "Data", default)]
    pub data: Value,
}

impl Envelope {
    /// Heartbeat announcing `origin`
    pub fn heartbeat(origin: Origin) -> Self {
        Self {
            kind: EnvelopeKind::Heartbeat,
            origin,
            data: Value::Null,
        }
    }

    /// Application envelope carrying `data`
    pub fn application(origin: Origin, data: Value) -> Self {
        Self {
            kind: EnvelopeKind::Application,
            origin,
            data,
        }
    }

    /// Serialize to JSON bytes
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

// ─────────────────────────────────────────────────────────────────
// Request / Response Bodies
// ─────────────────────────────────────────────────────────────────

/// Payload of a request envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBody {
    /// Correlation token; empty when sent by a peer that predates it
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "Path")]
    pub path: String,

    #[serde(rename = "Data", default)]
    pub data: Value,
}

impl RequestBody {
    /// New request with a fresh correlation token
    pub fn new(path: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            path: path.into(),
            data,
        }
    }
}

/// Outcome of a request as reported by the responder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    Error,
    NotFound,
}

/// Payload of a response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    /// Echo of the request's correlation token
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "Path")]
    pub path: String,

    #[serde(rename = "Status")]
    pub status: Status,

    #[serde(rename = "Error", default)]
    pub error: String,

    #[serde(rename = "Data", default)]
    pub data: Value,
}

impl ResponseBody {
    /// Successful reply to `request`
    pub fn ok(request: &RequestBody, data: Value) -> Self {
        Self {
            id: request.id.clone(),
            path: request.path.clone(),
            status: Status::Ok,
            error: String::new(),
            data,
        }
    }

    /// Handler failure reply to `request`
    pub fn error(request: &RequestBody, message: impl Into<String>) -> Self {
        Self {
            id: request.id.clone(),
            path: request.path.clone(),
            status: Status::Error,
            error: message.into(),
            data: Value::Null,
        }
    }

    /// Unknown-path reply to `request`
    pub fn not_found(request: &RequestBody) -> Self {
        Self {
            id: request.id.clone(),
            path: request.path.clone(),
            status: Status::NotFound,
            error: String::new(),
            data: Value::Null,
        }
    }

    /// Convert into the caller-facing result
    pub fn into_result(self) -> crate::error::Result<Value> {
        match self.status {
            Status::Ok => Ok(self.data),
            Status::Error => Err(crate::error::Error::Handler {
                path: self.path,
                message: self.error,
            }),
            Status::NotFound => Err(crate::error::Error::PathNotFound { path: self.path }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
