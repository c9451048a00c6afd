//! Wire protocol for peer discovery and request/response traffic
//!
//! Every datagram carries one JSON [`Envelope`]. Application envelopes carry
//! either a [`RequestBody`] or a [`ResponseBody`] in their `Data` field.
//! Field names and enum strings match the established wire format so that
//! existing peers keep interoperating.

mod codec;
mod messages;

pub use codec::*;
pub use messages::*;
