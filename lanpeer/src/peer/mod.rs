//! Peer discovery
//!
//! Nodes announce themselves with periodic heartbeat broadcasts. Every node
//! keeps a [`PeerTable`] of the peers it has heard from recently and drops
//! entries once they fall silent for longer than the TTL.

pub mod discovery;
pub mod registry;

pub use discovery::*;
pub use registry::*;
