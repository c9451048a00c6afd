//! Peer table: tracks peers announced by heartbeats
//!
//! Written by the discovery receive loop, swept by the eviction loop, and
//! read by the requester. All access goes through one lock.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use tokio::time::Instant;

use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Peer
// ─────────────────────────────────────────────────────────────────

/// A peer known from its heartbeats
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Peer id from the heartbeat origin
    pub id: String,

    /// Address advertised in the first heartbeat seen
    pub address: String,

    /// When the first heartbeat arrived
    pub first_seen: Instant,

    /// When the latest heartbeat arrived
    pub last_seen: Instant,
}

// ─────────────────────────────────────────────────────────────────
// Peer Table
// ─────────────────────────────────────────────────────────────────

/// Thread-safe registry of live peers keyed by peer id
#[derive(Debug)]
pub struct PeerTable {
    peers: RwLock<HashMap<String, Peer>>,
}

impl PeerTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Record a heartbeat. Returns `true` when the peer was not known yet.
    ///
    /// Only `last_seen` is refreshed for a known id; its address is kept even
    /// if the heartbeat came from somewhere else.
    pub fn upsert(&self, peer_id: &str, address: &str) -> bool {
        let now = Instant::now();
        let mut peers = self.peers.write();
        match peers.get_mut(peer_id) {
            Some(peer) => {
                peer.last_seen = now;
                false
            }
            None => {
                peers.insert(
                    peer_id.to_string(),
                    Peer {
                        id: peer_id.to_string(),
                        address: address.to_string(),
                        first_seen: now,
                        last_seen: now,
                    },
                );
                true
            }
        }
    }

    /// Remove peers silent for longer than `ttl`.
    /// Returns the ids of removed peers.
    pub fn evict_stale(&self, ttl: Duration) -> Vec<String> {
        let mut peers = self.peers.write();
        let stale: Vec<String> = peers
            .iter()
            .filter(|(_, p)| p.last_seen.elapsed() > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            peers.remove(id);
        }

        stale
    }

    /// Pick one peer uniformly at random
    pub fn pick_random(&self) -> Result<Peer> {
        self.peers
            .read()
            .values()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(Error::NoPeers)
    }

    /// Get a clone of a peer's entry
    pub fn get(&self, peer_id: &str) -> Option<Peer> {
        self.peers.read().get(peer_id).cloned()
    }

    /// Remove a peer by id
    pub fn remove(&self, peer_id: &str) -> Option<Peer> {
        self.peers.write().remove(peer_id)
    }

    /// All known peers, ordered by id
    pub fn all_peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.read().values().cloned().collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    /// Number of known peers
    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    #[cfg(test)]
    fn backdate(&self, peer_id: &str, age: Duration) {
        if let Some(peer) = self.peers.write().get_mut(peer_id) {
            peer.last_seen = Instant::now() - age;
        }
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_upsert_creates_once() {
        let table = PeerTable::new();

        assert!(table.upsert("p1", "10.0.0.1:1024"));
        assert!(!table.upsert("p1", "10.0.0.1:1024"));
        assert!(!table.upsert("p1", "10.0.0.1:1024"));

        assert_eq!(table.peer_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upsert_refreshes_last_seen_only() {
        let table = PeerTable::new();
        table.upsert("p1", "10.0.0.1:1024");
        let before = table.get("p1").unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        table.upsert("p1", "10.0.0.99:1024");

        let after = table.get("p1").unwrap();
        assert_eq!(after.address, "10.0.0.1:1024");
        assert_eq!(after.first_seen, before.first_seen);
        assert!(after.last_seen > before.last_seen);
    }

    #[test]
    fn test_evict_stale() {
        let table = PeerTable::new();
        table.upsert("stale", "10.0.0.1:1024");
        table.upsert("fresh", "10.0.0.2:1024");
        table.backdate("stale", Duration::from_secs(120));

        let evicted = table.evict_stale(Duration::from_secs(5));
        assert_eq!(evicted, vec!["stale".to_string()]);
        assert_eq!(table.peer_count(), 1);
        assert!(table.get("fresh").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_regular_heartbeats_survive_eviction() {
        let table = PeerTable::new();
        let ttl = Duration::from_secs(5);

        for _ in 0..20 {
            table.upsert("p1", "10.0.0.1:1024");
            tokio::time::advance(Duration::from_secs(1)).await;
            assert!(table.evict_stale(ttl).is_empty());
        }

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(table.evict_stale(ttl), vec!["p1".to_string()]);
    }

    #[test]
    fn test_pick_random_empty() {
        let table = PeerTable::new();
        assert!(matches!(table.pick_random(), Err(Error::NoPeers)));
    }

    #[test]
    fn test_pick_random_covers_all_peers() {
        let table = PeerTable::new();
        table.upsert("a", "10.0.0.1:1024");
        table.upsert("b", "10.0.0.2:1024");
        table.upsert("c", "10.0.0.3:1024");

        let mut seen = HashSet::new();
        for _ in 0..500 {
            seen.insert(table.pick_random().unwrap().id);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_all_peers_sorted_and_remove() {
        let table = PeerTable::new();
        table.upsert("b", "10.0.0.2:1024");
        table.upsert("a", "10.0.0.1:1024");

        let ids: Vec<String> = table.all_peers().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(table.remove("a").is_some());
        assert!(table.remove("a").is_none());
        assert_eq!(table.peer_count(), 1);
    }
}
