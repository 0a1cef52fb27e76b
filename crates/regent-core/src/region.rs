//! Region snapshots: a contiguous key range replicated across stores.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::peer::{Peer, PeerRole};

/// A down-peer report attached to a region snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownPeer {
    /// The peer reported down.
    pub peer_id: u64,
    /// How long the peer has been down, in seconds.
    pub down_seconds: u64,
}

/// A snapshot of one region: a half-open key range `[start, end)` (empty end
/// key means "to infinity") and its replica set.
///
/// Exactly one peer is the leader. Pending peers have unconfirmed raft state;
/// down peers carry the duration of their outage. All mutators return a
/// modified clone, matching the snapshot discipline of the rest of the crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Region id, unique within the cluster.
    pub id: u64,
    /// Inclusive start key.
    #[serde(with = "hex_key")]
    pub start_key: Vec<u8>,
    /// Exclusive end key; empty means unbounded.
    #[serde(with = "hex_key")]
    pub end_key: Vec<u8>,
    /// All replicas of this region.
    pub peers: Vec<Peer>,
    /// Peer id of the current leader.
    pub leader: u64,
    /// Ids of peers whose raft state is unconfirmed.
    pub pending: BTreeSet<u64>,
    /// Peers reported down, with outage durations.
    pub down_peers: Vec<DownPeer>,
}

impl Region {
    /// Creates a region covering the whole keyspace with the given peers.
    ///
    /// The first peer whose role is [`PeerRole::Leader`] becomes the leader;
    /// if none is marked, the first peer does.
    #[must_use]
    pub fn new(id: u64, peers: Vec<Peer>) -> Self {
        let leader = peers
            .iter()
            .find(|p| p.role == PeerRole::Leader)
            .or_else(|| peers.first())
            .map_or(0, |p| p.id);
        Self {
            id,
            start_key: Vec::new(),
            end_key: Vec::new(),
            peers,
            leader,
            pending: BTreeSet::new(),
            down_peers: Vec::new(),
        }
    }

    /// Sets the key range.
    #[must_use]
    pub fn with_key_range(mut self, start: &[u8], end: &[u8]) -> Self {
        self.start_key = start.to_vec();
        self.end_key = end.to_vec();
        self
    }

    /// Returns a clone with the given down-peer reports.
    #[must_use]
    pub fn with_down_peers(mut self, down: Vec<DownPeer>) -> Self {
        self.down_peers = down;
        self
    }

    /// Returns a clone with the given peer ids marked pending.
    #[must_use]
    pub fn with_pending_peers(mut self, pending: impl IntoIterator<Item = u64>) -> Self {
        self.pending = pending.into_iter().collect();
        self
    }

    /// Returns a clone with an extra peer appended.
    #[must_use]
    pub fn with_added_peer(mut self, peer: Peer) -> Self {
        self.peers.push(peer);
        self
    }

    /// Returns a clone with the peer on the given store removed.
    #[must_use]
    pub fn with_removed_store_peer(mut self, store_id: u64) -> Self {
        self.peers.retain(|p| p.store_id != store_id);
        self
    }

    /// Returns a clone with the given peer's role changed.
    #[must_use]
    pub fn with_peer_role(mut self, peer_id: u64, role: PeerRole) -> Self {
        for peer in &mut self.peers {
            if peer.id == peer_id {
                peer.role = role;
            }
        }
        self
    }

    /// Returns the leader peer, if present in the peer list.
    #[must_use]
    pub fn leader_peer(&self) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == self.leader)
    }

    /// Returns the store hosting the leader peer.
    #[must_use]
    pub fn leader_store(&self) -> Option<u64> {
        self.leader_peer().map(|p| p.store_id)
    }

    /// Returns the peer hosted on the given store, if any.
    #[must_use]
    pub fn peer_on_store(&self, store_id: u64) -> Option<&Peer> {
        self.peers.iter().find(|p| p.store_id == store_id)
    }

    /// Returns the ids of all stores hosting a peer of this region.
    #[must_use]
    pub fn store_ids(&self) -> Vec<u64> {
        self.peers.iter().map(|p| p.store_id).collect()
    }

    /// Whether the given peer is the current leader.
    #[must_use]
    pub fn is_leader(&self, peer_id: u64) -> bool {
        self.leader == peer_id
    }

    /// Whether the given peer has unconfirmed raft state.
    #[must_use]
    pub fn is_pending(&self, peer_id: u64) -> bool {
        self.pending.contains(&peer_id)
    }

    /// Returns how long the given peer has been down, if reported.
    #[must_use]
    pub fn down_seconds(&self, peer_id: u64) -> Option<u64> {
        self.down_peers.iter().find(|d| d.peer_id == peer_id).map(|d| d.down_seconds)
    }
}

/// Serde adapter encoding raw keys as lowercase hex strings.
pub mod hex_key {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes a raw key as a lowercase hex string.
    pub fn serialize<S: Serializer>(key: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(key))
    }

    /// Deserializes a raw key from a hex string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
