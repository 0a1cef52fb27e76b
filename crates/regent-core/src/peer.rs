//! Region peers: individual replicas with a raft role.

use serde::{Deserialize, Serialize};

/// The raft role of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerRole {
    /// A full voting replica.
    Voter,
    /// The voting replica currently holding leadership.
    Leader,
    /// A voting replica that is not the leader.
    Follower,
    /// A non-voting replica receiving the raft log.
    Learner,
    /// A learner being promoted through a joint-consensus transition.
    IncomingVoter,
    /// A voter being demoted through a joint-consensus transition.
    DemotingVoter,
}

/// One replica of a region hosted on a specific store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    /// Peer id, unique within the cluster.
    pub id: u64,
    /// The store hosting this peer.
    pub store_id: u64,
    /// The peer's raft role.
    pub role: PeerRole,
}

impl Peer {
    /// Creates a new peer.
    #[must_use]
    pub fn new(id: u64, store_id: u64, role: PeerRole) -> Self {
        Self { id, store_id, role }
    }

    /// Whether this peer counts toward the voter quorum.
    #[must_use]
    pub fn is_voter(&self) -> bool {
        matches!(
            self.role,
            PeerRole::Voter | PeerRole::Leader | PeerRole::Follower | PeerRole::IncomingVoter
        )
    }

    /// Whether this peer is a non-voting learner.
    #[must_use]
    pub fn is_learner(&self) -> bool {
        self.role == PeerRole::Learner
    }
}
