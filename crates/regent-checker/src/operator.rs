//! Operators: ordered membership-change step sequences emitted per region.
//!
//! The checker produces at most one operator per invocation; the execution
//! engine downstream owns its lifetime and performs the actual raft
//! membership changes. Step sequences are built so the region stays
//! available throughout: learners are added and promoted before voters are
//! removed, and leadership is transferred away before its store is touched.

use std::fmt;
use std::ops::BitOr;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use regent_core::{Cluster, Region};
use regent_placement::{Rule, RuleRole};

/// Description of an operator adding a peer for an under-filled rule.
pub const ADD_RULE_PEER: &str = "add-rule-peer";
/// Description of an operator replacing a peer on a down store.
pub const REPLACE_RULE_DOWN_PEER: &str = "replace-rule-down-peer";
/// Description of an operator replacing a peer on a draining store.
pub const REPLACE_RULE_OFFLINE_PEER: &str = "replace-rule-offline-peer";
/// Description of an operator promoting a learner that should be a voter.
pub const FIX_PEER_ROLE: &str = "fix-peer-role";
/// Description of an operator transferring leadership onto a leader-rule peer.
pub const FIX_LEADER_ROLE: &str = "fix-leader-role";
/// Description of an operator transferring leadership off a follower-rule peer.
pub const FIX_FOLLOWER_ROLE: &str = "fix-follower-role";
/// Description of an operator moving a peer to a better-isolated store.
pub const MOVE_TO_BETTER_LOCATION: &str = "move-to-better-location";
/// Description of an operator removing a peer no rule wants.
pub const REMOVE_ORPHAN_PEER: &str = "remove-orphan-peer";
/// Description of an operator splitting a region at rule boundaries.
pub const RULE_SPLIT_REGION: &str = "rule-split-region";

/// One membership-change step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpStep {
    /// Add a learner peer on a store.
    AddLearner {
        /// Destination store.
        to_store: u64,
        /// Pre-allocated id of the new peer.
        peer_id: u64,
    },
    /// Promote a learner to voter.
    PromoteLearner {
        /// Store hosting the learner.
        to_store: u64,
        /// The learner's peer id.
        peer_id: u64,
    },
    /// Remove the peer hosted on a store.
    RemovePeer {
        /// Store to remove the peer from.
        from_store: u64,
    },
    /// Move leadership between stores.
    TransferLeader {
        /// Store currently holding leadership.
        from_store: u64,
        /// Store to transfer leadership to.
        to_store: u64,
    },
    /// Split the region at the given keys.
    SplitRegion {
        /// Raw split keys; serialized as lowercase hex.
        #[serde(with = "hex_keys")]
        split_keys: Vec<Vec<u8>>,
    },
}

impl fmt::Display for OpStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddLearner { to_store, peer_id } => {
                write!(f, "add learner {peer_id} on store {to_store}")
            }
            Self::PromoteLearner { to_store, peer_id } => {
                write!(f, "promote learner {peer_id} on store {to_store}")
            }
            Self::RemovePeer { from_store } => write!(f, "remove peer on store {from_store}"),
            Self::TransferLeader { from_store, to_store } => {
                write!(f, "transfer leader from store {from_store} to store {to_store}")
            }
            Self::SplitRegion { split_keys } => {
                write!(f, "split region at {} keys", split_keys.len())
            }
        }
    }
}

/// Bitmask classifying what an operator touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpKind(u32);

impl OpKind {
    /// The operator acts on a region. Every emitted operator carries this.
    pub const REGION: OpKind = OpKind(1);
    /// The operator changes the replica set.
    pub const REPLICA: OpKind = OpKind(1 << 1);
    /// The operator moves leadership.
    pub const LEADER: OpKind = OpKind(1 << 2);
    /// The operator splits a region.
    pub const SPLIT: OpKind = OpKind(1 << 3);

    /// Whether every bit of `other` is set in `self`.
    #[must_use]
    pub fn contains(self, other: OpKind) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpKind {
    type Output = OpKind;

    fn bitor(self, rhs: OpKind) -> OpKind {
        OpKind(self.0 | rhs.0)
    }
}

/// Urgency of an operator, consumed by the execution engine's queueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriorityLevel {
    /// Background work.
    Low,
    /// Default.
    Normal,
    /// Repairs that protect durability.
    High,
    /// Must run before anything else.
    Urgent,
}

/// An ordered sequence of steps fixing one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    /// Region the operator applies to.
    pub region_id: u64,
    /// Stable description consumed by metrics and tests.
    pub desc: &'static str,
    /// What the operator touches.
    pub kind: OpKind,
    /// Urgency.
    pub priority: PriorityLevel,
    /// The steps, executed in order.
    pub steps: Vec<OpStep>,
}

impl Operator {
    /// The operator's stable description.
    #[must_use]
    pub fn desc(&self) -> &'static str {
        self.desc
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the operator has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the step at `index`.
    #[must_use]
    pub fn step(&self, index: usize) -> Option<&OpStep> {
        self.steps.get(index)
    }

    /// The operator's priority level.
    #[must_use]
    pub fn priority_level(&self) -> PriorityLevel {
        self.priority
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (region {}, {} steps)", self.desc, self.region_id, self.steps.len())
    }
}

/// Builds the split operator for a region whose range crosses rule
/// boundaries.
#[must_use]
pub fn create_split_operator(region: &Region, split_keys: Vec<Vec<u8>>) -> Operator {
    Operator {
        region_id: region.id,
        desc: RULE_SPLIT_REGION,
        kind: OpKind::REGION | OpKind::SPLIT,
        priority: PriorityLevel::High,
        steps: vec![OpStep::SplitRegion { split_keys }],
    }
}

/// Builds the operator adding a new peer for `rule` on `store_id`.
///
/// The peer always starts as a learner; rules asking for a voting role get a
/// promotion step appended. Learner rules stop there.
#[must_use]
pub fn create_add_peer_operator(
    cluster: &dyn Cluster,
    region: &Region,
    rule: &Rule,
    store_id: u64,
) -> Operator {
    let peer_id = cluster.alloc_peer_id();
    let mut steps = vec![OpStep::AddLearner { to_store: store_id, peer_id }];
    if rule.role != RuleRole::Learner {
        steps.push(OpStep::PromoteLearner { to_store: store_id, peer_id });
    }
    Operator {
        region_id: region.id,
        desc: ADD_RULE_PEER,
        kind: OpKind::REGION | OpKind::REPLICA,
        priority: PriorityLevel::High,
        steps,
    }
}

/// Builds the operator promoting an existing learner in place.
#[must_use]
pub fn create_promote_learner_operator(
    desc: &'static str,
    region: &Region,
    store_id: u64,
    peer_id: u64,
) -> Operator {
    Operator {
        region_id: region.id,
        desc,
        kind: OpKind::REGION | OpKind::REPLICA,
        priority: PriorityLevel::High,
        steps: vec![OpStep::PromoteLearner { to_store: store_id, peer_id }],
    }
}

/// Builds the operator transferring leadership between two existing peers.
#[must_use]
pub fn create_transfer_leader_operator(
    desc: &'static str,
    region: &Region,
    from_store: u64,
    to_store: u64,
) -> Operator {
    Operator {
        region_id: region.id,
        desc,
        kind: OpKind::REGION | OpKind::LEADER,
        priority: PriorityLevel::High,
        steps: vec![OpStep::TransferLeader { from_store, to_store }],
    }
}

/// Builds the operator removing the peer on `from_store`.
///
/// Removing the leader's store first transfers leadership to a randomly
/// chosen eligible peer; returns `None` when no peer can take over.
#[must_use]
pub fn create_remove_peer_operator(
    desc: &'static str,
    cluster: &dyn Cluster,
    region: &Region,
    from_store: u64,
    priority: PriorityLevel,
) -> Option<Operator> {
    let mut steps = Vec::new();
    let mut kind = OpKind::REGION | OpKind::REPLICA;
    if region.leader_store() == Some(from_store) {
        let candidates = leader_transfer_candidates(cluster, region, from_store);
        let target = *candidates.choose(&mut rand::thread_rng())?;
        steps.push(OpStep::TransferLeader { from_store, to_store: target });
        kind = kind | OpKind::LEADER;
    }
    steps.push(OpStep::RemovePeer { from_store });
    Some(Operator { region_id: region.id, desc, kind, priority, steps })
}

/// Builds the operator replacing the peer on `old_store` with a fresh peer
/// on `new_store`.
///
/// The replacement is add-first so the replica count never dips: the new
/// peer joins as a learner, is promoted if the rule wants a voting role, and
/// only then is the old peer removed. When the old store holds leadership,
/// the leadership target is picked at random among the eligible existing
/// voters and the incoming peer; an existing voter can take over before the
/// add begins, the incoming peer only after its promotion. A learner-rule
/// replacement never promotes, so if no existing voter can take over either,
/// returns `None` rather than remove the leader's peer with leadership still
/// on it.
#[must_use]
pub fn create_replace_peer_operator(
    desc: &'static str,
    cluster: &dyn Cluster,
    region: &Region,
    rule: &Rule,
    old_store: u64,
    new_store: u64,
    priority: PriorityLevel,
) -> Option<Operator> {
    let peer_id = cluster.alloc_peer_id();
    let promote = rule.role != RuleRole::Learner;

    let mut kind = OpKind::REGION | OpKind::REPLICA;
    let mut steps = Vec::new();
    let mut late_transfer = None;

    if region.leader_store() == Some(old_store) {
        kind = kind | OpKind::LEADER;
        let mut choices: Vec<Option<u64>> = leader_transfer_candidates(cluster, region, old_store)
            .into_iter()
            .map(Some)
            .collect();
        if promote {
            // the incoming peer may take over once promoted
            choices.push(None);
        }
        match choices.choose(&mut rand::thread_rng())? {
            Some(existing) => {
                steps.push(OpStep::TransferLeader { from_store: old_store, to_store: *existing });
            }
            None => late_transfer = Some(new_store),
        }
    }

    steps.push(OpStep::AddLearner { to_store: new_store, peer_id });
    if promote {
        steps.push(OpStep::PromoteLearner { to_store: new_store, peer_id });
    }
    if let Some(to_store) = late_transfer {
        steps.push(OpStep::TransferLeader { from_store: old_store, to_store });
    }
    steps.push(OpStep::RemovePeer { from_store: old_store });

    Some(Operator { region_id: region.id, desc, kind, priority, steps })
}

/// Stores of existing peers that could take over leadership: voting,
/// confirmed, on an up and not busy store, and not the store being vacated.
fn leader_transfer_candidates(cluster: &dyn Cluster, region: &Region, excluded: u64) -> Vec<u64> {
    let mut candidates: Vec<u64> = region
        .peers
        .iter()
        .filter(|p| p.store_id != excluded && p.is_voter() && !region.is_pending(p.id))
        .filter(|p| cluster.store(p.store_id).is_some_and(|s| s.is_up() && !s.busy))
        .map(|p| p.store_id)
        .collect();
    candidates.sort_unstable();
    candidates
}

/// Serde adapter encoding split keys as lowercase hex strings.
mod hex_keys {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(keys: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(keys.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings.into_iter().map(|s| hex::decode(&s).map_err(serde::de::Error::custom)).collect()
    }
}
