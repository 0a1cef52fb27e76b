//! The placement rule model: declarative constraints on replica placement.

use serde::{Deserialize, Serialize};

use regent_core::region::hex_key;
use regent_core::{Peer, Region, Store};

/// The replica role a rule asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleRole {
    /// A voting replica (the leader also qualifies).
    Voter,
    /// The leader replica itself.
    Leader,
    /// A voting replica that is not the leader.
    Follower,
    /// A non-voting learner replica.
    Learner,
}

impl RuleRole {
    /// Whether a peer filling this rule may hold leadership.
    #[must_use]
    pub fn can_lead(&self) -> bool {
        matches!(self, Self::Voter | Self::Leader)
    }

    /// Whether the given peer of `region` satisfies this role exactly.
    #[must_use]
    pub fn matches_strictly(&self, peer: &Peer, region: &Region) -> bool {
        match self {
            Self::Leader => region.is_leader(peer.id),
            Self::Voter => peer.is_voter(),
            Self::Follower => peer.is_voter() && !region.is_leader(peer.id),
            Self::Learner => peer.is_learner(),
        }
    }
}

/// Comparison operator of a [`LabelConstraint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelOp {
    /// The label must be present with one of the listed values.
    In,
    /// The label must be absent, or present with none of the listed values.
    NotIn,
    /// The label must be present, whatever its value.
    Exists,
    /// The label must be absent.
    NotExists,
}

/// A single label constraint on candidate stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelConstraint {
    /// The label key to inspect.
    pub key: String,
    /// How to compare.
    pub op: LabelOp,
    /// Values for `In`/`NotIn`; ignored for the existence operators.
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelConstraint {
    /// Builds an `In` constraint.
    #[must_use]
    pub fn new_in(key: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { key: key.into(), op: LabelOp::In, values: values.into_iter().map(Into::into).collect() }
    }

    /// Builds a `NotIn` constraint.
    #[must_use]
    pub fn new_not_in(
        key: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            key: key.into(),
            op: LabelOp::NotIn,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the given store satisfies this constraint.
    #[must_use]
    pub fn matches(&self, store: &Store) -> bool {
        let value = store.label(&self.key);
        match self.op {
            LabelOp::In => value.is_some_and(|v| self.values.iter().any(|c| c == v)),
            LabelOp::NotIn => !value.is_some_and(|v| self.values.iter().any(|c| c == v)),
            LabelOp::Exists => value.is_some(),
            LabelOp::NotExists => value.is_none(),
        }
    }
}

/// Whether a store satisfies every constraint in the list.
#[must_use]
pub fn matches_label_constraints(store: &Store, constraints: &[LabelConstraint]) -> bool {
    constraints.iter().all(|c| c.matches(store))
}

/// A declarative placement constraint over a key range.
///
/// Rules are totally ordered within a group by `(index, id)` and globally by
/// `(group_id, index, id)`. A rule with the override flag suppresses every
/// lower-priority rule of its own group when rules are resolved for a range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    /// The rule group this rule belongs to.
    pub group_id: String,
    /// Identifier, unique within the group.
    pub id: String,
    /// Priority within the group; higher index wins.
    #[serde(default)]
    pub index: u32,
    /// Whether this rule masks lower-priority rules of its group.
    #[serde(default, rename = "override")]
    pub override_rule: bool,
    /// Inclusive start of the governed key range.
    #[serde(with = "hex_key", default)]
    pub start_key: Vec<u8>,
    /// Exclusive end of the governed key range; empty means unbounded.
    #[serde(with = "hex_key", default)]
    pub end_key: Vec<u8>,
    /// The replica role this rule asks for.
    pub role: RuleRole,
    /// How many replicas of that role.
    pub count: usize,
    /// Constraints candidate stores must satisfy.
    #[serde(default)]
    pub label_constraints: Vec<LabelConstraint>,
    /// Topology label keys, most significant first (e.g. zone > rack > host).
    #[serde(default)]
    pub location_labels: Vec<String>,
    /// If set, every pair of replicas must differ at or above this location
    /// label. Must name one of `location_labels`.
    #[serde(default)]
    pub isolation_level: Option<String>,
}

impl Rule {
    /// Creates a rule covering the whole keyspace.
    #[must_use]
    pub fn new(
        group_id: impl Into<String>,
        id: impl Into<String>,
        role: RuleRole,
        count: usize,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            id: id.into(),
            index: 0,
            override_rule: false,
            start_key: Vec::new(),
            end_key: Vec::new(),
            role,
            count,
            label_constraints: Vec::new(),
            location_labels: Vec::new(),
            isolation_level: None,
        }
    }

    /// Sets the key range from lowercase-hex encoded bounds.
    ///
    /// # Errors
    ///
    /// Returns the decode error if either bound is not valid hex.
    pub fn with_key_range_hex(
        mut self,
        start_hex: &str,
        end_hex: &str,
    ) -> Result<Self, hex::FromHexError> {
        self.start_key = hex::decode(start_hex)?;
        self.end_key = hex::decode(end_hex)?;
        Ok(self)
    }

    /// Sets the in-group priority index.
    #[must_use]
    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// Marks the rule as overriding lower-priority rules of its group.
    #[must_use]
    pub fn with_override(mut self) -> Self {
        self.override_rule = true;
        self
    }

    /// Sets the label constraints.
    #[must_use]
    pub fn with_constraints(mut self, constraints: Vec<LabelConstraint>) -> Self {
        self.label_constraints = constraints;
        self
    }

    /// Sets the topology labels used for isolation scoring.
    #[must_use]
    pub fn with_location_labels(
        mut self,
        labels: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.location_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the required isolation level.
    #[must_use]
    pub fn with_isolation_level(mut self, level: impl Into<String>) -> Self {
        self.isolation_level = Some(level.into());
        self
    }

    /// The rule's start key, lowercase hex encoded.
    #[must_use]
    pub fn start_key_hex(&self) -> String {
        hex::encode(&self.start_key)
    }

    /// The rule's end key, lowercase hex encoded.
    #[must_use]
    pub fn end_key_hex(&self) -> String {
        hex::encode(&self.end_key)
    }

    /// The `(group, index, id)` key rules sort by for application.
    #[must_use]
    pub fn apply_key(&self) -> (&str, u32, &str) {
        (&self.group_id, self.index, &self.id)
    }

    /// Whether the rule's range overlaps the half-open range `[start, end)`.
    #[must_use]
    pub fn overlaps(&self, start: &[u8], end: &[u8]) -> bool {
        ranges_overlap(&self.start_key, &self.end_key, start, end)
    }
}

/// Whether two half-open key ranges overlap. Empty end keys are unbounded.
#[must_use]
pub fn ranges_overlap(a_start: &[u8], a_end: &[u8], b_start: &[u8], b_end: &[u8]) -> bool {
    let a_before_b_end = b_end.is_empty() || a_start < b_end;
    let b_before_a_end = a_end.is_empty() || b_start < a_end;
    a_before_b_end && b_before_a_end
}
