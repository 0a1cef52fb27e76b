//! Rule storage: validated writes, override resolution and split keys.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;

use regent_core::Cluster;

use crate::rule::{matches_label_constraints, Rule, RuleRole};

/// Group id of the built-in default rule.
pub const DEFAULT_GROUP_ID: &str = "regent";

/// Id of the built-in default rule.
pub const DEFAULT_RULE_ID: &str = "default";

/// A specialized `Result` type for rule management.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Errors returned when writing rules.
///
/// All validation happens at write time; reads never fail. A rule that was
/// valid when written stays in force even if the store population later
/// changes underneath it.
#[derive(Debug, Error)]
pub enum RuleError {
    /// Group id or rule id is empty.
    #[error("rule group id and id must not be empty")]
    MissingIdentity,

    /// The replica count is zero.
    #[error("rule {group_id}/{id} has zero replica count")]
    ZeroCount {
        /// Offending rule group.
        group_id: String,
        /// Offending rule id.
        id: String,
    },

    /// The start key does not precede the end key.
    #[error("rule {group_id}/{id} has start key at or after end key")]
    InvalidKeyRange {
        /// Offending rule group.
        group_id: String,
        /// Offending rule id.
        id: String,
    },

    /// The isolation level is not one of the rule's location labels.
    #[error("rule {group_id}/{id} isolation level {level:?} is not a location label")]
    UnknownIsolationLevel {
        /// Offending rule group.
        group_id: String,
        /// Offending rule id.
        id: String,
        /// The unknown level.
        level: String,
    },

    /// No store in the current population satisfies the constraint set.
    #[error("rule {group_id}/{id} can not match any store")]
    NoMatchingStore {
        /// Offending rule group.
        group_id: String,
        /// Offending rule id.
        id: String,
    },

    /// The rule to delete does not exist.
    #[error("rule {group_id}/{id} not found")]
    NotFound {
        /// Requested rule group.
        group_id: String,
        /// Requested rule id.
        id: String,
    },

    /// The write would leave part of the keyspace without any rule.
    #[error("no rule left to cover keys from {start_hex:?}")]
    IncompleteCoverage {
        /// Hex-encoded start of the uncovered range.
        start_hex: String,
    },
}

/// Persists the ordered, overridable rule list and resolves it per region.
///
/// Writes are serialized behind a lock and validated before they commit;
/// readers observe a consistent snapshot of the whole list. The manager is
/// seeded with a default voter rule covering the entire keyspace.
pub struct RuleManager {
    cluster: Arc<dyn Cluster>,
    rules: RwLock<BTreeMap<(String, String), Rule>>,
}

impl RuleManager {
    /// Creates a manager seeded with the default rule asking for
    /// `default_replicas` voters everywhere.
    #[must_use]
    pub fn new(cluster: Arc<dyn Cluster>, default_replicas: usize) -> Self {
        let default =
            Rule::new(DEFAULT_GROUP_ID, DEFAULT_RULE_ID, RuleRole::Voter, default_replicas);
        let mut rules = BTreeMap::new();
        rules.insert((default.group_id.clone(), default.id.clone()), default);
        Self { cluster, rules: RwLock::new(rules) }
    }

    /// Validates and upserts a rule.
    ///
    /// # Errors
    ///
    /// Rejects structurally invalid rules, constraint sets no current store
    /// can satisfy, and writes that would leave keys uncovered.
    pub fn set_rule(&self, rule: Rule) -> Result<()> {
        self.validate(&rule)?;
        let mut rules = self.rules.write();
        let mut next = rules.clone();
        next.insert((rule.group_id.clone(), rule.id.clone()), rule.clone());
        check_coverage(next.values())?;
        info!(group = %rule.group_id, id = %rule.id, role = ?rule.role, count = rule.count,
              "placement rule set");
        *rules = next;
        Ok(())
    }

    /// Deletes a rule.
    ///
    /// # Errors
    ///
    /// Fails if the rule does not exist or its removal would leave keys
    /// uncovered.
    pub fn delete_rule(&self, group_id: &str, id: &str) -> Result<()> {
        let mut rules = self.rules.write();
        let key = (group_id.to_string(), id.to_string());
        if !rules.contains_key(&key) {
            return Err(RuleError::NotFound { group_id: group_id.into(), id: id.into() });
        }
        let mut next = rules.clone();
        next.remove(&key);
        check_coverage(next.values())?;
        info!(group = group_id, id, "placement rule deleted");
        *rules = next;
        Ok(())
    }

    /// Returns one rule by group and id.
    #[must_use]
    pub fn rule(&self, group_id: &str, id: &str) -> Option<Rule> {
        self.rules.read().get(&(group_id.to_string(), id.to_string())).cloned()
    }

    /// Returns every rule in application order: `(group, index, id)`.
    #[must_use]
    pub fn rules(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self.rules.read().values().cloned().collect();
        rules.sort_by(|a, b| a.apply_key().cmp(&b.apply_key()));
        rules
    }

    /// Resolves the rules applying to the half-open range `[start, end)`.
    ///
    /// Returns an empty list when the range strictly contains a rule
    /// boundary: such a region cannot be fitted and must split first.
    /// Otherwise returns the overlapping rules with override semantics
    /// applied: within each group, an override rule masks every
    /// lower-priority rule of that group.
    #[must_use]
    pub fn rules_for_region(&self, start: &[u8], end: &[u8]) -> Vec<Rule> {
        if !self.split_keys(start, end).is_empty() {
            return Vec::new();
        }
        let overlapping = self.rules().into_iter().filter(|r| r.overlaps(start, end));
        prepare_for_apply(overlapping)
    }

    /// Returns every rule boundary key strictly inside `(start, end)`,
    /// sorted and deduplicated. These are the keys a mis-ranged region must
    /// split at.
    #[must_use]
    pub fn split_keys(&self, start: &[u8], end: &[u8]) -> Vec<Vec<u8>> {
        let mut keys: Vec<Vec<u8>> = Vec::new();
        for rule in self.rules.read().values() {
            for key in [&rule.start_key, &rule.end_key] {
                let inside = !key.is_empty()
                    && key.as_slice() > start
                    && (end.is_empty() || key.as_slice() < end);
                if inside {
                    keys.push(key.clone());
                }
            }
        }
        keys.sort();
        keys.dedup();
        keys
    }

    fn validate(&self, rule: &Rule) -> Result<()> {
        if rule.group_id.is_empty() || rule.id.is_empty() {
            return Err(RuleError::MissingIdentity);
        }
        if rule.count == 0 {
            return Err(RuleError::ZeroCount {
                group_id: rule.group_id.clone(),
                id: rule.id.clone(),
            });
        }
        if !rule.end_key.is_empty() && rule.start_key >= rule.end_key {
            return Err(RuleError::InvalidKeyRange {
                group_id: rule.group_id.clone(),
                id: rule.id.clone(),
            });
        }
        if let Some(level) = &rule.isolation_level {
            if !rule.location_labels.iter().any(|l| l == level) {
                return Err(RuleError::UnknownIsolationLevel {
                    group_id: rule.group_id.clone(),
                    id: rule.id.clone(),
                    level: level.clone(),
                });
            }
        }
        if !rule.label_constraints.is_empty() {
            let stores = self.cluster.stores();
            let matchable = stores.is_empty()
                || stores.iter().any(|s| matches_label_constraints(s, &rule.label_constraints));
            if !matchable {
                return Err(RuleError::NoMatchingStore {
                    group_id: rule.group_id.clone(),
                    id: rule.id.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Applies override semantics to rules already in application order.
fn prepare_for_apply(rules: impl IntoIterator<Item = Rule>) -> Vec<Rule> {
    let mut result: Vec<Rule> = Vec::new();
    for rule in rules {
        if rule.override_rule {
            result.retain(|r| r.group_id != rule.group_id);
        }
        result.push(rule);
    }
    result
}

/// Checks that every key in the keyspace is governed by at least one rule.
fn check_coverage<'a>(rules: impl Iterator<Item = &'a Rule> + Clone) -> Result<()> {
    // The coverage predicate is constant between rule boundaries, so it is
    // enough to probe each boundary key (plus the empty start of keyspace).
    let mut bounds: Vec<&[u8]> = vec![b""];
    for rule in rules.clone() {
        if !rule.start_key.is_empty() {
            bounds.push(&rule.start_key);
        }
        if !rule.end_key.is_empty() {
            bounds.push(&rule.end_key);
        }
    }
    bounds.sort();
    bounds.dedup();
    for bound in bounds {
        let covered = rules.clone().any(|r| {
            r.start_key.as_slice() <= bound && (r.end_key.is_empty() || bound < r.end_key.as_slice())
        });
        if !covered {
            return Err(RuleError::IncompleteCoverage { start_hex: hex::encode(bound) });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use regent_core::MemoryCluster;

    use crate::rule::LabelConstraint;

    fn manager() -> (Arc<MemoryCluster>, RuleManager) {
        let cluster = Arc::new(MemoryCluster::new());
        let manager = RuleManager::new(Arc::clone(&cluster) as Arc<dyn Cluster>, 3);
        (cluster, manager)
    }

    #[test]
    fn test_default_rule_seeded() {
        let (_, manager) = manager();
        let rules = manager.rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].group_id, DEFAULT_GROUP_ID);
        assert_eq!(rules[0].id, DEFAULT_RULE_ID);
        assert_eq!(rules[0].role, RuleRole::Voter);
        assert_eq!(rules[0].count, 3);
    }

    #[test]
    fn test_set_rule_rejects_invalid() {
        let (cluster, manager) = manager();
        cluster.add_labels_store(1, 1, [("host", "h1")]);

        let err = manager.set_rule(Rule::new("", "x", RuleRole::Voter, 1)).unwrap_err();
        assert!(matches!(err, RuleError::MissingIdentity));

        let err = manager.set_rule(Rule::new("g", "x", RuleRole::Voter, 0)).unwrap_err();
        assert!(matches!(err, RuleError::ZeroCount { .. }));

        let bad_range = Rule::new("g", "x", RuleRole::Voter, 1)
            .with_key_range_hex("ff", "aa")
            .unwrap();
        let err = manager.set_rule(bad_range).unwrap_err();
        assert!(matches!(err, RuleError::InvalidKeyRange { .. }));

        let bad_level = Rule::new("g", "x", RuleRole::Voter, 1)
            .with_location_labels(["zone"])
            .with_isolation_level("rack");
        let err = manager.set_rule(bad_level).unwrap_err();
        assert!(matches!(err, RuleError::UnknownIsolationLevel { .. }));

        let unmatchable = Rule::new("g", "x", RuleRole::Voter, 1)
            .with_constraints(vec![LabelConstraint::new_in("host", ["h9"])]);
        let err = manager.set_rule(unmatchable).unwrap_err();
        assert!(err.to_string().contains("can not match any store"));
    }

    #[test]
    fn test_validation_skipped_without_stores() {
        let (_, manager) = manager();
        // with an empty store population the constraint check cannot judge
        let rule = Rule::new("g", "x", RuleRole::Voter, 1)
            .with_constraints(vec![LabelConstraint::new_in("host", ["h9"])]);
        assert!(manager.set_rule(rule).is_ok());
    }

    #[test]
    fn test_delete_rule() {
        let (_, manager) = manager();
        manager.set_rule(Rule::new("g", "extra", RuleRole::Learner, 1)).unwrap();
        manager.delete_rule("g", "extra").unwrap();
        assert!(manager.rule("g", "extra").is_none());
        assert!(matches!(
            manager.delete_rule("g", "extra"),
            Err(RuleError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_last_covering_rule_rejected() {
        let (_, manager) = manager();
        let err = manager.delete_rule(DEFAULT_GROUP_ID, DEFAULT_RULE_ID).unwrap_err();
        assert!(matches!(err, RuleError::IncompleteCoverage { .. }));

        // a full-range replacement in another group unblocks the deletion
        manager.set_rule(Rule::new("tenant", "default", RuleRole::Voter, 3)).unwrap();
        manager.delete_rule(DEFAULT_GROUP_ID, DEFAULT_RULE_ID).unwrap();
        assert_eq!(manager.rules().len(), 1);
    }

    #[test]
    fn test_partial_coverage_rejected() {
        let (_, manager) = manager();
        manager.set_rule(Rule::new("tenant", "default", RuleRole::Voter, 3)).unwrap();
        manager.delete_rule(DEFAULT_GROUP_ID, DEFAULT_RULE_ID).unwrap();

        // shrinking the only remaining rule to [aa, ff) would abandon keys
        let partial = Rule::new("tenant", "default", RuleRole::Voter, 3)
            .with_key_range_hex("aa", "ff")
            .unwrap();
        let err = manager.set_rule(partial).unwrap_err();
        assert!(matches!(err, RuleError::IncompleteCoverage { .. }));
    }

    #[test]
    fn test_rules_apply_order() {
        let (_, manager) = manager();
        manager.set_rule(Rule::new("a", "z", RuleRole::Voter, 1).with_index(5)).unwrap();
        manager.set_rule(Rule::new("a", "a", RuleRole::Voter, 1).with_index(5)).unwrap();
        manager.set_rule(Rule::new("a", "m", RuleRole::Voter, 1).with_index(1)).unwrap();

        let order: Vec<(String, String)> = manager
            .rules()
            .into_iter()
            .map(|r| (r.group_id, r.id))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".into(), "m".into()),
                ("a".into(), "a".into()),
                ("a".into(), "z".into()),
                (DEFAULT_GROUP_ID.into(), DEFAULT_RULE_ID.into()),
            ]
        );
    }

    #[test]
    fn test_override_masks_same_group() {
        let (_, manager) = manager();
        let over = Rule::new(DEFAULT_GROUP_ID, "pinned", RuleRole::Voter, 5)
            .with_index(100)
            .with_override();
        manager.set_rule(over).unwrap();
        manager.set_rule(Rule::new("tenant", "extra", RuleRole::Learner, 1)).unwrap();

        let rules = manager.rules_for_region(b"", b"");
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        // the default rule is masked; the other group survives
        assert_eq!(ids, vec!["pinned", "extra"]);
    }

    #[test]
    fn test_split_keys_and_region_resolution() {
        let (_, manager) = manager();
        let ranged = Rule::new("tenant", "hot", RuleRole::Voter, 1)
            .with_key_range_hex("aa", "ff")
            .unwrap();
        manager.set_rule(ranged).unwrap();

        let keys = manager.split_keys(b"", b"");
        assert_eq!(keys, vec![vec![0xaa], vec![0xff]]);

        // a region spanning the boundary resolves to no rules
        assert!(manager.rules_for_region(b"", b"").is_empty());
        // a region inside the ranged rule sees both rules
        let rules = manager.rules_for_region(&[0xaa], &[0xbb]);
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![DEFAULT_RULE_ID, "hot"]);
        // a region outside it sees only the default rule
        let rules = manager.rules_for_region(&[0x10], &[0x20]);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, DEFAULT_RULE_ID);
    }
}
