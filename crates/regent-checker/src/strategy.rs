//! Destination selection for add, replace and relocate decisions.
//!
//! Selection is deterministic: candidates are ranked by isolation gain
//! against the rule's existing placement, then by fewer hosted regions, then
//! by ascending store id. A rule's isolation level acts as a hard filter on
//! top of the ranking.

use std::cmp::Reverse;

use tracing::trace;

use regent_core::{Cluster, Region, Store};
use regent_placement::{distinct_score, isolation_score, satisfies_isolation_level, Rule};

use crate::filter::check_add_target;

/// Picks destination stores for one rule of one region.
pub struct ReplicaStrategy<'a> {
    cluster: &'a dyn Cluster,
    region: &'a Region,
    rule: &'a Rule,
}

impl<'a> ReplicaStrategy<'a> {
    /// Creates a strategy scoped to one region and rule.
    #[must_use]
    pub fn new(cluster: &'a dyn Cluster, region: &'a Region, rule: &'a Rule) -> Self {
        Self { cluster, region, rule }
    }

    /// Selects the best store for a new peer, given the stores already
    /// hosting the rule's peers.
    #[must_use]
    pub fn select_store_to_add(&self, co_located: &[Store]) -> Option<u64> {
        self.select_target(co_located, None, true)
    }

    /// Selects the best store to replace the peer on `old_store`.
    #[must_use]
    pub fn select_store_to_replace(&self, co_located: &[Store], old_store: u64) -> Option<u64> {
        self.select_target(co_located, Some(old_store), true)
    }

    /// Whether a destination would exist if the rule's isolation level were
    /// ignored. Used to tell "no store at all" apart from "vetoed by the
    /// isolation level" in diagnostics.
    #[must_use]
    pub fn blocked_by_isolation(&self, co_located: &[Store], old_store: Option<u64>) -> bool {
        self.rule.isolation_level.is_some()
            && self.select_target(co_located, old_store, false).is_some()
    }

    /// Selects the most redundant of the rule's stores, the one whose peer
    /// should move if the placement is to improve. Prefers keeping the
    /// leader in place; ties break on ascending store id.
    #[must_use]
    pub fn select_store_to_remove(&self, co_located: &[Store]) -> Option<u64> {
        let labels = &self.rule.location_labels;
        co_located
            .iter()
            .min_by_key(|s| {
                let others: Vec<&Store> =
                    co_located.iter().filter(|o| o.id != s.id).collect();
                let holds_leader = self.region.leader_store() == Some(s.id);
                (distinct_score(&others, s, labels), holds_leader, s.id)
            })
            .map(|s| s.id)
    }

    /// Selects a store that would strictly raise the rule's isolation score
    /// if it replaced `old_store`. Returns `None` when no candidate beats
    /// the current placement; an equal score is not an improvement.
    #[must_use]
    pub fn select_store_to_improve(&self, co_located: &[Store], old_store: u64) -> Option<u64> {
        let labels = &self.rule.location_labels;
        let current: Vec<&Store> = co_located.iter().collect();
        let current_score = isolation_score(&current, labels);
        let remaining: Vec<&Store> =
            co_located.iter().filter(|s| s.id != old_store).collect();

        self.candidates(&remaining, true)
            .into_iter()
            .filter_map(|c| {
                let mut next = remaining.clone();
                next.push(&c);
                let score = isolation_score(&next, labels);
                (score > current_score).then_some((score, c))
            })
            .max_by_key(|(score, c)| (*score, Reverse(c.region_count), Reverse(c.id)))
            .map(|(_, c)| c.id)
    }

    fn select_target(
        &self,
        co_located: &[Store],
        exclude: Option<u64>,
        enforce_isolation: bool,
    ) -> Option<u64> {
        let labels = &self.rule.location_labels;
        let existing: Vec<&Store> =
            co_located.iter().filter(|s| Some(s.id) != exclude).collect();
        let selected = self
            .candidates(&existing, enforce_isolation)
            .into_iter()
            .max_by_key(|c| {
                (distinct_score(&existing, c, labels), Reverse(c.region_count), Reverse(c.id))
            })
            .map(|c| c.id);
        trace!(region_id = self.region.id, group = %self.rule.group_id, rule = %self.rule.id,
               selected = ?selected, "selected destination store");
        selected
    }

    /// Stores eligible to receive a peer of this rule, optionally enforcing
    /// the rule's isolation level against `existing`.
    fn candidates(&self, existing: &[&Store], enforce_isolation: bool) -> Vec<Store> {
        let mut stores: Vec<Store> = self
            .cluster
            .stores()
            .into_iter()
            .filter(|s| check_add_target(s, self.rule, self.region).is_ok())
            .collect();
        if enforce_isolation {
            if let Some(level) = &self.rule.isolation_level {
                stores.retain(|c| {
                    satisfies_isolation_level(existing, c, &self.rule.location_labels, level)
                });
            }
        }
        stores.sort_by_key(|s| s.id);
        stores
    }
}
