//! Fitting a region's peers onto its resolved rule list.
//!
//! The fit answers, for one region snapshot: which peers count toward which
//! rule, which claimed peers have the wrong role, and which peers no rule
//! wants at all (orphans). The checker's decision pipeline consumes the fit;
//! nothing here mutates cluster state.

use std::cmp::Reverse;
use std::collections::HashMap;

use tracing::debug;

use regent_core::{Peer, Region, Store};

use crate::rule::{matches_label_constraints, Rule};
use crate::score::{distinct_score, isolation_score};

/// The peers assigned to one rule.
#[derive(Debug, Clone)]
pub struct RuleFit {
    /// The rule being filled.
    pub rule: Rule,
    /// Peers claimed by the rule, in store-id order.
    pub peers: Vec<Peer>,
    /// The subset of `peers` whose current role does not strictly satisfy
    /// the rule's role. They still count toward the rule; the checker fixes
    /// their role in place rather than moving data.
    pub peers_with_different_role: Vec<Peer>,
    /// Isolation score of the claimed peers against the rule's location
    /// labels.
    pub isolation_score: u64,
}

impl RuleFit {
    /// Whether the rule is fully satisfied: replica count reached and every
    /// claimed peer in its exact role.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.peers.len() == self.rule.count && self.peers_with_different_role.is_empty()
    }
}

/// The complete fit of a region against its resolved rules.
#[derive(Debug, Clone)]
pub struct RegionFit {
    /// Per-rule assignments, in rule application order.
    pub rule_fits: Vec<RuleFit>,
    /// Peers claimed by no rule, in store-id order.
    pub orphan_peers: Vec<Peer>,
}

impl RegionFit {
    /// Whether every rule is satisfied and no orphans remain.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        !self.rule_fits.is_empty()
            && self.rule_fits.iter().all(RuleFit::is_satisfied)
            && self.orphan_peers.is_empty()
    }

    /// Returns the rule fit that claimed the given peer, if any.
    #[must_use]
    pub fn rule_fit_for_peer(&self, peer_id: u64) -> Option<&RuleFit> {
        self.rule_fits.iter().find(|rf| rf.peers.iter().any(|p| p.id == peer_id))
    }

    /// Sum of isolation scores over all rule fits; used to compare overall
    /// placements.
    #[must_use]
    pub fn total_score(&self) -> u64 {
        self.rule_fits.iter().map(|rf| rf.isolation_score).sum()
    }
}

/// Computes the fit of `region`'s peers against `rules`.
///
/// Peers are processed in store-id order so the result is stable under any
/// reordering of the snapshot's peer list. Each rule, in application order,
/// claims up to `count` unclaimed peers whose store satisfies its label
/// constraints; selection greedily maximizes `(strict role match, marginal
/// isolation gain)` with ties broken by ascending store id. Peers left over
/// become orphans.
#[must_use]
pub fn fit_region(region: &Region, stores: &[Store], rules: &[Rule]) -> RegionFit {
    let store_map: HashMap<u64, &Store> = stores.iter().map(|s| (s.id, s)).collect();

    let mut unclaimed: Vec<Peer> = region.peers.clone();
    unclaimed.sort_by_key(|p| (p.store_id, p.id));
    for peer in &unclaimed {
        if !store_map.contains_key(&peer.store_id) {
            debug!(region_id = region.id, peer_id = peer.id, store_id = peer.store_id,
                   "peer references a missing store");
        }
    }

    let mut rule_fits = Vec::with_capacity(rules.len());
    for rule in rules {
        let selected = claim_peers(rule, &mut unclaimed, region, &store_map);
        let peers_with_different_role: Vec<Peer> = selected
            .iter()
            .filter(|p| !rule.role.matches_strictly(p, region))
            .copied()
            .collect();
        let stores_of: Vec<&Store> =
            selected.iter().filter_map(|p| store_map.get(&p.store_id).copied()).collect();
        let isolation = isolation_score(&stores_of, &rule.location_labels);
        rule_fits.push(RuleFit {
            rule: rule.clone(),
            peers: selected,
            peers_with_different_role,
            isolation_score: isolation,
        });
    }

    RegionFit { rule_fits, orphan_peers: unclaimed }
}

/// Removes and returns up to `rule.count` matching peers from `unclaimed`.
fn claim_peers(
    rule: &Rule,
    unclaimed: &mut Vec<Peer>,
    region: &Region,
    store_map: &HashMap<u64, &Store>,
) -> Vec<Peer> {
    let mut selected: Vec<Peer> = Vec::new();
    let mut selected_stores: Vec<&Store> = Vec::new();

    while selected.len() < rule.count {
        let best = unclaimed
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                store_map
                    .get(&p.store_id)
                    .is_some_and(|s| matches_label_constraints(s, &rule.label_constraints))
            })
            .max_by_key(|(_, p)| {
                let strict = rule.role.matches_strictly(p, region);
                let gain = store_map
                    .get(&p.store_id)
                    .map_or(0, |s| distinct_score(&selected_stores, s, &rule.location_labels));
                (strict, gain, Reverse(p.store_id))
            })
            .map(|(idx, _)| idx);

        let Some(idx) = best else { break };
        let peer = unclaimed.remove(idx);
        if let Some(store) = store_map.get(&peer.store_id) {
            selected_stores.push(store);
        }
        selected.push(peer);
    }

    selected.sort_by_key(|p| p.store_id);
    selected
}
