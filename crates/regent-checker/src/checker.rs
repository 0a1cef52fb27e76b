//! The rule checker facade and its priority pipeline.
//!
//! One call checks one region against the rules resolved for its key range
//! and returns at most one corrective operator. The pipeline is an explicit
//! ordered list of decisions; the first that produces an operator wins:
//!
//! 1. The region's range crosses a rule boundary → split.
//! 2. Per rule, in application order: fill missing peers, replace peers on
//!    down or draining stores, fix mismatched roles, then improve location.
//! 3. Remove an orphan peer, but only once every rule is fully satisfied.
//!
//! A decision that finds a violation but no legal way to act reports an
//! internal error: the checker moves on to the next rule and ultimately
//! returns nothing rather than emit a worse operator.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use regent_core::{CancelFlag, CheckCache, Cluster, NoopKey, Peer, Region, Store};
use regent_placement::{fit_region, RegionFit, Rule, RuleFit, RuleManager, RuleRole};

use crate::config::CheckerConfig;
use crate::filter::check_leader_target;
use crate::operator::{
    create_add_peer_operator, create_promote_learner_operator, create_remove_peer_operator,
    create_replace_peer_operator, create_split_operator, create_transfer_leader_operator, Operator,
    PriorityLevel, FIX_FOLLOWER_ROLE, FIX_LEADER_ROLE, FIX_PEER_ROLE, MOVE_TO_BETTER_LOCATION,
    REMOVE_ORPHAN_PEER, REPLACE_RULE_DOWN_PEER, REPLACE_RULE_OFFLINE_PEER,
};
use crate::strategy::ReplicaStrategy;

/// Internal reasons a pipeline decision could not act on a violation.
///
/// These never surface to the caller; they are logged at debug level and the
/// check falls through to the next rule.
#[derive(Debug, Error)]
pub enum CheckError {
    /// An under-filled rule has no eligible destination store.
    #[error("no store to add a peer for rule {group_id}/{id}")]
    NoStoreToAdd {
        /// Rule group.
        group_id: String,
        /// Rule id.
        id: String,
    },

    /// A down or draining peer has no eligible replacement store.
    #[error("no store to replace peer {peer_id}")]
    NoStoreToReplace {
        /// The peer that needs replacing.
        peer_id: u64,
    },

    /// A leader-rule peer is not allowed to take leadership.
    #[error("peer {peer_id} cannot take leadership")]
    PeerCannotBeLeader {
        /// The blocked peer.
        peer_id: u64,
    },

    /// No peer of the region can take leadership over.
    #[error("no peer can take over leadership")]
    NoNewLeader,
}

/// Checks regions against placement rules and emits corrective operators.
///
/// The checker is cheap to share: it holds read-only handles and a small
/// advisory cache, and every check works on immutable snapshots. Concurrent
/// checks of different regions are independent; concurrent checks of the
/// same region each produce an operator against their own snapshot and the
/// execution engine deduplicates downstream.
pub struct RuleChecker {
    cluster: Arc<dyn Cluster>,
    rules: Arc<RuleManager>,
    cache: CheckCache,
    config: CheckerConfig,
}

impl RuleChecker {
    /// Creates a checker over the given cluster and rule manager.
    #[must_use]
    pub fn new(cluster: Arc<dyn Cluster>, rules: Arc<RuleManager>, config: CheckerConfig) -> Self {
        let cache = CheckCache::new(config.cache_capacity, config.cache_ttl);
        Self { cluster, rules, cache, config }
    }

    /// Checks one region and returns the highest-priority corrective
    /// operator, or `None` when the region is compliant (or nothing legal
    /// can be done yet).
    #[must_use]
    pub fn check(&self, region: &Region) -> Option<Operator> {
        self.check_cancellable(region, &CancelFlag::new())
    }

    /// Like [`check`](Self::check), polling `cancel` between phases. A
    /// cancelled check returns `None` without recording anything.
    #[must_use]
    pub fn check_cancellable(&self, region: &Region, cancel: &CancelFlag) -> Option<Operator> {
        counter!("regent_checker_check_total").increment(1);
        if cancel.is_cancelled() {
            return None;
        }

        let rules = self.rules.rules_for_region(&region.start_key, &region.end_key);
        let mut stores = self.cluster.stores();
        stores.sort_by_key(|s| s.id);

        let key = NoopKey {
            region_id: region.id,
            rule_fingerprint: fingerprint(&rules),
            snapshot_fingerprint: snapshot_fingerprint(region, &stores),
        };
        if self.cache.is_noop(&key) {
            counter!("regent_checker_cache_hit_total").increment(1);
            return None;
        }

        if rules.is_empty() {
            // No rule governs the region as a whole, which means its range
            // crosses a rule boundary.
            let op = self.fix_range(region);
            if op.is_none() {
                self.cache.insert_noop(key);
            }
            return op;
        }

        let fit = fit_region(region, &stores, &rules);
        if cancel.is_cancelled() {
            return None;
        }

        for rule_fit in &fit.rule_fits {
            match self.fix_rule_peer(region, &fit, rule_fit, &stores) {
                Ok(Some(op)) => {
                    counter!("regent_checker_operator_total", "type" => op.desc()).increment(1);
                    return Some(op);
                }
                Ok(None) => {}
                Err(err) => {
                    counter!("regent_checker_fix_error_total").increment(1);
                    debug!(region_id = region.id, group = %rule_fit.rule.group_id,
                           rule = %rule_fit.rule.id, error = %err, "cannot fix rule peer");
                }
            }
        }

        if let Some(op) = self.fix_orphan_peers(region, &fit) {
            counter!("regent_checker_operator_total", "type" => op.desc()).increment(1);
            return Some(op);
        }

        self.cache.insert_noop(key);
        None
    }

    fn fix_range(&self, region: &Region) -> Option<Operator> {
        let keys = self.rules.split_keys(&region.start_key, &region.end_key);
        if keys.is_empty() {
            return None;
        }
        counter!("regent_checker_operator_total", "type" => "rule-split-region").increment(1);
        Some(create_split_operator(region, keys))
    }

    /// Fixes the highest-priority violation of one rule, if any.
    fn fix_rule_peer(
        &self,
        region: &Region,
        fit: &RegionFit,
        rule_fit: &RuleFit,
        stores: &[Store],
    ) -> Result<Option<Operator>, CheckError> {
        if rule_fit.peers.len() < rule_fit.rule.count {
            return self.add_rule_peer(region, rule_fit, stores).map(Some);
        }
        for peer in &rule_fit.peers {
            if self.is_down_peer(region, peer) {
                return self
                    .replace_rule_peer(region, fit, rule_fit, peer, REPLACE_RULE_DOWN_PEER, stores)
                    .map(Some);
            }
            if self.is_offline_peer(peer) {
                return self
                    .replace_rule_peer(
                        region,
                        fit,
                        rule_fit,
                        peer,
                        REPLACE_RULE_OFFLINE_PEER,
                        stores,
                    )
                    .map(Some);
            }
        }
        for peer in &rule_fit.peers_with_different_role {
            if let Some(op) = self.fix_loose_match_peer(region, fit, rule_fit, peer)? {
                return Ok(Some(op));
            }
        }
        Ok(self.fix_better_location(region, rule_fit, stores))
    }

    fn add_rule_peer(
        &self,
        region: &Region,
        rule_fit: &RuleFit,
        stores: &[Store],
    ) -> Result<Operator, CheckError> {
        let co_located = rule_fit_stores(rule_fit, stores);
        let strategy = ReplicaStrategy::new(&*self.cluster, region, &rule_fit.rule);
        let Some(store_id) = strategy.select_store_to_add(&co_located) else {
            self.report_isolation_veto(region, &rule_fit.rule, &strategy, &co_located, None);
            return Err(CheckError::NoStoreToAdd {
                group_id: rule_fit.rule.group_id.clone(),
                id: rule_fit.rule.id.clone(),
            });
        };
        Ok(create_add_peer_operator(&*self.cluster, region, &rule_fit.rule, store_id))
    }

    fn replace_rule_peer(
        &self,
        region: &Region,
        fit: &RegionFit,
        rule_fit: &RuleFit,
        peer: &Peer,
        desc: &'static str,
        stores: &[Store],
    ) -> Result<Operator, CheckError> {
        // A surplus learner means an earlier replacement already added one
        // and timed out before removing the old peer. Re-adding would grow
        // the peer set without bound, so drain the surplus first.
        if let Some(orphan) = fit.orphan_peers.iter().find(|p| p.is_learner()) {
            return create_remove_peer_operator(
                REMOVE_ORPHAN_PEER,
                &*self.cluster,
                region,
                orphan.store_id,
                PriorityLevel::Normal,
            )
            .ok_or(CheckError::NoNewLeader);
        }

        let co_located = rule_fit_stores(rule_fit, stores);
        let strategy = ReplicaStrategy::new(&*self.cluster, region, &rule_fit.rule);
        let Some(new_store) = strategy.select_store_to_replace(&co_located, peer.store_id) else {
            self.report_isolation_veto(
                region,
                &rule_fit.rule,
                &strategy,
                &co_located,
                Some(peer.store_id),
            );
            return Err(CheckError::NoStoreToReplace { peer_id: peer.id });
        };
        create_replace_peer_operator(
            desc,
            &*self.cluster,
            region,
            &rule_fit.rule,
            peer.store_id,
            new_store,
            PriorityLevel::High,
        )
        .ok_or(CheckError::NoNewLeader)
    }

    /// Fixes a claimed peer whose role disagrees with its rule.
    fn fix_loose_match_peer(
        &self,
        region: &Region,
        fit: &RegionFit,
        rule_fit: &RuleFit,
        peer: &Peer,
    ) -> Result<Option<Operator>, CheckError> {
        if peer.is_learner() && rule_fit.rule.role != RuleRole::Learner {
            return Ok(Some(create_promote_learner_operator(
                FIX_PEER_ROLE,
                region,
                peer.store_id,
                peer.id,
            )));
        }
        if rule_fit.rule.role == RuleRole::Leader && !region.is_leader(peer.id) {
            if !self.allow_leader(fit, peer) {
                return Err(CheckError::PeerCannotBeLeader { peer_id: peer.id });
            }
            let from = region.leader_store().ok_or(CheckError::NoNewLeader)?;
            return Ok(Some(create_transfer_leader_operator(
                FIX_LEADER_ROLE,
                region,
                from,
                peer.store_id,
            )));
        }
        if rule_fit.rule.role == RuleRole::Follower && region.is_leader(peer.id) {
            let mut others: Vec<&Peer> =
                region.peers.iter().filter(|p| p.id != peer.id).collect();
            others.sort_by_key(|p| p.store_id);
            for candidate in others {
                if self.allow_leader(fit, candidate) {
                    return Ok(Some(create_transfer_leader_operator(
                        FIX_FOLLOWER_ROLE,
                        region,
                        peer.store_id,
                        candidate.store_id,
                    )));
                }
            }
            return Err(CheckError::NoNewLeader);
        }
        Ok(None)
    }

    /// Whether the peer may take leadership: a confirmed voter on a healthy,
    /// not-busy store that some leadable rule's constraints accept.
    fn allow_leader(&self, fit: &RegionFit, peer: &Peer) -> bool {
        if peer.is_learner() {
            return false;
        }
        let Some(store) = self.cluster.store(peer.store_id) else {
            return false;
        };
        if check_leader_target(&store).is_err() {
            return false;
        }
        fit.rule_fits.iter().any(|rf| {
            rf.rule.role.can_lead()
                && rf.rule.label_constraints.iter().all(|c| c.matches(&store))
        })
    }

    fn fix_better_location(
        &self,
        region: &Region,
        rule_fit: &RuleFit,
        stores: &[Store],
    ) -> Option<Operator> {
        if rule_fit.rule.location_labels.is_empty() || rule_fit.rule.count <= 1 {
            return None;
        }
        let co_located = rule_fit_stores(rule_fit, stores);
        let strategy = ReplicaStrategy::new(&*self.cluster, region, &rule_fit.rule);
        let old_store = strategy.select_store_to_remove(&co_located)?;
        let new_store = strategy.select_store_to_improve(&co_located, old_store)?;
        debug!(region_id = region.id, old_store, new_store, "moving peer to better location");
        create_replace_peer_operator(
            MOVE_TO_BETTER_LOCATION,
            &*self.cluster,
            region,
            &rule_fit.rule,
            old_store,
            new_store,
            PriorityLevel::Normal,
        )
    }

    /// Removes one orphan peer, but only when every rule is fully satisfied
    /// and none of its claimed peers is pending: an orphan may be the last
    /// thing standing between the region and quorum loss.
    fn fix_orphan_peers(&self, region: &Region, fit: &RegionFit) -> Option<Operator> {
        if fit.orphan_peers.is_empty() {
            return None;
        }
        for rule_fit in &fit.rule_fits {
            let blocked = !rule_fit.is_satisfied()
                || rule_fit.peers.iter().any(|p| region.is_pending(p.id));
            if blocked {
                counter!("regent_checker_skip_remove_orphan_total").increment(1);
                return None;
            }
        }
        let orphan = fit.orphan_peers.first()?;
        create_remove_peer_operator(
            REMOVE_ORPHAN_PEER,
            &*self.cluster,
            region,
            orphan.store_id,
            PriorityLevel::Normal,
        )
    }

    /// A peer is treated as down once its outage passes the configured
    /// threshold and its store is unreachable.
    fn is_down_peer(&self, region: &Region, peer: &Peer) -> bool {
        let Some(seconds) = region.down_seconds(peer.id) else {
            return false;
        };
        if seconds < self.config.max_store_down_time.as_secs() {
            return false;
        }
        match self.cluster.store(peer.store_id) {
            Some(store) => store.is_unreachable(),
            None => {
                debug!(region_id = region.id, store_id = peer.store_id,
                       "down peer references a missing store");
                false
            }
        }
    }

    fn is_offline_peer(&self, peer: &Peer) -> bool {
        match self.cluster.store(peer.store_id) {
            Some(store) => store.is_removing(),
            None => {
                debug!(store_id = peer.store_id, "peer references a missing store");
                false
            }
        }
    }

    /// Emits the diagnostic event for a repair suppressed by an isolation
    /// level: the region stays broken on purpose and external remediation
    /// (new stores in the right failure domain) is required.
    fn report_isolation_veto(
        &self,
        region: &Region,
        rule: &Rule,
        strategy: &ReplicaStrategy<'_>,
        co_located: &[Store],
        old_store: Option<u64>,
    ) {
        if strategy.blocked_by_isolation(co_located, old_store) {
            counter!("regent_checker_isolation_veto_total").increment(1);
            warn!(region_id = region.id, group = %rule.group_id, rule = %rule.id,
                  level = rule.isolation_level.as_deref().unwrap_or(""),
                  "repair suppressed by isolation level");
        }
    }
}

/// Stores hosting the rule fit's claimed peers, in peer order.
fn rule_fit_stores(rule_fit: &RuleFit, stores: &[Store]) -> Vec<Store> {
    rule_fit
        .peers
        .iter()
        .filter_map(|p| stores.iter().find(|s| s.id == p.store_id))
        .cloned()
        .collect()
}

fn fingerprint<T: Hash>(value: &T) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Fingerprints the inputs a decision depends on: the region snapshot plus
/// the health and busy bits of every store. Store health is included because
/// a store going offline must invalidate a cached "nothing to do".
fn snapshot_fingerprint(region: &Region, stores: &[Store]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    region.hash(&mut hasher);
    for store in stores {
        (store.id, store.state, store.busy).hash(&mut hasher);
    }
    hasher.finish()
}
