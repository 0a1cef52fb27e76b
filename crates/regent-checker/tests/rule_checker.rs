//! End-to-end scenarios for the rule checker: one region, one rule set, one
//! expected operator (or none) per check.

use std::sync::Arc;

use regent_checker::{
    CheckerConfig, OpKind, OpStep, Operator, PriorityLevel, RuleChecker, ADD_RULE_PEER,
    FIX_FOLLOWER_ROLE, FIX_LEADER_ROLE, FIX_PEER_ROLE, MOVE_TO_BETTER_LOCATION,
    REMOVE_ORPHAN_PEER, REPLACE_RULE_DOWN_PEER, REPLACE_RULE_OFFLINE_PEER,
};
use regent_core::{Cluster, DownPeer, MemoryCluster, Peer, PeerRole, Region};
use regent_placement::{
    LabelConstraint, Rule, RuleManager, RuleRole, DEFAULT_GROUP_ID, DEFAULT_RULE_ID,
};

struct Suite {
    cluster: Arc<MemoryCluster>,
    rules: Arc<RuleManager>,
    checker: RuleChecker,
}

fn suite() -> Suite {
    let cluster = Arc::new(MemoryCluster::new());
    let rules = Arc::new(RuleManager::new(Arc::clone(&cluster) as Arc<dyn Cluster>, 3));
    let checker = RuleChecker::new(
        Arc::clone(&cluster) as Arc<dyn Cluster>,
        Arc::clone(&rules),
        CheckerConfig::default(),
    );
    Suite { cluster, rules, checker }
}

impl Suite {
    fn check(&self, region_id: u64) -> Option<Operator> {
        self.checker.check(&self.cluster.region(region_id).unwrap())
    }

    fn peer_id_on(&self, region_id: u64, store_id: u64) -> u64 {
        self.cluster.region(region_id).unwrap().peer_on_store(store_id).unwrap().id
    }
}

/// Asserts that `op` moves a peer from `from` to `to`.
fn assert_transfer_peer(op: &Operator, from: u64, to: u64) {
    assert!(op.kind.contains(OpKind::REGION));
    assert!(
        op.steps.iter().any(|s| matches!(s, OpStep::AddLearner { to_store, .. } if *to_store == to)),
        "expected a learner added on store {to}: {op}"
    );
    assert!(
        op.steps.iter().any(|s| matches!(s, OpStep::RemovePeer { from_store } if *from_store == from)),
        "expected the peer on store {from} removed: {op}"
    );
}

#[test]
fn test_split_at_rule_boundaries() {
    let s = suite();
    for id in 1..=3 {
        s.cluster.add_leader_store(id, 1);
    }
    s.rules
        .set_rule(
            Rule::new("test", "test", RuleRole::Voter, 1)
                .with_key_range_hex("aa", "ff")
                .unwrap(),
        )
        .unwrap();
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2, 3]);

    let op = s.check(1).unwrap();
    assert_eq!(op.len(), 1);
    let Some(OpStep::SplitRegion { split_keys }) = op.step(0) else {
        panic!("expected a split step, got {op}");
    };
    assert_eq!(hex::encode(&split_keys[0]), "aa");
    assert_eq!(hex::encode(&split_keys[1]), "ff");
}

#[test]
fn test_add_missing_rule_peer() {
    let s = suite();
    for id in 1..=3 {
        s.cluster.add_leader_store(id, 1);
    }
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2]);

    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), ADD_RULE_PEER);
    assert_eq!(op.priority_level(), PriorityLevel::High);
    assert!(matches!(op.step(0), Some(OpStep::AddLearner { to_store: 3, .. })));
}

#[test]
fn test_add_peer_respects_isolation_level() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("zone", "z1"), ("rack", "r1"), ("host", "h1")]);
    s.cluster.add_labels_store(2, 1, [("zone", "z1"), ("rack", "r1"), ("host", "h2")]);
    s.cluster.add_labels_store(3, 1, [("zone", "z1"), ("rack", "r2"), ("host", "h1")]);
    s.cluster.add_labels_store(4, 1, [("zone", "z1"), ("rack", "r3"), ("host", "h1")]);
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2]);

    let zone_isolated = Rule::new(DEFAULT_GROUP_ID, "test", RuleRole::Voter, 3)
        .with_index(100)
        .with_override()
        .with_location_labels(["zone", "rack", "host"])
        .with_isolation_level("zone");
    s.rules.set_rule(zone_isolated).unwrap();

    // every store sits in z1: adding anywhere would violate the level
    assert!(s.check(1).is_none());

    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[3]);
    let rack_isolated = Rule::new(DEFAULT_GROUP_ID, "test", RuleRole::Voter, 3)
        .with_index(100)
        .with_override()
        .with_location_labels(["zone", "rack", "host"])
        .with_isolation_level("rack");
    s.rules.set_rule(rack_isolated).unwrap();

    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), ADD_RULE_PEER);
    assert!(matches!(op.step(0), Some(OpStep::AddLearner { to_store: 4, .. })));
}

#[test]
fn test_replace_down_peer() {
    let s = suite();
    for id in 1..=4 {
        s.cluster.add_leader_store(id, 1);
    }
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2, 3]);
    assert!(s.check(1).is_none());

    s.cluster.set_store_down(2);
    let down_id = s.peer_id_on(1, 2);
    let region = s
        .cluster
        .region(1)
        .unwrap()
        .with_down_peers(vec![DownPeer { peer_id: down_id, down_seconds: 60_000 }]);

    let op = s.checker.check(&region).unwrap();
    assert_eq!(op.desc(), REPLACE_RULE_DOWN_PEER);
    assert_eq!(op.priority_level(), PriorityLevel::High);
    assert!(matches!(op.step(0), Some(OpStep::AddLearner { .. })));
}

#[test]
fn test_replace_offline_peer() {
    let s = suite();
    for id in 1..=4 {
        s.cluster.add_leader_store(id, 1);
    }
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2, 3]);
    assert!(s.check(1).is_none());

    s.cluster.set_store_offline(2);
    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), REPLACE_RULE_OFFLINE_PEER);
    assert_eq!(op.priority_level(), PriorityLevel::High);
    assert!(matches!(op.step(0), Some(OpStep::AddLearner { .. })));
}

#[test]
fn test_leader_replacement_avoids_pending_peers() {
    let s = suite();
    for id in 1..=4 {
        s.cluster.add_leader_store(id, 1);
    }
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2, 3]);

    // the leader's own store drains while the peer on store 3 is pending
    s.cluster.set_store_offline(1);
    let pending_id = s.peer_id_on(1, 3);
    let region = s.cluster.region(1).unwrap().with_pending_peers([pending_id]);
    s.cluster.put_region(region);

    let mut saw_early_transfer = false;
    for _ in 0..100 {
        let op = s.check(1).expect("an offline leader store always needs fixing");
        assert_eq!(op.desc(), REPLACE_RULE_OFFLINE_PEER);
        if let Some(OpStep::TransferLeader { from_store, to_store }) = op.step(0) {
            assert_eq!(*from_store, 1);
            assert_ne!(*to_store, 3, "leadership must never land on a pending peer");
            saw_early_transfer = true;
        }
    }
    assert!(saw_early_transfer, "the transfer target choice must vary across runs");
}

#[test]
fn test_remove_orphan_peer() {
    let s = suite();
    for id in 1..=4 {
        s.cluster.add_leader_store(id, 1);
    }
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2, 3, 4]);

    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), REMOVE_ORPHAN_PEER);
    assert!(matches!(op.step(0), Some(OpStep::RemovePeer { from_store: 4 })));
}

#[test]
fn test_orphans_kept_while_rules_unsatisfied() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("foo", "bar")]);
    s.cluster.add_labels_store(2, 1, [("foo", "bar")]);
    s.cluster.add_labels_store(3, 1, [("foo", "baz")]);
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[3]);

    let pinned = Rule::new(DEFAULT_GROUP_ID, "r1", RuleRole::Leader, 2)
        .with_index(100)
        .with_override()
        .with_constraints(vec![LabelConstraint::new_in("foo", ["baz"])]);
    s.rules.set_rule(pinned).unwrap();
    s.cluster.set_store_down(2);

    // the rule is under-filled with nowhere to grow; the orphan on store 1
    // must survive, it may be the only thing keeping quorum
    assert!(s.check(1).is_none());
}

#[test]
fn test_promote_learner_in_voter_slot() {
    let s = suite();
    for id in 1..=3 {
        s.cluster.add_leader_store(id, 1);
    }
    s.cluster.add_leader_region_with_range(1, b"", b"", 2, &[1, 3]);
    let learner_id = s.peer_id_on(1, 1);
    let region = s.cluster.region(1).unwrap().with_peer_role(learner_id, PeerRole::Learner);

    let op = s.checker.check(&region).unwrap();
    assert_eq!(op.desc(), FIX_PEER_ROLE);
    assert!(matches!(op.step(0), Some(OpStep::PromoteLearner { to_store: 1, .. })));
}

#[test]
fn test_transfer_leader_off_follower_slot() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("role", "follower")]);
    s.cluster.add_labels_store(2, 1, [("role", "follower")]);
    s.cluster.add_labels_store(3, 1, [("role", "voter")]);
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2, 3]);

    let voters = Rule::new(DEFAULT_GROUP_ID, "r1", RuleRole::Voter, 1)
        .with_index(100)
        .with_override()
        .with_constraints(vec![LabelConstraint::new_in("role", ["voter"])]);
    s.rules.set_rule(voters).unwrap();
    let followers = Rule::new(DEFAULT_GROUP_ID, "r2", RuleRole::Follower, 2)
        .with_index(101)
        .with_constraints(vec![LabelConstraint::new_in("role", ["follower"])]);
    s.rules.set_rule(followers).unwrap();

    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), FIX_FOLLOWER_ROLE);
    assert!(matches!(op.step(0), Some(OpStep::TransferLeader { to_store: 3, .. })));
}

#[test]
fn test_leader_pinned_by_label_and_busy_target() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("role", "follower")]);
    s.cluster.add_labels_store(2, 1, [("role", "leader")]);
    s.cluster.add_leader_region(1, 1, &[2]);

    let pinned = Rule::new(DEFAULT_GROUP_ID, "r1", RuleRole::Leader, 1)
        .with_index(100)
        .with_override()
        .with_constraints(vec![LabelConstraint::new_in("role", ["leader"])]);
    s.rules.set_rule(pinned).unwrap();

    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), FIX_LEADER_ROLE);
    assert!(matches!(op.step(0), Some(OpStep::TransferLeader { to_store: 2, .. })));

    // a busy target is never chosen; better to do nothing
    s.cluster.set_store_busy(2, true);
    assert!(s.check(1).is_none());
    s.cluster.set_store_busy(2, false);

    // once the leader sits where the rule wants it, the unclaimed peer goes
    s.cluster.add_leader_region(1, 2, &[1]);
    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), REMOVE_ORPHAN_PEER);
    assert!(matches!(op.step(0), Some(OpStep::RemovePeer { from_store: 1 })));
}

#[test]
fn test_move_to_better_location() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("host", "host1")]);
    s.cluster.add_labels_store(2, 1, [("host", "host1")]);
    s.cluster.add_labels_store(3, 1, [("host", "host2")]);
    s.cluster.add_labels_store(4, 1, [("host", "host3")]);
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2, 3]);

    let rule = Rule::new(DEFAULT_GROUP_ID, "test", RuleRole::Voter, 3)
        .with_index(100)
        .with_override()
        .with_location_labels(["host"]);
    s.rules.set_rule(rule).unwrap();

    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), MOVE_TO_BETTER_LOCATION);
    assert_eq!(op.priority_level(), PriorityLevel::Normal);
    assert!(matches!(op.step(0), Some(OpStep::AddLearner { to_store: 4, .. })));

    // once spread across three hosts nothing strictly better exists
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[3, 4]);
    assert!(s.check(1).is_none());
}

#[test]
fn test_move_to_better_location_two_levels() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("zone", "z1"), ("host", "host1")]);
    s.cluster.add_labels_store(2, 1, [("zone", "z1"), ("host", "host2")]);
    s.cluster.add_labels_store(3, 1, [("zone", "z1"), ("host", "host3")]);
    s.cluster.add_labels_store(4, 1, [("zone", "z2"), ("host", "host1")]);
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2, 3]);

    let rule = Rule::new(DEFAULT_GROUP_ID, "test", RuleRole::Voter, 3)
        .with_index(100)
        .with_override()
        .with_location_labels(["zone", "host"]);
    s.rules.set_rule(rule).unwrap();

    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), MOVE_TO_BETTER_LOCATION);
    assert!(matches!(op.step(0), Some(OpStep::AddLearner { to_store: 4, .. })));

    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[3, 4]);
    assert!(s.check(1).is_none());
}

#[test]
fn test_no_relocation_without_strict_gain() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("host", "host1")]);
    s.cluster.add_labels_store(2, 1, [("host", "host1")]);
    s.cluster.add_labels_store(3, 1, [("host", "host2")]);
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2, 3]);

    let rule = Rule::new(DEFAULT_GROUP_ID, "test", RuleRole::Voter, 3)
        .with_index(100)
        .with_override()
        .with_location_labels(["host"]);
    s.rules.set_rule(rule).unwrap();

    assert!(s.check(1).is_none());
}

#[test]
fn test_surplus_learner_drained_before_replacement() {
    let s = suite();
    for id in 1..=4 {
        s.cluster.add_leader_store(id, 1);
    }
    s.cluster.set_store_offline(3);
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2, 3]);
    let learner_id = s.cluster.alloc_peer_id();
    let region = s
        .cluster
        .region(1)
        .unwrap()
        .with_added_peer(Peer::new(learner_id, 4, PeerRole::Learner));

    // the stray learner blocks the replacement target; drain it first
    let op = s.checker.check(&region).unwrap();
    assert_eq!(op.desc(), REMOVE_ORPHAN_PEER);
    assert!(matches!(op.step(0), Some(OpStep::RemovePeer { from_store: 4 })));

    // with the learner gone the offline peer is replaced through store 4
    let region = region.with_removed_store_peer(4);
    let op = s.checker.check(&region).unwrap();
    assert_eq!(op.desc(), REPLACE_RULE_OFFLINE_PEER);
    assert!(matches!(op.step(0), Some(OpStep::AddLearner { to_store: 4, .. })));
    assert!(matches!(op.step(1), Some(OpStep::PromoteLearner { to_store: 4, .. })));
    assert!(matches!(op.step(2), Some(OpStep::RemovePeer { from_store: 3 })));
}

#[test]
fn test_timed_out_replacement_drains_orphan_before_readding() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("host", "host1")]);
    s.cluster.add_labels_store(2, 1, [("host", "host1")]);
    s.cluster.add_labels_store(3, 1, [("host", "host2")]);
    s.cluster.add_labels_store(4, 1, [("host", "host4")]);
    s.cluster.add_labels_store(5, 1, [("host", "host5")]);
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2, 3]);
    assert!(s.check(1).is_none());

    s.cluster.set_store_offline(2);
    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), REPLACE_RULE_OFFLINE_PEER);
    assert!(matches!(op.step(0), Some(OpStep::AddLearner { .. })));

    // simulate that replacement timing out after its add step: the learner
    // is in place, the old peer is not gone. Re-checking must not add yet
    // another learner.
    let learner_id = s.cluster.alloc_peer_id();
    let region = s
        .cluster
        .region(1)
        .unwrap()
        .with_added_peer(Peer::new(learner_id, 4, PeerRole::Learner));
    s.cluster.put_region(region);

    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), REMOVE_ORPHAN_PEER);
    assert!(matches!(op.step(0), Some(OpStep::RemovePeer { .. })));
}

#[test]
fn test_rules_keep_applying_after_store_deletion() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("host", "host1")]);
    s.cluster.add_labels_store(2, 1, [("host", "host1")]);
    s.cluster.add_labels_store(3, 1, [("host", "host2")]);
    s.cluster.add_labels_store(4, 1, [("host", "host4")]);
    s.cluster.add_labels_store(5, 1, [("host", "host5")]);
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2]);

    let pinned_follower = Rule::new("table-51", "0", RuleRole::Follower, 1)
        .with_constraints(vec![LabelConstraint::new_in("host", ["host5"])]);
    s.rules.set_rule(pinned_follower).unwrap();

    // validation is write-time only: deleting the matching store afterwards
    // does not retro-invalidate the rule
    s.cluster.delete_store(5).unwrap();
    s.rules.set_rule(Rule::new("table-51", "default", RuleRole::Voter, 3)).unwrap();
    s.rules.delete_rule(DEFAULT_GROUP_ID, DEFAULT_RULE_ID).unwrap();

    // the unfillable pinned rule is skipped; the voter rule still grows
    let op = s.check(1).unwrap();
    assert_eq!(op.desc(), ADD_RULE_PEER);
}

#[test]
fn test_rule_validation_against_store_population() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("host", "host1")]);
    s.cluster.add_labels_store(2, 1, [("dc", "sh")]);
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2]);

    let cases: Vec<(Vec<LabelConstraint>, bool)> = vec![
        // value present on no store
        (vec![LabelConstraint::new_in("host", ["host5"])], true),
        // key present on no store
        (vec![LabelConstraint::new_in("ho", ["sh"])], true),
        // contradictory in / not-in on the same key and value
        (
            vec![
                LabelConstraint::new_in("host", ["host1"]),
                LabelConstraint::new_not_in("host", ["host1"]),
            ],
            true,
        ),
        // two disjoint in-sets on the same key
        (
            vec![
                LabelConstraint::new_in("host", ["host1"]),
                LabelConstraint::new_in("host", ["host3"]),
            ],
            true,
        ),
        // a duplicated constraint is redundant, not contradictory
        (
            vec![
                LabelConstraint::new_in("host", ["host1"]),
                LabelConstraint::new_in("host", ["host1"]),
            ],
            false,
        ),
    ];

    for (constraints, expect_err) in cases {
        let rule = Rule::new("p", "0", RuleRole::Follower, 1).with_constraints(constraints);
        let result = s.rules.set_rule(rule);
        if expect_err {
            let err = result.unwrap_err();
            assert!(
                err.to_string().contains("can not match any store"),
                "unexpected error: {err}"
            );
        } else {
            result.unwrap();
        }
    }
}

#[test]
fn test_replace_down_peer_prefers_isolation_and_honours_level() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("zone", "z1")]);
    s.cluster.add_labels_store(2, 1, [("zone", "z1")]);
    s.cluster.add_labels_store(3, 1, [("zone", "z2")]);
    s.cluster.add_labels_store(4, 1, [("zone", "z3")]);
    s.cluster.add_labels_store(5, 1, [("zone", "z3")]);
    s.cluster.add_leader_region(1, 1, &[3, 4]);

    let rule = Rule::new(DEFAULT_GROUP_ID, "test", RuleRole::Voter, 3)
        .with_index(100)
        .with_override()
        .with_location_labels(["zone"]);
    s.rules.set_rule(rule.clone()).unwrap();
    assert!(s.check(1).is_none());

    s.cluster.set_store_down(4);
    let down_id = s.peer_id_on(1, 4);
    let region = s
        .cluster
        .region(1)
        .unwrap()
        .with_down_peers(vec![DownPeer { peer_id: down_id, down_seconds: 6_000 }]);

    // store 5 keeps three distinct zones; store 2 would collapse to two
    assert_transfer_peer(&s.checker.check(&region).unwrap(), 4, 5);

    s.cluster.set_store_down(5);
    assert_transfer_peer(&s.checker.check(&region).unwrap(), 4, 2);

    // the only remaining candidate shares z1: the level vetoes the repair
    s.rules.set_rule(rule.with_isolation_level("zone")).unwrap();
    assert!(s.checker.check(&region).is_none());
}

#[test]
fn test_replace_offline_peer_prefers_isolation_and_honours_level() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("zone", "z1")]);
    s.cluster.add_labels_store(2, 1, [("zone", "z1")]);
    s.cluster.add_labels_store(3, 1, [("zone", "z2")]);
    s.cluster.add_labels_store(4, 1, [("zone", "z3")]);
    s.cluster.add_labels_store(5, 1, [("zone", "z3")]);
    s.cluster.add_leader_region(1, 1, &[3, 4]);

    let rule = Rule::new(DEFAULT_GROUP_ID, "test", RuleRole::Voter, 3)
        .with_index(100)
        .with_override()
        .with_location_labels(["zone"]);
    s.rules.set_rule(rule.clone()).unwrap();
    let region = s.cluster.region(1).unwrap();
    assert!(s.checker.check(&region).is_none());

    s.cluster.set_store_offline(4);
    assert_transfer_peer(&s.checker.check(&region).unwrap(), 4, 5);

    s.cluster.set_store_offline(5);
    assert_transfer_peer(&s.checker.check(&region).unwrap(), 4, 2);

    s.rules.set_rule(rule.with_isolation_level("zone")).unwrap();
    assert!(s.checker.check(&region).is_none());
}

/// Applies an operator's steps to a region snapshot, the way the execution
/// engine eventually would.
fn apply(region: &Region, op: &Operator) -> Region {
    let mut region = region.clone();
    for step in &op.steps {
        match step {
            OpStep::AddLearner { to_store, peer_id } => {
                region = region.with_added_peer(Peer::new(*peer_id, *to_store, PeerRole::Learner));
            }
            OpStep::PromoteLearner { peer_id, .. } => {
                region = region.with_peer_role(*peer_id, PeerRole::Voter);
            }
            OpStep::RemovePeer { from_store } => {
                region = region.with_removed_store_peer(*from_store);
            }
            OpStep::TransferLeader { to_store, .. } => {
                region.leader = region.peer_on_store(*to_store).unwrap().id;
            }
            OpStep::SplitRegion { .. } => {}
        }
    }
    region
}

#[test]
fn test_checking_after_applying_converges() {
    let s = suite();
    s.cluster.add_labels_store(1, 1, [("host", "h1")]);
    s.cluster.add_labels_store(2, 1, [("host", "h1")]);
    s.cluster.add_labels_store(3, 1, [("host", "h2")]);
    s.cluster.add_labels_store(4, 1, [("host", "h3")]);
    s.cluster.add_labels_store(5, 1, [("host", "h3")]);

    let rule = Rule::new(DEFAULT_GROUP_ID, "spread", RuleRole::Voter, 3)
        .with_index(100)
        .with_override()
        .with_location_labels(["host"]);
    s.rules.set_rule(rule).unwrap();

    // start under-replicated and badly placed
    s.cluster.add_leader_region_with_range(1, b"", b"", 1, &[2]);
    let mut region = s.cluster.region(1).unwrap();

    let fit_score = |region: &Region| {
        let rules = s.rules.rules_for_region(&region.start_key, &region.end_key);
        regent_placement::fit_region(region, &s.cluster.stores(), &rules).total_score()
    };

    let mut steps = 0;
    let mut score = fit_score(&region);
    while let Some(op) = s.checker.check(&region) {
        region = apply(&region, &op);
        s.cluster.put_region(region.clone());
        steps += 1;
        assert!(steps < 10, "checker failed to converge: {op}");

        // each applied operator moves the placement monotonically closer
        let next = fit_score(&region);
        assert!(next >= score, "fit score regressed from {score} to {next} after {op}");
        score = next;
    }

    // converged: three voters over three distinct hosts, nothing left to do
    assert_eq!(region.peers.len(), 3);
    let hosts: std::collections::HashSet<String> = region
        .peers
        .iter()
        .map(|p| s.cluster.store(p.store_id).unwrap().label("host").unwrap().to_string())
        .collect();
    assert_eq!(hosts.len(), 3);
    assert!(s.checker.check(&region).is_none());
}
