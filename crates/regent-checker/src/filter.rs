//! Store eligibility filters for operator destinations.
//!
//! Filters are pure functions over the snapshot. A rejected store comes with
//! a structured reason so callers can count and log why candidates were
//! discarded.

use std::fmt;

use regent_core::{Region, Store, ENGINE_LABEL_KEY};
use regent_placement::{matches_label_constraints, LabelOp, Rule};

/// Why a store was rejected as an operator destination.
///
/// Checks run in this order; the first failure wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The store is not up (draining, removed, down or disconnected).
    Health,
    /// The store reported itself overloaded.
    Busy,
    /// The store's engine class does not match what the rule targets.
    EngineMismatch,
    /// The store fails the rule's label constraints.
    LabelMismatch,
    /// The store already hosts a peer of this region.
    AlreadyHasPeer,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Health => "unhealthy",
            Self::Busy => "busy",
            Self::EngineMismatch => "engine mismatch",
            Self::LabelMismatch => "label mismatch",
            Self::AlreadyHasPeer => "already hosts a peer",
        };
        f.write_str(reason)
    }
}

/// Whether `store` may receive a new peer of `region` under `rule`.
///
/// # Errors
///
/// Returns the first failing check.
pub fn check_add_target(store: &Store, rule: &Rule, region: &Region) -> Result<(), RejectReason> {
    if !store.is_up() {
        return Err(RejectReason::Health);
    }
    if store.busy {
        return Err(RejectReason::Busy);
    }
    if !engine_allowed(store, rule) {
        return Err(RejectReason::EngineMismatch);
    }
    if !matches_label_constraints(store, &rule.label_constraints) {
        return Err(RejectReason::LabelMismatch);
    }
    if region.peer_on_store(store.id).is_some() {
        return Err(RejectReason::AlreadyHasPeer);
    }
    Ok(())
}

/// Whether `store` may receive leadership.
///
/// # Errors
///
/// Returns the first failing check.
pub fn check_leader_target(store: &Store) -> Result<(), RejectReason> {
    if !store.is_up() {
        return Err(RejectReason::Health);
    }
    if store.busy {
        return Err(RejectReason::Busy);
    }
    Ok(())
}

/// Stores carrying an `engine` label belong to a special engine class and
/// only serve rules that name that class explicitly; plain stores serve any
/// rule.
fn engine_allowed(store: &Store, rule: &Rule) -> bool {
    let Some(engine) = store.engine() else {
        return true;
    };
    rule.label_constraints.iter().any(|c| {
        c.key == ENGINE_LABEL_KEY && c.op == LabelOp::In && c.values.iter().any(|v| v == engine)
    })
}
