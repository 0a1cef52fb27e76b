//! Isolation scoring against topology labels.
//!
//! Location labels order the topology from most to least significant (e.g.
//! `zone > rack > host`). A placement scores higher the earlier its replicas
//! diverge: two replicas in different zones are worth more than two replicas
//! that only sit on different hosts of the same rack.

use regent_core::Store;

/// Weight multiplier between adjacent location levels.
///
/// A pair differing at level `i` of `n` labels contributes
/// `BASE^(n - i - 1)`, so one cross-zone pair outweighs any number of
/// realistic cross-host pairs.
pub const REPLICA_BASE_SCORE: u64 = 100;

/// Returns the index of the first location label at which the two stores
/// provably differ, or `None` when they are co-located.
///
/// A store missing a label is considered co-located at that level with every
/// other store.
#[must_use]
pub fn compare_location(a: &Store, b: &Store, labels: &[String]) -> Option<usize> {
    labels.iter().position(|key| match (a.label(key), b.label(key)) {
        (Some(va), Some(vb)) => va != vb,
        _ => false,
    })
}

fn pair_score(a: &Store, b: &Store, labels: &[String]) -> u64 {
    match compare_location(a, b, labels) {
        Some(idx) => REPLICA_BASE_SCORE.pow((labels.len() - idx - 1) as u32),
        None => 0,
    }
}

/// Scores a whole placement: the sum of pairwise scores over all stores.
///
/// Zero for fewer than two stores or an empty label list. Higher is better
/// isolated.
#[must_use]
pub fn isolation_score(stores: &[&Store], labels: &[String]) -> u64 {
    if labels.is_empty() || stores.len() < 2 {
        return 0;
    }
    let mut score = 0;
    for (i, a) in stores.iter().enumerate() {
        for b in &stores[i + 1..] {
            score += pair_score(a, b, labels);
        }
    }
    score
}

/// Scores how distinct `candidate` is from an existing placement: the sum of
/// its pairwise scores against every existing store (the candidate's marginal
/// contribution to [`isolation_score`]).
#[must_use]
pub fn distinct_score(existing: &[&Store], candidate: &Store, labels: &[String]) -> u64 {
    existing
        .iter()
        .filter(|s| s.id != candidate.id)
        .map(|s| pair_score(s, candidate, labels))
        .sum()
}

/// Whether adding `candidate` to `existing` keeps every pair separated at or
/// above `level` (one of `labels`).
///
/// An unknown level rejects nothing; validation happens at rule-write time.
#[must_use]
pub fn satisfies_isolation_level(
    existing: &[&Store],
    candidate: &Store,
    labels: &[String],
    level: &str,
) -> bool {
    let Some(level_idx) = labels.iter().position(|l| l == level) else {
        return true;
    };
    existing
        .iter()
        .filter(|s| s.id != candidate.id)
        .all(|s| matches!(compare_location(s, candidate, labels), Some(idx) if idx <= level_idx))
}
