//! A bounded cache of no-op markers used to short-circuit repeated checks.
//!
//! The checker records "this exact snapshot needed no operator" keyed by
//! region id plus fingerprints of the resolved rules and the peer/store
//! state. The cache is advisory: an eviction or an expired entry only costs
//! a recomputation, never a wrong operator.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

/// Key identifying one no-op check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoopKey {
    /// The checked region.
    pub region_id: u64,
    /// Fingerprint of the rule list resolved for the region's range.
    pub rule_fingerprint: u64,
    /// Fingerprint of the region's peer set and the relevant store state.
    pub snapshot_fingerprint: u64,
}

/// Thread-safe bounded cache of no-op markers with per-entry TTL.
///
/// All operations take a single lock; the critical section is pure in-memory
/// map work.
pub struct CheckCache {
    ttl: Duration,
    inner: Mutex<LruCache<NoopKey, Instant>>,
}

impl CheckCache {
    /// Creates a cache holding at most `capacity` markers, each valid for
    /// `ttl` after insertion. The capacity is clamped to at least one entry.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { ttl, inner: Mutex::new(LruCache::new(capacity)) }
    }

    /// Records that the snapshot identified by `key` required no operator.
    pub fn insert_noop(&self, key: NoopKey) {
        self.inner.lock().put(key, Instant::now());
        trace!(region_id = key.region_id, "recorded no-op marker");
    }

    /// Whether a live no-op marker exists for `key`. Expired markers are
    /// dropped on lookup.
    pub fn is_noop(&self, key: &NoopKey) -> bool {
        let mut inner = self.inner.lock();
        let live = match inner.get(key) {
            Some(at) => at.elapsed() < self.ttl,
            None => return false,
        };
        if !live {
            inner.pop(key);
        }
        live
    }

    /// Number of live and expired markers currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache holds no markers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every marker.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}
