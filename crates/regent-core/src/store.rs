//! Store snapshots: cluster members that host region peers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The label key that marks a store as belonging to a special engine class.
pub const ENGINE_LABEL_KEY: &str = "engine";

/// Lifecycle and health state of a store.
///
/// Transitions are driven externally (by the membership layer); the checker
/// only reads the state from snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreState {
    /// Healthy and serving.
    Up,
    /// Being drained; its peers must move elsewhere.
    Offline,
    /// Fully removed; only kept for bookkeeping.
    Tombstone,
    /// Has missed heartbeats past the failure threshold.
    Down,
    /// Temporarily unreachable but not yet considered failed.
    Disconnected,
}

/// A snapshot of one cluster store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    /// Store id, unique within the cluster.
    pub id: u64,
    /// Topology and capability labels (e.g. `zone`, `rack`, `host`, `engine`).
    pub labels: HashMap<String, String>,
    /// Current health state.
    pub state: StoreState,
    /// Whether the store reported itself as overloaded.
    pub busy: bool,
    /// Number of region peers hosted on this store.
    pub region_count: u64,
    /// Number of region leaders hosted on this store.
    pub leader_count: u64,
}

impl Store {
    /// Creates a healthy store with no labels.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            labels: HashMap::new(),
            state: StoreState::Up,
            busy: false,
            region_count: 0,
            leader_count: 0,
        }
    }

    /// Sets the store labels.
    #[must_use]
    pub fn with_labels<K, V>(mut self, labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.labels = labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Sets the health state.
    #[must_use]
    pub fn with_state(mut self, state: StoreState) -> Self {
        self.state = state;
        self
    }

    /// Sets the region count.
    #[must_use]
    pub fn with_region_count(mut self, count: u64) -> Self {
        self.region_count = count;
        self
    }

    /// Sets the leader count.
    #[must_use]
    pub fn with_leader_count(mut self, count: u64) -> Self {
        self.leader_count = count;
        self
    }

    /// Returns the value of a label, if set.
    #[must_use]
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Returns the engine class of this store, if it carries one.
    #[must_use]
    pub fn engine(&self) -> Option<&str> {
        self.label(ENGINE_LABEL_KEY)
    }

    /// Whether the store is healthy and serving.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.state == StoreState::Up
    }

    /// Whether the store is being removed from the cluster.
    #[must_use]
    pub fn is_removing(&self) -> bool {
        matches!(self.state, StoreState::Offline | StoreState::Tombstone)
    }

    /// Whether the store cannot currently be reached.
    #[must_use]
    pub fn is_unreachable(&self) -> bool {
        matches!(self.state, StoreState::Down | StoreState::Disconnected)
    }
}
