//! The read-only cluster snapshot surface and an in-memory implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::peer::{Peer, PeerRole};
use crate::region::Region;
use crate::store::{Store, StoreState};

/// Read-only access to cluster state, as seen by the placement checker.
///
/// Implementations must hand out consistent snapshots: a `Store` or `Region`
/// value returned here is immutable for the duration of a check. The only
/// non-read operation is peer-id allocation, needed when an operator
/// introduces a new peer.
pub trait Cluster: Send + Sync {
    /// Returns a snapshot of every store in the cluster.
    fn stores(&self) -> Vec<Store>;

    /// Returns a snapshot of one store.
    fn store(&self, id: u64) -> Option<Store>;

    /// Returns a snapshot of one region.
    fn region(&self, id: u64) -> Option<Region>;

    /// Allocates a fresh, cluster-unique peer id.
    fn alloc_peer_id(&self) -> u64;
}

/// An in-memory [`Cluster`] backed by concurrent maps.
///
/// This is the canonical cluster container for embedding and for tests; the
/// mutators mirror the operations a membership layer performs (stores joining,
/// going down, being drained) so scenarios can be staged directly.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    stores: DashMap<u64, Store>,
    regions: DashMap<u64, Region>,
    next_id: AtomicU64,
}

impl MemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self { stores: DashMap::new(), regions: DashMap::new(), next_id: AtomicU64::new(1) }
    }

    /// Inserts or replaces a store snapshot.
    pub fn put_store(&self, store: Store) {
        self.stores.insert(store.id, store);
    }

    /// Adds a healthy, unlabelled store with the given leader count.
    pub fn add_leader_store(&self, id: u64, leader_count: u64) {
        self.put_store(Store::new(id).with_leader_count(leader_count));
    }

    /// Adds a healthy store with topology labels and the given region count.
    pub fn add_labels_store<'a>(
        &self,
        id: u64,
        region_count: u64,
        labels: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        self.put_store(Store::new(id).with_labels(labels).with_region_count(region_count));
    }

    /// Inserts or replaces a region snapshot.
    pub fn put_region(&self, region: Region) {
        self.regions.insert(region.id, region);
    }

    /// Creates a region covering the whole keyspace with a leader on
    /// `leader_store` and followers on `follower_stores`. Peer ids are
    /// freshly allocated.
    pub fn add_leader_region(&self, id: u64, leader_store: u64, follower_stores: &[u64]) {
        self.add_leader_region_with_range(id, b"", b"", leader_store, follower_stores);
    }

    /// Like [`add_leader_region`](Self::add_leader_region) with an explicit
    /// key range.
    pub fn add_leader_region_with_range(
        &self,
        id: u64,
        start: &[u8],
        end: &[u8],
        leader_store: u64,
        follower_stores: &[u64],
    ) {
        let mut peers = vec![Peer::new(self.alloc_peer_id(), leader_store, PeerRole::Leader)];
        for &store in follower_stores {
            peers.push(Peer::new(self.alloc_peer_id(), store, PeerRole::Follower));
        }
        self.put_region(Region::new(id, peers).with_key_range(start, end));
    }

    /// Marks a store down.
    pub fn set_store_down(&self, id: u64) {
        self.set_store_state(id, StoreState::Down);
    }

    /// Marks a store as draining.
    pub fn set_store_offline(&self, id: u64) {
        self.set_store_state(id, StoreState::Offline);
    }

    /// Marks a store healthy again.
    pub fn set_store_up(&self, id: u64) {
        self.set_store_state(id, StoreState::Up);
    }

    /// Sets or clears a store's busy flag.
    pub fn set_store_busy(&self, id: u64, busy: bool) {
        if let Some(mut store) = self.stores.get_mut(&id) {
            store.busy = busy;
        }
    }

    /// Removes a store entirely.
    pub fn delete_store(&self, id: u64) -> Result<()> {
        self.stores.remove(&id).map(|_| ()).ok_or(Error::StoreNotFound(id))
    }

    fn set_store_state(&self, id: u64, state: StoreState) {
        if let Some(mut store) = self.stores.get_mut(&id) {
            store.state = state;
        }
    }
}

impl Cluster for MemoryCluster {
    fn stores(&self) -> Vec<Store> {
        let mut stores: Vec<Store> = self.stores.iter().map(|e| e.value().clone()).collect();
        stores.sort_by_key(|s| s.id);
        stores
    }

    fn store(&self, id: u64) -> Option<Store> {
        self.stores.get(&id).map(|e| e.value().clone())
    }

    fn region(&self, id: u64) -> Option<Region> {
        self.regions.get(&id).map(|e| e.value().clone())
    }

    fn alloc_peer_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_lifecycle() {
        let cluster = MemoryCluster::new();
        cluster.add_leader_store(1, 5);
        cluster.add_labels_store(2, 3, [("zone", "z1")]);

        assert_eq!(cluster.stores().len(), 2);
        assert_eq!(cluster.store(1).unwrap().leader_count, 5);
        assert_eq!(cluster.store(2).unwrap().label("zone"), Some("z1"));

        cluster.set_store_down(1);
        assert_eq!(cluster.store(1).unwrap().state, StoreState::Down);
        cluster.set_store_offline(1);
        assert!(cluster.store(1).unwrap().is_removing());
        cluster.set_store_up(1);
        assert!(cluster.store(1).unwrap().is_up());

        cluster.set_store_busy(2, true);
        assert!(cluster.store(2).unwrap().busy);

        cluster.delete_store(2).unwrap();
        assert!(cluster.store(2).is_none());
        assert!(cluster.delete_store(2).is_err());
    }

    #[test]
    fn test_region_creation() {
        let cluster = MemoryCluster::new();
        cluster.add_leader_region(1, 1, &[2, 3]);

        let region = cluster.region(1).unwrap();
        assert_eq!(region.peers.len(), 3);
        assert_eq!(region.leader_store(), Some(1));
        assert_eq!(region.store_ids(), vec![1, 2, 3]);
        assert!(region.start_key.is_empty() && region.end_key.is_empty());
    }

    #[test]
    fn test_peer_ids_unique() {
        let cluster = MemoryCluster::new();
        cluster.add_leader_region(1, 1, &[2]);
        cluster.add_leader_region(2, 2, &[1]);

        let mut ids: Vec<u64> = cluster
            .region(1)
            .unwrap()
            .peers
            .iter()
            .chain(cluster.region(2).unwrap().peers.iter())
            .map(|p| p.id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_stores_sorted_by_id() {
        let cluster = MemoryCluster::new();
        for id in [5, 1, 3] {
            cluster.add_leader_store(id, 0);
        }
        let ids: Vec<u64> = cluster.stores().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }
}
