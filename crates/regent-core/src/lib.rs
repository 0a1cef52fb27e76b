//! Core cluster data model for Regent, a placement control plane for a
//! distributed key-value store.
//!
//! This crate provides:
//! - Snapshot types for stores, peers and regions
//! - The read-only [`Cluster`] trait and an in-memory [`MemoryCluster`]
//! - A bounded, TTL'd cache used to suppress repeated no-op checks
//! - Cooperative cancellation via [`CancelFlag`]
//!
//! Everything here is a *snapshot*: the placement checker reads a consistent
//! view of the cluster and never mutates it. Ownership of stores and regions
//! stays with the cluster; the checker only borrows.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod cancel;
pub mod cluster;
pub mod error;
pub mod peer;
pub mod region;
pub mod store;

pub use cache::{CheckCache, NoopKey};
pub use cancel::CancelFlag;
pub use cluster::{Cluster, MemoryCluster};
pub use error::{Error, Result};
pub use peer::{Peer, PeerRole};
pub use region::{DownPeer, Region};
pub use store::{Store, StoreState, ENGINE_LABEL_KEY};
