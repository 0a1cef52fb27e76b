//! The Regent rule checker: inspects one region at a time and emits at most
//! one operator moving it toward compliance with the placement rules.
//!
//! # Architecture
//!
//! ```text
//!                ┌───────────────┐   rules for range   ┌─────────────┐
//!  Region ──────▶│  RuleChecker  │◀────────────────────│ RuleManager │
//!                │               │                     └─────────────┘
//!                │  no-op cache  │   store snapshots   ┌─────────────┐
//!                │  fit ▸ pipeline│◀───────────────────│   Cluster   │
//!                └───────┬───────┘                     └─────────────┘
//!                        │
//!                        ▼
//!              Operator (steps, priority) ──▶ execution engine
//! ```
//!
//! The checker never applies operators, never persists anything and never
//! fails its caller: every collaborator error degrades to "no operator"
//! after the observability hooks fire.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checker;
pub mod config;
pub mod filter;
pub mod operator;
pub mod strategy;

pub use checker::{CheckError, RuleChecker};
pub use config::CheckerConfig;
pub use filter::{check_add_target, check_leader_target, RejectReason};
pub use operator::{
    create_add_peer_operator, create_promote_learner_operator, create_remove_peer_operator,
    create_replace_peer_operator, create_split_operator, create_transfer_leader_operator, OpKind,
    OpStep, Operator,
    PriorityLevel, ADD_RULE_PEER, FIX_FOLLOWER_ROLE, FIX_LEADER_ROLE, FIX_PEER_ROLE,
    MOVE_TO_BETTER_LOCATION, REMOVE_ORPHAN_PEER, REPLACE_RULE_DOWN_PEER,
    REPLACE_RULE_OFFLINE_PEER, RULE_SPLIT_REGION,
};
pub use strategy::ReplicaStrategy;
