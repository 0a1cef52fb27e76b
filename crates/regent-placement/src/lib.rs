//! Placement rules for the Regent control plane.
//!
//! Rules declare how many replicas of each role a key range should have and
//! where they may live. This crate provides:
//! - The [`Rule`] model with label constraints and location labels
//! - The [`RuleManager`]: validated storage, override resolution and
//!   split-key computation
//! - The isolation scorer comparing placements against topology labels
//! - The rule fitter, mapping a region's peers onto its resolved rules
//!
//! # Overview
//!
//! ```text
//!  rules (ordered, overridable)     region peers
//!          │                             │
//!          ▼                             ▼
//!   RuleManager::rules_for_region ──▶ fit_region ──▶ RegionFit
//!                                                      ├─ RuleFit per rule
//!                                                      └─ orphan peers
//! ```
//!
//! The fit is the input to the checker's decision pipeline; it never mutates
//! anything itself.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fit;
pub mod manager;
pub mod rule;
pub mod score;

pub use fit::{fit_region, RegionFit, RuleFit};
pub use manager::{RuleError, RuleManager, DEFAULT_GROUP_ID, DEFAULT_RULE_ID};
pub use rule::{matches_label_constraints, ranges_overlap, LabelConstraint, LabelOp, Rule, RuleRole};
pub use score::{compare_location, distinct_score, isolation_score, satisfies_isolation_level};
