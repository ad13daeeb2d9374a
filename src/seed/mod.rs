//! Seed Node Selection
//!
//! Places the cluster's seed quorum across fault and upgrade domains and
//! keeps it stable as the topology changes.

pub mod config;
pub mod selector;

pub use config::{ReliabilityLevel, SeedSelectionConfig, SeedSelectionStrategy};
pub use selector::{SeedNodeSelector, SeedNodeSet, MIN_SEED_QUORUM};
