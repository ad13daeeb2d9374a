//! Topology Model
//!
//! Immutable view of the nodes a manifest is generated for: their fault and
//! upgrade domains and their roles.

pub mod cluster;
pub mod node;

pub use cluster::ClusterTopology;
pub use node::{DomainPath, NodeDescription, NodeRole};
