//! Cluster Manifest
//!
//! The versioned manifest the cluster runtime consumes, how versions are
//! issued and compared, and the builder that produces manifests from a
//! topology and configuration snapshot.

pub mod builder;
pub mod model;
pub mod version;

pub use builder::ClusterManifestBuilder;
pub use model::{ClusterManifest, ManifestNode, ManifestVersion, NodeEndpoints, UpgradeKind};
pub use version::{ManifestDiff, MonotonicVersionGenerator, VersionGenerator};
