//! The versioned cluster manifest and its parts

use crate::cluster_config::NodeState;
use crate::seed::SeedNodeSet;
use crate::settings::{ParameterChange, Settings};
use crate::topology::{DomainPath, NodeRole};
use crate::upgrade::ClusterUpgradePolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Manifest version; strictly increasing across published manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestVersion(u64);

impl ManifestVersion {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ManifestVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ports a node listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeEndpoints {
    pub client_connection: u16,
    pub http_gateway: u16,
    pub cluster_connection: u16,
    pub lease_driver: u16,
}

impl Default for NodeEndpoints {
    fn default() -> Self {
        Self {
            client_connection: 19000,
            http_gateway: 19080,
            cluster_connection: 19001,
            lease_driver: 19002,
        }
    }
}

/// A node as published in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestNode {
    pub name: String,
    pub address: String,
    pub node_type: String,
    pub fault_domain: DomainPath,
    pub upgrade_domain: DomainPath,
    pub role: NodeRole,
    pub state: NodeState,
    pub is_seed: bool,
    pub endpoints: NodeEndpoints,
}

/// How disruptive the move from the prior manifest is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UpgradeKind {
    /// Nothing to roll out
    #[default]
    None,
    /// Only dynamic settings changed; pushed in place
    SettingsOnly,
    /// Needs a rolling upgrade across every upgrade domain
    Full,
}

/// Immutable, versioned cluster manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterManifest {
    pub(crate) cluster_name: String,
    pub(crate) version: ManifestVersion,
    pub(crate) code_version: String,
    pub(crate) settings: Settings,
    pub(crate) nodes: BTreeMap<String, ManifestNode>,
    pub(crate) seed_nodes: SeedNodeSet,
    pub(crate) upgrade_policy: ClusterUpgradePolicy,
    pub(crate) override_upgrade_policy: Option<ClusterUpgradePolicy>,
    pub(crate) node_config_version: u64,
    /// Parameter changes relative to the prior manifest, rejected ones included
    pub(crate) changes: Vec<ParameterChange>,
    pub(crate) upgrade_kind: UpgradeKind,
}

impl ClusterManifest {
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn version(&self) -> ManifestVersion {
        self.version
    }

    pub fn code_version(&self) -> &str {
        &self.code_version
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ManifestNode> {
        self.nodes.values()
    }

    pub fn node(&self, name: &str) -> Option<&ManifestNode> {
        self.nodes.get(name)
    }

    pub fn seed_nodes(&self) -> &SeedNodeSet {
        &self.seed_nodes
    }

    pub fn upgrade_policy(&self) -> &ClusterUpgradePolicy {
        &self.upgrade_policy
    }

    pub fn override_upgrade_policy(&self) -> Option<&ClusterUpgradePolicy> {
        self.override_upgrade_policy.as_ref()
    }

    pub fn node_config_version(&self) -> u64 {
        self.node_config_version
    }

    pub fn changes(&self) -> &[ParameterChange] {
        &self.changes
    }

    pub fn upgrade_kind(&self) -> UpgradeKind {
        self.upgrade_kind
    }

    /// Number of distinct upgrade domains, the unit a rolling upgrade walks
    pub fn upgrade_domain_count(&self) -> usize {
        self.nodes
            .values()
            .map(|n| &n.upgrade_domain)
            .collect::<BTreeSet<_>>()
            .len()
    }
}
