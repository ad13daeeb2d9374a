//! Cluster topology: the node map a manifest is generated from

use crate::error::{ClusterError, ClusterResult};
use crate::topology::node::{NodeDescription, NodeRole};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Immutable view of the cluster's nodes, keyed by unique node name
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<NodeDescription>", into = "Vec<NodeDescription>")]
pub struct ClusterTopology {
    nodes: BTreeMap<String, NodeDescription>,
}

impl ClusterTopology {
    /// Build a topology, rejecting duplicate node names
    pub fn new(nodes: impl IntoIterator<Item = NodeDescription>) -> ClusterResult<Self> {
        let mut map = BTreeMap::new();
        for node in nodes {
            let name = node.name().to_string();
            if map.insert(name.clone(), node).is_some() {
                return Err(ClusterError::validation(
                    format!("node[{}]", name),
                    "duplicate node name in topology",
                ));
            }
        }
        Ok(Self { nodes: map })
    }

    pub fn get(&self, name: &str) -> Option<&NodeDescription> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Nodes in node-name order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeDescription> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes allowed to host a seed
    pub fn eligible_seed_nodes(&self) -> impl Iterator<Item = &NodeDescription> {
        self.nodes.values().filter(|n| n.role().is_seed_eligible())
    }

    /// Names of the seed-eligible nodes; seed sets are cached against this
    pub fn eligible_membership(&self) -> BTreeSet<String> {
        self.eligible_seed_nodes().map(|n| n.name().to_string()).collect()
    }

    /// Copy of this topology without the named nodes
    pub fn without<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut nodes = self.nodes.clone();
        for name in names {
            nodes.remove(name);
        }
        Self { nodes }
    }

    /// Copy of this topology with the given role overrides applied
    pub fn with_roles<'a>(&self, roles: impl IntoIterator<Item = (&'a str, NodeRole)>) -> Self {
        let mut nodes = self.nodes.clone();
        for (name, role) in roles {
            if let Some(node) = nodes.remove(name) {
                nodes.insert(name.to_string(), node.with_role(role));
            }
        }
        Self { nodes }
    }
}

impl TryFrom<Vec<NodeDescription>> for ClusterTopology {
    type Error = ClusterError;

    fn try_from(nodes: Vec<NodeDescription>) -> Result<Self, Self::Error> {
        Self::new(nodes)
    }
}

impl From<ClusterTopology> for Vec<NodeDescription> {
    fn from(topology: ClusterTopology) -> Self {
        topology.nodes.into_values().collect()
    }
}
