//! Node descriptions and fault/upgrade domain paths

use crate::error::{ClusterError, ClusterResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A fault-domain or upgrade-domain path
///
/// Accepts plain names (`FD0`, `UD1`) and hierarchical paths with an optional
/// scheme (`fd:/dc1/rack2`). Segments are non-empty and made of ASCII
/// alphanumerics, `-`, `_` or `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainPath(String);

impl DomainPath {
    /// Parse and validate a domain path
    pub fn parse(raw: &str) -> ClusterResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ClusterError::validation("domain", "domain path is empty"));
        }

        // Optional "scheme:" prefix (e.g. "fd:/dc1/r0")
        let path = match trimmed.split_once(':') {
            Some((scheme, rest)) => {
                if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(ClusterError::validation(
                        "domain",
                        format!("'{}' has an invalid scheme", raw),
                    ));
                }
                rest
            }
            None => trimmed,
        };

        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return Err(ClusterError::validation(
                "domain",
                format!("'{}' has no path segments", raw),
            ));
        }

        for segment in path.split('/') {
            if segment.is_empty() {
                return Err(ClusterError::validation(
                    "domain",
                    format!("'{}' contains an empty segment", raw),
                ));
            }
            if !segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            {
                return Err(ClusterError::validation(
                    "domain",
                    format!("'{}' contains an invalid character", raw),
                ));
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DomainPath {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DomainPath {
    type Error = ClusterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DomainPath> for String {
    fn from(path: DomainPath) -> Self {
        path.0
    }
}

impl fmt::Display for DomainPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role a node plays in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Hosts system services; eligible to run the seed quorum
    Primary,
    /// Application-only node
    NonPrimary,
}

impl NodeRole {
    pub fn is_seed_eligible(self) -> bool {
        matches!(self, NodeRole::Primary)
    }
}

/// A single node of the cluster topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawNodeDescription")]
pub struct NodeDescription {
    name: String,
    address: String,
    node_type: String,
    fault_domain: DomainPath,
    upgrade_domain: DomainPath,
    role: NodeRole,
}

impl NodeDescription {
    /// Create a node description, validating its name and domain paths
    ///
    /// The address defaults to the node name and the node type to an empty string.
    pub fn new(
        name: impl Into<String>,
        fault_domain: &str,
        upgrade_domain: &str,
        role: NodeRole,
    ) -> ClusterResult<Self> {
        let name = name.into();
        validate_node_name(&name)?;
        let fault_domain = DomainPath::parse(fault_domain).map_err(|e| in_node(&name, e))?;
        let upgrade_domain = DomainPath::parse(upgrade_domain).map_err(|e| in_node(&name, e))?;

        Ok(Self {
            address: name.clone(),
            name,
            node_type: String::new(),
            fault_domain,
            upgrade_domain,
            role,
        })
    }

    /// Set the address other nodes use to reach this node
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the node type this node belongs to
    pub fn with_node_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = node_type.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn fault_domain(&self) -> &DomainPath {
        &self.fault_domain
    }

    pub fn upgrade_domain(&self) -> &DomainPath {
        &self.upgrade_domain
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    /// Copy of this node with a different role
    pub(crate) fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }
}

fn validate_node_name(name: &str) -> ClusterResult<()> {
    if name.trim().is_empty() {
        return Err(ClusterError::validation("node.name", "node name is empty"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(ClusterError::validation(
            "node.name",
            format!("node name '{}' contains whitespace", name),
        ));
    }
    Ok(())
}

fn in_node(name: &str, err: ClusterError) -> ClusterError {
    match err {
        ClusterError::Validation { field, reason } => ClusterError::Validation {
            field: format!("node[{}].{}", name, field),
            reason,
        },
        other => other,
    }
}

#[derive(Deserialize)]
struct RawNodeDescription {
    name: String,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    node_type: String,
    fault_domain: String,
    upgrade_domain: String,
    role: NodeRole,
}

impl TryFrom<RawNodeDescription> for NodeDescription {
    type Error = ClusterError;

    fn try_from(raw: RawNodeDescription) -> Result<Self, Self::Error> {
        let node = NodeDescription::new(raw.name, &raw.fault_domain, &raw.upgrade_domain, raw.role)?
            .with_node_type(raw.node_type);
        Ok(match raw.address {
            Some(address) => node.with_address(address),
            None => node,
        })
    }
}
