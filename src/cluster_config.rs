//! Admin, user and node configuration inputs to the manifest builder

use crate::error::{ClusterError, ClusterResult};
use crate::manifest::NodeEndpoints;
use crate::seed::{ReliabilityLevel, SeedSelectionConfig};
use crate::settings::{Settings, SettingsSchema};
use crate::topology::NodeRole;
use crate::upgrade::ClusterUpgradePolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Common capability of the admin and user configuration shapes
pub trait ConfigSource {
    fn settings(&self) -> &Settings;

    fn upgrade_policy(&self) -> Option<&ClusterUpgradePolicy>;

    /// Checks particular to one configuration shape
    fn validate_fields(&self) -> ClusterResult<()> {
        Ok(())
    }

    /// Check the configuration on its own, before it is merged
    fn validate(&self) -> ClusterResult<()> {
        self.validate_fields()?;
        match self.upgrade_policy() {
            Some(policy) => policy.validate(),
            None => Ok(()),
        }
    }
}

/// Operator-supplied configuration: documented defaults, schema and policy
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Default value and policy of every documented parameter
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub schema: SettingsSchema,
    #[serde(default)]
    pub upgrade_policy: Option<ClusterUpgradePolicy>,
    /// Let `upgrade_policy` decide when the user's policy is breached
    #[serde(default)]
    pub override_user_upgrade_policy: bool,
    /// Runtime code version deployed to every node
    pub code_version: String,
}

impl AdminConfig {
    pub fn new(code_version: impl Into<String>) -> Self {
        Self {
            code_version: code_version.into(),
            ..Self::default()
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_schema(mut self, schema: SettingsSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Set an override policy consulted when the user's policy is breached
    pub fn with_override_policy(mut self, policy: ClusterUpgradePolicy) -> Self {
        self.upgrade_policy = Some(policy);
        self.override_user_upgrade_policy = true;
        self
    }

    /// The policy that overrides the user's, if one is in force
    pub fn override_policy(&self) -> Option<&ClusterUpgradePolicy> {
        self.upgrade_policy
            .as_ref()
            .filter(|_| self.override_user_upgrade_policy)
    }
}

impl ConfigSource for AdminConfig {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn upgrade_policy(&self) -> Option<&ClusterUpgradePolicy> {
        self.upgrade_policy.as_ref()
    }

    fn validate_fields(&self) -> ClusterResult<()> {
        if self.code_version.trim().is_empty() {
            return Err(ClusterError::validation("admin.code_version", "must not be empty"));
        }
        if self.override_user_upgrade_policy && self.upgrade_policy.is_none() {
            return Err(ClusterError::validation(
                "admin.upgrade_policy",
                "override requested without an upgrade policy",
            ));
        }
        Ok(())
    }
}

/// Cluster owner's configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub cluster_name: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub seed_selection: SeedSelectionConfig,
    #[serde(default)]
    pub upgrade_policy: ClusterUpgradePolicy,
}

impl UserConfig {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            settings: Settings::default(),
            seed_selection: SeedSelectionConfig::default(),
            upgrade_policy: ClusterUpgradePolicy::default(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_reliability(mut self, level: ReliabilityLevel) -> Self {
        self.seed_selection = SeedSelectionConfig::from_reliability(level);
        self
    }

    pub fn with_seed_selection(mut self, seed_selection: SeedSelectionConfig) -> Self {
        self.seed_selection = seed_selection;
        self
    }

    pub fn with_upgrade_policy(mut self, policy: ClusterUpgradePolicy) -> Self {
        self.upgrade_policy = policy;
        self
    }
}

impl ConfigSource for UserConfig {
    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn upgrade_policy(&self) -> Option<&ClusterUpgradePolicy> {
        Some(&self.upgrade_policy)
    }

    fn validate_fields(&self) -> ClusterResult<()> {
        if self.cluster_name.trim().is_empty() {
            return Err(ClusterError::validation("user.cluster_name", "must not be empty"));
        }
        Ok(())
    }
}

/// Administrative status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeState {
    #[default]
    Enabled,
    Disabling,
    Disabled,
    /// Dropped from the manifest entirely
    Removed,
}

impl NodeState {
    pub fn is_seed_eligible(self) -> bool {
        self == NodeState::Enabled
    }
}

/// Per-node overrides supplied alongside the topology
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeOverride {
    #[serde(default)]
    pub state: NodeState,
    #[serde(default)]
    pub role: Option<NodeRole>,
    #[serde(default)]
    pub endpoints: Option<NodeEndpoints>,
}

/// Explicit node overrides, versioned
///
/// Role and endpoint overrides only apply when `is_user_set` is true; node
/// states always apply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterNodeConfig {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub is_user_set: bool,
    #[serde(default)]
    pub nodes: BTreeMap<String, NodeOverride>,
}

impl ClusterNodeConfig {
    pub fn new(version: u64) -> Self {
        Self {
            version,
            ..Self::default()
        }
    }

    pub fn user_set(mut self) -> Self {
        self.is_user_set = true;
        self
    }

    pub fn with_override(mut self, name: impl Into<String>, node: NodeOverride) -> Self {
        self.nodes.insert(name.into(), node);
        self
    }

    pub fn with_state(mut self, name: impl Into<String>, state: NodeState) -> Self {
        self.nodes.entry(name.into()).or_default().state = state;
        self
    }

    pub fn state_of(&self, name: &str) -> NodeState {
        self.nodes.get(name).map(|n| n.state).unwrap_or_default()
    }

    /// Role override, if user overrides are in force
    pub fn role_of(&self, name: &str) -> Option<NodeRole> {
        if !self.is_user_set {
            return None;
        }
        self.nodes.get(name)?.role
    }

    /// Endpoint override, if user overrides are in force
    pub fn endpoints_of(&self, name: &str) -> Option<&NodeEndpoints> {
        if !self.is_user_set {
            return None;
        }
        self.nodes.get(name)?.endpoints.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_validation() {
        assert!(AdminConfig::new("8.0.1").validate().is_ok());
        assert!(matches!(
            AdminConfig::new(" ").validate(),
            Err(ClusterError::Validation { .. })
        ));

        let mut admin = AdminConfig::new("8.0.1");
        admin.override_user_upgrade_policy = true;
        assert!(admin.validate().is_err());
        assert!(admin.override_policy().is_none());

        let admin = AdminConfig::new("8.0.1").with_override_policy(ClusterUpgradePolicy::default());
        assert!(admin.override_policy().is_some());
    }

    #[test]
    fn test_user_validation_through_trait() {
        fn check(source: &dyn ConfigSource) -> ClusterResult<()> {
            source.validate()
        }
        assert!(check(&UserConfig::new("prod")).is_ok());
        assert!(check(&UserConfig::new("")).is_err());

        let broken = ClusterUpgradePolicy {
            upgrade_domain_timeout: std::time::Duration::from_secs(1),
            ..ClusterUpgradePolicy::default()
        };
        assert!(check(&UserConfig::new("prod").with_upgrade_policy(broken.clone())).is_err());
        assert!(check(&AdminConfig::new("8.0.1").with_override_policy(broken)).is_err());
        assert!(check(&AdminConfig::new("8.0.1")).is_ok());
        assert_eq!(
            UserConfig::new("prod").with_reliability(ReliabilityLevel::Gold).seed_selection.desired_seed_count,
            7
        );
    }

    #[test]
    fn test_overrides_apply_only_when_user_set() {
        let node = NodeOverride {
            state: NodeState::Disabled,
            role: Some(NodeRole::NonPrimary),
            endpoints: Some(NodeEndpoints::default()),
        };
        let config = ClusterNodeConfig::new(2).with_override("N1", node);

        assert_eq!(config.state_of("N1"), NodeState::Disabled);
        assert_eq!(config.state_of("N2"), NodeState::Enabled);
        assert_eq!(config.role_of("N1"), None);
        assert!(config.endpoints_of("N1").is_none());

        let config = config.user_set();
        assert_eq!(config.role_of("N1"), Some(NodeRole::NonPrimary));
        assert!(config.endpoints_of("N1").is_some());
    }

    #[test]
    fn test_user_config_from_json() {
        let json = r#"{"cluster_name":"prod","seed_selection":{"desired_seed_count":5,"strategy":"DomainSpread"}}"#;
        let config: UserConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.seed_selection.desired_seed_count, 5);
        assert_eq!(config.upgrade_policy, ClusterUpgradePolicy::default());
    }
}
