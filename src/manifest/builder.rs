//! Cluster Manifest Builder
//!
//! Turns a topology plus configuration snapshot into one consistent,
//! versioned manifest. Every step runs against borrowed inputs and the
//! manifest is only assembled once all of them succeed, so a failed build
//! never produces a partial manifest.

use crate::cluster_config::{AdminConfig, ClusterNodeConfig, ConfigSource, NodeState, UserConfig};
use crate::config::ManifestGeneratorConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::manifest::model::{ClusterManifest, ManifestNode, UpgradeKind};
use crate::manifest::version::VersionGenerator;
use crate::seed::{SeedNodeSelector, SeedNodeSet};
use crate::settings::{MergeOutcome, SettingsMerger};
use crate::topology::ClusterTopology;
use crate::upgrade::{ClusterProvisioningState, UpgradeEvaluator, UpgradeProgress};
use slog::{debug, info, Logger};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds cluster manifests
pub struct ClusterManifestBuilder {
    config: ManifestGeneratorConfig,
    version_generator: Arc<dyn VersionGenerator>,
    merger: SettingsMerger,
    logger: Logger,
}

impl ClusterManifestBuilder {
    /// Create a new builder
    ///
    /// # Arguments
    /// * `config` - Generator-wide defaults
    /// * `version_generator` - Source of manifest versions
    /// * `logger` - Logger instance
    pub fn new(
        config: ManifestGeneratorConfig,
        version_generator: Arc<dyn VersionGenerator>,
        logger: Logger,
    ) -> Self {
        Self {
            merger: SettingsMerger::new(logger.clone()),
            config,
            version_generator,
            logger,
        }
    }

    pub fn config(&self) -> &ManifestGeneratorConfig {
        &self.config
    }

    pub fn version_generator(&self) -> &Arc<dyn VersionGenerator> {
        &self.version_generator
    }

    /// Build the next manifest
    ///
    /// `prior` is the manifest currently published for the cluster, or
    /// `None` when the cluster is being created.
    pub fn build(
        &self,
        topology: &ClusterTopology,
        user: &UserConfig,
        admin: &AdminConfig,
        node_config: &ClusterNodeConfig,
        prior: Option<&ClusterManifest>,
    ) -> ClusterResult<ClusterManifest> {
        info!(self.logger, "Building cluster manifest";
            "cluster" => &user.cluster_name,
            "nodes" => topology.len(),
            "prior_version" => ?prior.map(|p| p.version().value()));

        self.validate_inputs(topology, user, admin, node_config, prior)?;

        let effective = Self::effective_topology(topology, node_config);
        let seed_nodes = self.select_seeds(&effective, user, node_config, prior)?;
        let merge = self.merge_settings(user, admin, prior)?;
        let nodes = self.assign_nodes(&effective, node_config, &seed_nodes);
        let version = self
            .version_generator
            .next_version(prior.map(ClusterManifest::version));

        let mut manifest = ClusterManifest {
            cluster_name: user.cluster_name.clone(),
            version,
            code_version: admin.code_version.clone(),
            settings: merge.merged,
            nodes,
            seed_nodes,
            upgrade_policy: user.upgrade_policy.clone(),
            override_upgrade_policy: admin.override_policy().cloned(),
            node_config_version: node_config.version,
            changes: merge.changes,
            upgrade_kind: UpgradeKind::Full,
        };
        if let Some(prior) = prior {
            manifest.upgrade_kind = self.version_generator.diff(prior, &manifest).upgrade_kind();
        }

        info!(self.logger, "Cluster manifest built";
            "cluster" => manifest.cluster_name(),
            "version" => %manifest.version(),
            "seeds" => manifest.seed_nodes().len(),
            "upgrade_kind" => ?manifest.upgrade_kind());

        Ok(manifest)
    }

    /// Evaluator for rolling out `manifest` under its recorded policies
    pub fn evaluator_for(&self, manifest: &ClusterManifest) -> UpgradeEvaluator {
        UpgradeEvaluator::new(
            manifest.upgrade_policy().clone(),
            manifest.override_upgrade_policy().cloned(),
            self.config.upgrade_service_unreachable_timeout,
            self.logger.clone(),
        )
    }

    /// Progress at the start of a rollout of `manifest` in `state`
    pub fn initial_progress(
        manifest: &ClusterManifest,
        state: ClusterProvisioningState,
    ) -> UpgradeProgress {
        UpgradeProgress::start(state, manifest.upgrade_domain_count())
    }

    fn validate_inputs(
        &self,
        topology: &ClusterTopology,
        user: &UserConfig,
        admin: &AdminConfig,
        node_config: &ClusterNodeConfig,
        prior: Option<&ClusterManifest>,
    ) -> ClusterResult<()> {
        user.validate()?;
        admin.validate()?;

        if topology.is_empty() {
            return Err(ClusterError::validation("topology", "no nodes"));
        }

        for name in node_config.nodes.keys() {
            if !topology.contains(name) {
                return Err(ClusterError::validation(
                    format!("node_config.nodes[{}]", name),
                    "override names a node that is not in the topology",
                ));
            }
        }

        if let Some(prior) = prior {
            if prior.cluster_name() != user.cluster_name {
                return Err(ClusterError::validation(
                    "user.cluster_name",
                    format!("prior manifest belongs to cluster '{}'", prior.cluster_name()),
                ));
            }
            if node_config.version < prior.node_config_version() {
                return Err(ClusterError::validation(
                    "node_config.version",
                    format!(
                        "{} is older than the published version {}",
                        node_config.version,
                        prior.node_config_version()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Topology with removed nodes dropped and user role overrides applied
    fn effective_topology(topology: &ClusterTopology, node_config: &ClusterNodeConfig) -> ClusterTopology {
        let removed = topology
            .nodes()
            .filter(|n| node_config.state_of(n.name()) == NodeState::Removed)
            .map(|n| n.name());
        let roles = topology
            .nodes()
            .filter_map(|n| node_config.role_of(n.name()).map(|role| (n.name(), role)));

        topology.with_roles(roles).without(removed)
    }

    fn select_seeds(
        &self,
        effective: &ClusterTopology,
        user: &UserConfig,
        node_config: &ClusterNodeConfig,
        prior: Option<&ClusterManifest>,
    ) -> ClusterResult<SeedNodeSet> {
        // Only enabled nodes may host seeds
        let candidates = effective.without(
            effective
                .nodes()
                .filter(|n| !node_config.state_of(n.name()).is_seed_eligible())
                .map(|n| n.name()),
        );

        let selector = SeedNodeSelector::new(
            user.seed_selection.clone(),
            self.config.allow_single_node,
            self.logger.clone(),
        );
        selector.select_cached(&candidates, prior.map(ClusterManifest::seed_nodes))
    }

    fn merge_settings(
        &self,
        user: &UserConfig,
        admin: &AdminConfig,
        prior: Option<&ClusterManifest>,
    ) -> ClusterResult<MergeOutcome> {
        let outcome = self
            .merger
            .merge(admin.settings(), user.settings(), prior.map(ClusterManifest::settings))?;
        admin.schema.validate(&outcome.merged)?;
        Ok(outcome)
    }

    fn assign_nodes(
        &self,
        effective: &ClusterTopology,
        node_config: &ClusterNodeConfig,
        seed_nodes: &SeedNodeSet,
    ) -> BTreeMap<String, ManifestNode> {
        effective
            .nodes()
            .map(|node| {
                let endpoints = node_config
                    .endpoints_of(node.name())
                    .copied()
                    .unwrap_or(self.config.default_endpoints);
                let manifest_node = ManifestNode {
                    name: node.name().to_string(),
                    address: node.address().to_string(),
                    node_type: node.node_type().to_string(),
                    fault_domain: node.fault_domain().clone(),
                    upgrade_domain: node.upgrade_domain().clone(),
                    role: node.role(),
                    state: node_config.state_of(node.name()),
                    is_seed: seed_nodes.contains(node.name()),
                    endpoints,
                };
                debug!(self.logger, "Assigned node";
                    "node" => node.name(), "seed" => manifest_node.is_seed, "state" => ?manifest_node.state);
                (manifest_node.name.clone(), manifest_node)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_config::NodeOverride;
    use crate::manifest::model::{ManifestVersion, NodeEndpoints};
    use crate::manifest::version::MonotonicVersionGenerator;
    use crate::settings::{Settings, SettingsSchema, UpgradePolicy};
    use crate::topology::{NodeDescription, NodeRole};

    fn builder() -> ClusterManifestBuilder {
        ClusterManifestBuilder::new(
            ManifestGeneratorConfig::default(),
            Arc::new(MonotonicVersionGenerator::new()),
            Logger::root(slog::Discard, slog::o!()),
        )
    }

    fn topology() -> ClusterTopology {
        ClusterTopology::new(
            [
                ("N1", "FD0", "UD0"),
                ("N2", "FD1", "UD0"),
                ("N3", "FD2", "UD0"),
                ("N4", "FD0", "UD1"),
                ("N5", "FD1", "UD1"),
            ]
            .into_iter()
            .map(|(n, fd, ud)| NodeDescription::new(n, fd, ud, NodeRole::Primary).unwrap()),
        )
        .unwrap()
    }

    fn admin() -> AdminConfig {
        AdminConfig::new("10.1.0").with_settings(
            Settings::new()
                .with_parameter("Setup", "FabricDataRoot", "D:\\SF", UpgradePolicy::NotAllowed)
                .with_parameter("Diagnostics", "MaxDiskQuotaInMB", "1024", UpgradePolicy::Dynamic),
        )
    }

    #[test]
    fn test_initial_build() {
        let manifest = builder()
            .build(&topology(), &UserConfig::new("prod"), &admin(), &ClusterNodeConfig::default(), None)
            .unwrap();

        assert_eq!(manifest.version(), ManifestVersion::new(1));
        assert_eq!(manifest.seed_nodes().names().collect::<Vec<_>>(), vec!["N1", "N2", "N3"]);
        assert_eq!(manifest.upgrade_kind(), UpgradeKind::Full);
        assert!(manifest.node("N1").unwrap().is_seed);
        assert!(!manifest.node("N4").unwrap().is_seed);
        assert_eq!(manifest.node("N4").unwrap().endpoints, NodeEndpoints::default());
        assert_eq!(manifest.upgrade_domain_count(), 2);
    }

    #[test]
    fn test_dynamic_change_is_settings_only() {
        let builder = builder();
        let prior = builder
            .build(&topology(), &UserConfig::new("prod"), &admin(), &ClusterNodeConfig::default(), None)
            .unwrap();

        let user = UserConfig::new("prod").with_settings(
            Settings::new().with_parameter("Diagnostics", "MaxDiskQuotaInMB", "4096", UpgradePolicy::Dynamic),
        );
        let next = builder
            .build(&topology(), &user, &admin(), &ClusterNodeConfig::default(), Some(&prior))
            .unwrap();

        assert!(next.version() > prior.version());
        assert_eq!(next.upgrade_kind(), UpgradeKind::SettingsOnly);
        assert_eq!(next.seed_nodes(), prior.seed_nodes());
    }

    #[test]
    fn test_removed_and_disabled_nodes() {
        let node_config = ClusterNodeConfig::new(1)
            .with_state("N1", NodeState::Removed)
            .with_state("N2", NodeState::Disabled);

        let manifest = builder()
            .build(&topology(), &UserConfig::new("prod"), &admin(), &node_config, None)
            .unwrap();

        assert!(manifest.node("N1").is_none());
        let n2 = manifest.node("N2").unwrap();
        assert_eq!(n2.state, NodeState::Disabled);
        assert!(!n2.is_seed);
        assert_eq!(manifest.seed_nodes().len(), 3);
    }

    #[test]
    fn test_user_overrides_win_when_user_set() {
        let custom = NodeEndpoints {
            client_connection: 29000,
            ..NodeEndpoints::default()
        };
        let overrides = NodeOverride {
            state: NodeState::Enabled,
            role: Some(NodeRole::NonPrimary),
            endpoints: Some(custom),
        };
        let node_config = ClusterNodeConfig::new(1).with_override("N1", overrides);

        let ignored = builder()
            .build(&topology(), &UserConfig::new("prod"), &admin(), &node_config, None)
            .unwrap();
        assert_eq!(ignored.node("N1").unwrap().role, NodeRole::Primary);
        assert!(ignored.seed_nodes().contains("N1"));

        let applied = builder()
            .build(&topology(), &UserConfig::new("prod"), &admin(), &node_config.user_set(), None)
            .unwrap();
        let n1 = applied.node("N1").unwrap();
        assert_eq!(n1.role, NodeRole::NonPrimary);
        assert_eq!(n1.endpoints, custom);
        assert!(!applied.seed_nodes().contains("N1"));
    }

    #[test]
    fn test_validation_failures() {
        let b = builder();
        let user = UserConfig::new("prod");
        let node_config = ClusterNodeConfig::default();

        let unknown = ClusterNodeConfig::new(1).with_state("N9", NodeState::Disabled);
        assert!(matches!(
            b.build(&topology(), &user, &admin(), &unknown, None),
            Err(ClusterError::Validation { .. })
        ));

        let schema_admin = admin().with_schema(SettingsSchema::new().with_required("Security", "ClusterCredentialType"));
        assert!(matches!(
            b.build(&topology(), &user, &schema_admin, &node_config, None),
            Err(ClusterError::Validation { .. })
        ));

        let prior = b
            .build(&topology(), &user, &admin(), &ClusterNodeConfig::new(5), None)
            .unwrap();
        assert!(matches!(
            b.build(&topology(), &user, &admin(), &ClusterNodeConfig::new(4), Some(&prior)),
            Err(ClusterError::Validation { ref field, .. }) if field == "node_config.version"
        ));
        assert!(matches!(
            b.build(&topology(), &UserConfig::new("other"), &admin(), &ClusterNodeConfig::new(5), Some(&prior)),
            Err(ClusterError::Validation { .. })
        ));
    }

    #[test]
    fn test_evaluator_for_manifest() {
        let b = builder();
        let admin = admin().with_override_policy(crate::upgrade::ClusterUpgradePolicy::default());
        let manifest = b
            .build(&topology(), &UserConfig::new("prod"), &admin, &ClusterNodeConfig::default(), None)
            .unwrap();

        assert!(manifest.override_upgrade_policy().is_some());
        let progress = ClusterManifestBuilder::initial_progress(
            &manifest,
            ClusterProvisioningState::BaselineUpgrade,
        );
        assert_eq!(progress.total_domains, 2);
        assert_eq!(b.evaluator_for(&manifest).policy(), manifest.upgrade_policy());
    }
}
