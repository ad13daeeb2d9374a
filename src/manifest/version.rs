//! Manifest versioning and manifest-to-manifest diffs

use crate::manifest::model::{ClusterManifest, ManifestVersion, UpgradeKind};
use crate::settings::{ChangeDisposition, ParameterChange, UpgradePolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Source of manifest versions
pub trait VersionGenerator: Send + Sync {
    /// A version strictly greater than `current`
    fn next_version(&self, current: Option<ManifestVersion>) -> ManifestVersion;

    /// What changed between two manifests
    fn diff(&self, from: &ClusterManifest, to: &ClusterManifest) -> ManifestDiff {
        ManifestDiff::between(from, to)
    }
}

/// Successor-of-prior generator
///
/// Holds no state: the same predecessor always yields the same version.
/// Uniqueness within a cluster comes from serializing its builds.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicVersionGenerator;

impl MonotonicVersionGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl VersionGenerator for MonotonicVersionGenerator {
    fn next_version(&self, current: Option<ManifestVersion>) -> ManifestVersion {
        ManifestVersion::new(current.map_or(1, |v| v.value().saturating_add(1)))
    }
}

/// Differences between two manifests
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManifestDiff {
    pub settings: Vec<ParameterChange>,
    pub nodes_added: Vec<String>,
    pub nodes_removed: Vec<String>,
    pub nodes_changed: Vec<String>,
    pub seeds_changed: bool,
    pub code_version_changed: bool,
}

impl ManifestDiff {
    pub fn between(from: &ClusterManifest, to: &ClusterManifest) -> Self {
        let mut diff = ManifestDiff {
            seeds_changed: !from.seed_nodes().names().eq(to.seed_nodes().names()),
            code_version_changed: from.code_version() != to.code_version(),
            ..Self::default()
        };

        let keys: BTreeSet<(&str, &str)> = from
            .settings()
            .iter()
            .chain(to.settings().iter())
            .map(|(section, parameter, _)| (section, parameter))
            .collect();
        for (section, parameter) in keys {
            let before = from.settings().get(section, parameter);
            let after = to.settings().get(section, parameter);
            if before.map(|p| &p.value) == after.map(|p| &p.value) {
                continue;
            }
            let policy = after.or(before).map(|p| p.policy).unwrap_or_default();
            let disposition = match policy {
                UpgradePolicy::Dynamic => ChangeDisposition::InPlace,
                _ => ChangeDisposition::RequiresFullUpgrade,
            };
            diff.settings.push(ParameterChange {
                section: section.to_string(),
                parameter: parameter.to_string(),
                previous: before.map(|p| p.value.clone()),
                requested: after.map(|p| p.value.clone()),
                policy,
                disposition,
            });
        }

        for node in to.nodes() {
            match from.node(&node.name) {
                None => diff.nodes_added.push(node.name.clone()),
                Some(previous) if previous != node => diff.nodes_changed.push(node.name.clone()),
                Some(_) => {}
            }
        }
        diff.nodes_removed = from
            .nodes()
            .filter(|n| to.node(&n.name).is_none())
            .map(|n| n.name.clone())
            .collect();

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.upgrade_kind() == UpgradeKind::None
    }

    /// Full when code, nodes, seeds or a non-dynamic setting changed;
    /// settings-only when every change is dynamic
    pub fn upgrade_kind(&self) -> UpgradeKind {
        let topology_changed = self.code_version_changed
            || self.seeds_changed
            || !self.nodes_added.is_empty()
            || !self.nodes_removed.is_empty()
            || !self.nodes_changed.is_empty();
        let full_setting = self
            .settings
            .iter()
            .any(|c| c.disposition == ChangeDisposition::RequiresFullUpgrade);

        if topology_changed || full_setting {
            UpgradeKind::Full
        } else if self.settings.iter().any(ParameterChange::is_applied) {
            UpgradeKind::SettingsOnly
        } else {
            UpgradeKind::None
        }
    }
}
