pub mod cluster_config;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod manifest;
pub mod runtime;
pub mod seed;
pub mod settings;
pub mod topology;
pub mod upgrade;

pub use cluster_config::{AdminConfig, ClusterNodeConfig, ConfigSource, NodeOverride, NodeState, UserConfig};
pub use config::ManifestGeneratorConfig;
pub use error::{ClusterError, ClusterResult};
pub use event_bus::EventBus;
pub use manifest::{
    ClusterManifest, ClusterManifestBuilder, ManifestDiff, ManifestNode, ManifestVersion,
    MonotonicVersionGenerator, NodeEndpoints, UpgradeKind, VersionGenerator,
};
pub use runtime::{ManifestEvent, ManifestRuntime};
pub use seed::{ReliabilityLevel, SeedNodeSelector, SeedNodeSet, SeedSelectionConfig, SeedSelectionStrategy};
pub use settings::{
    ChangeDisposition, MergeOutcome, ParameterChange, Settings, SettingsMerger, SettingsParameter,
    SettingsSchema, UpgradePolicy,
};
pub use topology::{ClusterTopology, DomainPath, NodeDescription, NodeRole};
pub use upgrade::{
    ClusterHealthPolicy, ClusterProvisioningState, ClusterUpgradeDeltaHealthPolicy,
    ClusterUpgradeFailureReason, ClusterUpgradePolicy, Evaluation, HealthBreach, HealthReport,
    UpgradeAction, UpgradeElapsed, UpgradeEvaluator, UpgradeEvent, UpgradeMonitor, UpgradeProgress,
};
