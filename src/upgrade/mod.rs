//! Rolling Upgrade Gating
//!
//! The provisioning state machine, upgrade/health policies, the pure
//! evaluator that turns health reports into decisions, and the monitor task
//! that feeds it one report at a time.

pub mod evaluator;
pub mod event;
pub mod health;
pub mod monitor;
pub mod policy;
pub mod state;

pub use evaluator::{Evaluation, UpgradeAction, UpgradeElapsed, UpgradeEvaluator};
pub use event::UpgradeEvent;
pub use health::{EntityHealthCounts, HealthBreach, HealthReport, HealthScope};
pub use monitor::UpgradeMonitor;
pub use policy::{ClusterHealthPolicy, ClusterUpgradeDeltaHealthPolicy, ClusterUpgradePolicy};
pub use state::{ClusterProvisioningState, ClusterUpgradeFailureReason, UpgradeProgress};
