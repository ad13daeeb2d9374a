//! Events emitted while an upgrade is being monitored

use crate::upgrade::evaluator::UpgradeAction;
use crate::upgrade::health::HealthBreach;
use crate::upgrade::state::{ClusterProvisioningState, ClusterUpgradeFailureReason};
use serde::{Deserialize, Serialize};

/// Events broadcast by the UpgradeMonitor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum UpgradeEvent {
    /// A health report was evaluated
    Evaluated {
        state: ClusterProvisioningState,
        action: UpgradeAction,
        current_domain: usize,
    },

    /// The provisioning state changed
    StateChanged {
        from: ClusterProvisioningState,
        to: ClusterProvisioningState,
        failure_reason: ClusterUpgradeFailureReason,
    },

    /// A health threshold was exceeded (whether or not the upgrade proceeded)
    HealthBreached(HealthBreach),

    CoordinatorUnreachable {
        resume_state: ClusterProvisioningState,
    },

    CoordinatorReconnected {
        state: ClusterProvisioningState,
    },
}
