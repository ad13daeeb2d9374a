//! Provisioning state machine for the cluster resource

use crate::error::{ClusterError, ClusterResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Lifecycle phase of the cluster resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClusterProvisioningState {
    #[default]
    Default,
    WaitingForNodes,
    Deploying,
    BaselineUpgrade,
    UpdatingUserConfiguration,
    UpdatingUserCertificate,
    UpdatingInfrastructure,
    EnforcingClusterVersion,
    UpgradeServiceUnreachable,
    AutoScale,
    ScaleUp,
    ScaleDown,
    Ready,
    Failed,
    Deleting,
}

impl ClusterProvisioningState {
    /// A rolling upgrade phase gated on health
    pub fn is_upgrading(self) -> bool {
        use ClusterProvisioningState::*;
        matches!(
            self,
            BaselineUpgrade
                | UpdatingUserConfiguration
                | UpdatingUserCertificate
                | UpdatingInfrastructure
                | EnforcingClusterVersion
        )
    }

    pub fn is_scaling(self) -> bool {
        use ClusterProvisioningState::*;
        matches!(self, AutoScale | ScaleUp | ScaleDown)
    }

    /// Phases driven domain by domain by the upgrade evaluator
    pub fn is_in_progress(self) -> bool {
        self.is_upgrading() || self.is_scaling()
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ClusterProvisioningState::Failed | ClusterProvisioningState::Deleting
        )
    }

    pub fn can_transition_to(self, to: ClusterProvisioningState) -> bool {
        use ClusterProvisioningState::*;

        if self == to {
            return false;
        }
        match to {
            Failed => return true,
            Deleting => return !self.is_terminal(),
            _ => {}
        }

        match self {
            Default => to == WaitingForNodes,
            WaitingForNodes => to == Deploying,
            Deploying => to == BaselineUpgrade,
            BaselineUpgrade => matches!(
                to,
                UpdatingUserConfiguration
                    | UpdatingUserCertificate
                    | UpdatingInfrastructure
                    | EnforcingClusterVersion
                    | UpgradeServiceUnreachable
            ),
            UpdatingUserConfiguration | UpdatingUserCertificate | UpdatingInfrastructure => {
                matches!(to, EnforcingClusterVersion | UpgradeServiceUnreachable)
            }
            EnforcingClusterVersion => matches!(to, Ready | UpgradeServiceUnreachable),
            AutoScale | ScaleUp | ScaleDown => {
                matches!(to, Ready | EnforcingClusterVersion | UpgradeServiceUnreachable)
            }
            UpgradeServiceUnreachable => to.is_in_progress(),
            Ready => matches!(
                to,
                AutoScale
                    | ScaleUp
                    | ScaleDown
                    | UpdatingUserConfiguration
                    | UpdatingUserCertificate
                    | UpdatingInfrastructure
            ),
            Failed | Deleting => false,
        }
    }

    /// Checked transition
    pub fn transition_to(self, to: ClusterProvisioningState) -> ClusterResult<ClusterProvisioningState> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(ClusterError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for ClusterProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why an upgrade was rolled back or failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClusterUpgradeFailureReason {
    #[default]
    None,
    /// The upgrade coordinator stayed unreachable too long
    Interrupted,
    HealthCheck,
    UpgradeDomainTimeout,
    OverallUpgradeTimeout,
}

impl fmt::Display for ClusterUpgradeFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where a rolling upgrade stands
///
/// Instants are offsets on the overall upgrade clock (`UpgradeElapsed::overall`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpgradeProgress {
    pub state: ClusterProvisioningState,
    /// State to return to when the coordinator reconnects
    pub resume_state: Option<ClusterProvisioningState>,
    /// Index of the upgrade domain being processed
    pub current_domain: usize,
    pub total_domains: usize,
    /// Start of the current continuously-healthy window
    pub healthy_since: Option<Duration>,
    pub unreachable_since: Option<Duration>,
    pub failure_reason: ClusterUpgradeFailureReason,
}

impl UpgradeProgress {
    /// Progress at the start of a phase walking `total_domains` upgrade domains
    pub fn start(state: ClusterProvisioningState, total_domains: usize) -> Self {
        Self {
            state,
            total_domains,
            ..Self::default()
        }
    }

    pub fn is_last_domain(&self) -> bool {
        self.current_domain + 1 >= self.total_domains
    }
}
