//! Error types for manifest generation and upgrade evaluation

use crate::settings::UpgradePolicy;
use crate::upgrade::{ClusterProvisioningState, ClusterUpgradeFailureReason, HealthBreach};
use std::time::Duration;

/// Errors raised while building manifests or evaluating upgrades
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClusterError {
    /// Malformed or missing input; the caller must fix the input
    #[error("validation failed for '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// Attempted change to a setting whose upgrade policy forbids it
    #[error("{section}/{parameter} is {policy} and cannot change: {reason}")]
    PolicyViolation {
        section: String,
        parameter: String,
        policy: UpgradePolicy,
        reason: String,
    },

    /// Topology cannot satisfy the minimum seed quorum
    #[error("seed quorum needs {required} eligible node(s), topology has {eligible}")]
    InsufficientNodes { eligible: usize, required: usize },

    /// An upgrade domain or the whole upgrade ran past its deadline
    #[error("upgrade failed with {reason}: elapsed {elapsed:?} exceeds limit {limit:?}")]
    Timeout {
        reason: ClusterUpgradeFailureReason,
        elapsed: Duration,
        limit: Duration,
    },

    /// A delta or absolute health threshold was exceeded
    #[error("health breach: {0}")]
    HealthBreach(HealthBreach),

    /// Requested provisioning state change is not part of the lifecycle
    #[error("cannot move cluster from {from} to {to}")]
    InvalidTransition {
        from: ClusterProvisioningState,
        to: ClusterProvisioningState,
    },

    /// The upgrade monitor task is no longer accepting reports
    #[error("upgrade monitor stopped")]
    MonitorStopped,
}

impl ClusterError {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ClusterError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for cluster manifest operations
pub type ClusterResult<T> = Result<T, ClusterError>;
