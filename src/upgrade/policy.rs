//! Upgrade and health policies

use crate::error::{ClusterError, ClusterResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Absolute health thresholds for the whole cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterHealthPolicy {
    pub max_percent_unhealthy_nodes: u32,
    pub max_percent_unhealthy_applications: u32,
}

impl Default for ClusterHealthPolicy {
    fn default() -> Self {
        Self {
            max_percent_unhealthy_nodes: 100,
            max_percent_unhealthy_applications: 100,
        }
    }
}

/// Thresholds on entities that turned unhealthy since the upgrade baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterUpgradeDeltaHealthPolicy {
    /// Across the whole cluster
    pub max_percent_delta_unhealthy_nodes: u32,
    /// Within the upgrade domain being processed
    pub max_percent_upgrade_domain_delta_unhealthy_nodes: u32,
    pub max_percent_delta_unhealthy_applications: u32,
}

impl Default for ClusterUpgradeDeltaHealthPolicy {
    fn default() -> Self {
        Self {
            max_percent_delta_unhealthy_nodes: 10,
            max_percent_upgrade_domain_delta_unhealthy_nodes: 15,
            max_percent_delta_unhealthy_applications: 0,
        }
    }
}

/// Timeouts and health gates for a rolling upgrade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterUpgradePolicy {
    /// Proceed past health breaches (breaches are still reported)
    pub force_restart: bool,
    /// Time to wait after a domain completes before health is first checked
    pub health_check_wait_duration: Duration,
    /// Health must hold continuously this long before moving on
    pub health_check_stable_duration: Duration,
    /// How long to keep retrying when no health report is available
    pub health_check_retry_timeout: Duration,
    pub upgrade_domain_timeout: Duration,
    pub upgrade_timeout: Duration,
    pub health_policy: ClusterHealthPolicy,
    pub delta_health_policy: ClusterUpgradeDeltaHealthPolicy,
}

impl Default for ClusterUpgradePolicy {
    fn default() -> Self {
        Self {
            force_restart: false,
            health_check_wait_duration: Duration::from_secs(5 * 60),
            health_check_stable_duration: Duration::from_secs(5 * 60),
            health_check_retry_timeout: Duration::from_secs(45 * 60),
            upgrade_domain_timeout: Duration::from_secs(2 * 60 * 60),
            upgrade_timeout: Duration::from_secs(12 * 60 * 60),
            health_policy: ClusterHealthPolicy::default(),
            delta_health_policy: ClusterUpgradeDeltaHealthPolicy::default(),
        }
    }
}

impl ClusterUpgradePolicy {
    pub fn validate(&self) -> ClusterResult<()> {
        let percents = [
            ("max_percent_unhealthy_nodes", self.health_policy.max_percent_unhealthy_nodes),
            (
                "max_percent_unhealthy_applications",
                self.health_policy.max_percent_unhealthy_applications,
            ),
            (
                "max_percent_delta_unhealthy_nodes",
                self.delta_health_policy.max_percent_delta_unhealthy_nodes,
            ),
            (
                "max_percent_upgrade_domain_delta_unhealthy_nodes",
                self.delta_health_policy.max_percent_upgrade_domain_delta_unhealthy_nodes,
            ),
            (
                "max_percent_delta_unhealthy_applications",
                self.delta_health_policy.max_percent_delta_unhealthy_applications,
            ),
        ];
        for (field, value) in percents {
            if value > 100 {
                return Err(ClusterError::validation(
                    format!("upgrade_policy.{}", field),
                    format!("{} is not a percentage", value),
                ));
            }
        }

        let health_window = self
            .health_check_wait_duration
            .checked_add(self.health_check_stable_duration)
            .ok_or_else(|| {
                ClusterError::validation(
                    "upgrade_policy.health_check_wait_duration",
                    "health check wait plus stable duration overflows",
                )
            })?;
        if self.upgrade_domain_timeout < health_window {
            return Err(ClusterError::validation(
                "upgrade_policy.upgrade_domain_timeout",
                format!(
                    "{:?} is shorter than health check wait plus stable duration ({:?})",
                    self.upgrade_domain_timeout, health_window
                ),
            ));
        }
        if self.upgrade_timeout < self.upgrade_domain_timeout {
            return Err(ClusterError::validation(
                "upgrade_policy.upgrade_timeout",
                "must not be shorter than the upgrade domain timeout",
            ));
        }
        Ok(())
    }
}
