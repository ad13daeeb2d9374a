//! Health reports and threshold checks

use crate::upgrade::policy::{ClusterHealthPolicy, ClusterUpgradeDeltaHealthPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Total and unhealthy counts for one kind of entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityHealthCounts {
    pub total: u32,
    pub unhealthy: u32,
}

impl EntityHealthCounts {
    pub fn new(total: u32, unhealthy: u32) -> Self {
        Self { total, unhealthy }
    }

    pub fn percent_unhealthy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.unhealthy.min(self.total)) * 100.0 / f64::from(self.total)
        }
    }

    /// Percentage points of unhealthy entities added since `baseline`
    pub fn delta_from(&self, baseline: &EntityHealthCounts) -> f64 {
        (self.percent_unhealthy() - baseline.percent_unhealthy()).max(0.0)
    }
}

/// A health snapshot taken while an upgrade domain is being processed
///
/// Baselines are captured when the upgrade (or the current domain) started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthReport {
    /// False when the health store could not produce a report
    pub evaluated: bool,
    pub baseline_nodes: EntityHealthCounts,
    pub nodes: EntityHealthCounts,
    pub domain_baseline: EntityHealthCounts,
    pub domain_nodes: EntityHealthCounts,
    pub baseline_applications: EntityHealthCounts,
    pub applications: EntityHealthCounts,
}

impl HealthReport {
    /// A report with every entity healthy
    pub fn healthy(nodes: u32, domain_nodes: u32, applications: u32) -> Self {
        Self {
            evaluated: true,
            baseline_nodes: EntityHealthCounts::new(nodes, 0),
            nodes: EntityHealthCounts::new(nodes, 0),
            domain_baseline: EntityHealthCounts::new(domain_nodes, 0),
            domain_nodes: EntityHealthCounts::new(domain_nodes, 0),
            baseline_applications: EntityHealthCounts::new(applications, 0),
            applications: EntityHealthCounts::new(applications, 0),
        }
    }

    /// Placeholder when no health data could be gathered
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// First threshold this report exceeds, checking absolute limits before deltas
    pub fn first_breach(
        &self,
        health: &ClusterHealthPolicy,
        delta: &ClusterUpgradeDeltaHealthPolicy,
    ) -> Option<HealthBreach> {
        let checks = [
            (
                HealthScope::Nodes,
                self.nodes.percent_unhealthy(),
                health.max_percent_unhealthy_nodes,
            ),
            (
                HealthScope::Applications,
                self.applications.percent_unhealthy(),
                health.max_percent_unhealthy_applications,
            ),
            (
                HealthScope::DeltaNodes,
                self.nodes.delta_from(&self.baseline_nodes),
                delta.max_percent_delta_unhealthy_nodes,
            ),
            (
                HealthScope::UpgradeDomainDeltaNodes,
                self.domain_nodes.delta_from(&self.domain_baseline),
                delta.max_percent_upgrade_domain_delta_unhealthy_nodes,
            ),
            (
                HealthScope::DeltaApplications,
                self.applications.delta_from(&self.baseline_applications),
                delta.max_percent_delta_unhealthy_applications,
            ),
        ];

        checks
            .into_iter()
            .find(|(_, observed, max)| *observed > f64::from(*max))
            .map(|(scope, observed_percent, max_percent)| HealthBreach {
                scope,
                observed_percent,
                max_percent,
            })
    }
}

/// Which threshold a breach refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthScope {
    Nodes,
    Applications,
    DeltaNodes,
    UpgradeDomainDeltaNodes,
    DeltaApplications,
}

/// A health threshold that was exceeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthBreach {
    pub scope: HealthScope,
    pub observed_percent: f64,
    pub max_percent: u32,
}

impl fmt::Display for HealthBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} unhealthy at {:.1}% exceeds the {}% limit",
            self.scope, self.observed_percent, self.max_percent
        )
    }
}
