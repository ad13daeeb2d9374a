//! Configuration for the manifest generator

use crate::manifest::NodeEndpoints;
use std::time::Duration;

/// Generator-wide settings shared by the builder, seed selector and upgrade monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestGeneratorConfig {
    /// Endpoint ports assigned to nodes that carry no explicit override
    pub default_endpoints: NodeEndpoints,

    /// Allow a one-node seed set when the topology has a single eligible node
    /// (development clusters)
    pub allow_single_node: bool,

    /// How long the upgrade coordinator may stay unreachable before the
    /// upgrade is marked failed
    pub upgrade_service_unreachable_timeout: Duration,

    /// Number of health reports the upgrade monitor queues before senders wait
    pub monitor_queue_capacity: usize,

    /// Buffered events per subscriber on the event buses
    pub event_capacity: usize,
}

impl Default for ManifestGeneratorConfig {
    fn default() -> Self {
        Self {
            default_endpoints: NodeEndpoints::default(),
            allow_single_node: true,
            upgrade_service_unreachable_timeout: Duration::from_secs(30 * 60),
            monitor_queue_capacity: 64,
            event_capacity: 100,
        }
    }
}

impl ManifestGeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the endpoint ports used for nodes without overrides.
    pub fn with_default_endpoints(mut self, endpoints: NodeEndpoints) -> Self {
        self.default_endpoints = endpoints;
        self
    }

    /// Require a real quorum (3+ seeds) even for single-node topologies.
    pub fn without_single_node(mut self) -> Self {
        self.allow_single_node = false;
        self
    }

    /// Set the upgrade coordinator unreachable timeout.
    pub fn with_unreachable_timeout(mut self, timeout: Duration) -> Self {
        self.upgrade_service_unreachable_timeout = timeout;
        self
    }

    /// Set the upgrade monitor queue capacity.
    pub fn with_monitor_queue_capacity(mut self, capacity: usize) -> Self {
        self.monitor_queue_capacity = capacity.max(1);
        self
    }
}
