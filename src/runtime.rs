//! Manifest Runtime
//!
//! Keeps the published manifest of each cluster and serializes builds so at
//! most one build per cluster is in flight. Builds for different clusters
//! proceed independently.

use crate::cluster_config::{AdminConfig, ClusterNodeConfig, UserConfig};
use crate::error::ClusterResult;
use crate::event_bus::EventBus;
use crate::manifest::{ClusterManifest, ClusterManifestBuilder, ManifestVersion, UpgradeKind};
use crate::topology::ClusterTopology;
use serde::{Deserialize, Serialize};
use slog::{info, warn, Logger};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Events emitted by the ManifestRuntime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ManifestEvent {
    /// A new manifest was published
    Published {
        cluster_name: String,
        version: ManifestVersion,
        upgrade_kind: UpgradeKind,
    },

    /// A build failed; the published manifest is unchanged
    BuildFailed { cluster_name: String, error: String },
}

type ManifestSlot = Arc<Mutex<Option<Arc<ClusterManifest>>>>;

/// Single-writer store of published manifests
pub struct ManifestRuntime {
    /// Builder shared by every cluster
    builder: Arc<ClusterManifestBuilder>,

    /// One slot per cluster; holding a slot's lock is the right to build
    slots: Mutex<HashMap<String, ManifestSlot>>,

    /// Event bus for manifest notifications
    event_bus: EventBus<ManifestEvent>,

    logger: Logger,
}

impl ManifestRuntime {
    /// Create a new runtime
    ///
    /// # Arguments
    /// * `builder` - Manifest builder
    /// * `logger` - Logger instance
    pub fn new(builder: Arc<ClusterManifestBuilder>, logger: Logger) -> Self {
        let event_bus = EventBus::new(builder.config().event_capacity);
        Self {
            builder,
            slots: Mutex::new(HashMap::new()),
            event_bus,
            logger,
        }
    }

    /// Build and publish the next manifest for `user.cluster_name`
    ///
    /// Waits for any build already running for the same cluster. On failure
    /// the published manifest stays as it was.
    pub async fn build(
        &self,
        topology: &ClusterTopology,
        user: &UserConfig,
        admin: &AdminConfig,
        node_config: &ClusterNodeConfig,
    ) -> ClusterResult<Arc<ClusterManifest>> {
        let slot = self.slot(&user.cluster_name).await;
        let mut published = slot.lock().await;

        match self
            .builder
            .build(topology, user, admin, node_config, published.as_deref())
        {
            Ok(manifest) => {
                let manifest = Arc::new(manifest);
                *published = Some(manifest.clone());
                info!(self.logger, "Published manifest";
                    "cluster" => &user.cluster_name, "version" => %manifest.version());
                self.event_bus.publish(ManifestEvent::Published {
                    cluster_name: user.cluster_name.clone(),
                    version: manifest.version(),
                    upgrade_kind: manifest.upgrade_kind(),
                });
                Ok(manifest)
            }
            Err(e) => {
                warn!(self.logger, "Manifest build failed";
                    "cluster" => &user.cluster_name, "error" => %e);
                self.event_bus.publish(ManifestEvent::BuildFailed {
                    cluster_name: user.cluster_name.clone(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Install an already-published manifest (e.g. loaded from storage)
    pub async fn restore(&self, manifest: ClusterManifest) {
        let slot = self.slot(manifest.cluster_name()).await;
        let mut published = slot.lock().await;
        info!(self.logger, "Restored manifest";
            "cluster" => manifest.cluster_name(), "version" => %manifest.version());
        *published = Some(Arc::new(manifest));
    }

    /// The manifest currently published for a cluster
    pub async fn current(&self, cluster_name: &str) -> Option<Arc<ClusterManifest>> {
        let slot = self.slots.lock().await.get(cluster_name).cloned()?;
        let published = slot.lock().await;
        published.clone()
    }

    /// Drop a deleted cluster's slot and return its last published manifest
    ///
    /// Waits for an in-flight build of the cluster to finish first. A build
    /// started after this call begins from an empty slot.
    pub async fn forget(&self, cluster_name: &str) -> Option<Arc<ClusterManifest>> {
        let slot = self.slots.lock().await.remove(cluster_name)?;
        let mut published = slot.lock().await;
        info!(self.logger, "Forgot cluster"; "cluster" => cluster_name);
        published.take()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManifestEvent> {
        self.event_bus.subscribe()
    }

    pub fn builder(&self) -> &Arc<ClusterManifestBuilder> {
        &self.builder
    }

    async fn slot(&self, cluster_name: &str) -> ManifestSlot {
        let mut slots = self.slots.lock().await;
        slots
            .entry(cluster_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}
