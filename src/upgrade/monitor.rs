//! Upgrade Monitor
//!
//! Owns the progress of one rolling upgrade. Health reports arrive over a
//! bounded queue and are evaluated strictly one at a time; every decision is
//! published on the event bus and the latest progress on a watch channel.

use crate::config::ManifestGeneratorConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::event_bus::EventBus;
use crate::upgrade::evaluator::{Evaluation, UpgradeElapsed, UpgradeEvaluator};
use crate::upgrade::event::UpgradeEvent;
use crate::upgrade::health::HealthReport;
use crate::upgrade::state::UpgradeProgress;
use slog::{debug, info, Logger};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

enum MonitorCommand {
    Report {
        report: HealthReport,
        elapsed: UpgradeElapsed,
        callback: oneshot::Sender<ClusterResult<Evaluation>>,
    },
    Unreachable {
        at: Duration,
        callback: oneshot::Sender<ClusterResult<UpgradeProgress>>,
    },
    Reconnected {
        callback: oneshot::Sender<ClusterResult<UpgradeProgress>>,
    },
}

/// Handle to a running upgrade monitor task
pub struct UpgradeMonitor {
    sender: mpsc::Sender<MonitorCommand>,
    progress: watch::Receiver<UpgradeProgress>,
    events: EventBus<UpgradeEvent>,
    handle: JoinHandle<()>,
}

impl UpgradeMonitor {
    /// Spawn the monitor task on the current tokio runtime
    pub fn spawn(
        evaluator: UpgradeEvaluator,
        initial: UpgradeProgress,
        config: &ManifestGeneratorConfig,
        logger: Logger,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel(config.monitor_queue_capacity.max(1));
        let (progress_tx, progress) = watch::channel(initial.clone());
        let events = EventBus::new(config.event_capacity);
        let task_events = events.clone();

        info!(logger, "Upgrade monitor started";
            "state" => %initial.state, "total_domains" => initial.total_domains);

        let handle = tokio::spawn(async move {
            let mut current = initial;
            while let Some(command) = receiver.recv().await {
                match command {
                    MonitorCommand::Report {
                        report,
                        elapsed,
                        callback,
                    } => {
                        let result = evaluator.evaluate(&current, &report, elapsed);
                        if let Ok(evaluation) = &result {
                            Self::publish_evaluation(&task_events, &current, evaluation);
                            current = evaluation.next.clone();
                            let _ = progress_tx.send(current.clone());
                        }
                        let _ = callback.send(result);
                    }
                    MonitorCommand::Unreachable { at, callback } => {
                        let result = evaluator.on_coordinator_unreachable(&current, at);
                        if let Ok(next) = &result {
                            task_events.publish(UpgradeEvent::CoordinatorUnreachable {
                                resume_state: current.state,
                            });
                            current = next.clone();
                            let _ = progress_tx.send(current.clone());
                        }
                        let _ = callback.send(result);
                    }
                    MonitorCommand::Reconnected { callback } => {
                        let result = evaluator.on_coordinator_reconnected(&current);
                        if let Ok(next) = &result {
                            task_events.publish(UpgradeEvent::CoordinatorReconnected { state: next.state });
                            current = next.clone();
                            let _ = progress_tx.send(current.clone());
                        }
                        let _ = callback.send(result);
                    }
                }
            }
            debug!(logger, "Upgrade monitor stopped"; "state" => %current.state);
        });

        Self {
            sender,
            progress,
            events,
            handle,
        }
    }

    /// Queue a health report and wait for its evaluation
    pub async fn submit(&self, report: HealthReport, elapsed: UpgradeElapsed) -> ClusterResult<Evaluation> {
        let (callback, receiver) = oneshot::channel();
        self.send(MonitorCommand::Report {
            report,
            elapsed,
            callback,
        })
        .await?;
        receiver.await.map_err(|_| ClusterError::MonitorStopped)?
    }

    /// Mark the upgrade coordinator unreachable at `at` on the upgrade clock
    pub async fn coordinator_unreachable(&self, at: Duration) -> ClusterResult<UpgradeProgress> {
        let (callback, receiver) = oneshot::channel();
        self.send(MonitorCommand::Unreachable { at, callback }).await?;
        receiver.await.map_err(|_| ClusterError::MonitorStopped)?
    }

    pub async fn coordinator_reconnected(&self) -> ClusterResult<UpgradeProgress> {
        let (callback, receiver) = oneshot::channel();
        self.send(MonitorCommand::Reconnected { callback }).await?;
        receiver.await.map_err(|_| ClusterError::MonitorStopped)?
    }

    /// Latest progress
    pub fn progress(&self) -> UpgradeProgress {
        self.progress.borrow().clone()
    }

    pub fn watch_progress(&self) -> watch::Receiver<UpgradeProgress> {
        self.progress.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpgradeEvent> {
        self.events.subscribe()
    }

    /// Stop accepting reports and wait for queued ones to drain
    pub async fn shutdown(self) {
        drop(self.sender);
        let _ = self.handle.await;
    }

    async fn send(&self, command: MonitorCommand) -> ClusterResult<()> {
        self.sender
            .send(command)
            .await
            .map_err(|_| ClusterError::MonitorStopped)
    }

    fn publish_evaluation(events: &EventBus<UpgradeEvent>, before: &UpgradeProgress, evaluation: &Evaluation) {
        if let Some(ClusterError::HealthBreach(breach)) = &evaluation.cause {
            events.publish(UpgradeEvent::HealthBreached(breach.clone()));
        }
        events.publish(UpgradeEvent::Evaluated {
            state: before.state,
            action: evaluation.action,
            current_domain: before.current_domain,
        });
        if evaluation.next.state != before.state {
            events.publish(UpgradeEvent::StateChanged {
                from: before.state,
                to: evaluation.next.state,
                failure_reason: evaluation.failure_reason,
            });
        }
    }
}
