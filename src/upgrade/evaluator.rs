//! Upgrade Policy Evaluator
//!
//! Decides, one health report at a time, whether a rolling upgrade moves to
//! the next domain, holds, rolls back or fails. Pure given the elapsed times
//! it is handed; it never sleeps or polls.

use crate::error::{ClusterError, ClusterResult};
use crate::upgrade::health::HealthReport;
use crate::upgrade::policy::ClusterUpgradePolicy;
use crate::upgrade::state::{ClusterProvisioningState, ClusterUpgradeFailureReason, UpgradeProgress};
use serde::{Deserialize, Serialize};
use slog::{debug, info, warn, Logger};
use std::time::Duration;

/// Decision taken for one health report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpgradeAction {
    /// Current domain is done; proceed to the next one
    Continue,
    /// Hold the current domain and evaluate again later
    Wait,
    /// Re-enforce the prior manifest
    RollBack,
    /// Stop; the cluster is failed
    Abort,
    /// Last domain finished; the phase is complete
    Complete,
}

/// Time spent so far in the upgrade and in the current domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpgradeElapsed {
    pub overall: Duration,
    pub domain: Duration,
}

impl UpgradeElapsed {
    pub fn new(overall: Duration, domain: Duration) -> Self {
        Self { overall, domain }
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub next: UpgradeProgress,
    pub action: UpgradeAction,
    pub failure_reason: ClusterUpgradeFailureReason,
    /// Timeout or breach behind the decision; breaches are reported here even
    /// when the upgrade is allowed to proceed
    pub cause: Option<ClusterError>,
}

/// Applies an upgrade policy to health reports
#[derive(Clone)]
pub struct UpgradeEvaluator {
    policy: ClusterUpgradePolicy,
    override_policy: Option<ClusterUpgradePolicy>,
    unreachable_timeout: Duration,
    logger: Logger,
}

impl UpgradeEvaluator {
    /// Create an evaluator
    ///
    /// # Arguments
    /// * `policy` - The user's upgrade policy
    /// * `override_policy` - Admin policy consulted when the user policy is breached
    /// * `unreachable_timeout` - How long the coordinator may be unreachable
    /// * `logger` - Logger instance
    pub fn new(
        policy: ClusterUpgradePolicy,
        override_policy: Option<ClusterUpgradePolicy>,
        unreachable_timeout: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            policy,
            override_policy,
            unreachable_timeout,
            logger,
        }
    }

    pub fn policy(&self) -> &ClusterUpgradePolicy {
        &self.policy
    }

    /// Evaluate a health report against the upgrade policy
    ///
    /// Checks run in order: coordinator unreachable timeout, overall timeout,
    /// domain timeout, health-check wait window, report availability, health
    /// thresholds, and finally the stability window.
    pub fn evaluate(
        &self,
        progress: &UpgradeProgress,
        report: &HealthReport,
        elapsed: UpgradeElapsed,
    ) -> ClusterResult<Evaluation> {
        if progress.state == ClusterProvisioningState::UpgradeServiceUnreachable {
            return self.evaluate_unreachable(progress, elapsed);
        }
        if !progress.state.is_in_progress() {
            return Err(ClusterError::validation(
                "upgrade.state",
                format!("no upgrade in progress in state {}", progress.state),
            ));
        }

        let policy = &self.policy;

        if elapsed.overall > policy.upgrade_timeout {
            return self.fail(
                progress,
                ClusterUpgradeFailureReason::OverallUpgradeTimeout,
                ClusterError::Timeout {
                    reason: ClusterUpgradeFailureReason::OverallUpgradeTimeout,
                    elapsed: elapsed.overall,
                    limit: policy.upgrade_timeout,
                },
            );
        }

        if elapsed.domain > policy.upgrade_domain_timeout {
            return self.fail(
                progress,
                ClusterUpgradeFailureReason::UpgradeDomainTimeout,
                ClusterError::Timeout {
                    reason: ClusterUpgradeFailureReason::UpgradeDomainTimeout,
                    elapsed: elapsed.domain,
                    limit: policy.upgrade_domain_timeout,
                },
            );
        }

        if elapsed.domain < policy.health_check_wait_duration {
            debug!(self.logger, "Inside health check wait window";
                "domain" => progress.current_domain, "elapsed" => ?elapsed.domain);
            return Ok(Self::hold(progress, None, None));
        }

        if !report.evaluated {
            let retrying = elapsed.domain.saturating_sub(policy.health_check_wait_duration);
            if retrying > policy.health_check_retry_timeout {
                return self.fail(
                    progress,
                    ClusterUpgradeFailureReason::HealthCheck,
                    ClusterError::Timeout {
                        reason: ClusterUpgradeFailureReason::HealthCheck,
                        elapsed: retrying,
                        limit: policy.health_check_retry_timeout,
                    },
                );
            }
            debug!(self.logger, "Health report unavailable, retrying";
                "domain" => progress.current_domain);
            return Ok(Self::hold(progress, None, None));
        }

        let mut reported = None;
        if let Some(breach) = report.first_breach(&policy.health_policy, &policy.delta_health_policy) {
            warn!(self.logger, "Upgrade health policy breached";
                "state" => %progress.state,
                "domain" => progress.current_domain,
                "breach" => %breach);

            let tolerated = if let Some(override_policy) = &self.override_policy {
                let override_breach = report.first_breach(
                    &override_policy.health_policy,
                    &override_policy.delta_health_policy,
                );
                override_breach.is_none() || override_policy.force_restart
            } else {
                policy.force_restart
            };

            if !tolerated {
                return self.fail(
                    progress,
                    ClusterUpgradeFailureReason::HealthCheck,
                    ClusterError::HealthBreach(breach),
                );
            }
            info!(self.logger, "Proceeding despite health breach";
                "override" => self.override_policy.is_some());
            reported = Some(ClusterError::HealthBreach(breach));
        }

        // Stability window
        let healthy_since = progress.healthy_since.unwrap_or(elapsed.overall);
        let stable_for = elapsed.overall.saturating_sub(healthy_since);
        if stable_for < policy.health_check_stable_duration {
            return Ok(Self::hold(progress, Some(healthy_since), reported));
        }

        let mut next = progress.clone();
        next.healthy_since = None;

        if progress.is_last_domain() {
            let target = match progress.state {
                ClusterProvisioningState::EnforcingClusterVersion
                | ClusterProvisioningState::AutoScale
                | ClusterProvisioningState::ScaleUp
                | ClusterProvisioningState::ScaleDown => ClusterProvisioningState::Ready,
                _ => ClusterProvisioningState::EnforcingClusterVersion,
            };
            next.state = progress.state.transition_to(target)?;
            next.current_domain = 0;
            info!(self.logger, "Upgrade phase complete";
                "from" => %progress.state, "to" => %next.state);
            return Ok(Evaluation {
                next,
                action: UpgradeAction::Complete,
                failure_reason: progress.failure_reason,
                cause: reported,
            });
        }

        next.current_domain += 1;
        info!(self.logger, "Upgrade domain complete, continuing";
            "state" => %progress.state,
            "completed" => progress.current_domain,
            "total" => progress.total_domains);
        Ok(Evaluation {
            next,
            action: UpgradeAction::Continue,
            failure_reason: progress.failure_reason,
            cause: reported,
        })
    }

    /// Record that the upgrade coordinator stopped answering at `at`
    pub fn on_coordinator_unreachable(
        &self,
        progress: &UpgradeProgress,
        at: Duration,
    ) -> ClusterResult<UpgradeProgress> {
        let state = progress
            .state
            .transition_to(ClusterProvisioningState::UpgradeServiceUnreachable)?;
        warn!(self.logger, "Upgrade coordinator unreachable"; "resume_state" => %progress.state);
        Ok(UpgradeProgress {
            state,
            resume_state: Some(progress.state),
            unreachable_since: Some(at),
            ..progress.clone()
        })
    }

    /// Return to the interrupted state once the coordinator answers again
    pub fn on_coordinator_reconnected(&self, progress: &UpgradeProgress) -> ClusterResult<UpgradeProgress> {
        let resume = progress.resume_state.ok_or_else(|| {
            ClusterError::validation("upgrade.resume_state", "coordinator was not marked unreachable")
        })?;
        let state = progress.state.transition_to(resume)?;
        info!(self.logger, "Upgrade coordinator reconnected"; "state" => %state);
        Ok(UpgradeProgress {
            state,
            resume_state: None,
            unreachable_since: None,
            ..progress.clone()
        })
    }

    fn evaluate_unreachable(
        &self,
        progress: &UpgradeProgress,
        elapsed: UpgradeElapsed,
    ) -> ClusterResult<Evaluation> {
        let since = progress.unreachable_since.unwrap_or(elapsed.overall);
        let unreachable_for = elapsed.overall.saturating_sub(since);
        if unreachable_for < self.unreachable_timeout {
            return Ok(Self::hold(progress, progress.healthy_since, None));
        }

        let reason = ClusterUpgradeFailureReason::Interrupted;
        let next = UpgradeProgress {
            state: progress.state.transition_to(ClusterProvisioningState::Failed)?,
            resume_state: None,
            failure_reason: reason,
            ..progress.clone()
        };
        warn!(self.logger, "Upgrade coordinator unreachable past timeout, failing cluster";
            "unreachable_for" => ?unreachable_for);
        Ok(Evaluation {
            next,
            action: UpgradeAction::Abort,
            failure_reason: reason,
            cause: Some(ClusterError::Timeout {
                reason,
                elapsed: unreachable_for,
                limit: self.unreachable_timeout,
            }),
        })
    }

    /// Roll back, or abort when there is nothing to roll back to
    fn fail(
        &self,
        progress: &UpgradeProgress,
        reason: ClusterUpgradeFailureReason,
        cause: ClusterError,
    ) -> ClusterResult<Evaluation> {
        let can_roll_back = !matches!(
            progress.state,
            ClusterProvisioningState::BaselineUpgrade | ClusterProvisioningState::EnforcingClusterVersion
        );

        let (action, target) = if can_roll_back {
            (UpgradeAction::RollBack, ClusterProvisioningState::EnforcingClusterVersion)
        } else {
            (UpgradeAction::Abort, ClusterProvisioningState::Failed)
        };

        warn!(self.logger, "Upgrade failed";
            "state" => %progress.state,
            "domain" => progress.current_domain,
            "reason" => %reason,
            "action" => ?action,
            "cause" => %cause);

        let next = UpgradeProgress {
            state: progress.state.transition_to(target)?,
            resume_state: None,
            current_domain: 0,
            healthy_since: None,
            unreachable_since: None,
            failure_reason: reason,
            total_domains: progress.total_domains,
        };
        Ok(Evaluation {
            next,
            action,
            failure_reason: reason,
            cause: Some(cause),
        })
    }

    fn hold(
        progress: &UpgradeProgress,
        healthy_since: Option<Duration>,
        cause: Option<ClusterError>,
    ) -> Evaluation {
        Evaluation {
            next: UpgradeProgress {
                healthy_since,
                ..progress.clone()
            },
            action: UpgradeAction::Wait,
            failure_reason: progress.failure_reason,
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upgrade::health::{EntityHealthCounts, HealthScope};

    const MIN: u64 = 60;

    fn evaluator(policy: ClusterUpgradePolicy) -> UpgradeEvaluator {
        UpgradeEvaluator::new(
            policy,
            None,
            Duration::from_secs(30 * MIN),
            Logger::root(slog::Discard, slog::o!()),
        )
    }

    fn mins(m: u64) -> Duration {
        Duration::from_secs(m * MIN)
    }

    fn updating(total_domains: usize) -> UpgradeProgress {
        UpgradeProgress::start(ClusterProvisioningState::UpdatingUserConfiguration, total_domains)
    }

    fn unhealthy_percent_report() -> HealthReport {
        // 3 of 20 nodes unhealthy in the domain being upgraded: 15%
        HealthReport {
            nodes: EntityHealthCounts::new(20, 3),
            domain_nodes: EntityHealthCounts::new(20, 3),
            ..HealthReport::healthy(20, 20, 5)
        }
    }

    #[test]
    fn test_fifteen_percent_unhealthy_rolls_back() {
        let eval = evaluator(ClusterUpgradePolicy::default());
        let result = eval
            .evaluate(&updating(3), &unhealthy_percent_report(), UpgradeElapsed::new(mins(20), mins(10)))
            .unwrap();

        assert_eq!(result.action, UpgradeAction::RollBack);
        assert_eq!(result.failure_reason, ClusterUpgradeFailureReason::HealthCheck);
        assert_eq!(result.next.state, ClusterProvisioningState::EnforcingClusterVersion);
        match result.cause {
            Some(ClusterError::HealthBreach(breach)) => {
                assert_eq!(breach.scope, HealthScope::DeltaNodes);
                assert_eq!(breach.observed_percent, 15.0);
            }
            other => panic!("unexpected cause: {:?}", other),
        }
    }

    #[test]
    fn test_domain_timeout_rolls_back_even_when_healthy() {
        let eval = evaluator(ClusterUpgradePolicy::default());
        let result = eval
            .evaluate(
                &updating(3),
                &HealthReport::healthy(20, 5, 5),
                UpgradeElapsed::new(mins(200), mins(121)),
            )
            .unwrap();

        assert_eq!(result.action, UpgradeAction::RollBack);
        assert_eq!(result.failure_reason, ClusterUpgradeFailureReason::UpgradeDomainTimeout);
        assert!(matches!(result.cause, Some(ClusterError::Timeout { .. })));
    }

    #[test]
    fn test_overall_timeout_checked_before_domain_timeout() {
        let eval = evaluator(ClusterUpgradePolicy::default());
        let result = eval
            .evaluate(
                &updating(3),
                &HealthReport::healthy(20, 5, 5),
                UpgradeElapsed::new(mins(13 * 60), mins(121)),
            )
            .unwrap();
        assert_eq!(result.failure_reason, ClusterUpgradeFailureReason::OverallUpgradeTimeout);
    }

    #[test]
    fn test_baseline_failure_aborts() {
        let eval = evaluator(ClusterUpgradePolicy::default());
        let progress = UpgradeProgress::start(ClusterProvisioningState::BaselineUpgrade, 3);
        let result = eval
            .evaluate(&progress, &unhealthy_percent_report(), UpgradeElapsed::new(mins(20), mins(10)))
            .unwrap();

        assert_eq!(result.action, UpgradeAction::Abort);
        assert_eq!(result.next.state, ClusterProvisioningState::Failed);
    }

    #[test]
    fn test_stability_window_before_continue() {
        let eval = evaluator(ClusterUpgradePolicy::default());
        let report = HealthReport::healthy(20, 5, 5);

        // Inside the wait window
        let waiting = eval
            .evaluate(&updating(3), &report, UpgradeElapsed::new(mins(2), mins(2)))
            .unwrap();
        assert_eq!(waiting.action, UpgradeAction::Wait);
        assert_eq!(waiting.next.healthy_since, None);

        // First healthy report starts the stable window
        let first = eval
            .evaluate(&waiting.next, &report, UpgradeElapsed::new(mins(6), mins(6)))
            .unwrap();
        assert_eq!(first.action, UpgradeAction::Wait);
        assert_eq!(first.next.healthy_since, Some(mins(6)));

        let still = eval
            .evaluate(&first.next, &report, UpgradeElapsed::new(mins(9), mins(9)))
            .unwrap();
        assert_eq!(still.action, UpgradeAction::Wait);

        let done = eval
            .evaluate(&still.next, &report, UpgradeElapsed::new(mins(11), mins(11)))
            .unwrap();
        assert_eq!(done.action, UpgradeAction::Continue);
        assert_eq!(done.next.current_domain, 1);
        assert_eq!(done.next.healthy_since, None);
    }

    #[test]
    fn test_last_domain_completes_phase() {
        let eval = evaluator(ClusterUpgradePolicy::default());
        let report = HealthReport::healthy(20, 5, 5);

        let mut progress = updating(1);
        progress.healthy_since = Some(mins(1));
        let result = eval
            .evaluate(&progress, &report, UpgradeElapsed::new(mins(10), mins(10)))
            .unwrap();
        assert_eq!(result.action, UpgradeAction::Complete);
        assert_eq!(result.next.state, ClusterProvisioningState::EnforcingClusterVersion);

        let mut enforcing = result.next.clone();
        enforcing.healthy_since = Some(mins(10));
        let result = eval
            .evaluate(&enforcing, &report, UpgradeElapsed::new(mins(20), mins(10)))
            .unwrap();
        assert_eq!(result.action, UpgradeAction::Complete);
        assert_eq!(result.next.state, ClusterProvisioningState::Ready);
    }

    #[test]
    fn test_force_restart_proceeds_and_reports_breach() {
        let policy = ClusterUpgradePolicy {
            force_restart: true,
            ..ClusterUpgradePolicy::default()
        };
        let eval = evaluator(policy);
        let result = eval
            .evaluate(&updating(3), &unhealthy_percent_report(), UpgradeElapsed::new(mins(20), mins(10)))
            .unwrap();

        assert_eq!(result.action, UpgradeAction::Wait);
        assert!(matches!(result.cause, Some(ClusterError::HealthBreach(_))));
    }

    #[test]
    fn test_admin_override_policy_decides_breach() {
        let mut lenient = ClusterUpgradePolicy::default();
        lenient.delta_health_policy.max_percent_delta_unhealthy_nodes = 20;
        lenient.delta_health_policy.max_percent_upgrade_domain_delta_unhealthy_nodes = 20;

        let eval = UpgradeEvaluator::new(
            ClusterUpgradePolicy::default(),
            Some(lenient),
            mins(30),
            Logger::root(slog::Discard, slog::o!()),
        );
        let result = eval
            .evaluate(&updating(3), &unhealthy_percent_report(), UpgradeElapsed::new(mins(20), mins(10)))
            .unwrap();
        assert_eq!(result.action, UpgradeAction::Wait);

        let strict = UpgradeEvaluator::new(
            ClusterUpgradePolicy::default(),
            Some(ClusterUpgradePolicy::default()),
            mins(30),
            Logger::root(slog::Discard, slog::o!()),
        );
        let result = strict
            .evaluate(&updating(3), &unhealthy_percent_report(), UpgradeElapsed::new(mins(20), mins(10)))
            .unwrap();
        assert_eq!(result.action, UpgradeAction::RollBack);
    }

    #[test]
    fn test_missing_report_retries_then_fails() {
        let eval = evaluator(ClusterUpgradePolicy::default());
        let retry = eval
            .evaluate(&updating(3), &HealthReport::unavailable(), UpgradeElapsed::new(mins(30), mins(30)))
            .unwrap();
        assert_eq!(retry.action, UpgradeAction::Wait);

        let failed = eval
            .evaluate(&updating(3), &HealthReport::unavailable(), UpgradeElapsed::new(mins(60), mins(51)))
            .unwrap();
        assert_eq!(failed.action, UpgradeAction::RollBack);
        assert_eq!(failed.failure_reason, ClusterUpgradeFailureReason::HealthCheck);
    }

    #[test]
    fn test_unreachable_coordinator() {
        let eval = evaluator(ClusterUpgradePolicy::default());
        let progress = updating(3);

        let unreachable = eval.on_coordinator_unreachable(&progress, mins(10)).unwrap();
        assert_eq!(unreachable.state, ClusterProvisioningState::UpgradeServiceUnreachable);

        let held = eval
            .evaluate(&unreachable, &HealthReport::unavailable(), UpgradeElapsed::new(mins(20), mins(20)))
            .unwrap();
        assert_eq!(held.action, UpgradeAction::Wait);

        let resumed = eval.on_coordinator_reconnected(&held.next).unwrap();
        assert_eq!(resumed.state, ClusterProvisioningState::UpdatingUserConfiguration);
        assert_eq!(resumed.unreachable_since, None);

        let failed = eval
            .evaluate(&unreachable, &HealthReport::unavailable(), UpgradeElapsed::new(mins(41), mins(41)))
            .unwrap();
        assert_eq!(failed.action, UpgradeAction::Abort);
        assert_eq!(failed.next.state, ClusterProvisioningState::Failed);
        assert_eq!(failed.failure_reason, ClusterUpgradeFailureReason::Interrupted);
    }

    #[test]
    fn test_evaluate_outside_upgrade_is_rejected() {
        let eval = evaluator(ClusterUpgradePolicy::default());
        let progress = UpgradeProgress::start(ClusterProvisioningState::Ready, 0);
        assert!(eval
            .evaluate(&progress, &HealthReport::healthy(3, 1, 0), UpgradeElapsed::default())
            .is_err());
    }
}
