use cluster_manifest::{
    AdminConfig, ClusterManifestBuilder, ClusterNodeConfig, ClusterProvisioningState,
    ClusterTopology, ClusterUpgradeFailureReason, HealthReport, ManifestGeneratorConfig,
    MonotonicVersionGenerator, NodeDescription, NodeRole, UpgradeAction, UpgradeElapsed,
    UpgradeEvent, UpgradeMonitor, UserConfig,
};
use cluster_manifest::upgrade::EntityHealthCounts;
use slog::Logger;
use std::sync::Arc;
use std::time::Duration;

fn mins(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

fn setup(total_nodes: usize) -> (ClusterManifestBuilder, cluster_manifest::ClusterManifest) {
    let builder = ClusterManifestBuilder::new(
        ManifestGeneratorConfig::default(),
        Arc::new(MonotonicVersionGenerator::new()),
        Logger::root(slog::Discard, slog::o!()),
    );
    let topology = ClusterTopology::new((0..total_nodes).map(|i| {
        NodeDescription::new(
            format!("N{}", i),
            &format!("FD{}", i % 3),
            &format!("UD{}", i % 2),
            NodeRole::Primary,
        )
        .expect("valid node")
    }))
    .expect("valid topology");
    let manifest = builder
        .build(&topology, &UserConfig::new("prod"), &AdminConfig::new("1.0"), &ClusterNodeConfig::default(), None)
        .expect("build");
    (builder, manifest)
}

#[tokio::test]
async fn test_rollout_completes_across_domains() {
    let (builder, manifest) = setup(6);
    let progress = ClusterManifestBuilder::initial_progress(
        &manifest,
        ClusterProvisioningState::UpdatingUserConfiguration,
    );
    assert_eq!(progress.total_domains, 2);

    let monitor = UpgradeMonitor::spawn(
        builder.evaluator_for(&manifest),
        progress,
        builder.config(),
        Logger::root(slog::Discard, slog::o!()),
    );
    let report = HealthReport::healthy(6, 3, 2);

    // Domain 0: first healthy report opens the stable window, second closes it
    let r = monitor.submit(report, UpgradeElapsed::new(mins(6), mins(6))).await.expect("evaluate");
    assert_eq!(r.action, UpgradeAction::Wait);
    let r = monitor.submit(report, UpgradeElapsed::new(mins(12), mins(12))).await.expect("evaluate");
    assert_eq!(r.action, UpgradeAction::Continue);

    // Domain 1
    let r = monitor.submit(report, UpgradeElapsed::new(mins(18), mins(6))).await.expect("evaluate");
    assert_eq!(r.action, UpgradeAction::Wait);
    let r = monitor.submit(report, UpgradeElapsed::new(mins(24), mins(12))).await.expect("evaluate");
    assert_eq!(r.action, UpgradeAction::Complete);
    assert_eq!(monitor.progress().state, ClusterProvisioningState::EnforcingClusterVersion);

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_health_breach_rolls_back_and_broadcasts() {
    let (builder, manifest) = setup(20);
    let monitor = UpgradeMonitor::spawn(
        builder.evaluator_for(&manifest),
        ClusterManifestBuilder::initial_progress(&manifest, ClusterProvisioningState::UpdatingInfrastructure),
        builder.config(),
        Logger::root(slog::Discard, slog::o!()),
    );
    let mut events = monitor.subscribe();
    let mut progress = monitor.watch_progress();

    let report = HealthReport {
        nodes: EntityHealthCounts::new(20, 3),
        domain_nodes: EntityHealthCounts::new(10, 3),
        ..HealthReport::healthy(20, 10, 0)
    };
    let evaluation = monitor
        .submit(report, UpgradeElapsed::new(mins(10), mins(10)))
        .await
        .expect("evaluate");

    assert_eq!(evaluation.action, UpgradeAction::RollBack);
    assert_eq!(evaluation.failure_reason, ClusterUpgradeFailureReason::HealthCheck);

    assert!(matches!(events.recv().await.expect("event"), UpgradeEvent::HealthBreached(_)));
    assert!(matches!(
        events.recv().await.expect("event"),
        UpgradeEvent::Evaluated { action: UpgradeAction::RollBack, .. }
    ));
    assert!(matches!(
        events.recv().await.expect("event"),
        UpgradeEvent::StateChanged { to: ClusterProvisioningState::EnforcingClusterVersion, .. }
    ));

    progress.changed().await.expect("progress update");
    assert_eq!(progress.borrow().failure_reason, ClusterUpgradeFailureReason::HealthCheck);
}

#[tokio::test]
async fn test_unreachable_coordinator_times_out() {
    let (builder, manifest) = setup(6);
    let monitor = UpgradeMonitor::spawn(
        builder.evaluator_for(&manifest),
        ClusterManifestBuilder::initial_progress(&manifest, ClusterProvisioningState::UpdatingUserCertificate),
        builder.config(),
        Logger::root(slog::Discard, slog::o!()),
    );

    monitor.coordinator_unreachable(mins(5)).await.expect("mark unreachable");
    let held = monitor
        .submit(HealthReport::unavailable(), UpgradeElapsed::new(mins(20), mins(20)))
        .await
        .expect("evaluate");
    assert_eq!(held.action, UpgradeAction::Wait);

    let failed = monitor
        .submit(HealthReport::unavailable(), UpgradeElapsed::new(mins(40), mins(40)))
        .await
        .expect("evaluate");
    assert_eq!(failed.action, UpgradeAction::Abort);
    assert_eq!(failed.failure_reason, ClusterUpgradeFailureReason::Interrupted);
    assert_eq!(monitor.progress().state, ClusterProvisioningState::Failed);

    // Nothing left to evaluate once failed
    assert!(monitor
        .submit(HealthReport::healthy(6, 3, 0), UpgradeElapsed::new(mins(41), mins(41)))
        .await
        .is_err());
}
