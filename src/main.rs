use clap::{Parser, Subcommand};
use cluster_manifest::{
    AdminConfig, ClusterManifest, ClusterManifestBuilder, ClusterNodeConfig, ClusterTopology,
    HealthReport, ManifestGeneratorConfig, MonotonicVersionGenerator, UpgradeElapsed,
    UpgradeProgress, UserConfig,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use slog::{info, o, Drain, Logger};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "manifestgen")]
#[command(about = "Cluster manifest generation and upgrade gating", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the next cluster manifest from a request file
    Build {
        /// JSON request: topology, user, admin and node_config
        #[arg(short, long)]
        request: PathBuf,

        /// Currently published manifest (omit when creating the cluster)
        #[arg(short, long)]
        prior: Option<PathBuf>,

        /// Where to write the manifest (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Require a three-seed quorum even for single-node topologies
        #[arg(long, default_value_t = false)]
        strict_quorum: bool,
    },

    /// Evaluate one health report against a manifest's upgrade policy
    Evaluate {
        /// Manifest being rolled out
        #[arg(short, long)]
        manifest: PathBuf,

        /// Current upgrade progress
        #[arg(short, long)]
        progress: PathBuf,

        /// Health report to evaluate
        #[arg(short, long)]
        report: PathBuf,

        /// Seconds since the upgrade started
        #[arg(long)]
        overall_secs: u64,

        /// Seconds since the current upgrade domain started
        #[arg(long)]
        domain_secs: u64,
    },
}

/// Inputs to one manifest build
#[derive(Debug, Deserialize)]
struct BuildRequest {
    topology: ClusterTopology,
    user: UserConfig,
    admin: AdminConfig,
    #[serde(default)]
    node_config: ClusterNodeConfig,
}

#[derive(Debug, Serialize)]
struct EvaluationOutput {
    action: cluster_manifest::UpgradeAction,
    failure_reason: cluster_manifest::ClusterUpgradeFailureReason,
    cause: Option<String>,
    next: UpgradeProgress,
}

fn create_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stderr());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let rendered = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => fs::write(path, rendered)?,
        None => println!("{}", rendered),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let logger = create_logger();

    match args.command {
        Command::Build {
            request,
            prior,
            output,
            strict_quorum,
        } => {
            let request: BuildRequest = read_json(&request)?;
            let prior: Option<ClusterManifest> = prior.as_deref().map(read_json::<ClusterManifest>).transpose()?;

            let mut config = ManifestGeneratorConfig::default();
            if strict_quorum {
                config = config.without_single_node();
            }
            let builder = ClusterManifestBuilder::new(
                config,
                Arc::new(MonotonicVersionGenerator::new()),
                logger.clone(),
            );

            let manifest = builder.build(
                &request.topology,
                &request.user,
                &request.admin,
                &request.node_config,
                prior.as_ref(),
            )?;
            write_json(&manifest, output.as_deref())?;
            info!(logger, "Manifest written";
                "version" => %manifest.version(),
                "upgrade_kind" => ?manifest.upgrade_kind());
        }
        Command::Evaluate {
            manifest,
            progress,
            report,
            overall_secs,
            domain_secs,
        } => {
            let manifest: ClusterManifest = read_json(&manifest)?;
            let progress: UpgradeProgress = read_json(&progress)?;
            let report: HealthReport = read_json(&report)?;

            let builder = ClusterManifestBuilder::new(
                ManifestGeneratorConfig::default(),
                Arc::new(MonotonicVersionGenerator::new()),
                logger.clone(),
            );
            let evaluation = builder.evaluator_for(&manifest).evaluate(
                &progress,
                &report,
                UpgradeElapsed::new(Duration::from_secs(overall_secs), Duration::from_secs(domain_secs)),
            )?;

            write_json(
                &EvaluationOutput {
                    action: evaluation.action,
                    failure_reason: evaluation.failure_reason,
                    cause: evaluation.cause.map(|e| e.to_string()),
                    next: evaluation.next,
                },
                None,
            )?;
        }
    }

    Ok(())
}
