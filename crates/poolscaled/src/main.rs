//! poolscaled — the poolscale daemon.
//!
//! Reads worker snapshots exported by the membership directory, runs the
//! scaling engine on a fixed interval, and forwards its decisions to the
//! provisioner gateway.
//!
//! # Usage
//!
//! ```text
//! poolscaled run --config /etc/poolscale/poolscale.toml
//! poolscaled evaluate --config poolscale.toml --snapshot workers.json
//! ```

mod directory;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;

use poolscale_core::{parse_interval, PoolscaleConfig};
use poolscale_engine::{DryRunGateway, ScalingEngine, ScalingLoop};

use crate::directory::JsonFileDirectory;

const DEFAULT_LOG_FILTER: &str =
    "info,poolscaled=debug,poolscale_core=debug,poolscale_engine=debug";

#[derive(Parser)]
#[command(name = "poolscaled", about = "poolscale worker autoscaler daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scaling loop until interrupted.
    Run {
        /// Path to poolscale.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Decision interval (e.g. "30s"); overrides `loop.interval`.
        #[arg(long)]
        interval: Option<String>,

        /// Worker snapshot JSON file; overrides `loop.snapshot_path`.
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Run a single decision cycle and print what it would do.
    Evaluate {
        /// Path to poolscale.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Worker snapshot JSON file.
        #[arg(long)]
        snapshot: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            interval,
            snapshot,
        } => run(config.as_deref(), interval.as_deref(), snapshot).await,
        Command::Evaluate { config, snapshot } => evaluate(config.as_deref(), snapshot),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(
    config_path: Option<&Path>,
    interval: Option<&str>,
    snapshot: Option<PathBuf>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    let interval = resolve_interval(&config, interval)?;
    let snapshot_path = snapshot
        .or_else(|| config.snapshot_path().map(Path::to_path_buf))
        .context("no snapshot file: pass --snapshot or set loop.snapshot_path")?;

    let engine = Arc::new(build_engine(&config)?);
    let policy = engine.policy();
    info!(
        min_workers = policy.min_workers(),
        idle_threshold_ms = policy.idle_termination_threshold().as_millis() as u64,
        snapshot = ?snapshot_path,
        "poolscale daemon starting"
    );

    let scaling = Arc::new(ScalingLoop::new(engine, JsonFileDirectory::new(snapshot_path)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = tokio::spawn(scaling.run(interval, shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("install Ctrl-C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;

    info!("poolscale daemon stopped");
    Ok(())
}

fn evaluate(config_path: Option<&Path>, snapshot: PathBuf) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let engine = Arc::new(build_engine(&config)?);
    let scaling = ScalingLoop::new(engine, JsonFileDirectory::new(snapshot));

    let report = scaling.tick()?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// `--interval` wins over `loop.interval`.
fn resolve_interval(config: &PoolscaleConfig, flag: Option<&str>) -> anyhow::Result<Duration> {
    let interval = match flag {
        Some(s) => parse_interval("--interval", s)?,
        None => config.loop_interval()?,
    };
    Ok(interval)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PoolscaleConfig> {
    match path {
        Some(path) => PoolscaleConfig::from_file(path)
            .with_context(|| format!("load config {}", path.display())),
        None => Ok(PoolscaleConfig::default()),
    }
}

/// Build an engine backed by the dry-run gateway.
fn build_engine(config: &PoolscaleConfig) -> anyhow::Result<ScalingEngine> {
    let policy = config.scaling_policy()?;
    let mut engine = ScalingEngine::new(policy, Arc::new(DryRunGateway::new()));
    if let Some(after) = config.pending_alert_after()? {
        engine = engine.with_pending_alert_after(after);
    }
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    use poolscale_engine::CycleOutcome;

    #[test]
    fn cli_parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "poolscaled",
            "run",
            "--config",
            "/etc/poolscale.toml",
            "--interval",
            "15s",
        ])
        .unwrap();

        match cli.command {
            Command::Run { config, interval, snapshot } => {
                assert_eq!(config, Some(PathBuf::from("/etc/poolscale.toml")));
                assert_eq!(interval.as_deref(), Some("15s"));
                assert!(snapshot.is_none());
            }
            Command::Evaluate { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn zero_interval_flag_is_rejected() {
        let config = PoolscaleConfig::default();

        assert!(resolve_interval(&config, Some("0s")).is_err());
        assert!(resolve_interval(&config, Some("9999999999999999999h")).is_err());
        assert_eq!(
            resolve_interval(&config, Some("15s")).unwrap(),
            Duration::from_secs(15)
        );
        assert_eq!(
            resolve_interval(&config, None).unwrap(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn default_log_filter_covers_every_crate() {
        let filter: tracing_subscriber::EnvFilter = DEFAULT_LOG_FILTER.parse().unwrap();
        let rendered = filter.to_string();

        for target in ["poolscaled", "poolscale_core", "poolscale_engine"] {
            assert!(rendered.contains(&format!("{target}=debug")), "{rendered}");
        }
    }

    #[test]
    fn evaluate_requires_snapshot() {
        assert!(Cli::try_parse_from(["poolscaled", "evaluate"]).is_err());
    }

    #[test]
    fn build_engine_applies_policy() {
        let config = PoolscaleConfig::from_toml_str(
            "[policy]\nmin_workers = 4\nidle_termination_threshold = \"2m\"\n",
        )
        .unwrap();
        let engine = build_engine(&config).unwrap();

        assert_eq!(engine.policy().min_workers(), 4);
        assert_eq!(
            engine.policy().idle_termination_threshold(),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn build_engine_rejects_bad_alert_duration() {
        let config =
            PoolscaleConfig::from_toml_str("[engine]\npending_alert_after = \"never\"\n").unwrap();
        assert!(build_engine(&config).is_err());
    }

    #[test]
    fn single_cycle_against_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = dir.path().join("workers.json");
        std::fs::write(
            &snapshot,
            r#"[{"id": "w-1", "at_capacity": true}, {"id": "w-2", "at_capacity": true}]"#,
        )
        .unwrap();
        let config =
            PoolscaleConfig::from_toml_str("[policy]\nmin_workers = 2\n").unwrap();

        let engine = Arc::new(build_engine(&config).unwrap());
        let scaling = ScalingLoop::new(engine, JsonFileDirectory::new(&snapshot));
        let report = scaling.tick().unwrap();

        assert_eq!(report.workers, 2);
        assert!(matches!(report.provision, CycleOutcome::Requested { .. }));
        assert_eq!(report.terminate, CycleOutcome::NoAction);
    }
}
