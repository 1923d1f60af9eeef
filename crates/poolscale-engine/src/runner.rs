//! ScalingLoop — periodic driver for the scaling engine.
//!
//! Every tick reads one snapshot from the membership directory and runs
//! both decisions against it. Failures are logged and the loop carries on;
//! the next tick is the retry.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

use poolscale_core::WorkerSnapshot;

use crate::engine::{ScaleAction, ScalingEngine};
use crate::error::ScalingResult;

/// Source of worker snapshots (the cluster's membership directory).
pub trait WorkerDirectory: Send + Sync {
    /// One consistent read of every registered worker.
    fn snapshot(&self) -> anyhow::Result<WorkerSnapshot>;
}

/// What one decision did during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    NoAction,
    Requested { request: ScaleAction },
    Failed { error: String },
}

impl From<ScalingResult<Option<ScaleAction>>> for CycleOutcome {
    fn from(result: ScalingResult<Option<ScaleAction>>) -> Self {
        match result {
            Ok(None) => CycleOutcome::NoAction,
            Ok(Some(request)) => CycleOutcome::Requested { request },
            Err(e) => CycleOutcome::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Outcome of a single decision cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Number of workers in the snapshot the cycle ran against.
    pub workers: usize,
    pub provision: CycleOutcome,
    pub terminate: CycleOutcome,
}

/// Runs the engine against fresh snapshots on a fixed interval.
pub struct ScalingLoop<D> {
    engine: Arc<ScalingEngine>,
    directory: D,
}

impl<D: WorkerDirectory> ScalingLoop<D> {
    pub fn new(engine: Arc<ScalingEngine>, directory: D) -> Self {
        Self { engine, directory }
    }

    pub fn engine(&self) -> &Arc<ScalingEngine> {
        &self.engine
    }

    /// Run one decision cycle.
    ///
    /// Only a failed directory read is returned as an error; gateway
    /// failures are reported in the [`CycleReport`].
    pub fn tick(&self) -> anyhow::Result<CycleReport> {
        let snapshot = self.directory.snapshot()?;

        let provision = CycleOutcome::from(self.engine.provision_if_needed(&snapshot));
        let terminate = CycleOutcome::from(self.engine.terminate_if_needed(&snapshot));

        Ok(CycleReport {
            workers: snapshot.len(),
            provision,
            terminate,
        })
    }
}

impl<D: WorkerDirectory + 'static> ScalingLoop<D> {
    /// Run the decision loop until `shutdown` flips.
    ///
    /// Each tick runs on the blocking pool, since directory reads and
    /// gateway calls are synchronous.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "scaling loop started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let this = Arc::clone(&self);
                    match tokio::task::spawn_blocking(move || this.tick()).await {
                        Ok(Ok(report)) => log_report(&report),
                        Ok(Err(e)) => error!(error = %e, "failed to read worker snapshot"),
                        Err(e) => error!(error = %e, "decision cycle panicked"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("scaling loop shutting down");
                    break;
                }
            }
        }

        let status = self.engine.status();
        if status.provisioning.is_some() || status.terminating.is_some() {
            warn!(?status, "stopped with actions still pending");
        }
    }
}

fn log_report(report: &CycleReport) {
    for outcome in [&report.provision, &report.terminate] {
        if let CycleOutcome::Failed { error } = outcome {
            warn!(workers = report.workers, %error, "scaling decision failed, retrying next cycle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use poolscale_core::{ScalingPolicy, Worker};

    use crate::gateway::DryRunGateway;

    /// Directory that serves whatever snapshot was last stored.
    #[derive(Default)]
    struct SharedDirectory {
        current: Mutex<Option<WorkerSnapshot>>,
    }

    impl SharedDirectory {
        fn set(&self, workers: Vec<Worker>) {
            *self.current.lock().unwrap() = Some(workers.into());
        }
    }

    impl WorkerDirectory for Arc<SharedDirectory> {
        fn snapshot(&self) -> anyhow::Result<WorkerSnapshot> {
            self.current
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| anyhow::anyhow!("directory unavailable"))
        }
    }

    fn scaling_loop(
        gateway: DryRunGateway,
        min_workers: u32,
    ) -> (ScalingLoop<Arc<SharedDirectory>>, Arc<SharedDirectory>) {
        let policy = ScalingPolicy::new(min_workers, Duration::from_secs(3600));
        let engine = Arc::new(ScalingEngine::new(policy, Arc::new(gateway)));
        let directory = Arc::new(SharedDirectory::default());
        (ScalingLoop::new(engine, directory.clone()), directory)
    }

    #[test]
    fn tick_runs_both_decisions() {
        let (scaling, directory) = scaling_loop(DryRunGateway::new(), 0);
        directory.set(vec![Worker::new("a").at_capacity()]);

        let report = scaling.tick().unwrap();
        assert_eq!(report.workers, 1);
        assert_eq!(
            report.provision,
            CycleOutcome::Requested {
                request: ScaleAction::Provision { worker_id: "dry-run-1".to_string() }
            }
        );
        // Never completed a task, so it is past any threshold.
        assert_eq!(
            report.terminate,
            CycleOutcome::Requested {
                request: ScaleAction::Terminate { worker_id: "a".to_string() }
            }
        );
    }

    #[test]
    fn tick_reports_gateway_failures() {
        let (scaling, directory) = scaling_loop(DryRunGateway::rejecting("quota"), 1);
        directory.set(vec![Worker::new("a").at_capacity()]);

        let report = scaling.tick().unwrap();
        assert!(matches!(report.provision, CycleOutcome::Failed { ref error } if error.contains("quota")));
        assert_eq!(report.terminate, CycleOutcome::NoAction);
    }

    #[test]
    fn tick_fails_when_directory_is_unavailable() {
        let (scaling, _directory) = scaling_loop(DryRunGateway::new(), 0);
        assert!(scaling.tick().is_err());
    }

    #[test]
    fn report_serializes_outcomes() {
        let report = CycleReport {
            workers: 3,
            provision: CycleOutcome::NoAction,
            terminate: CycleOutcome::Requested {
                request: ScaleAction::Terminate { worker_id: "w-1".to_string() },
            },
        };
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["provision"]["outcome"], "no_action");
        assert_eq!(json["terminate"]["outcome"], "requested");
        assert_eq!(json["terminate"]["request"]["worker_id"], "w-1");
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let (scaling, directory) = scaling_loop(DryRunGateway::new(), 0);
        directory.set(vec![Worker::new("a").at_capacity()]);
        let scaling = Arc::new(scaling);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scaling.clone().run(Duration::from_secs(1), shutdown_rx));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        // One tick ran: the provision is pending.
        let status = scaling.engine().status();
        assert_eq!(status.provisioning.unwrap().worker_id, "dry-run-1");
    }

    #[tokio::test(start_paused = true)]
    async fn run_keeps_going_after_directory_failure() {
        let (scaling, directory) = scaling_loop(DryRunGateway::new(), 0);
        let scaling = Arc::new(scaling);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(scaling.clone().run(Duration::from_secs(1), shutdown_rx));

        // First tick finds the directory unavailable.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(scaling.engine().status().provisioning, None);

        directory.set(vec![Worker::new("a").at_capacity()]);
        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let status = scaling.engine().status();
        assert_eq!(status.provisioning.unwrap().worker_id, "dry-run-1");
    }
}
