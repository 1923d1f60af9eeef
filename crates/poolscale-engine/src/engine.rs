//! ScalingEngine — decides when to grow or shrink the worker pool.
//!
//! The two entry points are independent: each has its own pending slot and
//! its own lock, so a slow terminate never holds up a provision. Within one
//! kind, the lock is held from reconciliation through the gateway call, so
//! a concurrent caller always sees the pending marker of an accepted
//! request.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info, warn};

use poolscale_core::{ScalingPolicy, WorkerId, WorkerSnapshot};

use crate::error::{ScalingError, ScalingResult};
use crate::gateway::ProvisionerGateway;
use crate::pending::{PendingAction, Reconciliation};

/// A request the engine issued to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScaleAction {
    Provision { worker_id: WorkerId },
    Terminate { worker_id: WorkerId },
}

impl ScaleAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            ScaleAction::Provision { .. } => ActionKind::Provision,
            ScaleAction::Terminate { .. } => ActionKind::Terminate,
        }
    }

    pub fn worker_id(&self) -> &str {
        match self {
            ScaleAction::Provision { worker_id } | ScaleAction::Terminate { worker_id } => {
                worker_id
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Provision,
    Terminate,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Provision => f.write_str("provision"),
            ActionKind::Terminate => f.write_str("terminate"),
        }
    }
}

/// An in-flight action as seen from outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingStatus {
    pub worker_id: WorkerId,
    pub pending_for_ms: u64,
}

/// Point-in-time view of both pending slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EngineStatus {
    pub provisioning: Option<PendingStatus>,
    pub terminating: Option<PendingStatus>,
}

/// Evaluates worker snapshots against a [`ScalingPolicy`] and issues at
/// most one in-flight provision and one in-flight terminate.
pub struct ScalingEngine {
    policy: ScalingPolicy,
    gateway: Arc<dyn ProvisionerGateway>,
    provisioning: Mutex<PendingAction>,
    terminating: Mutex<PendingAction>,
    /// Pending actions older than this are logged as stuck.
    pending_alert_after: Option<Duration>,
}

impl ScalingEngine {
    pub fn new(policy: ScalingPolicy, gateway: Arc<dyn ProvisionerGateway>) -> Self {
        Self {
            policy,
            gateway,
            provisioning: Mutex::new(PendingAction::Idle),
            terminating: Mutex::new(PendingAction::Idle),
            pending_alert_after: None,
        }
    }

    /// Warn when a pending action has been outstanding for at least `after`.
    pub fn with_pending_alert_after(mut self, after: Duration) -> Self {
        self.pending_alert_after = Some(after);
        self
    }

    pub fn policy(&self) -> &ScalingPolicy {
        &self.policy
    }

    /// Provision one worker if every known worker is at capacity.
    ///
    /// Returns `Ok(None)` while an earlier provision has not yet shown up in
    /// the snapshot. A rejected request leaves nothing pending, so the next
    /// call retries on its own if the pool is still saturated.
    pub fn provision_if_needed(
        &self,
        snapshot: &WorkerSnapshot,
    ) -> ScalingResult<Option<ScaleAction>> {
        let mut slot = lock(&self.provisioning);

        match slot.reconcile(|target| snapshot.contains(target), Instant::now()) {
            Reconciliation::StillPending { target, age } => {
                self.report_pending(ActionKind::Provision, &target, age);
                return Ok(None);
            }
            Reconciliation::Resolved(worker_id) => {
                info!(%worker_id, "provisioned worker has registered");
            }
            Reconciliation::Idle => {}
        }

        if !snapshot.is_saturated() {
            debug!(
                workers = snapshot.len(),
                available = snapshot.available().count(),
                "spare capacity available, not provisioning"
            );
            return Ok(None);
        }

        match self.gateway.provision() {
            Ok(worker_id) if snapshot.contains(&worker_id) => {
                // Recording it would resolve on the next call and let a
                // second request through while this one is unresolved.
                warn!(%worker_id, "provisioner returned an id that is already registered");
                Err(ScalingError::ProvisionedIdInUse(worker_id))
            }
            Ok(worker_id) => {
                slot.begin(worker_id.clone(), Instant::now());
                info!(%worker_id, workers = snapshot.len(), "all workers at capacity, provisioning");
                Ok(Some(ScaleAction::Provision { worker_id }))
            }
            Err(e) => {
                warn!(error = %e, "provision request failed");
                Err(ScalingError::Provision(e))
            }
        }
    }

    /// Terminate the least recently active worker if it has been idle past
    /// the policy threshold, using the system clock.
    pub fn terminate_if_needed(
        &self,
        snapshot: &WorkerSnapshot,
    ) -> ScalingResult<Option<ScaleAction>> {
        self.terminate_if_needed_at(snapshot, epoch_millis())
    }

    /// Same as [`terminate_if_needed`](Self::terminate_if_needed) with an
    /// explicit clock reading in Unix milliseconds.
    ///
    /// Never shrinks the pool to fewer than `min_workers`.
    pub fn terminate_if_needed_at(
        &self,
        snapshot: &WorkerSnapshot,
        now_ms: u64,
    ) -> ScalingResult<Option<ScaleAction>> {
        let mut slot = lock(&self.terminating);

        match slot.reconcile(|target| !snapshot.contains(target), Instant::now()) {
            Reconciliation::StillPending { target, age } => {
                self.report_pending(ActionKind::Terminate, &target, age);
                return Ok(None);
            }
            Reconciliation::Resolved(worker_id) => {
                info!(%worker_id, "terminated worker has left the pool");
            }
            Reconciliation::Idle => {}
        }

        if !self.policy.allows_termination(snapshot.len()) {
            debug!(
                workers = snapshot.len(),
                min_workers = self.policy.min_workers(),
                "pool at minimum size, not terminating"
            );
            return Ok(None);
        }

        let Some(candidate) = snapshot.least_recently_active() else {
            return Ok(None);
        };

        let idle_ms = candidate.idle_millis(now_ms);
        if !self.policy.is_idle_past_threshold(idle_ms) {
            debug!(
                worker_id = %candidate.id,
                idle_ms,
                "least active worker is within idle threshold"
            );
            return Ok(None);
        }

        let worker_id = candidate.id.clone();
        match self.gateway.terminate(&worker_id) {
            Ok(()) => {
                slot.begin(worker_id.clone(), Instant::now());
                info!(
                    %worker_id,
                    idle_ms,
                    workers = snapshot.len(),
                    "terminating idle worker"
                );
                Ok(Some(ScaleAction::Terminate { worker_id }))
            }
            Err(e) => {
                warn!(%worker_id, error = %e, "terminate request failed");
                Err(ScalingError::Terminate {
                    worker_id,
                    source: e,
                })
            }
        }
    }

    /// Current pending actions and how long each has been outstanding.
    pub fn status(&self) -> EngineStatus {
        self.status_at(Instant::now())
    }

    pub fn status_at(&self, now: Instant) -> EngineStatus {
        EngineStatus {
            provisioning: pending_status(&lock(&self.provisioning), now),
            terminating: pending_status(&lock(&self.terminating), now),
        }
    }

    fn report_pending(&self, kind: ActionKind, worker_id: &str, age: Duration) {
        let age_ms = age.as_millis() as u64;
        match self.pending_alert_after {
            Some(limit) if age >= limit => warn!(
                %kind,
                %worker_id,
                age_ms,
                stuck = true,
                "pending action has not completed"
            ),
            _ => match kind {
                ActionKind::Provision => info!(
                    %worker_id,
                    age_ms,
                    "still provisioning, waiting before requesting another worker"
                ),
                ActionKind::Terminate => info!(
                    %worker_id,
                    age_ms,
                    "not yet terminated, waiting before terminating another worker"
                ),
            },
        }
    }
}

fn pending_status(slot: &PendingAction, now: Instant) -> Option<PendingStatus> {
    let worker_id = slot.target()?.to_string();
    let age = slot.age(now).unwrap_or_default();
    Some(PendingStatus {
        worker_id,
        pending_for_ms: age.as_millis() as u64,
    })
}

/// Lock a pending slot. A panic while holding the lock cannot leave the
/// slot half-written, so a poisoned lock is still safe to use.
fn lock(slot: &Mutex<PendingAction>) -> MutexGuard<'_, PendingAction> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Current Unix epoch in milliseconds.
fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
