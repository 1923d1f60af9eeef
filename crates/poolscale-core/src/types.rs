//! Worker and snapshot types.
//!
//! A [`WorkerSnapshot`] is one consistent read of the membership directory.
//! The engine only ever borrows it; nothing in poolscale mutates a snapshot
//! after it has been built.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Unique identifier a worker registers under in the membership directory.
pub type WorkerId = String;

// ── Worker ────────────────────────────────────────────────────────

/// A single worker as reported by the membership directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    /// True when the worker cannot accept another task.
    #[serde(default)]
    pub at_capacity: bool,
    /// Unix timestamp (milliseconds) of the last task this worker completed.
    /// `None` if it has never completed one.
    #[serde(default)]
    pub last_completed_task_at: Option<u64>,
}

impl Worker {
    /// A worker with spare capacity that has never completed a task.
    pub fn new(id: impl Into<WorkerId>) -> Self {
        Self {
            id: id.into(),
            at_capacity: false,
            last_completed_task_at: None,
        }
    }

    /// Mark the worker as saturated.
    pub fn at_capacity(mut self) -> Self {
        self.at_capacity = true;
        self
    }

    /// Set the time of the last completed task.
    pub fn completed_at(mut self, epoch_ms: u64) -> Self {
        self.last_completed_task_at = Some(epoch_ms);
        self
    }

    /// Milliseconds since the last completed task, or `None` if the worker
    /// never completed one. A timestamp ahead of `now_ms` counts as zero.
    pub fn idle_millis(&self, now_ms: u64) -> Option<u64> {
        self.last_completed_task_at
            .map(|at| now_ms.saturating_sub(at))
    }

    /// Termination order: never-active workers first, then oldest activity,
    /// then worker id so equal timestamps rank the same way every time.
    pub fn idle_order(&self, other: &Self) -> Ordering {
        // `None < Some(_)` for `Option`, which is the order we want.
        self.last_completed_task_at
            .cmp(&other.last_completed_task_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

// ── Snapshot ──────────────────────────────────────────────────────

/// Point-in-time view of every known worker, keyed by worker id.
///
/// Serialized as a JSON array of workers. When an id appears twice the
/// later entry wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Worker>", into = "Vec<Worker>")]
pub struct WorkerSnapshot {
    workers: HashMap<WorkerId, Worker>,
}

impl WorkerSnapshot {
    /// An empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a snapshot from a JSON array of workers.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Number of workers in the snapshot.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Whether a worker with this id is registered.
    pub fn contains(&self, worker_id: &str) -> bool {
        self.workers.contains_key(worker_id)
    }

    pub fn get(&self, worker_id: &str) -> Option<&Worker> {
        self.workers.get(worker_id)
    }

    /// Iterate over all workers in no particular order.
    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    /// Workers that can still accept tasks.
    pub fn available(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values().filter(|w| !w.at_capacity)
    }

    /// True if every known worker is at capacity (including when there are
    /// no workers at all).
    pub fn is_saturated(&self) -> bool {
        self.available().next().is_none()
    }

    /// All workers in termination order (see [`Worker::idle_order`]).
    pub fn idle_ranking(&self) -> Vec<&Worker> {
        let mut ranked: Vec<&Worker> = self.workers.values().collect();
        ranked.sort_by(|a, b| a.idle_order(b));
        ranked
    }

    /// The single best candidate for termination.
    pub fn least_recently_active(&self) -> Option<&Worker> {
        self.workers.values().min_by(|a, b| a.idle_order(b))
    }
}

impl From<Vec<Worker>> for WorkerSnapshot {
    fn from(workers: Vec<Worker>) -> Self {
        workers.into_iter().collect()
    }
}

impl From<WorkerSnapshot> for Vec<Worker> {
    fn from(snapshot: WorkerSnapshot) -> Self {
        let mut workers: Vec<Worker> = snapshot.workers.into_values().collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }
}

impl FromIterator<Worker> for WorkerSnapshot {
    fn from_iter<I: IntoIterator<Item = Worker>>(iter: I) -> Self {
        let workers = iter
            .into_iter()
            .map(|w| (w.id.clone(), w))
            .collect();
        Self { workers }
    }
}
