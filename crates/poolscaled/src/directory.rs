//! File-backed membership directory.
//!
//! Reads the JSON array of workers the membership directory exports on
//! every call, so each cycle sees the latest export.

use std::path::PathBuf;

use anyhow::Context;
use tracing::debug;

use poolscale_core::WorkerSnapshot;
use poolscale_engine::WorkerDirectory;

pub struct JsonFileDirectory {
    path: PathBuf,
}

impl JsonFileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl WorkerDirectory for JsonFileDirectory {
    fn snapshot(&self) -> anyhow::Result<WorkerSnapshot> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("read worker snapshot {}", self.path.display()))?;
        let snapshot = WorkerSnapshot::from_json(&bytes)
            .with_context(|| format!("parse worker snapshot {}", self.path.display()))?;
        debug!(path = ?self.path, workers = snapshot.len(), "worker snapshot loaded");
        Ok(snapshot)
    }
}
