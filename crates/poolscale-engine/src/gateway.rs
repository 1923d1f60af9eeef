//! Provisioner gateway — the seam to whatever creates and destroys workers.
//!
//! Requests are fire-and-forget: `Ok` means the request was accepted, not
//! that the worker exists (or is gone) yet. The engine learns about
//! completion from the next snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use poolscale_core::WorkerId;

use crate::error::GatewayError;

/// Issues start/stop requests to the cloud provisioner.
pub trait ProvisionerGateway: Send + Sync {
    /// Request one new worker. Returns the id it will register under.
    fn provision(&self) -> Result<WorkerId, GatewayError>;

    /// Request termination of an existing worker.
    fn terminate(&self, worker_id: &str) -> Result<(), GatewayError>;
}

/// Gateway that only logs the requests it receives.
///
/// Useful for running the engine against a live directory without touching
/// any instances.
#[derive(Debug, Default)]
pub struct DryRunGateway {
    next_id: AtomicU64,
    reject_with: Option<String>,
}

impl DryRunGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway that rejects every request with `reason`.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            reject_with: Some(reason.into()),
        }
    }

    fn check(&self) -> Result<(), GatewayError> {
        match &self.reject_with {
            Some(reason) => Err(GatewayError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }
}

impl ProvisionerGateway for DryRunGateway {
    fn provision(&self) -> Result<WorkerId, GatewayError> {
        self.check()?;
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let worker_id = format!("dry-run-{n}");
        info!(%worker_id, "dry run: would provision a worker");
        Ok(worker_id)
    }

    fn terminate(&self, worker_id: &str) -> Result<(), GatewayError> {
        self.check()?;
        info!(%worker_id, "dry run: would terminate worker");
        Ok(())
    }
}
