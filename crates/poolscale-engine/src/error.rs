//! Engine error types.

use thiserror::Error;

use poolscale_core::WorkerId;

/// A provisioner request that was refused or could not be sent.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("provisioner unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by a decision cycle.
///
/// All are transient: the pending slot is left idle and the next cycle
/// re-evaluates from scratch.
#[derive(Debug, Error)]
pub enum ScalingError {
    #[error("failed to provision worker: {0}")]
    Provision(#[source] GatewayError),

    #[error("provisioner returned worker id {0} that is already registered")]
    ProvisionedIdInUse(WorkerId),

    #[error("failed to terminate worker {worker_id}: {source}")]
    Terminate {
        worker_id: WorkerId,
        #[source]
        source: GatewayError,
    },
}

pub type ScalingResult<T> = Result<T, ScalingError>;
