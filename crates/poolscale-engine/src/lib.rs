//! poolscale-engine — the worker pool scaling decision engine.
//!
//! Each cycle the engine is handed a [`WorkerSnapshot`] and decides whether
//! to grow the pool (every worker is saturated) or shrink it (the least
//! recently active worker has been idle past the policy threshold). At most
//! one provision and one terminate are ever in flight; a pending action is
//! resolved only when a later snapshot shows the worker appearing or
//! disappearing.
//!
//! # Architecture
//!
//! ```text
//! ScalingLoop (periodic driver)
//!   ├── WorkerDirectory  → WorkerSnapshot
//!   └── ScalingEngine
//!       ├── provision slot  (Mutex<PendingAction>)
//!       ├── terminate slot  (Mutex<PendingAction>)
//!       └── ProvisionerGateway (start / stop workers)
//! ```
//!
//! [`WorkerSnapshot`]: poolscale_core::WorkerSnapshot

pub mod engine;
pub mod error;
pub mod gateway;
pub mod pending;
pub mod runner;

pub use engine::{ActionKind, EngineStatus, PendingStatus, ScaleAction, ScalingEngine};
pub use error::{GatewayError, ScalingError, ScalingResult};
pub use gateway::{DryRunGateway, ProvisionerGateway};
pub use pending::{PendingAction, Reconciliation};
pub use runner::{CycleOutcome, CycleReport, ScalingLoop, WorkerDirectory};
