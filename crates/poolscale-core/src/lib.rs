//! poolscale-core — shared types for the poolscale worker autoscaler.
//!
//! - [`Worker`] / [`WorkerSnapshot`]: the point-in-time view of the worker
//!   pool handed to the engine by the membership directory.
//! - [`ScalingPolicy`]: the thresholds the engine decides against.
//! - [`PoolscaleConfig`]: the `poolscale.toml` file the daemon loads.

pub mod config;
pub mod error;
pub mod types;

pub use config::{parse_duration, parse_interval, PoolscaleConfig, ScalingPolicy};
pub use error::{ConfigError, ConfigResult};
pub use types::*;
