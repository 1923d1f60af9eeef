//! poolscale.toml configuration parser.
//!
//! ```toml
//! [policy]
//! min_workers = 1
//! idle_termination_threshold = "10m"
//!
//! [engine]
//! pending_alert_after = "15m"
//!
//! [loop]
//! interval = "60s"
//! snapshot_path = "/var/lib/poolscale/workers.json"
//! ```
//!
//! Every section and key is optional; missing values fall back to the
//! defaults below.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Default idle time before a worker may be terminated.
pub const DEFAULT_IDLE_TERMINATION_THRESHOLD: Duration = Duration::from_secs(10 * 60);

/// Default interval between decision cycles.
pub const DEFAULT_LOOP_INTERVAL: Duration = Duration::from_secs(60);

// ── Scaling policy ────────────────────────────────────────────────

/// Thresholds the scaling engine decides against.
///
/// Built once and never changed; the engine keeps its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingPolicy {
    min_workers: u32,
    idle_termination_threshold: Duration,
}

impl ScalingPolicy {
    pub fn new(min_workers: u32, idle_termination_threshold: Duration) -> Self {
        Self {
            min_workers,
            idle_termination_threshold,
        }
    }

    /// The pool is never shrunk to fewer workers than this.
    pub fn min_workers(&self) -> u32 {
        self.min_workers
    }

    /// How long a worker must go without completing a task before it may
    /// be terminated.
    pub fn idle_termination_threshold(&self) -> Duration {
        self.idle_termination_threshold
    }

    /// Whether a worker idle for `idle_millis` is past the threshold.
    /// `None` (never completed a task) is always past it.
    pub fn is_idle_past_threshold(&self, idle_millis: Option<u64>) -> bool {
        match idle_millis {
            None => true,
            Some(ms) => u128::from(ms) > self.idle_termination_threshold.as_millis(),
        }
    }

    /// Whether a pool of `pool_size` workers may lose one more.
    pub fn allows_termination(&self, pool_size: usize) -> bool {
        pool_size > self.min_workers as usize
    }
}

impl Default for ScalingPolicy {
    fn default() -> Self {
        Self::new(0, DEFAULT_IDLE_TERMINATION_THRESHOLD)
    }
}

// ── File config ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolscaleConfig {
    pub policy: Option<PolicyConfig>,
    pub engine: Option<EngineConfig>,
    #[serde(rename = "loop")]
    pub scaling_loop: Option<LoopConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub min_workers: Option<u32>,
    pub idle_termination_threshold: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Warn when a provision or terminate has been pending this long.
    pub pending_alert_after: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopConfig {
    pub interval: Option<String>,
    /// JSON file the membership directory exports worker state to.
    pub snapshot_path: Option<PathBuf>,
}

impl PoolscaleConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Build the scaling policy, filling in defaults.
    pub fn scaling_policy(&self) -> ConfigResult<ScalingPolicy> {
        let policy = self.policy.clone().unwrap_or_default();
        let threshold = match policy.idle_termination_threshold.as_deref() {
            Some(s) => require_duration("policy.idle_termination_threshold", s)?,
            None => DEFAULT_IDLE_TERMINATION_THRESHOLD,
        };
        Ok(ScalingPolicy::new(policy.min_workers.unwrap_or(0), threshold))
    }

    /// Age after which a pending action is reported as stuck, if set.
    pub fn pending_alert_after(&self) -> ConfigResult<Option<Duration>> {
        self.engine
            .as_ref()
            .and_then(|e| e.pending_alert_after.as_deref())
            .map(|s| require_duration("engine.pending_alert_after", s))
            .transpose()
    }

    /// Interval between decision cycles.
    pub fn loop_interval(&self) -> ConfigResult<Duration> {
        match self.scaling_loop.as_ref().and_then(|l| l.interval.as_deref()) {
            Some(s) => parse_interval("loop.interval", s),
            None => Ok(DEFAULT_LOOP_INTERVAL),
        }
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.scaling_loop
            .as_ref()
            .and_then(|l| l.snapshot_path.as_deref())
    }
}

fn require_duration(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

/// Parse a decision interval for `field`. Zero is rejected.
pub fn parse_interval(field: &'static str, value: &str) -> ConfigResult<Duration> {
    let interval = require_duration(field, value)?;
    if interval.is_zero() {
        return Err(ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
        });
    }
    Ok(interval)
}

/// Parse a duration string like "250ms", "30s", "5m", "2h", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        let m = mins.trim().parse::<u64>().ok()?;
        m.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        let h = hours.trim().parse::<u64>().ok()?;
        h.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
