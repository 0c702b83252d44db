//! Scheduler Configuration
//!
//! [`SchedulerConfig`] bundles everything `initialize` needs. It can be built
//! in code:
//!
//! ```rust
//! use replay_scheduler::infrastructure::config::SchedulerConfig;
//! use replay_scheduler::domain::types::{PolicyKind, SchedulerMode};
//!
//! let config = SchedulerConfig::new(PolicyKind::CbTree)
//!     .with_mode(SchedulerMode::Replay)
//!     .with_schedule_file("/tmp/run.sched");
//! assert_eq!(config.mode, SchedulerMode::Replay);
//! ```
//!
//! or read from the process environment with [`SchedulerConfig::from_env`]:
//!
//! | Variable                       | Default                    |
//! |--------------------------------|----------------------------|
//! | `UV_SCHEDULER_TYPE`            | `CBTREE`                   |
//! | `UV_SCHEDULER_MODE`            | `RECORD`                   |
//! | `UV_SCHEDULER_SCHEDULE_FILE`   | `/tmp/libuv_schedule.txt`  |
//! | `UV_SCHEDULER_MIN_DELAY` (µs)  | `0`                        |
//! | `UV_SCHEDULER_MAX_DELAY` (µs)  | `100`                      |
//! | `UV_SCHEDULER_TP_DEG_FREEDOM`  | `2`                        |
//! | `UV_SCHEDULER_SEED`            | current time               |
//!
//! Unset or empty variables take the default; anything unparseable is a
//! [`SchedulerError::Config`].

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::domain::error::SchedulerError;
use crate::domain::policy::{FuzzThreadOrderArgs, FuzzTimerArgs, PolicyArgs};
use crate::domain::types::{PolicyKind, SchedulerMode};

/// Default schedule file location
pub const DEFAULT_SCHEDULE_FILE: &str = "/tmp/libuv_schedule.txt";

/// Policy kind
pub const ENV_TYPE: &str = "UV_SCHEDULER_TYPE";
/// RECORD or REPLAY
pub const ENV_MODE: &str = "UV_SCHEDULER_MODE";
/// Schedule file path
pub const ENV_SCHEDULE_FILE: &str = "UV_SCHEDULER_SCHEDULE_FILE";
/// Timer fuzzer minimum delay, microseconds
pub const ENV_MIN_DELAY: &str = "UV_SCHEDULER_MIN_DELAY";
/// Fuzzer maximum delay, microseconds
pub const ENV_MAX_DELAY: &str = "UV_SCHEDULER_MAX_DELAY";
/// Thread-order fuzzer degrees of freedom
pub const ENV_DEG_FREEDOM: &str = "UV_SCHEDULER_TP_DEG_FREEDOM";
/// Fuzzer RNG seed
pub const ENV_SEED: &str = "UV_SCHEDULER_SEED";

/// Everything needed to construct a scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Ordering policy
    pub policy: PolicyKind,

    /// RECORD or REPLAY
    pub mode: SchedulerMode,

    /// Recording to load (REPLAY) and base path for `emit()`
    pub schedule_file: PathBuf,

    /// Policy-specific arguments; must match `policy`
    pub args: PolicyArgs,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(PolicyKind::CbTree)
    }
}

impl SchedulerConfig {
    /// RECORD-mode config for `policy` with default arguments
    pub fn new(policy: PolicyKind) -> Self {
        Self {
            policy,
            mode: SchedulerMode::Record,
            schedule_file: PathBuf::from(DEFAULT_SCHEDULE_FILE),
            args: PolicyArgs::default_for(policy),
        }
    }

    /// Set the mode
    pub fn with_mode(mut self, mode: SchedulerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the schedule file
    pub fn with_schedule_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.schedule_file = path.into();
        self
    }

    /// Set the policy arguments
    pub fn with_args(mut self, args: PolicyArgs) -> Self {
        self.args = args;
        self
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, SchedulerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through `lookup`
    ///
    /// `from_env` with the environment swapped out, so callers (and tests)
    /// can supply variables from anywhere.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SchedulerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let policy = match get(ENV_TYPE) {
            Some(v) => v.parse()?,
            None => PolicyKind::CbTree,
        };
        let mode = match get(ENV_MODE) {
            Some(v) => v.parse()?,
            None => SchedulerMode::Record,
        };
        let schedule_file = get(ENV_SCHEDULE_FILE)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEDULE_FILE));

        let seed = match get(ENV_SEED) {
            Some(v) => parse_number(ENV_SEED, &v)?,
            None => time_seed(),
        };

        let args = match policy {
            PolicyKind::CbTree => PolicyArgs::CbTree,
            PolicyKind::FuzzerTimer => {
                let defaults = FuzzTimerArgs::default();
                PolicyArgs::FuzzTimer(FuzzTimerArgs {
                    min_delay: micros_or(get(ENV_MIN_DELAY), ENV_MIN_DELAY, defaults.min_delay)?,
                    max_delay: micros_or(get(ENV_MAX_DELAY), ENV_MAX_DELAY, defaults.max_delay)?,
                    seed,
                })
            }
            PolicyKind::FuzzerThreadOrder => {
                let defaults = FuzzThreadOrderArgs::default();
                let degrees_of_freedom = match get(ENV_DEG_FREEDOM) {
                    Some(v) => parse_number(ENV_DEG_FREEDOM, &v)?,
                    None => defaults.degrees_of_freedom,
                };
                PolicyArgs::FuzzThreadOrder(FuzzThreadOrderArgs {
                    degrees_of_freedom,
                    max_delay: micros_or(get(ENV_MAX_DELAY), ENV_MAX_DELAY, defaults.max_delay)?,
                    seed,
                })
            }
        };

        Ok(Self {
            policy,
            mode,
            schedule_file,
            args,
        })
    }

    /// Print a one-line summary for startup logs
    pub fn log_summary(&self) {
        tracing::info!(
            policy = %self.policy,
            mode = %self.mode,
            schedule_file = %self.schedule_file.display(),
            args = ?self.args,
            "⚙️  Scheduler configuration"
        );
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, SchedulerError> {
    raw.trim()
        .parse()
        .map_err(|_| SchedulerError::Config(format!("{key}: not a valid number: {raw:?}")))
}

fn micros_or(raw: Option<String>, key: &str, default: Duration) -> Result<Duration, SchedulerError> {
    match raw {
        Some(v) => parse_number(key, &v).map(Duration::from_micros),
        None => Ok(default),
    }
}

fn time_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
