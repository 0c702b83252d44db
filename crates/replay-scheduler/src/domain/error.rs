//! Domain Model: Scheduler Error Types
//!
//! Two families, deliberately kept apart:
//!
//! - [`SchedulerError`]: recoverable failures (I/O, malformed schedule
//!   files, bad configuration). Returned as `Result` and left to the caller.
//! - [`ContractViolation`]: misuse of the scheduler by the embedding runtime
//!   (double initialization, unregistered threads, ...). These never come
//!   back as values; [`violated`] logs them and aborts the process.
//!
//! Replay divergence is neither: it is scheduler state, read through
//! `has_diverged()`.

use std::path::PathBuf;
use std::thread::ThreadId;

use super::types::{PolicyKind, SchedulerMode, ThreadRole};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recoverable Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Recoverable scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Reading or writing a schedule file failed
    #[error("Schedule file I/O failed for {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A schedule file could not be encoded or decoded
    #[error("Malformed schedule file {path}: {source}")]
    Format {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// The schedule file was written by an incompatible format version
    #[error("Unsupported schedule format version {found} in {path} (expected {expected})")]
    UnsupportedVersion {
        /// File involved
        path: PathBuf,
        /// Version in the file
        found: u32,
        /// Version this build reads
        expected: u32,
    },

    /// A configuration value could not be parsed
    #[error("Invalid scheduler configuration: {0}")]
    Config(String),

    /// Policy arguments were built for a different policy
    #[error("Policy {kind} cannot be configured with {args} arguments")]
    ArgsMismatch {
        /// Requested policy
        kind: PolicyKind,
        /// Name of the argument variant supplied
        args: &'static str,
    },

    /// The policy does not support the requested mode
    #[error("Policy {kind} does not support {mode} mode")]
    UnsupportedMode {
        /// Requested policy
        kind: PolicyKind,
        /// Requested mode
        mode: SchedulerMode,
    },
}

impl SchedulerError {
    /// Wrap an I/O error with the path it concerns
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SchedulerError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a serde error with the path it concerns
    pub fn format(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        SchedulerError::Format {
            path: path.into(),
            source,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contract Violations (fatal)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Misuse of the scheduler by its caller
///
/// Continuing past any of these would produce a schedule that is silently
/// wrong, so they are only ever handed to [`violated`].
#[derive(Debug, thiserror::Error)]
pub enum ContractViolation {
    /// The process-wide scheduler was initialized a second time
    #[error("scheduler initialized twice")]
    AlreadyInitialized,

    /// A scheduler operation ran before initialization
    #[error("scheduler used before initialization ({operation})")]
    NotInitialized {
        /// Operation that was attempted
        operation: &'static str,
    },

    /// The validity tag does not hold the expected sentinel
    #[error("scheduler state is corrupted ({operation}: tag {found:#x})")]
    Corrupted {
        /// Operation that was attempted
        operation: &'static str,
        /// Tag value found
        found: u32,
    },

    /// A thread registered its role twice
    #[error("{thread:?} already registered as {existing}, re-registered as {requested}")]
    DuplicateThread {
        /// Offending thread
        thread: ThreadId,
        /// Role already on record
        existing: ThreadRole,
        /// Role requested now
        requested: ThreadRole,
    },

    /// A thread reached an instrumented point without registering
    #[error("{thread:?} was never registered")]
    UnregisteredThread {
        /// Offending thread
        thread: ThreadId,
    },

    /// The selected policy could not be constructed
    #[error("policy construction failed: {0}")]
    PolicyConstruction(#[source] SchedulerError),
}

/// Report a contract violation and abort the process
///
/// Never returns and never unwinds: a half-finished scheduler operation
/// under concurrency could leave policy state inconsistent.
#[cold]
#[inline(never)]
pub fn violated(violation: ContractViolation) -> ! {
    tracing::error!(%violation, "scheduler contract violation, aborting");
    eprintln!("replay-scheduler: contract violation: {violation}");
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = SchedulerError::UnsupportedMode {
            kind: PolicyKind::FuzzerTimer,
            mode: SchedulerMode::Replay,
        };
        assert_eq!(err.to_string(), "Policy FUZZER_TIMER does not support REPLAY mode");

        let err = SchedulerError::Config("bad".into());
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn test_io_error_keeps_path() {
        let err = SchedulerError::io(
            "/nonexistent/sched",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/nonexistent/sched"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_violation_messages() {
        let v = ContractViolation::NotInitialized { operation: "register_thread" };
        assert!(v.to_string().contains("register_thread"));

        let v = ContractViolation::Corrupted { operation: "emit", found: 0 };
        assert!(v.to_string().contains("0x0"));
    }
}
