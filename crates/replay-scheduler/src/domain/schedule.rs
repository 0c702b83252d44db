//! Schedule Model
//!
//! The durable artifact of a run: the order in which callbacks actually
//! started executing, plus enough metadata to replay it.
//!
//! A schedule recorded under any policy can be replayed by the CBTREE
//! policy; the fuzzers only differ in how they perturbed the order that got
//! recorded.
//!
//! Disk I/O lives in `infrastructure::schedule_file`; this module owns the
//! data model and the output path rule.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::types::{CallbackType, Lcbn, LcbnKey, PolicyKind, SchedulerMode, ThreadRole};

/// Version of the schedule format written by this build
pub const SCHEDULE_FORMAT_VERSION: u32 = 1;

/// Suffix appended to the schedule path when emitting from a replay
///
/// Keeps the replay's own trace from overwriting the recording it replays.
pub const REPLAY_SUFFIX: &str = "-replay";

/// Where `emit()` writes for a scheduler configured with `schedule_file`
///
/// # Example
///
/// ```rust
/// use replay_scheduler::domain::schedule::emit_path;
/// use replay_scheduler::domain::types::SchedulerMode;
/// use std::path::Path;
///
/// let file = Path::new("/tmp/sched");
/// assert_eq!(emit_path(file, SchedulerMode::Record), Path::new("/tmp/sched"));
/// assert_eq!(emit_path(file, SchedulerMode::Replay), Path::new("/tmp/sched-replay"));
/// ```
pub fn emit_path(schedule_file: &Path, mode: SchedulerMode) -> PathBuf {
    match mode {
        SchedulerMode::Record => schedule_file.to_path_buf(),
        SchedulerMode::Replay => {
            let mut raw: OsString = schedule_file.as_os_str().to_owned();
            raw.push(REPLAY_SUFFIX);
            PathBuf::from(raw)
        }
    }
}

/// One executed callback, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledCallback {
    /// Position in the execution order (0-based)
    pub exec_id: u64,

    /// Identity of the node
    pub key: LcbnKey,

    /// Node that registered it
    pub parent: Option<LcbnKey>,

    /// Callback category
    pub cb_type: CallbackType,

    /// Role of the thread that ran it
    pub role: ThreadRole,
}

impl ScheduledCallback {
    /// Entry for `lcbn` run as the `exec_id`-th callback by a `role` thread
    pub fn new(exec_id: u64, lcbn: &Lcbn, role: ThreadRole) -> Self {
        Self {
            exec_id,
            key: lcbn.key,
            parent: lcbn.parent,
            cb_type: lcbn.cb_type,
            role,
        }
    }
}

/// A complete persisted schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleLog {
    /// Format version ([`SCHEDULE_FORMAT_VERSION`] when written by this build)
    pub version: u32,

    /// Policy that produced it
    pub policy: PolicyKind,

    /// Mode of the run that produced it
    pub mode: SchedulerMode,

    /// Whether that run diverged from its own recording (replays only)
    #[serde(default)]
    pub diverged: bool,

    /// Executed callbacks in execution order
    pub callbacks: Vec<ScheduledCallback>,
}

impl ScheduleLog {
    /// Empty schedule for a run of `policy` in `mode`
    pub fn new(policy: PolicyKind, mode: SchedulerMode) -> Self {
        Self {
            version: SCHEDULE_FORMAT_VERSION,
            policy,
            mode,
            diverged: false,
            callbacks: Vec::new(),
        }
    }

    /// Number of executed callbacks
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// `true` if nothing executed
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_path_is_stable() {
        let file = Path::new("/var/tmp/run.sched");
        assert_eq!(
            emit_path(file, SchedulerMode::Replay),
            emit_path(file, SchedulerMode::Replay)
        );
        assert_eq!(
            emit_path(file, SchedulerMode::Replay),
            PathBuf::from("/var/tmp/run.sched-replay")
        );
        assert!(!emit_path(file, SchedulerMode::Record)
            .to_string_lossy()
            .ends_with(REPLAY_SUFFIX));
    }

    #[test]
    fn test_log_serializes_with_wire_names() {
        let lcbn = Lcbn::root(LcbnKey::new(0, 1, 2), CallbackType::Timer);
        let mut log = ScheduleLog::new(PolicyKind::CbTree, SchedulerMode::Record);
        log.callbacks.push(ScheduledCallback::new(0, &lcbn, ThreadRole::Looper));

        let json = serde_json::to_string(&log).unwrap();
        assert!(json.contains("\"CBTREE\""));
        assert!(json.contains("\"TIMER\""));
        assert!(json.contains("\"LOOPER\""));

        let back: ScheduleLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn test_missing_diverged_defaults_to_false() {
        let json = r#"{"version":1,"policy":"FUZZER_TIMER","mode":"RECORD","callbacks":[]}"#;
        let log: ScheduleLog = serde_json::from_str(json).unwrap();
        assert!(!log.diverged);
        assert!(log.is_empty());
    }
}
