//! RECORD-mode bookkeeping shared by every policy
//!
//! Tracks three sets of nodes:
//!
//! ```text
//! register_lcbn ──> pending ── BEFORE_EXEC_CB ──> running ── AFTER_EXEC_CB ──> done
//!                                    │
//!                                    └── appended to the executed trace
//! ```
//!
//! A node moves through each state once. Re-registering a node, or
//! completing one that never started, changes nothing.

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::domain::schedule::{ScheduleLog, ScheduledCallback};
use crate::domain::types::{Lcbn, LcbnKey, PolicyKind, SchedulerMode, ThreadRole};

/// Observed execution order plus per-node accounting
#[derive(Debug, Default)]
pub struct ScheduleRecorder {
    pending: BTreeMap<LcbnKey, Lcbn>,
    running: HashSet<LcbnKey>,
    seen: HashSet<LcbnKey>,
    executed: Vec<ScheduledCallback>,
}

impl ScheduleRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a newly scheduled node; returns `false` if it was already known
    pub fn register(&mut self, lcbn: &Lcbn) -> bool {
        if !self.seen.insert(lcbn.key) {
            warn!(lcbn = %lcbn, "callback registered twice, keeping first registration");
            return false;
        }
        self.pending.insert(lcbn.key, *lcbn);
        true
    }

    /// `lcbn` is starting on a `role` thread; appends it to the trace
    ///
    /// Nodes that were never registered are still traced (they did run) but
    /// do not take part in completion accounting.
    pub fn begin(&mut self, lcbn: &Lcbn, role: ThreadRole) -> &ScheduledCallback {
        if self.pending.remove(&lcbn.key).is_some() {
            self.running.insert(lcbn.key);
        } else {
            debug!(lcbn = %lcbn, "executing callback that is not pending");
        }

        let exec_id = self.executed.len() as u64;
        self.executed.push(ScheduledCallback::new(exec_id, lcbn, role));
        &self.executed[self.executed.len() - 1]
    }

    /// `key` finished; returns `true` exactly once per started, registered node
    pub fn complete(&mut self, key: &LcbnKey) -> bool {
        self.running.remove(key)
    }

    /// Registered nodes that have not started
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Nodes currently between BEFORE_EXEC_CB and AFTER_EXEC_CB
    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.running.len()
    }

    /// The trace so far
    pub fn executed(&self) -> &[ScheduledCallback] {
        &self.executed
    }

    /// Snapshot the trace as a persistable schedule
    pub fn to_log(&self, policy: PolicyKind, mode: SchedulerMode, diverged: bool) -> ScheduleLog {
        let mut log = ScheduleLog::new(policy, mode);
        log.diverged = diverged;
        log.callbacks = self.executed.clone();
        log
    }
}
