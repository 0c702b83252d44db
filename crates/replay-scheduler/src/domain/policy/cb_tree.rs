//! CBTREE Policy - Deterministic, key-matched record and replay
//!
//! # RECORD
//!
//! Pure observation: no thread is ever blocked. Each BEFORE_EXEC_CB appends
//! the callback's stable key to the trace, so the trace is the order the
//! run actually took.
//!
//! # REPLAY
//!
//! The recording is loaded at construction and consumed front to back. A
//! thread arriving at BEFORE_EXEC_CB with key `k`:
//!
//! ```text
//! head == k                         → pop head, run
//! k not in the remaining recording  → diverged
//! head ran on the looper and the
//!   caller is the looper            → diverged (the only looper is busy with k)
//! otherwise                         → park until the head moves
//! ```
//!
//! Once diverged the policy stops enforcing anything: every parked thread is
//! released, nobody parks again, and the flag never clears. The replay's own
//! trace keeps being recorded so the divergent run can be inspected after
//! `emit()`.
//!
//! Thread-pool yield points never block under this policy; the order of
//! pool work is pinned down by the exec points of the callbacks it runs.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use tracing::{debug, info, trace, warn};

use super::recorder::ScheduleRecorder;
use super::{SchedulingPolicy, YieldContext, YieldOutcome};
use crate::domain::error::SchedulerError;
use crate::domain::schedule::{ScheduleLog, ScheduledCallback};
use crate::domain::types::{
    Lcbn, LcbnKey, NextCallbackType, PolicyKind, SchedulerMode, ThreadRole, YieldPoint,
};
use crate::infrastructure::schedule_file;

/// Why and where a replay left its recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    /// Callbacks replayed faithfully before the mismatch
    pub after: u64,
    /// What the recording expected next (`None` when it was exhausted)
    pub expected: Option<LcbnKey>,
    /// What actually arrived
    pub found: LcbnKey,
}

#[derive(Debug)]
struct ReplayState {
    expected: VecDeque<ScheduledCallback>,
    running: HashSet<LcbnKey>,
    registered: HashSet<LcbnKey>,
    trace: Vec<ScheduledCallback>,
    divergence: Option<Divergence>,
}

enum Admission {
    Run,
    Wait,
}

impl ReplayState {
    fn new(log: ScheduleLog) -> Self {
        Self {
            expected: log.callbacks.into(),
            running: HashSet::new(),
            registered: HashSet::new(),
            trace: Vec::new(),
            divergence: None,
        }
    }

    fn push_trace(&mut self, lcbn: &Lcbn, role: ThreadRole) {
        let exec_id = self.trace.len() as u64;
        self.trace.push(ScheduledCallback::new(exec_id, lcbn, role));
    }

    fn diverge(&mut self, expected: Option<LcbnKey>, lcbn: &Lcbn, reason: &'static str) {
        let divergence = Divergence {
            after: self.trace.len() as u64,
            expected,
            found: lcbn.key,
        };
        warn!(
            after = divergence.after,
            expected = ?divergence.expected,
            found = %lcbn,
            reason,
            "⚠️  Replay diverged from recorded schedule"
        );
        self.divergence = Some(divergence);
    }

    fn admit(&mut self, lcbn: &Lcbn, role: ThreadRole) -> Admission {
        if self.divergence.is_none() {
            match self.expected.front() {
                Some(head) if head.key == lcbn.key => {}
                Some(head) => {
                    let (head_key, head_role) = (head.key, head.role);
                    if !self.expected.iter().any(|cb| cb.key == lcbn.key) {
                        self.diverge(Some(head_key), lcbn, "callback not in remaining recording");
                    } else if head_role == ThreadRole::Looper && role == ThreadRole::Looper {
                        self.diverge(Some(head_key), lcbn, "looper arrived out of order");
                    } else {
                        return Admission::Wait;
                    }
                }
                None => self.diverge(None, lcbn, "recording exhausted"),
            }
        }

        if !self.registered.contains(&lcbn.key) {
            debug!(lcbn = %lcbn, "executing callback that was never registered");
        }

        // Started nodes leave the recording, in order or not
        if let Some(pos) = self.expected.iter().position(|cb| cb.key == lcbn.key) {
            self.expected.remove(pos);
        }
        self.running.insert(lcbn.key);
        self.push_trace(lcbn, role);
        Admission::Run
    }
}

#[derive(Debug)]
enum CbTreeState {
    Record(ScheduleRecorder),
    Replay(ReplayState),
}

/// Deterministic record/replay policy
#[derive(Debug)]
pub struct CbTreePolicy {
    state: Mutex<CbTreeState>,
}

impl CbTreePolicy {
    /// A policy that records the live order
    pub fn record() -> Self {
        Self {
            state: Mutex::new(CbTreeState::Record(ScheduleRecorder::new())),
        }
    }

    /// A policy that enforces `log`
    pub fn replay(log: ScheduleLog) -> Self {
        info!(callbacks = log.len(), recorded_by = %log.policy, "🔁 CBTREE replay armed");
        Self {
            state: Mutex::new(CbTreeState::Replay(ReplayState::new(log))),
        }
    }

    /// A policy that enforces the schedule stored at `path`
    pub fn replay_from(path: &Path) -> Result<Self, SchedulerError> {
        Ok(Self::replay(schedule_file::load(path)?))
    }

    /// Details of the divergence, if any
    pub fn divergence(&self) -> Option<Divergence> {
        match &*self.state.lock() {
            CbTreeState::Record(_) => None,
            CbTreeState::Replay(replay) => replay.divergence,
        }
    }

    fn before_exec(&self, lcbn: &Lcbn, ctx: &YieldContext<'_>) {
        let mut parked = false;
        ctx.wait_while(|| {
            let mut state = self.state.lock();
            match &mut *state {
                CbTreeState::Record(recorder) => {
                    recorder.begin(lcbn, ctx.role);
                    false
                }
                CbTreeState::Replay(replay) => match replay.admit(lcbn, ctx.role) {
                    Admission::Run => false,
                    Admission::Wait => {
                        if !parked {
                            trace!(lcbn = %lcbn, role = %ctx.role, "parking until recorded turn");
                            parked = true;
                        }
                        true
                    }
                },
            }
        });
    }

    fn after_exec(&self, lcbn: &Lcbn) -> YieldOutcome {
        let completed = match &mut *self.state.lock() {
            CbTreeState::Record(recorder) => recorder.complete(&lcbn.key),
            CbTreeState::Replay(replay) => replay.running.remove(&lcbn.key),
        };
        if completed {
            YieldOutcome::Completed
        } else {
            YieldOutcome::Proceed
        }
    }
}

impl SchedulingPolicy for CbTreePolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::CbTree
    }

    fn register_lcbn(&self, lcbn: &Lcbn) {
        match &mut *self.state.lock() {
            CbTreeState::Record(recorder) => {
                recorder.register(lcbn);
            }
            CbTreeState::Replay(replay) => {
                if !replay.registered.insert(lcbn.key) {
                    debug!(lcbn = %lcbn, "callback registered twice during replay");
                }
            }
        }
    }

    fn next_lcbn_type(&self) -> NextCallbackType {
        match &*self.state.lock() {
            CbTreeState::Record(_) => NextCallbackType::Any,
            CbTreeState::Replay(replay) if replay.divergence.is_some() => NextCallbackType::Any,
            CbTreeState::Replay(replay) => replay
                .expected
                .front()
                .map_or(NextCallbackType::NoneRemaining, |head| {
                    NextCallbackType::Exactly(head.cb_type)
                }),
        }
    }

    fn thread_yield(&self, point: &YieldPoint, ctx: &YieldContext<'_>) -> YieldOutcome {
        match point {
            YieldPoint::BeforeExecCb(lcbn) => {
                self.before_exec(lcbn, ctx);
                YieldOutcome::Proceed
            }
            YieldPoint::AfterExecCb(lcbn) => self.after_exec(lcbn),
            _ => YieldOutcome::Proceed,
        }
    }

    fn emit(&self, path: &Path) -> Result<(), SchedulerError> {
        let log = match &*self.state.lock() {
            CbTreeState::Record(recorder) => {
                recorder.to_log(PolicyKind::CbTree, SchedulerMode::Record, false)
            }
            CbTreeState::Replay(replay) => {
                let mut log = ScheduleLog::new(PolicyKind::CbTree, SchedulerMode::Replay);
                log.diverged = replay.divergence.is_some();
                log.callbacks = replay.trace.clone();
                log
            }
        };
        schedule_file::store(path, &log)
    }

    fn lcbns_remaining(&self) -> usize {
        match &*self.state.lock() {
            CbTreeState::Record(recorder) => recorder.remaining(),
            CbTreeState::Replay(replay) => replay.expected.len(),
        }
    }

    fn has_diverged(&self) -> bool {
        self.divergence().is_some()
    }
}
