//! Scheduling Policies
//!
//! # Overview
//!
//! A policy owns every ordering decision: what category of callback runs
//! next, whether a thread arriving at a yield point may continue, and (in
//! REPLAY mode) whether the live run still matches the recording. The
//! facade owns none of this; it validates, takes the guard, and forwards.
//!
//! # Module Structure
//!
//! ```text
//! domain/policy/
//! ├── mod.rs                ✓ SchedulingPolicy contract, args, construction
//! ├── recorder.rs           ✓ RECORD-mode bookkeeping shared by all policies
//! ├── cb_tree.rs            ✓ Deterministic key-matched policy (record + replay)
//! ├── fuzz_timer.rs         ✓ Random-delay fuzzer (record)
//! └── fuzz_thread_order.rs  ✓ Random-release fuzzer (record)
//! ```
//!
//! # Contract
//!
//! Every implementation guarantees:
//!
//! 1. Every registered node is accounted for exactly once.
//! 2. A serialized decision releases at most one blocked thread.
//! 3. In REPLAY mode divergence is flagged as soon as the live sequence
//!    provably cannot match the recording, and nothing is reordered after
//!    that point.
//!
//! All methods run with the facade's [`SyncGuard`] held by the caller.
//! Policies block only through [`YieldContext::wait_while`] and friends,
//! which release the guard while parked.

pub mod cb_tree;
pub mod fuzz_thread_order;
pub mod fuzz_timer;
pub mod recorder;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::thread::ThreadId;
use std::time::Duration;

use super::error::SchedulerError;
use super::guard::{GuardHeld, SyncGuard, WaitOutcome};
use super::types::{Lcbn, NextCallbackType, PolicyKind, SchedulerMode, ThreadRole, YieldPoint};

pub use cb_tree::CbTreePolicy;
pub use fuzz_thread_order::FuzzThreadOrderPolicy;
pub use fuzz_timer::FuzzTimerPolicy;
pub use recorder::ScheduleRecorder;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a yield meant, as far as the facade's counters are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldOutcome {
    /// The thread may continue; nothing completed
    Proceed,

    /// The thread may continue; this yield closed a callback execution
    Completed,
}

impl YieldOutcome {
    /// `true` for [`YieldOutcome::Completed`]
    #[inline(always)]
    pub const fn is_completed(self) -> bool {
        matches!(self, YieldOutcome::Completed)
    }
}

/// Caller information handed to [`SchedulingPolicy::thread_yield`]
pub struct YieldContext<'a> {
    /// OS thread at the yield point
    pub thread: ThreadId,

    /// Its registered role
    pub role: ThreadRole,

    guard: &'a SyncGuard,
    held: &'a GuardHeld<'a>,
}

impl<'a> YieldContext<'a> {
    /// Context for `thread` holding `guard` through `held`
    pub fn new(
        thread: ThreadId,
        role: ThreadRole,
        guard: &'a SyncGuard,
        held: &'a GuardHeld<'a>,
    ) -> Self {
        Self {
            thread,
            role,
            guard,
            held,
        }
    }

    /// Park the calling thread while `cond` holds, releasing the guard
    pub fn wait_while<F: FnMut() -> bool>(&self, cond: F) {
        self.guard.wait_while(self.held, cond);
    }

    /// Bounded [`wait_while`](Self::wait_while)
    pub fn wait_while_for<F: FnMut() -> bool>(&self, cond: F, timeout: Duration) -> WaitOutcome {
        self.guard.wait_while_for(self.held, cond, timeout)
    }

    /// Sleep for `delay` without holding the guard
    pub fn pause(&self, delay: Duration) {
        if !delay.is_zero() {
            let _ = self.guard.wait_while_for(self.held, || true, delay);
        }
    }

    /// Wake parked threads after changing state inside a wait condition
    pub fn notify(&self) {
        self.guard.notify(self.held);
    }
}

/// An ordering algorithm pluggable into the scheduler facade
pub trait SchedulingPolicy: Send + Sync {
    /// Which kind this is
    fn kind(&self) -> PolicyKind;

    /// A callback was scheduled
    fn register_lcbn(&self, lcbn: &Lcbn);

    /// Which category the runtime should dispatch next
    ///
    /// Must always answer.
    fn next_lcbn_type(&self) -> NextCallbackType;

    /// A thread reached `point`; may block it
    fn thread_yield(&self, point: &YieldPoint, ctx: &YieldContext<'_>) -> YieldOutcome;

    /// Persist the recorded (or replayed) order to `path`
    fn emit(&self, path: &Path) -> Result<(), SchedulerError>;

    /// RECORD: registered but not started. REPLAY: recorded but not started.
    fn lcbns_remaining(&self) -> usize;

    /// Whether a replay has provably left its recording
    fn has_diverged(&self) -> bool;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy Arguments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Arguments of the timing fuzzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzTimerArgs {
    /// Shortest injected delay
    pub min_delay: Duration,
    /// Longest injected delay
    pub max_delay: Duration,
    /// RNG seed
    pub seed: u64,
}

impl Default for FuzzTimerArgs {
    fn default() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::from_micros(100),
            seed: 0,
        }
    }
}

/// Arguments of the thread-order fuzzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzThreadOrderArgs {
    /// How many threads must be waiting before one is picked
    pub degrees_of_freedom: usize,
    /// How long the oldest waiter waits for company before a pick is forced
    pub max_delay: Duration,
    /// RNG seed
    pub seed: u64,
}

impl Default for FuzzThreadOrderArgs {
    fn default() -> Self {
        Self {
            degrees_of_freedom: 2,
            max_delay: Duration::from_micros(100),
            seed: 0,
        }
    }
}

/// Per-policy configuration payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyArgs {
    /// CBTREE takes no arguments
    CbTree,
    /// Arguments for FUZZER_TIMER
    FuzzTimer(FuzzTimerArgs),
    /// Arguments for FUZZER_THREAD_ORDER
    FuzzThreadOrder(FuzzThreadOrderArgs),
}

impl PolicyArgs {
    /// Default arguments for `kind`
    pub fn default_for(kind: PolicyKind) -> Self {
        match kind {
            PolicyKind::CbTree => PolicyArgs::CbTree,
            PolicyKind::FuzzerTimer => PolicyArgs::FuzzTimer(FuzzTimerArgs::default()),
            PolicyKind::FuzzerThreadOrder => {
                PolicyArgs::FuzzThreadOrder(FuzzThreadOrderArgs::default())
            }
        }
    }

    /// Name of the variant, for error messages
    pub const fn name(&self) -> &'static str {
        match self {
            PolicyArgs::CbTree => "CBTREE",
            PolicyArgs::FuzzTimer(_) => "FUZZER_TIMER",
            PolicyArgs::FuzzThreadOrder(_) => "FUZZER_THREAD_ORDER",
        }
    }
}

/// Construct the policy for `kind`
///
/// `schedule_file` is the recording a REPLAY-mode policy loads.
pub fn build_policy(
    kind: PolicyKind,
    mode: SchedulerMode,
    schedule_file: &Path,
    args: PolicyArgs,
) -> Result<Box<dyn SchedulingPolicy>, SchedulerError> {
    let policy: Box<dyn SchedulingPolicy> = match (kind, args) {
        (PolicyKind::CbTree, PolicyArgs::CbTree) => match mode {
            SchedulerMode::Record => Box::new(CbTreePolicy::record()),
            SchedulerMode::Replay => Box::new(CbTreePolicy::replay_from(schedule_file)?),
        },
        (PolicyKind::FuzzerTimer, PolicyArgs::FuzzTimer(args)) => {
            Box::new(FuzzTimerPolicy::new(mode, args)?)
        }
        (PolicyKind::FuzzerThreadOrder, PolicyArgs::FuzzThreadOrder(args)) => {
            Box::new(FuzzThreadOrderPolicy::new(mode, args)?)
        }
        (kind, args) => {
            return Err(SchedulerError::ArgsMismatch {
                kind,
                args: args.name(),
            })
        }
    };
    Ok(policy)
}
