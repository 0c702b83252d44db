//! Scheduler Types - Vocabulary shared by the facade and every policy
//!
//! # Overview
//!
//! This module defines the value types that flow across the scheduler
//! boundary: which ordering policy is active, which mode it runs in, what
//! role a thread plays, what a Logical Callback Node (LCBN) looks like, and
//! the six yield points the runtime instruments.
//!
//! All of these are small `Copy` values. The facade treats LCBNs and yield
//! point details as opaque and only hands them to the active policy; the
//! policies are the only readers of their fields.
//!
//! # Wire Names
//!
//! Every enum here has a stable upper-case name (`CBTREE`, `RECORD`,
//! `LOOPER`, `BEFORE_EXEC_CB`, ...) used both by `Display` and by the serde
//! representation of the schedule file and the environment configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::SchedulerError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy Kind & Mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which ordering discipline the scheduler runs
///
/// Fixed at construction; the facade never branches on it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyKind {
    /// Deterministic, key-matched policy. The only one that can replay.
    #[serde(rename = "CBTREE")]
    CbTree,

    /// Injects random delays at yield points
    FuzzerTimer,

    /// Randomly picks which waiting thread proceeds
    FuzzerThreadOrder,
}

impl PolicyKind {
    /// All kinds, in declaration order
    pub const ALL: [PolicyKind; 3] = [
        PolicyKind::CbTree,
        PolicyKind::FuzzerTimer,
        PolicyKind::FuzzerThreadOrder,
    ];

    /// Stable upper-case name
    pub const fn as_str(self) -> &'static str {
        match self {
            PolicyKind::CbTree => "CBTREE",
            PolicyKind::FuzzerTimer => "FUZZER_TIMER",
            PolicyKind::FuzzerThreadOrder => "FUZZER_THREAD_ORDER",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SchedulerError::Config(format!("unknown scheduler type: {s:?}")))
    }
}

/// Whether the scheduler records a fresh order or enforces a loaded one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerMode {
    /// Observe and persist the live order
    Record,

    /// Enforce a previously persisted order
    Replay,
}

impl SchedulerMode {
    /// Stable upper-case name
    pub const fn as_str(self) -> &'static str {
        match self {
            SchedulerMode::Record => "RECORD",
            SchedulerMode::Replay => "REPLAY",
        }
    }

    /// `true` in REPLAY mode
    #[inline(always)]
    pub const fn is_replay(self) -> bool {
        matches!(self, SchedulerMode::Replay)
    }
}

impl fmt::Display for SchedulerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerMode {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RECORD" => Ok(SchedulerMode::Record),
            "REPLAY" => Ok(SchedulerMode::Replay),
            _ => Err(SchedulerError::Config(format!("unknown scheduler mode: {s:?}"))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Thread Roles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Role an OS thread plays in the event-loop runtime
///
/// There is exactly one looper; there may be any number of thread-pool
/// workers. Roles are registered once per thread and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadRole {
    /// The thread driving event-loop dispatch
    Looper,

    /// A worker executing offloaded blocking work
    #[serde(rename = "THREADPOOL")]
    ThreadPool,
}

impl ThreadRole {
    /// Stable upper-case name
    pub const fn as_str(self) -> &'static str {
        match self {
            ThreadRole::Looper => "LOOPER",
            ThreadRole::ThreadPool => "THREADPOOL",
        }
    }
}

impl fmt::Display for ThreadRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logical Callback Nodes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Category of an asynchronous callback
///
/// The runtime asks the scheduler which category to dispatch next
/// ([`NextCallbackType`]); in REPLAY mode the answer is the category of the
/// next recorded callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackType {
    /// Code run before the loop starts (initial stack)
    InitialStack,
    /// Buffer allocation for a read
    Alloc,
    /// Data read from a stream
    Read,
    /// Write request completed
    Write,
    /// Outgoing connection established
    Connect,
    /// Stream shutdown completed
    Shutdown,
    /// Incoming connection accepted
    Connection,
    /// Handle closed
    Close,
    /// Poll watcher fired
    Poll,
    /// Timer expired
    Timer,
    /// Async handle woken
    Async,
    /// Prepare phase hook
    Prepare,
    /// Check phase hook
    Check,
    /// Idle phase hook
    Idle,
    /// Child process exited
    Exit,
    /// Filesystem work on a thread-pool worker
    FsWork,
    /// Filesystem completion on the looper
    Fs,
    /// User work on a thread-pool worker
    Work,
    /// User work completion on the looper
    AfterWork,
    /// DNS lookup on a thread-pool worker
    GetAddrInfoWork,
    /// DNS lookup completion on the looper
    GetAddrInfo,
    /// Signal delivered
    Signal,
}

impl CallbackType {
    /// `true` for categories executed by thread-pool workers
    pub const fn runs_on_thread_pool(self) -> bool {
        matches!(
            self,
            CallbackType::FsWork | CallbackType::Work | CallbackType::GetAddrInfoWork
        )
    }
}

impl fmt::Display for CallbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the serde name so logs and schedule files agree
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(name)) => f.write_str(&name),
            _ => write!(f, "{self:?}"),
        }
    }
}

/// Answer to "which category should the runtime dispatch next?"
///
/// Policies must always answer; `NoneRemaining` is an answer, not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NextCallbackType {
    /// No constraint: dispatch whatever is ready
    Any,

    /// Only this category may run next
    Exactly(CallbackType),

    /// The policy expects no further callbacks
    NoneRemaining,
}

impl fmt::Display for NextCallbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextCallbackType::Any => f.write_str("ANY"),
            NextCallbackType::Exactly(cb_type) => write!(f, "{cb_type}"),
            NextCallbackType::NoneRemaining => f.write_str("NONE_REMAINING"),
        }
    }
}

/// Stable identity of a callback node within the callback tree
///
/// `tree` numbers the root (the initial stack and each externally triggered
/// root), `level` is the depth below it and `entry` the position among the
/// nodes registered at that depth. The same program produces the same keys
/// on every run, which is what lets a replay match live callbacks against a
/// recording. The derived ordering is the order pending nodes are kept in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct LcbnKey {
    /// Tree number
    pub tree: u32,
    /// Depth in the tree
    pub level: u32,
    /// Position among siblings at this depth
    pub entry: u32,
}

impl LcbnKey {
    /// Create a new key
    #[inline(always)]
    pub const fn new(tree: u32, level: u32, entry: u32) -> Self {
        Self { tree, level, entry }
    }
}

impl fmt::Display for LcbnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}|{}|{}>", self.tree, self.level, self.entry)
    }
}

/// Logical Callback Node
///
/// Descriptor of one schedulable unit of asynchronous work, built by the
/// runtime when the callback is scheduled. The facade never looks inside.
///
/// # Example
///
/// ```rust
/// use replay_scheduler::domain::types::{CallbackType, Lcbn, LcbnKey};
///
/// let root = Lcbn::root(LcbnKey::new(0, 0, 0), CallbackType::InitialStack);
/// let timer = Lcbn::child_of(&root, LcbnKey::new(0, 1, 0), CallbackType::Timer);
///
/// assert_eq!(timer.parent, Some(root.key));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lcbn {
    /// Stable identity
    pub key: LcbnKey,

    /// Node that registered this one, if any
    pub parent: Option<LcbnKey>,

    /// Callback category
    pub cb_type: CallbackType,
}

impl Lcbn {
    /// Create a node with no parent
    pub const fn root(key: LcbnKey, cb_type: CallbackType) -> Self {
        Self {
            key,
            parent: None,
            cb_type,
        }
    }

    /// Create a node registered by `parent`
    pub const fn child_of(parent: &Lcbn, key: LcbnKey, cb_type: CallbackType) -> Self {
        Self {
            key,
            parent: Some(parent.key),
            cb_type,
        }
    }
}

impl fmt::Display for Lcbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.cb_type)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Yield Points
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The six instrumentation sites, without their details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PointKind {
    /// A callback is about to run
    BeforeExecCb,
    /// A callback just returned
    AfterExecCb,
    /// A worker is about to take an item off the work queue
    TpBeforeGetWork,
    /// A worker took an item (or found none)
    TpAfterGetWork,
    /// A worker is about to hand a finished item back to the looper
    TpBeforePutDone,
    /// A worker handed a finished item back
    TpAfterPutDone,
}

impl PointKind {
    /// Stable upper-case name
    pub const fn as_str(self) -> &'static str {
        match self {
            PointKind::BeforeExecCb => "BEFORE_EXEC_CB",
            PointKind::AfterExecCb => "AFTER_EXEC_CB",
            PointKind::TpBeforeGetWork => "TP_BEFORE_GET_WORK",
            PointKind::TpAfterGetWork => "TP_AFTER_GET_WORK",
            PointKind::TpBeforePutDone => "TP_BEFORE_PUT_DONE",
            PointKind::TpAfterPutDone => "TP_AFTER_PUT_DONE",
        }
    }

    /// `true` for the points at which a thread is about to do something
    #[inline(always)]
    pub const fn is_before(self) -> bool {
        matches!(
            self,
            PointKind::BeforeExecCb | PointKind::TpBeforeGetWork | PointKind::TpBeforePutDone
        )
    }
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A yield point together with its point-specific details
///
/// Exec points name the callback being run. Thread-pool points name the
/// work item's node when the worker knows it (`None` when the queue was
/// empty or the item carries no node).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldPoint {
    /// About to invoke the callback for this node
    BeforeExecCb(Lcbn),
    /// Finished invoking the callback for this node
    AfterExecCb(Lcbn),
    /// About to dequeue work
    TpBeforeGetWork,
    /// Dequeued this work item
    TpAfterGetWork(Option<LcbnKey>),
    /// About to post completion of this work item
    TpBeforePutDone(Option<LcbnKey>),
    /// Posted completion of this work item
    TpAfterPutDone(Option<LcbnKey>),
}

impl YieldPoint {
    /// Which site this is
    pub const fn kind(&self) -> PointKind {
        match self {
            YieldPoint::BeforeExecCb(_) => PointKind::BeforeExecCb,
            YieldPoint::AfterExecCb(_) => PointKind::AfterExecCb,
            YieldPoint::TpBeforeGetWork => PointKind::TpBeforeGetWork,
            YieldPoint::TpAfterGetWork(_) => PointKind::TpAfterGetWork,
            YieldPoint::TpBeforePutDone(_) => PointKind::TpBeforePutDone,
            YieldPoint::TpAfterPutDone(_) => PointKind::TpAfterPutDone,
        }
    }
}

impl fmt::Display for YieldPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YieldPoint::BeforeExecCb(lcbn) | YieldPoint::AfterExecCb(lcbn) => {
                write!(f, "{} {}", self.kind(), lcbn)
            }
            YieldPoint::TpAfterGetWork(Some(key))
            | YieldPoint::TpBeforePutDone(Some(key))
            | YieldPoint::TpAfterPutDone(Some(key)) => write!(f, "{} {}", self.kind(), key),
            _ => write!(f, "{}", self.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_kind_parses_case_insensitively() {
        assert_eq!("cbtree".parse::<PolicyKind>().unwrap(), PolicyKind::CbTree);
        assert_eq!(
            "FUZZER_THREAD_ORDER".parse::<PolicyKind>().unwrap(),
            PolicyKind::FuzzerThreadOrder
        );
        assert!("round_robin".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn test_mode_parse_and_display_agree() {
        for mode in [SchedulerMode::Record, SchedulerMode::Replay] {
            assert_eq!(mode.to_string().parse::<SchedulerMode>().unwrap(), mode);
        }
        assert!(SchedulerMode::Replay.is_replay());
        assert!(!SchedulerMode::Record.is_replay());
    }

    #[test]
    fn test_serde_names_match_display() {
        let json = serde_json::to_string(&PolicyKind::CbTree).unwrap();
        assert_eq!(json, "\"CBTREE\"");

        let json = serde_json::to_string(&ThreadRole::ThreadPool).unwrap();
        assert_eq!(json, "\"THREADPOOL\"");

        assert_eq!(CallbackType::AfterWork.to_string(), "AFTER_WORK");
    }

    #[test]
    fn test_key_ordering_is_tree_then_level_then_entry() {
        let mut keys = vec![
            LcbnKey::new(1, 0, 0),
            LcbnKey::new(0, 2, 0),
            LcbnKey::new(0, 1, 3),
            LcbnKey::new(0, 1, 1),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                LcbnKey::new(0, 1, 1),
                LcbnKey::new(0, 1, 3),
                LcbnKey::new(0, 2, 0),
                LcbnKey::new(1, 0, 0),
            ]
        );
    }

    #[test]
    fn test_yield_point_kinds() {
        let lcbn = Lcbn::root(LcbnKey::new(0, 0, 0), CallbackType::Timer);
        assert_eq!(YieldPoint::BeforeExecCb(lcbn).kind(), PointKind::BeforeExecCb);
        assert_eq!(YieldPoint::TpAfterPutDone(None).kind(), PointKind::TpAfterPutDone);

        assert!(PointKind::TpBeforeGetWork.is_before());
        assert!(!PointKind::AfterExecCb.is_before());
        assert_eq!(YieldPoint::TpBeforeGetWork.to_string(), "TP_BEFORE_GET_WORK");
    }
}
