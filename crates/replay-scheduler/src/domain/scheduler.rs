//! Scheduler Facade
//!
//! # Overview
//!
//! The single entry point the instrumented runtime talks to. The facade
//! owns no ordering logic; it
//!
//! 1. checks that it is a live, initialized scheduler,
//! 2. takes the [`SyncGuard`],
//! 3. resolves the calling thread's role,
//! 4. forwards to the active [`SchedulingPolicy`].
//!
//! ```text
//!   runtime threads
//!        │ register_thread / register_lcbn / thread_yield / ...
//!        ▼
//! ┌────────────────────────────────────────────┐
//! │ Scheduler                                  │
//! │   magic ── validity check on every call    │
//! │   guard ── reentrant monitor               │
//! │   registry ── ThreadId → ThreadRole        │
//! │   executed ── completed callbacks          │
//! │   policy ── Box<dyn SchedulingPolicy>      │
//! └────────────────────────────────────────────┘
//! ```
//!
//! # Failure Semantics
//!
//! Misuse (an unregistered thread, a corrupted instance) aborts the process
//! through [`violated`]. Only `emit()` returns a `Result`, because I/O
//! failures are the caller's to handle.
//!
//! `n_executed()` is the one read taken without the guard; it may lag
//! behind a concurrent completion.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use tracing::{debug, info};

use super::error::{violated, ContractViolation, SchedulerError};
use super::guard::SyncGuard;
use super::policy::{build_policy, SchedulingPolicy, YieldContext};
use super::registry::ThreadRegistry;
use super::schedule::emit_path;
use super::types::{Lcbn, NextCallbackType, PolicyKind, SchedulerMode, ThreadRole, YieldPoint};
use crate::infrastructure::config::SchedulerConfig;

/// Validity tag of a live scheduler
pub const SCHEDULER_MAGIC: u32 = 8_675_309;

/// Record/replay callback scheduler
pub struct Scheduler {
    magic: AtomicU32,
    policy_kind: PolicyKind,
    mode: SchedulerMode,
    schedule_file: PathBuf,
    executed: AtomicU64,
    registry: ThreadRegistry,
    guard: SyncGuard,
    policy: Box<dyn SchedulingPolicy>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("policy", &self.policy_kind)
            .field("mode", &self.mode)
            .field("schedule_file", &self.schedule_file)
            .field("executed", &self.executed.load(Ordering::Relaxed))
            .field("threads", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Build a scheduler, aborting the process if the policy cannot be built
    ///
    /// A REPLAY scheduler whose recording cannot be loaded is unusable, and
    /// the runtime has no way to continue without one.
    pub fn new(config: SchedulerConfig) -> Self {
        match Self::try_new(config) {
            Ok(scheduler) => scheduler,
            Err(e) => violated(ContractViolation::PolicyConstruction(e)),
        }
    }

    /// Build a scheduler, returning policy construction failures
    pub fn try_new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let SchedulerConfig {
            policy: policy_kind,
            mode,
            schedule_file,
            args,
        } = config;

        let policy = build_policy(policy_kind, mode, &schedule_file, args)?;

        let scheduler = Self {
            magic: AtomicU32::new(0),
            policy_kind,
            mode,
            schedule_file,
            executed: AtomicU64::new(0),
            registry: ThreadRegistry::new(),
            guard: SyncGuard::new(),
            policy,
        };

        // Tag last: only a fully built scheduler passes `check`
        scheduler.magic.store(SCHEDULER_MAGIC, Ordering::Release);

        info!(
            policy = %policy_kind,
            mode = %mode,
            schedule_file = %scheduler.schedule_file.display(),
            "🚀 Scheduler initialized"
        );
        Ok(scheduler)
    }

    #[inline(always)]
    fn check(&self, operation: &'static str) {
        let found = self.magic.load(Ordering::Acquire);
        if found != SCHEDULER_MAGIC {
            violated(ContractViolation::Corrupted { operation, found });
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Runtime Hooks
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Register the calling thread as `role`
    ///
    /// Every thread must do this once before its first yield point.
    /// Registering twice aborts.
    pub fn register_thread(&self, role: ThreadRole) {
        self.check("register_thread");
        let _held = self.guard.lock();
        let thread = thread::current().id();
        self.registry.register(thread, role);
        debug!(?thread, %role, "🧵 Thread registered");
    }

    /// A callback node was scheduled
    pub fn register_lcbn(&self, lcbn: &Lcbn) {
        self.check("register_lcbn");
        let _held = self.guard.lock();
        self.policy.register_lcbn(lcbn);
    }

    /// Which category of callback the runtime should dispatch next
    pub fn next_lcbn_type(&self) -> NextCallbackType {
        self.check("next_lcbn_type");
        let _held = self.guard.lock();
        self.policy.next_lcbn_type()
    }

    /// The calling thread reached `point`
    ///
    /// May block until the policy lets the thread continue. The guard is
    /// not held while blocked, so other threads (and nested calls on this
    /// one) keep making progress.
    pub fn thread_yield(&self, point: YieldPoint) {
        self.check("thread_yield");
        let held = self.guard.lock();
        let thread = thread::current().id();
        let role = self.registry.lookup(thread);

        let ctx = YieldContext::new(thread, role, &self.guard, &held);
        if self.policy.thread_yield(&point, &ctx).is_completed() {
            self.executed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Persist the schedule and return the path written
    ///
    /// The path is the configured schedule file, with `-replay` appended in
    /// REPLAY mode. Calling `emit` again overwrites the same file.
    pub fn emit(&self) -> Result<PathBuf, SchedulerError> {
        self.check("emit");
        let _held = self.guard.lock();
        let path = emit_path(&self.schedule_file, self.mode);
        self.policy.emit(&path)?;

        info!(
            path = %path.display(),
            executed = self.executed.load(Ordering::Relaxed),
            diverged = self.policy.has_diverged(),
            "💾 Schedule emitted"
        );
        Ok(path)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Queries
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Callbacks the policy still expects to start
    pub fn lcbns_remaining(&self) -> usize {
        self.check("lcbns_remaining");
        let _held = self.guard.lock();
        self.policy.lcbns_remaining()
    }

    /// Whether a replay has left its recording (never clears)
    pub fn has_diverged(&self) -> bool {
        self.check("has_diverged");
        let _held = self.guard.lock();
        self.policy.has_diverged()
    }

    /// Completed callback executions so far (unsynchronized, may be stale)
    pub fn n_executed(&self) -> u64 {
        self.check("n_executed");
        self.executed.load(Ordering::Relaxed)
    }

    /// Mode fixed at construction
    pub fn mode(&self) -> SchedulerMode {
        self.check("mode");
        self.mode
    }

    /// Policy fixed at construction
    pub fn policy_kind(&self) -> PolicyKind {
        self.check("policy_kind");
        self.policy_kind
    }

    /// Configured schedule file (before any replay suffix)
    pub fn schedule_file(&self) -> &Path {
        self.check("schedule_file");
        &self.schedule_file
    }

    /// Role of `thread`; aborts if it never registered
    pub fn thread_role(&self, thread: ThreadId) -> ThreadRole {
        self.check("thread_role");
        let _held = self.guard.lock();
        self.registry.lookup(thread)
    }

    /// Number of registered threads
    pub fn registered_threads(&self) -> usize {
        self.check("registered_threads");
        self.registry.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::PolicyArgs;
    use crate::domain::types::{CallbackType, LcbnKey};
    use crate::infrastructure::schedule_file;

    fn record_config(dir: &tempfile::TempDir) -> SchedulerConfig {
        SchedulerConfig::new(PolicyKind::CbTree).with_schedule_file(dir.path().join("sched"))
    }

    fn run_callback(scheduler: &Scheduler, lcbn: Lcbn) {
        scheduler.thread_yield(YieldPoint::BeforeExecCb(lcbn));
        scheduler.thread_yield(YieldPoint::AfterExecCb(lcbn));
    }

    #[test]
    fn test_fresh_scheduler_state() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(record_config(&dir));

        assert_eq!(scheduler.mode(), SchedulerMode::Record);
        assert_eq!(scheduler.policy_kind(), PolicyKind::CbTree);
        assert_eq!(scheduler.n_executed(), 0);
        assert_eq!(scheduler.lcbns_remaining(), 0);
        assert_eq!(scheduler.registered_threads(), 0);
        assert!(!scheduler.has_diverged());
        assert_eq!(scheduler.schedule_file(), dir.path().join("sched"));
    }

    #[test]
    fn test_executed_counts_completions_not_yields() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(record_config(&dir));
        scheduler.register_thread(ThreadRole::Looper);

        let a = Lcbn::root(LcbnKey::new(0, 1, 0), CallbackType::Timer);
        scheduler.register_lcbn(&a);
        assert_eq!(scheduler.lcbns_remaining(), 1);

        scheduler.thread_yield(YieldPoint::TpBeforeGetWork);
        assert_eq!(scheduler.n_executed(), 0);

        run_callback(&scheduler, a);
        assert_eq!(scheduler.n_executed(), 1);
        assert_eq!(scheduler.lcbns_remaining(), 0);

        // A second AFTER for the same node is not a new completion
        scheduler.thread_yield(YieldPoint::AfterExecCb(a));
        assert_eq!(scheduler.n_executed(), 1);
    }

    #[test]
    fn test_thread_role_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(record_config(&dir));
        scheduler.register_thread(ThreadRole::ThreadPool);

        assert_eq!(scheduler.thread_role(thread::current().id()), ThreadRole::ThreadPool);
        assert_eq!(scheduler.registered_threads(), 1);
    }

    #[test]
    fn test_emit_writes_trace_and_returns_path() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(record_config(&dir));
        scheduler.register_thread(ThreadRole::Looper);

        let root = Lcbn::root(LcbnKey::new(0, 0, 0), CallbackType::InitialStack);
        let timer = Lcbn::child_of(&root, LcbnKey::new(0, 1, 0), CallbackType::Timer);
        for lcbn in [root, timer] {
            scheduler.register_lcbn(&lcbn);
            run_callback(&scheduler, lcbn);
        }

        let path = scheduler.emit().unwrap();
        assert_eq!(path, dir.path().join("sched"));

        let log = schedule_file::load(&path).unwrap();
        let keys: Vec<_> = log.callbacks.iter().map(|cb| cb.key).collect();
        assert_eq!(keys, vec![root.key, timer.key]);
        assert_eq!(log.callbacks[1].parent, Some(root.key));
    }

    #[test]
    fn test_try_new_reports_missing_recording() {
        let dir = tempfile::tempdir().unwrap();
        let config = record_config(&dir).with_mode(SchedulerMode::Replay);

        let err = Scheduler::try_new(config).unwrap_err();
        assert!(matches!(err, SchedulerError::Io { .. }));
    }

    #[test]
    fn test_try_new_reports_args_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let config = record_config(&dir).with_args(PolicyArgs::default_for(PolicyKind::FuzzerTimer));

        let err = Scheduler::try_new(config).unwrap_err();
        assert!(matches!(err, SchedulerError::ArgsMismatch { .. }));
    }

    #[test]
    fn test_emit_failure_leaves_state_intact() {
        let dir = tempfile::tempdir().unwrap();
        let config = SchedulerConfig::new(PolicyKind::CbTree)
            .with_schedule_file(dir.path().join("missing/dir/sched"));
        let scheduler = Scheduler::new(config);
        scheduler.register_thread(ThreadRole::Looper);

        let a = Lcbn::root(LcbnKey::new(0, 1, 0), CallbackType::Idle);
        scheduler.register_lcbn(&a);
        run_callback(&scheduler, a);

        assert!(scheduler.emit().is_err());
        assert_eq!(scheduler.n_executed(), 1);
        assert!(!scheduler.has_diverged());
    }
}
