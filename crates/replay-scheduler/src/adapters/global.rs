//! Process-wide Scheduler
//!
//! An instrumented runtime has no convenient place to thread a scheduler
//! handle through every yield point, so it talks to one process-wide
//! instance through the free functions here. Embedders that can pass a
//! handle should construct a [`Scheduler`] directly instead.
//!
//! ```text
//! initialize(config) ──> OnceCell<Scheduler> ──> scheduler()
//!      │ second call                               │ before initialize
//!      ▼                                           ▼
//!    abort                                       abort
//! ```
//!
//! The instance lives for the rest of the process.

use once_cell::sync::OnceCell;
use std::path::PathBuf;

use crate::domain::error::{violated, ContractViolation, SchedulerError};
use crate::domain::scheduler::Scheduler;
use crate::domain::types::{Lcbn, NextCallbackType, SchedulerMode, ThreadRole, YieldPoint};
use crate::infrastructure::config::SchedulerConfig;

static SCHEDULER: OnceCell<Scheduler> = OnceCell::new();

/// Install the process-wide scheduler
///
/// Aborts if a scheduler is already installed, or if the policy cannot be
/// constructed (e.g. a REPLAY recording that cannot be loaded).
pub fn initialize(config: SchedulerConfig) -> &'static Scheduler {
    let mut fresh = false;
    let scheduler = SCHEDULER.get_or_init(|| {
        fresh = true;
        Scheduler::new(config)
    });
    if !fresh {
        violated(ContractViolation::AlreadyInitialized);
    }
    scheduler
}

/// Install the process-wide scheduler configured from the environment
///
/// Configuration errors are returned; everything else behaves like
/// [`initialize`].
pub fn initialize_from_env() -> Result<&'static Scheduler, SchedulerError> {
    let config = SchedulerConfig::from_env()?;
    config.log_summary();
    Ok(initialize(config))
}

/// `true` once [`initialize`] has completed
pub fn is_initialized() -> bool {
    SCHEDULER.get().is_some()
}

/// The process-wide scheduler; aborts if none is installed
pub fn scheduler() -> &'static Scheduler {
    instance("scheduler")
}

fn instance(operation: &'static str) -> &'static Scheduler {
    match SCHEDULER.get() {
        Some(scheduler) => scheduler,
        None => violated(ContractViolation::NotInitialized { operation }),
    }
}

/// See [`Scheduler::register_thread`]
pub fn register_thread(role: ThreadRole) {
    instance("register_thread").register_thread(role);
}

/// See [`Scheduler::register_lcbn`]
pub fn register_lcbn(lcbn: &Lcbn) {
    instance("register_lcbn").register_lcbn(lcbn);
}

/// See [`Scheduler::next_lcbn_type`]
pub fn next_lcbn_type() -> NextCallbackType {
    instance("next_lcbn_type").next_lcbn_type()
}

/// See [`Scheduler::thread_yield`]
pub fn thread_yield(point: YieldPoint) {
    instance("thread_yield").thread_yield(point);
}

/// See [`Scheduler::emit`]
pub fn emit() -> Result<PathBuf, SchedulerError> {
    instance("emit").emit()
}

/// See [`Scheduler::lcbns_remaining`]
pub fn lcbns_remaining() -> usize {
    instance("lcbns_remaining").lcbns_remaining()
}

/// See [`Scheduler::has_diverged`]
pub fn has_diverged() -> bool {
    instance("has_diverged").has_diverged()
}

/// See [`Scheduler::n_executed`]
pub fn n_executed() -> u64 {
    instance("n_executed").n_executed()
}

/// See [`Scheduler::mode`]
pub fn mode() -> SchedulerMode {
    instance("mode").mode()
}
