//! Domain Layer
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Domain Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  Scheduler (facade)                                         │
//! │  ├─ validity tag                                            │
//! │  ├─ SyncGuard ── reentrant monitor                          │
//! │  ├─ ThreadRegistry ── ThreadId → LOOPER | THREADPOOL        │
//! │  └─ Box<dyn SchedulingPolicy>                               │
//! │        ├─ CbTreePolicy          (record + replay)           │
//! │        ├─ FuzzTimerPolicy       (record)                    │
//! │        └─ FuzzThreadOrderPolicy (record)                    │
//! │                                                             │
//! │  Schedule model ── ScheduleLog / ScheduledCallback          │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The policy is picked once at construction; nothing above it branches on
//! the kind afterwards.

pub mod error;
pub mod guard;
pub mod policy;
pub mod registry;
pub mod schedule;
pub mod scheduler;
pub mod types;

pub use error::{ContractViolation, SchedulerError};
pub use guard::{GuardHeld, SyncGuard, WaitOutcome};
pub use policy::{
    build_policy, CbTreePolicy, FuzzThreadOrderArgs, FuzzThreadOrderPolicy, FuzzTimerArgs,
    FuzzTimerPolicy, PolicyArgs, SchedulingPolicy, YieldContext, YieldOutcome,
};
pub use registry::ThreadRegistry;
pub use schedule::{ScheduleLog, ScheduledCallback};
pub use scheduler::{Scheduler, SCHEDULER_MAGIC};
pub use types::{
    CallbackType, Lcbn, LcbnKey, NextCallbackType, PointKind, PolicyKind, SchedulerMode,
    ThreadRole, YieldPoint,
};
