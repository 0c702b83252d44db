//! FUZZER_TIMER Policy - Random delays at "before" points
//!
//! Every thread arriving at BEFORE_EXEC_CB, TP_BEFORE_GET_WORK or
//! TP_BEFORE_PUT_DONE sleeps for a delay drawn uniformly from
//! `[min_delay, max_delay]` (microsecond resolution) before continuing.
//! The guard is released during the sleep so other threads can overtake.
//!
//! The delays come from a seeded ChaCha stream, so the same seed produces
//! the same sequence of delays. The resulting interleaving still depends on
//! the OS; only the recorded schedule pins it down.
//!
//! RECORD mode only.

use parking_lot::Mutex;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore as _, SeedableRng as _};
use std::path::Path;
use std::time::Duration;
use tracing::{info, trace};

use super::recorder::ScheduleRecorder;
use super::{FuzzTimerArgs, SchedulingPolicy, YieldContext, YieldOutcome};
use crate::domain::error::SchedulerError;
use crate::domain::types::{
    Lcbn, NextCallbackType, PolicyKind, SchedulerMode, YieldPoint,
};
use crate::infrastructure::schedule_file;

#[derive(Debug)]
struct TimerState {
    rng: ChaCha20Rng,
    recorder: ScheduleRecorder,
}

/// Random-delay fuzzing policy
#[derive(Debug)]
pub struct FuzzTimerPolicy {
    args: FuzzTimerArgs,
    state: Mutex<TimerState>,
}

impl FuzzTimerPolicy {
    /// Build a timer fuzzer
    ///
    /// Fails for REPLAY mode and for `min_delay > max_delay`.
    pub fn new(mode: SchedulerMode, args: FuzzTimerArgs) -> Result<Self, SchedulerError> {
        if mode.is_replay() {
            return Err(SchedulerError::UnsupportedMode {
                kind: PolicyKind::FuzzerTimer,
                mode,
            });
        }
        if args.min_delay > args.max_delay {
            return Err(SchedulerError::Config(format!(
                "min delay {:?} exceeds max delay {:?}",
                args.min_delay, args.max_delay
            )));
        }

        info!(
            min_us = args.min_delay.as_micros() as u64,
            max_us = args.max_delay.as_micros() as u64,
            seed = args.seed,
            "🎲 Timer fuzzer ready"
        );

        Ok(Self {
            args,
            state: Mutex::new(TimerState {
                rng: ChaCha20Rng::seed_from_u64(args.seed),
                recorder: ScheduleRecorder::new(),
            }),
        })
    }

    /// Arguments this fuzzer was built with
    pub fn args(&self) -> FuzzTimerArgs {
        self.args
    }

    fn draw_delay(&self) -> Duration {
        let min = self.args.min_delay.as_micros() as u64;
        let max = self.args.max_delay.as_micros() as u64;
        let span = max - min;
        let offset = if span == 0 {
            0
        } else {
            self.state.lock().rng.next_u64() % (span + 1)
        };
        Duration::from_micros(min + offset)
    }

    fn record_start(&self, lcbn: &Lcbn, ctx: &YieldContext<'_>) {
        self.state.lock().recorder.begin(lcbn, ctx.role);
    }
}

impl SchedulingPolicy for FuzzTimerPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::FuzzerTimer
    }

    fn register_lcbn(&self, lcbn: &Lcbn) {
        self.state.lock().recorder.register(lcbn);
    }

    fn next_lcbn_type(&self) -> NextCallbackType {
        NextCallbackType::Any
    }

    fn thread_yield(&self, point: &YieldPoint, ctx: &YieldContext<'_>) -> YieldOutcome {
        if point.kind().is_before() {
            let delay = self.draw_delay();
            trace!(point = %point, delay_us = delay.as_micros() as u64, "delaying");
            ctx.pause(delay);
        }

        match point {
            YieldPoint::BeforeExecCb(lcbn) => {
                self.record_start(lcbn, ctx);
                YieldOutcome::Proceed
            }
            YieldPoint::AfterExecCb(lcbn) => {
                if self.state.lock().recorder.complete(&lcbn.key) {
                    YieldOutcome::Completed
                } else {
                    YieldOutcome::Proceed
                }
            }
            _ => YieldOutcome::Proceed,
        }
    }

    fn emit(&self, path: &Path) -> Result<(), SchedulerError> {
        let log = self
            .state
            .lock()
            .recorder
            .to_log(PolicyKind::FuzzerTimer, SchedulerMode::Record, false);
        schedule_file::store(path, &log)
    }

    fn lcbns_remaining(&self) -> usize {
        self.state.lock().recorder.remaining()
    }

    fn has_diverged(&self) -> bool {
        false
    }
}
