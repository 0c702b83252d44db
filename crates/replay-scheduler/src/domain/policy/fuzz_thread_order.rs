//! FUZZER_THREAD_ORDER Policy - Random release of waiting threads
//!
//! # Algorithm
//!
//! A thread arriving at a "before" point takes a ticket and joins the
//! waiting set. A decision is made when either
//!
//! - `degrees_of_freedom` threads are waiting, or
//! - the oldest waiter has waited `max_delay` (so a lone thread is never
//!   stuck waiting for company that will not come).
//!
//! A decision picks one waiter uniformly at random from a seeded ChaCha
//! stream and releases exactly that one. No further decision is made until
//! the chosen thread has left the waiting set.
//!
//! ```text
//! T1 ─┐
//! T2 ─┼─> waiting {t1, t2, t3} ── pick t2 ──> T2 runs
//! T3 ─┘                                       T1, T3 wait for the next pick
//! ```
//!
//! RECORD mode only.

use parking_lot::Mutex;
use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore as _, SeedableRng as _};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use super::recorder::ScheduleRecorder;
use super::{FuzzThreadOrderArgs, SchedulingPolicy, YieldContext, YieldOutcome};
use crate::domain::error::SchedulerError;
use crate::domain::types::{Lcbn, NextCallbackType, PolicyKind, SchedulerMode, YieldPoint};
use crate::infrastructure::schedule_file;

type Ticket = u64;

#[derive(Debug)]
struct OrderState {
    rng: ChaCha20Rng,
    recorder: ScheduleRecorder,
    next_ticket: Ticket,
    waiting: BTreeMap<Ticket, Instant>,
    chosen: Option<Ticket>,
    decisions: u64,
}

enum Turn {
    Mine,
    Picked,
    Wait,
}

impl OrderState {
    fn enqueue(&mut self) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.waiting.insert(ticket, Instant::now());
        ticket
    }

    fn turn(&mut self, ticket: Ticket, args: &FuzzThreadOrderArgs) -> Turn {
        if self.chosen.is_none() && self.ready_to_pick(args) {
            let index = (self.rng.next_u64() % self.waiting.len() as u64) as usize;
            let pick = self.waiting.keys().nth(index).copied();
            self.chosen = pick;
            self.decisions += 1;
            debug!(waiting = self.waiting.len(), ?pick, "picked waiter");
            if pick != Some(ticket) {
                return Turn::Picked;
            }
        }

        if self.chosen == Some(ticket) {
            self.chosen = None;
            self.waiting.remove(&ticket);
            Turn::Mine
        } else {
            Turn::Wait
        }
    }

    fn ready_to_pick(&self, args: &FuzzThreadOrderArgs) -> bool {
        if self.waiting.len() >= args.degrees_of_freedom {
            return true;
        }
        self.waiting
            .values()
            .next()
            .is_some_and(|since| since.elapsed() >= args.max_delay)
    }
}

/// Random thread-release fuzzing policy
#[derive(Debug)]
pub struct FuzzThreadOrderPolicy {
    args: FuzzThreadOrderArgs,
    state: Mutex<OrderState>,
}

impl FuzzThreadOrderPolicy {
    /// Build a thread-order fuzzer
    ///
    /// Fails for REPLAY mode and for zero degrees of freedom.
    pub fn new(mode: SchedulerMode, args: FuzzThreadOrderArgs) -> Result<Self, SchedulerError> {
        if mode.is_replay() {
            return Err(SchedulerError::UnsupportedMode {
                kind: PolicyKind::FuzzerThreadOrder,
                mode,
            });
        }
        if args.degrees_of_freedom == 0 {
            return Err(SchedulerError::Config(
                "degrees of freedom must be at least 1".to_string(),
            ));
        }

        info!(
            degrees_of_freedom = args.degrees_of_freedom,
            max_delay_us = args.max_delay.as_micros() as u64,
            seed = args.seed,
            "🎲 Thread-order fuzzer ready"
        );

        Ok(Self {
            args,
            state: Mutex::new(OrderState {
                rng: ChaCha20Rng::seed_from_u64(args.seed),
                recorder: ScheduleRecorder::new(),
                next_ticket: 0,
                waiting: BTreeMap::new(),
                chosen: None,
                decisions: 0,
            }),
        })
    }

    /// Arguments this fuzzer was built with
    pub fn args(&self) -> FuzzThreadOrderArgs {
        self.args
    }

    /// Number of release decisions made so far
    pub fn decisions(&self) -> u64 {
        self.state.lock().decisions
    }

    /// Threads currently parked at a "before" point
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting.len()
    }

    fn take_turn(&self, ctx: &YieldContext<'_>) {
        let ticket = self.state.lock().enqueue();

        let mut still_waiting = || match self.state.lock().turn(ticket, &self.args) {
            Turn::Mine => false,
            Turn::Picked => {
                ctx.notify();
                true
            }
            Turn::Wait => true,
        };

        // The bound re-checks the oldest waiter's age even if nobody arrives
        while ctx
            .wait_while_for(&mut still_waiting, self.args.max_delay)
            .timed_out()
        {}
    }
}

impl SchedulingPolicy for FuzzThreadOrderPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::FuzzerThreadOrder
    }

    fn register_lcbn(&self, lcbn: &Lcbn) {
        self.state.lock().recorder.register(lcbn);
    }

    fn next_lcbn_type(&self) -> NextCallbackType {
        NextCallbackType::Any
    }

    fn thread_yield(&self, point: &YieldPoint, ctx: &YieldContext<'_>) -> YieldOutcome {
        if point.kind().is_before() {
            self.take_turn(ctx);
        }

        match point {
            YieldPoint::BeforeExecCb(lcbn) => {
                self.state.lock().recorder.begin(lcbn, ctx.role);
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
        let log = self.state.lock().recorder.to_log(
            PolicyKind::FuzzerThreadOrder,
            SchedulerMode::Record,
            false,
        );
        schedule_file::store(path, &log)
    }

    fn lcbns_remaining(&self) -> usize {
        self.state.lock().recorder.remaining()
    }

    fn has_diverged(&self) -> bool {
        false
    }
}
