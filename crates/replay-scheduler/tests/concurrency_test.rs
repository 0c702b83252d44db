//! Integration tests for multi-threaded scheduling
//!
//! One looper plus thread-pool workers, all real OS threads, all going
//! through the same `Scheduler`.

use std::path::Path;
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use replay_scheduler::domain::policy::{FuzzThreadOrderArgs, FuzzTimerArgs};
use replay_scheduler::infrastructure::schedule_file;
use replay_scheduler::{
    CallbackType, Lcbn, LcbnKey, PolicyArgs, PolicyKind, Scheduler, SchedulerConfig,
    SchedulerMode, ThreadRole, YieldPoint,
};

/// Work item a pool worker executes, the way the runtime drives it
fn execute_work(scheduler: &Scheduler, work: Lcbn) {
    scheduler.thread_yield(YieldPoint::TpBeforeGetWork);
    scheduler.thread_yield(YieldPoint::TpAfterGetWork(Some(work.key)));
    scheduler.thread_yield(YieldPoint::BeforeExecCb(work));
    scheduler.thread_yield(YieldPoint::AfterExecCb(work));
    scheduler.thread_yield(YieldPoint::TpBeforePutDone(Some(work.key)));
    scheduler.thread_yield(YieldPoint::TpAfterPutDone(Some(work.key)));
}

fn execute_callback(scheduler: &Scheduler, lcbn: Lcbn) {
    scheduler.thread_yield(YieldPoint::BeforeExecCb(lcbn));
    scheduler.thread_yield(YieldPoint::AfterExecCb(lcbn));
}

fn work_item(entry: u32) -> Lcbn {
    Lcbn::root(LcbnKey::new(1, 1, entry), CallbackType::Work)
}

fn replay_config(path: &Path) -> SchedulerConfig {
    SchedulerConfig::new(PolicyKind::CbTree)
        .with_mode(SchedulerMode::Replay)
        .with_schedule_file(path)
}

/// Looper plus two workers under the thread-order fuzzer
///
/// # Scenario
///
/// - Looper: runs 4 timer callbacks
/// - Worker 0 and worker 1: 3 work items each
///
/// # Expected
///
/// Nobody deadlocks, every callback is accounted for exactly once and the
/// emitted schedule lists all 10 executions.
#[test]
fn test_thread_order_fuzzer_looper_and_two_workers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedule");
    let config = SchedulerConfig::new(PolicyKind::FuzzerThreadOrder)
        .with_schedule_file(&path)
        .with_args(PolicyArgs::FuzzThreadOrder(FuzzThreadOrderArgs {
            degrees_of_freedom: 3,
            max_delay: Duration::from_millis(1),
            seed: 2024,
        }));
    let scheduler = Arc::new(Scheduler::new(config));

    let timers: Vec<_> = (0..4)
        .map(|entry| Lcbn::root(LcbnKey::new(0, 1, entry), CallbackType::Timer))
        .collect();
    let work: Vec<Vec<_>> = (0..2)
        .map(|w| (0..3).map(|i| work_item(w * 10 + i)).collect())
        .collect();
    for lcbn in timers.iter().chain(work.iter().flatten()) {
        scheduler.register_lcbn(lcbn);
    }
    assert_eq!(scheduler.lcbns_remaining(), 10);

    let start = Arc::new(Barrier::new(3));
    let workers: Vec<_> = work
        .into_iter()
        .map(|items| {
            let scheduler = Arc::clone(&scheduler);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                scheduler.register_thread(ThreadRole::ThreadPool);
                start.wait();
                for item in items {
                    execute_work(&scheduler, item);
                }
            })
        })
        .collect();

    scheduler.register_thread(ThreadRole::Looper);
    start.wait();
    for timer in timers {
        execute_callback(&scheduler, timer);
    }

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(scheduler.registered_threads(), 3);
    assert_eq!(scheduler.n_executed(), 10);
    assert_eq!(scheduler.lcbns_remaining(), 0);
    assert!(!scheduler.has_diverged());

    let log = schedule_file::load(&scheduler.emit().unwrap()).unwrap();
    assert_eq!(log.len(), 10);
    assert_eq!(
        log.callbacks
            .iter()
            .filter(|cb| cb.role == ThreadRole::ThreadPool)
            .count(),
        6
    );
}

/// Replay pins down which worker goes first
///
/// # Scenario
///
/// Recording: worker A runs X, then worker B runs Y.
/// Replay: B arrives with Y well before A arrives with X.
///
/// # Expected
///
/// B is held until X has started, so the replay trace is X then Y and no
/// divergence is reported.
#[test]
fn test_replay_orders_workers() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedule");
    let (x, y) = (work_item(0), work_item(1));

    // Record, sequentially
    let recorder = Arc::new(Scheduler::new(
        SchedulerConfig::new(PolicyKind::CbTree).with_schedule_file(&path),
    ));
    for item in [x, y] {
        recorder.register_lcbn(&item);
        let recorder = Arc::clone(&recorder);
        thread::spawn(move || {
            recorder.register_thread(ThreadRole::ThreadPool);
            execute_work(&recorder, item);
        })
        .join()
        .unwrap();
    }
    recorder.emit().unwrap();

    // Replay, with B early
    let replayer = Arc::new(Scheduler::new(replay_config(&path)));
    replayer.register_lcbn(&x);
    replayer.register_lcbn(&y);

    let spawn_worker = |item: Lcbn| {
        let replayer = Arc::clone(&replayer);
        thread::spawn(move || {
            replayer.register_thread(ThreadRole::ThreadPool);
            execute_work(&replayer, item);
        })
    };
    let b = spawn_worker(y);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(replayer.n_executed(), 0, "B must still be waiting for X");
    let a = spawn_worker(x);

    a.join().unwrap();
    b.join().unwrap();

    assert!(!replayer.has_diverged());
    assert_eq!(replayer.n_executed(), 2);

    let trace = schedule_file::load(&replayer.emit().unwrap()).unwrap();
    let keys: Vec<_> = trace.callbacks.iter().map(|cb| cb.key).collect();
    assert_eq!(keys, vec![x.key, y.key]);
}

/// The looper waits for pool work recorded ahead of its completion callback
///
/// # Scenario
///
/// Recording: worker runs WORK, then looper runs AFTER_WORK.
/// Replay: looper reaches AFTER_WORK before the worker starts.
///
/// # Expected
///
/// The head of the recording belongs to the pool, so the looper waits for
/// it instead of diverging.
#[test]
fn test_looper_waits_for_recorded_pool_work() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedule");
    let work = work_item(0);
    let after = Lcbn::child_of(&work, LcbnKey::new(1, 2, 0), CallbackType::AfterWork);

    let recorder = Arc::new(Scheduler::new(
        SchedulerConfig::new(PolicyKind::CbTree).with_schedule_file(&path),
    ));
    recorder.register_thread(ThreadRole::Looper);
    recorder.register_lcbn(&work);
    {
        let recorder = Arc::clone(&recorder);
        thread::spawn(move || {
            recorder.register_thread(ThreadRole::ThreadPool);
            execute_work(&recorder, work);
        })
        .join()
        .unwrap();
    }
    recorder.register_lcbn(&after);
    execute_callback(&recorder, after);
    recorder.emit().unwrap();

    let replayer = Arc::new(Scheduler::new(replay_config(&path)));
    replayer.register_thread(ThreadRole::Looper);
    replayer.register_lcbn(&work);
    replayer.register_lcbn(&after);

    let worker = {
        let replayer = Arc::clone(&replayer);
        thread::spawn(move || {
            replayer.register_thread(ThreadRole::ThreadPool);
            thread::sleep(Duration::from_millis(50));
            execute_work(&replayer, work);
        })
    };

    execute_callback(&replayer, after);
    worker.join().unwrap();

    assert!(!replayer.has_diverged());
    let trace = schedule_file::load(&replayer.emit().unwrap()).unwrap();
    let keys: Vec<_> = trace.callbacks.iter().map(|cb| cb.key).collect();
    assert_eq!(keys, vec![work.key, after.key]);
}

/// Divergence releases threads parked on the recording
///
/// # Scenario
///
/// Recording: looper runs A, then a worker runs W.
/// Replay: the worker arrives with W first and parks behind A. The looper
/// then runs Z, which was never recorded.
///
/// # Expected
///
/// Z diverges the replay, and the parked worker wakes up and finishes W
/// without A ever running.
#[test]
fn test_divergence_releases_parked_worker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schedule");
    let a = Lcbn::root(LcbnKey::new(0, 1, 0), CallbackType::Timer);
    let w = work_item(0);
    let z = Lcbn::root(LcbnKey::new(9, 0, 0), CallbackType::Signal);

    let recorder = Arc::new(Scheduler::new(
        SchedulerConfig::new(PolicyKind::CbTree).with_schedule_file(&path),
    ));
    recorder.register_thread(ThreadRole::Looper);
    recorder.register_lcbn(&a);
    recorder.register_lcbn(&w);
    execute_callback(&recorder, a);
    {
        let recorder = Arc::clone(&recorder);
        thread::spawn(move || {
            recorder.register_thread(ThreadRole::ThreadPool);
            execute_work(&recorder, w);
        })
        .join()
        .unwrap();
    }
    recorder.emit().unwrap();

    let replayer = Arc::new(Scheduler::new(replay_config(&path)));
    replayer.register_thread(ThreadRole::Looper);
    for lcbn in [a, w, z] {
        replayer.register_lcbn(&lcbn);
    }

    let (done_tx, done_rx) = mpsc::channel();
    let worker = {
        let replayer = Arc::clone(&replayer);
        thread::spawn(move || {
            replayer.register_thread(ThreadRole::ThreadPool);
            execute_work(&replayer, w);
            done_tx.send(()).unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert_eq!(replayer.n_executed(), 0);
    assert!(done_rx.try_recv().is_err(), "worker must be parked behind A");

    execute_callback(&replayer, z);
    assert!(replayer.has_diverged());

    assert!(
        done_rx.recv_timeout(Duration::from_secs(5)).is_ok(),
        "parked worker was not released by the divergence"
    );
    worker.join().unwrap();
    assert_eq!(replayer.n_executed(), 2);
}

/// The timer fuzzer sleeps without holding the guard
///
/// # Scenario
///
/// A worker reaches TP_BEFORE_GET_WORK under a fixed 300ms delay. While it
/// sleeps, the main thread registers a callback.
///
/// # Expected
///
/// The registration is not serialized behind the sleep: it returns long
/// before the worker's delay is over.
#[test]
fn test_timer_fuzzer_releases_guard_while_sleeping() {
    const DELAY: Duration = Duration::from_millis(300);

    let dir = tempfile::tempdir().unwrap();
    let config = SchedulerConfig::new(PolicyKind::FuzzerTimer)
        .with_schedule_file(dir.path().join("schedule"))
        .with_args(PolicyArgs::FuzzTimer(FuzzTimerArgs {
            min_delay: DELAY,
            max_delay: DELAY,
            seed: 7,
        }));
    let scheduler = Arc::new(Scheduler::new(config));

    let worker = {
        let scheduler = Arc::clone(&scheduler);
        thread::spawn(move || {
            scheduler.register_thread(ThreadRole::ThreadPool);
            let started = Instant::now();
            scheduler.thread_yield(YieldPoint::TpBeforeGetWork);
            started.elapsed()
        })
    };

    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    scheduler.register_lcbn(&work_item(0));
    let registration = started.elapsed();

    let slept = worker.join().unwrap();
    assert!(slept >= DELAY, "worker slept only {slept:?}");
    assert!(
        registration < Duration::from_millis(150),
        "registration waited {registration:?} behind the sleeping worker"
    );
    assert_eq!(scheduler.lcbns_remaining(), 1);
}

/// Nested facade calls from inside a callback do not self-deadlock
#[test]
fn test_reentrant_registration_during_callback() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = Scheduler::new(
        SchedulerConfig::new(PolicyKind::CbTree).with_schedule_file(dir.path().join("s")),
    );
    scheduler.register_thread(ThreadRole::Looper);

    let parent = Lcbn::root(LcbnKey::new(0, 1, 0), CallbackType::Timer);
    let child = Lcbn::child_of(&parent, LcbnKey::new(0, 2, 0), CallbackType::Timer);
    scheduler.register_lcbn(&parent);

    scheduler.thread_yield(YieldPoint::BeforeExecCb(parent));
    // The callback body schedules more work
    scheduler.register_lcbn(&child);
    scheduler.thread_yield(YieldPoint::AfterExecCb(parent));
    execute_callback(&scheduler, child);

    assert_eq!(scheduler.n_executed(), 2);
    assert_eq!(scheduler.lcbns_remaining(), 0);
}
