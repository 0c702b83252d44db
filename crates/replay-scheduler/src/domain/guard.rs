//! Synchronization Guard - Reentrant Monitor
//!
//! # Overview
//!
//! Every facade operation that touches policy or registry state runs under
//! one [`SyncGuard`]. The guard is reentrant: a thread that already holds it
//! may lock it again from a nested call (a callback registering another
//! callback, a policy calling back into the facade) without deadlocking.
//! Each `lock()` returns a [`GuardHeld`] token; the guard is released when
//! the last token of the owning thread is dropped.
//!
//! # Waiting
//!
//! A policy that has to block a thread at a yield point must not sleep while
//! holding the guard, or no other thread could ever reach the state it is
//! waiting for. [`SyncGuard::wait_while`] therefore behaves like a condition
//! variable over a reentrant lock:
//!
//! ```text
//! holder ── cond() true ──> release fully (depth saved)
//!                            │
//!                            ▼
//!                 park until the guard state changes
//!                            │
//!                            ▼
//!                 re-acquire at the saved depth ── cond() again
//! ```
//!
//! "State changes" means a lock holder released the guard, or someone called
//! [`SyncGuard::notify`]. Releases performed by waiters themselves do not
//! count, so two waiters cannot wake each other in a loop.
//!
//! [`SyncGuard::wait_while_for`] is the bounded variant. It is the
//! cancellation hook for the blocking rendezvous: ordering decisions use the
//! unbounded form, and callers that want a bound can use this one without
//! changing the ordering semantics.
//!
//! # Implementation
//!
//! Built from a `parking_lot::Mutex` over the owner/depth bookkeeping and a
//! single `parking_lot::Condvar`. `parking_lot::ReentrantMutex` is not used
//! because it cannot be paired with a condition variable.

use parking_lot::{Condvar, Mutex};
use std::marker::PhantomData;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Bookkeeping protected by the inner mutex
#[derive(Debug, Default)]
struct GuardState {
    /// Thread currently holding the guard
    owner: Option<ThreadId>,

    /// Nesting depth of the owner
    depth: usize,

    /// Bumped whenever guarded state may have changed
    generation: u64,
}

/// Result of a wait on the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The condition cleared
    Ready,

    /// The bound elapsed with the condition still set
    TimedOut,
}

impl WaitOutcome {
    /// `true` if the wait ended because of its bound
    #[inline(always)]
    pub const fn timed_out(self) -> bool {
        matches!(self, WaitOutcome::TimedOut)
    }
}

/// Reentrant mutual-exclusion lock with monitor-style waits
#[derive(Debug, Default)]
pub struct SyncGuard {
    state: Mutex<GuardState>,
    changed: Condvar,
}

/// Proof that the current thread holds a [`SyncGuard`]
///
/// Dropping the token releases one level of nesting. Not `Send`: a guard
/// must be released by the thread that acquired it.
#[must_use = "the guard is released as soon as the token is dropped"]
pub struct GuardHeld<'a> {
    guard: &'a SyncGuard,
    _not_send: PhantomData<*const ()>,
}

impl std::fmt::Debug for GuardHeld<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardHeld").finish_non_exhaustive()
    }
}

impl SyncGuard {
    /// Create an unheld guard
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the guard, nesting if the current thread already holds it
    pub fn lock(&self) -> GuardHeld<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                Some(_) => self.changed.wait(&mut state),
            }
        }

        GuardHeld {
            guard: self,
            _not_send: PhantomData,
        }
    }

    #[cfg(test)]
    fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        self.state.lock().depth
    }

    /// Announce a state change made while holding the guard
    ///
    /// Needed only when state is changed from inside a wait condition; a
    /// normal release already wakes every waiter.
    pub fn notify(&self, _held: &GuardHeld<'_>) {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        self.changed.notify_all();
    }

    /// Block while `cond` returns `true`, releasing the guard in between
    ///
    /// `cond` is always evaluated with the guard held.
    pub fn wait_while<F>(&self, held: &GuardHeld<'_>, cond: F)
    where
        F: FnMut() -> bool,
    {
        let _ = self.wait_until(held, cond, None);
    }

    /// Like [`wait_while`](Self::wait_while), giving up after `timeout`
    ///
    /// Returns [`WaitOutcome::TimedOut`] if `cond` was still `true` when the
    /// bound elapsed. The guard is held again on return either way.
    pub fn wait_while_for<F>(&self, held: &GuardHeld<'_>, cond: F, timeout: Duration) -> WaitOutcome
    where
        F: FnMut() -> bool,
    {
        self.wait_until(held, cond, Instant::now().checked_add(timeout))
    }

    fn wait_until<F>(&self, held: &GuardHeld<'_>, mut cond: F, deadline: Option<Instant>) -> WaitOutcome
    where
        F: FnMut() -> bool,
    {
        assert!(
            std::ptr::eq(held.guard, self),
            "waited on a guard with another guard's token"
        );
        let me = thread::current().id();

        loop {
            if !cond() {
                return WaitOutcome::Ready;
            }

            let mut state = self.state.lock();
            debug_assert_eq!(state.owner, Some(me));

            // Release fully, remembering how deep we were
            let depth = state.depth;
            state.owner = None;
            state.depth = 0;
            self.changed.notify_all();

            let seen = state.generation;
            let mut timed_out = false;
            while state.generation == seen {
                match deadline {
                    None => self.changed.wait(&mut state),
                    Some(deadline) => {
                        if self.changed.wait_until(&mut state, deadline).timed_out() {
                            timed_out = state.generation == seen;
                            break;
                        }
                    }
                }
            }

            while state.owner.is_some() {
                self.changed.wait(&mut state);
            }
            state.owner = Some(me);
            state.depth = depth;
            drop(state);

            if timed_out {
                return if cond() {
                    WaitOutcome::TimedOut
                } else {
                    WaitOutcome::Ready
                };
            }
        }
    }

    fn unlock(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.owner, Some(thread::current().id()));
        debug_assert!(state.depth > 0);

        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            state.generation = state.generation.wrapping_add(1);
            self.changed.notify_all();
        }
    }
}

impl Drop for GuardHeld<'_> {
    fn drop(&mut self) {
        self.guard.unlock();
    }
}
