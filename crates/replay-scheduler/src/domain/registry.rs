//! Thread Registry
//!
//! Authoritative mapping from OS thread to runtime role. Filled in a short
//! burst as the looper and the pool workers start, then read on every yield.
//!
//! Entries are write-once and never removed. Both misuse cases are contract
//! violations, not errors:
//!
//! - registering the same thread twice;
//! - looking up a thread that never registered (an instrumentation bug in
//!   the runtime: every thread must register before its first yield point).

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::thread::ThreadId;

use super::error::{violated, ContractViolation};
use super::types::ThreadRole;

/// Concurrent thread id → role map
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    roles: DashMap<ThreadId, ThreadRole>,
}

impl ThreadRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `role` for `thread`
    ///
    /// Aborts the process if `thread` is already registered, whatever role
    /// it registered with.
    pub fn register(&self, thread: ThreadId, role: ThreadRole) {
        match self.roles.entry(thread) {
            Entry::Vacant(slot) => {
                slot.insert(role);
            }
            Entry::Occupied(existing) => {
                let existing = *existing.get();
                violated(ContractViolation::DuplicateThread {
                    thread,
                    existing,
                    requested: role,
                })
            }
        }
    }

    /// Role of `thread`; aborts the process if it never registered
    pub fn lookup(&self, thread: ThreadId) -> ThreadRole {
        match self.try_lookup(thread) {
            Some(role) => role,
            None => violated(ContractViolation::UnregisteredThread { thread }),
        }
    }

    /// Role of `thread`, if registered
    pub fn try_lookup(&self, thread: ThreadId) -> Option<ThreadRole> {
        self.roles.get(&thread).map(|entry| *entry.value())
    }

    /// Number of registered threads
    pub(crate) fn len(&self) -> usize {
        self.roles.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    #[cfg(test)]
    fn count_role(&self, role: ThreadRole) -> usize {
        self.roles.iter().filter(|entry| *entry.value() == role).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_register_then_lookup() {
        let registry = ThreadRegistry::new();
        let me = thread::current().id();

        assert!(registry.is_empty());
        assert_eq!(registry.try_lookup(me), None);

        registry.register(me, ThreadRole::Looper);
        assert_eq!(registry.lookup(me), ThreadRole::Looper);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_from_other_thread() {
        let registry = Arc::new(ThreadRegistry::new());

        let worker = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let id = thread::current().id();
                registry.register(id, ThreadRole::ThreadPool);
                id
            })
        };
        let worker_id = worker.join().unwrap();

        assert_eq!(registry.lookup(worker_id), ThreadRole::ThreadPool);
        assert_eq!(registry.count_role(ThreadRole::ThreadPool), 1);
        assert_eq!(registry.count_role(ThreadRole::Looper), 0);
    }
}
