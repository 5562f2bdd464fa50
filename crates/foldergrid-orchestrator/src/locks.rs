//! Per-instance mutual exclusion.
//!
//! At most one lifecycle operation per instance id runs at a time. Locks
//! are try-only: a second caller gets `None` and reports a conflict rather
//! than queueing behind a deploy that may take minutes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

#[derive(Debug, Clone, Default)]
pub struct InstanceLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set holds no invariants a panicking holder could break.
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the lock for `id`, or `None` if it is already held.
    pub fn try_acquire(&self, id: &str) -> Option<InstanceGuard> {
        if !self.set().insert(id.to_string()) {
            return None;
        }
        trace!(%id, "instance lock acquired");
        Some(InstanceGuard {
            held: Arc::clone(&self.held),
            id: id.to_string(),
        })
    }

    pub fn is_locked(&self, id: &str) -> bool {
        self.set().contains(id)
    }
}

/// Releases its instance lock on drop.
#[derive(Debug)]
pub struct InstanceGuard {
    held: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl InstanceGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        let mut held = self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        held.remove(&self.id);
        trace!(id = %self.id, "instance lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_until_release() {
        let locks = InstanceLocks::new();
        let guard = locks.try_acquire("a").unwrap();
        assert!(locks.try_acquire("a").is_none());
        assert!(locks.is_locked("a"));

        // Other ids are independent.
        let _b = locks.try_acquire("b").unwrap();

        drop(guard);
        assert!(!locks.is_locked("a"));
        assert!(locks.try_acquire("a").is_some());
    }

    #[test]
    fn clones_share_the_same_set() {
        let locks = InstanceLocks::new();
        let other = locks.clone();
        let _guard = locks.try_acquire("a").unwrap();
        assert!(other.try_acquire("a").is_none());
    }
}
