//! Advisory per-root session locks

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};

/// Set of roots with a session in flight.
///
/// Clones share the same set, so one instance can be handed to several engines.
#[derive(Debug, Clone, Default)]
pub struct SessionLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl SessionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lock for `root_id`, failing fast if it is already held
    pub fn try_acquire(&self, root_id: &str) -> Result<SessionLockGuard> {
        if !self.lock().insert(root_id.to_string()) {
            return Err(Error::SessionAlreadyRunning(root_id.to_string()));
        }
        Ok(SessionLockGuard {
            locks: self.clone(),
            root_id: root_id.to_string(),
        })
    }

    #[must_use]
    pub fn is_locked(&self, root_id: &str) -> bool {
        self.lock().contains(root_id)
    }
}

/// Releases the root's lock when dropped
#[derive(Debug)]
pub struct SessionLockGuard {
    locks: SessionLocks,
    root_id: String,
}

impl Drop for SessionLockGuard {
    fn drop(&mut self) {
        self.locks.lock().remove(&self.root_id);
    }
}
