//! Per-profile serialization
//!
//! At most one transaction per profile id runs at a time. Transactions on
//! different ids never wait for each other.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Set of profile ids with a transaction in flight
#[derive(Debug, Default)]
pub struct ProfileLocks {
    locked: Mutex<HashSet<String>>,
    released: Condvar,
}

impl ProfileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashSet<String>> {
        self.locked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until `profile_id` is free, then take it
    pub fn acquire(&self, profile_id: &str) -> ProfileLock<'_> {
        let mut locked = self.guard();
        while locked.contains(profile_id) {
            log::debug!("Waiting for profile '{profile_id}'");
            locked = self
                .released
                .wait(locked)
                .unwrap_or_else(PoisonError::into_inner);
        }
        locked.insert(profile_id.to_string());
        log::trace!("Locked profile '{profile_id}'");
        ProfileLock {
            locks: self,
            profile_id: profile_id.to_string(),
        }
    }

    /// Take `profile_id` only if nobody holds it
    pub fn try_acquire(&self, profile_id: &str) -> Option<ProfileLock<'_>> {
        let mut locked = self.guard();
        if !locked.insert(profile_id.to_string()) {
            return None;
        }
        Some(ProfileLock {
            locks: self,
            profile_id: profile_id.to_string(),
        })
    }

    pub fn is_locked(&self, profile_id: &str) -> bool {
        self.guard().contains(profile_id)
    }

    fn release(&self, profile_id: &str) {
        self.guard().remove(profile_id);
        log::trace!("Released profile '{profile_id}'");
        // Waiters may want different ids; wake all and let each re-check.
        self.released.notify_all();
    }
}

/// Held profile id; released on drop, unwinding included
#[derive(Debug)]
pub struct ProfileLock<'a> {
    locks: &'a ProfileLocks,
    profile_id: String,
}

impl ProfileLock<'_> {
    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }
}

impl Drop for ProfileLock<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.profile_id);
    }
}
