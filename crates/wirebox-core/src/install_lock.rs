//! Per-location install lock.

use std::collections::HashSet;

use parking_lot::{Condvar, Mutex};

/// Serializes installs of the same location.
///
/// Independent of the module and global locks.
#[derive(Debug, Default)]
pub struct InstallLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl InstallLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other install of `location` is in progress.
    pub fn acquire(&self, location: &str) -> InstallLockGuard<'_> {
        let mut held = self.held.lock();
        while held.contains(location) {
            self.released.wait(&mut held);
        }
        held.insert(location.to_string());
        InstallLockGuard {
            locks: self,
            location: location.to_string(),
        }
    }

    pub fn is_locked(&self, location: &str) -> bool {
        self.held.lock().contains(location)
    }
}

#[must_use = "the install lock is released as soon as the guard is dropped"]
pub struct InstallLockGuard<'a> {
    locks: &'a InstallLocks,
    location: String,
}

impl Drop for InstallLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.location);
        self.locks.released.notify_all();
    }
}
