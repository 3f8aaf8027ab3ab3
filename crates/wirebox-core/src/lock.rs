//! Global and per-module locking.
//!
//! All lock bookkeeping lives behind one mutex paired with one condition
//! variable, so a module's state can be checked against the caller's mask
//! atomically with acquiring its lock.
//!
//! A thread holding a module lock may request the global lock (promotion).
//! If the current global owner is itself blocked waiting for that module's
//! lock, the owner interrupts the promoting thread: its acquisition fails
//! with [`LockError::Interrupted`], it unwinds and releases the module lock,
//! and the global owner proceeds.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use wirebox_protocols::{LockError, ModuleId, ModuleState, StateMask};

use crate::module::Module;

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;

#[derive(Debug)]
struct Held {
    owner: ThreadId,
    count: usize,
}

#[derive(Debug, Default)]
struct LockTable {
    global: Option<Held>,
    global_waiters: Vec<ThreadId>,
    modules: HashMap<ModuleId, Held>,
    interrupted: HashSet<ThreadId>,
}

impl LockTable {
    fn global_held_by_other(&self, me: ThreadId) -> bool {
        self.global.as_ref().is_some_and(|g| g.owner != me)
    }

    fn holds_global(&self, me: ThreadId) -> bool {
        self.global.as_ref().is_some_and(|g| g.owner == me)
    }

    fn module_owner(&self, module: ModuleId) -> Option<ThreadId> {
        self.modules.get(&module).map(|h| h.owner)
    }

    fn holds_module(&self, module: ModuleId, me: ThreadId) -> bool {
        self.module_owner(module) == Some(me)
    }
}

/// Registry-wide lock manager.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
    changed: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `module` for the calling thread.
    ///
    /// Blocks while another thread holds the module, or while another thread
    /// holds the global lock and the caller does not already hold this
    /// module. Fails at once, without waiting, whenever the module's state
    /// is outside `allowed`.
    pub fn acquire_module(
        &self,
        module: &Module,
        allowed: StateMask,
    ) -> Result<ModuleLockGuard<'_>, LockError> {
        let me = thread::current().id();
        let id = module.id();
        let mut table = self.table.lock();

        loop {
            let state = module.state();
            if !allowed.allows(state) {
                return Err(LockError::InvalidState { module: id, state });
            }

            let free = table.module_owner(id).is_none_or(|owner| owner == me);
            let blocked_by_global =
                table.global_held_by_other(me) && !table.holds_module(id, me);
            if free && !blocked_by_global {
                break;
            }

            if table.holds_global(me) {
                if let Some(owner) = table.module_owner(id) {
                    if table.global_waiters.contains(&owner) && table.interrupted.insert(owner) {
                        debug!(module = %id, "interrupting lock holder waiting for the global lock");
                        self.changed.notify_all();
                    }
                }
            }

            self.changed.wait(&mut table);
        }

        let state = module.state();
        if !allowed.allows(state) {
            return Err(LockError::InvalidState { module: id, state });
        }

        table
            .modules
            .entry(id)
            .and_modify(|held| held.count += 1)
            .or_insert(Held { owner: me, count: 1 });

        Ok(ModuleLockGuard {
            manager: self,
            module: id,
            _not_send: PhantomData,
        })
    }

    /// Release one level of the calling thread's hold on `module`.
    pub fn release_module(&self, module: ModuleId) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut table = self.table.lock();
        let held = table
            .modules
            .get_mut(&module)
            .ok_or_else(|| LockError::NotOwner(format!("module {} is not locked", module)))?;
        if held.owner != me {
            return Err(LockError::NotOwner(format!(
                "module {} is locked by another thread",
                module
            )));
        }
        held.count -= 1;
        if held.count == 0 {
            table.modules.remove(&module);
            self.changed.notify_all();
        }
        Ok(())
    }

    /// Acquire the reentrant global lock.
    ///
    /// Fails with [`LockError::Interrupted`] if the current owner needs a
    /// module lock held by the caller.
    pub fn acquire_global(&self) -> Result<GlobalLockGuard<'_>, LockError> {
        let me = thread::current().id();
        let mut table = self.table.lock();
        table.interrupted.remove(&me);

        while table.global_held_by_other(me) {
            table.global_waiters.push(me);
            // The owner may be parked on a module lock we hold.
            self.changed.notify_all();
            self.changed.wait(&mut table);
            table.global_waiters.retain(|waiter| *waiter != me);

            if table.interrupted.remove(&me) {
                return Err(LockError::Interrupted);
            }
        }

        match table.global.as_mut() {
            Some(held) => held.count += 1,
            None => table.global = Some(Held { owner: me, count: 1 }),
        }

        Ok(GlobalLockGuard {
            manager: self,
            _not_send: PhantomData,
        })
    }

    pub fn release_global(&self) -> Result<(), LockError> {
        let me = thread::current().id();
        let mut table = self.table.lock();
        match table.global.as_mut() {
            Some(held) if held.owner == me => {
                held.count -= 1;
                if held.count == 0 {
                    table.global = None;
                    self.changed.notify_all();
                }
                Ok(())
            }
            Some(_) => Err(LockError::NotOwner(
                "global lock is held by another thread".to_string(),
            )),
            None => Err(LockError::NotOwner("global lock is not held".to_string())),
        }
    }

    pub fn holds_global(&self) -> bool {
        self.table.lock().holds_global(thread::current().id())
    }

    pub fn holds_module(&self, module: ModuleId) -> bool {
        self.table.lock().holds_module(module, thread::current().id())
    }

    /// Change a module's state and wake every thread waiting on a lock.
    pub fn set_state(&self, module: &Module, state: ModuleState) {
        let _table = self.table.lock();
        module.store_state(state);
        self.changed.notify_all();
    }
}

/// Hold on a module lock; released on drop.
///
/// Not `Send`: the lock belongs to the thread that acquired it.
#[derive(Debug)]
#[must_use = "the module lock is released as soon as the guard is dropped"]
pub struct ModuleLockGuard<'a> {
    manager: &'a LockManager,
    module: ModuleId,
    _not_send: PhantomData<*const ()>,
}

impl ModuleLockGuard<'_> {
    pub fn module(&self) -> ModuleId {
        self.module
    }
}

impl Drop for ModuleLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.manager.release_module(self.module) {
            warn!(module = %self.module, "failed to release module lock: {}", e);
        }
    }
}

/// Hold on the global lock; released on drop.
#[derive(Debug)]
#[must_use = "the global lock is released as soon as the guard is dropped"]
pub struct GlobalLockGuard<'a> {
    manager: &'a LockManager,
    _not_send: PhantomData<*const ()>,
}

impl Drop for GlobalLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.manager.release_global() {
            warn!("failed to release global lock: {}", e);
        }
    }
}
