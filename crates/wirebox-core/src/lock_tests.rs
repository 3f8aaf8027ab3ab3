use super::*;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use wirebox_protocols::{ModuleDescriptor, Version};

fn module(id: u64) -> Arc<Module> {
    let descriptor = ModuleDescriptor::new(format!("acme.m{}", id), Version::new(1, 0, 0));
    Arc::new(Module::new(ModuleId(id), format!("mem:{}", id), descriptor, 1).unwrap())
}

#[test]
fn test_module_lock_is_reentrant() {
    let manager = LockManager::new();
    let m = module(1);

    let outer = manager.acquire_module(&m, StateMask::all()).unwrap();
    let inner = manager.acquire_module(&m, StateMask::all()).unwrap();
    assert_eq!(inner.module(), ModuleId(1));
    drop(inner);
    assert!(manager.holds_module(ModuleId(1)));
    drop(outer);
    assert!(!manager.holds_module(ModuleId(1)));
}

#[test]
fn test_state_outside_mask_fails() {
    let manager = LockManager::new();
    let m = module(1);

    let err = manager.acquire_module(&m, StateMask::ACTIVE).unwrap_err();
    assert_eq!(
        err,
        LockError::InvalidState {
            module: ModuleId(1),
            state: ModuleState::Installed
        }
    );
    assert!(!manager.holds_module(ModuleId(1)));
}

#[test]
fn test_state_outside_mask_fails_while_module_is_held() {
    let manager = Arc::new(LockManager::new());
    let m = module(1);
    let _held = manager.acquire_module(&m, StateMask::all()).unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter = {
        let manager = manager.clone();
        let m = m.clone();
        thread::spawn(move || {
            let result = manager.acquire_module(&m, StateMask::ACTIVE).map(|_| ());
            tx.send(result).unwrap();
        })
    };

    let result = rx
        .recv_timeout(Duration::from_secs(2))
        .expect("acquisition blocked instead of failing");
    assert_eq!(
        result,
        Err(LockError::InvalidState {
            module: ModuleId(1),
            state: ModuleState::Installed
        })
    );
    waiter.join().unwrap();
    assert!(manager.holds_module(ModuleId(1)));
}

#[test]
fn test_release_without_ownership() {
    let manager = LockManager::new();
    assert!(matches!(
        manager.release_module(ModuleId(9)),
        Err(LockError::NotOwner(_))
    ));
    assert!(matches!(manager.release_global(), Err(LockError::NotOwner(_))));
}

#[test]
fn test_release_from_other_thread_is_rejected() {
    let manager = Arc::new(LockManager::new());
    let m = module(1);
    let _guard = manager.acquire_module(&m, StateMask::all()).unwrap();

    let other = manager.clone();
    let result = thread::spawn(move || other.release_module(ModuleId(1)))
        .join()
        .unwrap();
    assert!(matches!(result, Err(LockError::NotOwner(_))));
    assert!(manager.holds_module(ModuleId(1)));
}

#[test]
fn test_global_lock_is_reentrant() {
    let manager = LockManager::new();
    let outer = manager.acquire_global().unwrap();
    let inner = manager.acquire_global().unwrap();
    drop(inner);
    assert!(manager.holds_global());
    drop(outer);
    assert!(!manager.holds_global());
}

#[test]
fn test_global_holder_may_lock_modules() {
    let manager = LockManager::new();
    let m = module(1);
    let _global = manager.acquire_global().unwrap();
    let guard = manager.acquire_module(&m, StateMask::all());
    assert!(guard.is_ok());
}

#[test]
fn test_module_lock_waits_for_global_holder() {
    let manager = Arc::new(LockManager::new());
    let m = module(1);
    let global = manager.acquire_global().unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter = {
        let manager = manager.clone();
        let m = m.clone();
        thread::spawn(move || {
            let _guard = manager.acquire_module(&m, StateMask::all()).unwrap();
            tx.send(()).unwrap();
        })
    };

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    drop(global);
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    waiter.join().unwrap();
}

#[test]
fn test_waiter_sees_state_change_after_wakeup() {
    let manager = Arc::new(LockManager::new());
    let m = module(1);
    let guard = manager.acquire_module(&m, StateMask::all()).unwrap();

    let waiter = {
        let manager = manager.clone();
        let m = m.clone();
        thread::spawn(move || manager.acquire_module(&m, StateMask::INSTALLED).map(|_| ()))
    };

    thread::sleep(Duration::from_millis(50));
    manager.set_state(&m, ModuleState::Uninstalled);
    drop(guard);

    let result = waiter.join().unwrap();
    assert!(matches!(
        result,
        Err(LockError::InvalidState {
            state: ModuleState::Uninstalled,
            ..
        })
    ));
}

#[test]
fn test_promotion_is_interrupted_by_global_holder() {
    let manager = Arc::new(LockManager::new());
    let m = module(1);

    let (locked_tx, locked_rx) = mpsc::channel();
    let (global_tx, global_rx) = mpsc::channel::<()>();

    let promoter = {
        let manager = manager.clone();
        let m = m.clone();
        thread::spawn(move || {
            let module_guard = manager.acquire_module(&m, StateMask::all()).unwrap();
            locked_tx.send(()).unwrap();
            global_rx.recv().unwrap();
            let result = manager.acquire_global().map(|_| ());
            drop(module_guard);
            result
        })
    };

    locked_rx.recv().unwrap();
    let _global = manager.acquire_global().unwrap();
    global_tx.send(()).unwrap();

    let module_guard = manager.acquire_module(&m, StateMask::all());
    assert!(module_guard.is_ok());

    assert_eq!(promoter.join().unwrap(), Err(LockError::Interrupted));
}
