//! Start levels.
//!
//! Changes of the active start level are queued and served one at a time,
//! by a dedicated worker thread when one is running. A change takes a
//! sorted snapshot of the affected modules under the global lock, then
//! starts (ascending) or stops (descending) them one by one, each under its
//! own module lock only.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex, ReentrantMutex};
use tracing::{debug, error, info, warn};

use wirebox_protocols::{
    FrameworkEvent, FrameworkEventKind, ModuleError, ModuleId, ModuleState, RegistryError,
    StateMask,
};

use super::lifecycle::{StartOptions, StopOptions};
use super::{Framework, FrameworkRef};
use crate::module::Module;

const WORKER_NAME: &str = "wirebox-start-level";

#[derive(Default)]
struct Completion {
    finished: Mutex<bool>,
    signal: Condvar,
}

impl Completion {
    fn finish(&self) {
        *self.finished.lock() = true;
        self.signal.notify_all();
    }

    fn wait(&self) {
        let mut finished = self.finished.lock();
        while !*finished {
            self.signal.wait(&mut finished);
        }
    }
}

struct LevelRequest {
    target: u32,
    done: Option<Arc<Completion>>,
}

impl LevelRequest {
    fn finish(self) {
        if let Some(done) = self.done {
            done.finish();
        }
    }
}

#[derive(Default)]
struct QueueState {
    requests: VecDeque<LevelRequest>,
    stopped: bool,
}

#[derive(Default)]
struct LevelQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl LevelQueue {
    fn push(&self, request: LevelRequest) -> Result<(), LevelRequest> {
        let mut state = self.state.lock();
        if state.stopped {
            return Err(request);
        }
        state.requests.push_back(request);
        self.ready.notify_one();
        Ok(())
    }

    /// Next request, or `None` once stopped.
    fn next(&self) -> Option<LevelRequest> {
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                return None;
            }
            if let Some(request) = state.requests.pop_front() {
                return Some(request);
            }
            self.ready.wait(&mut state);
        }
    }

    fn stop(&self) {
        let pending: Vec<LevelRequest> = {
            let mut state = self.state.lock();
            state.stopped = true;
            state.requests.drain(..).collect()
        };
        self.ready.notify_all();
        for request in pending {
            request.finish();
        }
    }
}

/// Modules still to be processed by the running change, keyed so the
/// first entry is always the next one due.
struct LiveChange {
    raising: bool,
    target: u32,
    pending: BTreeSet<(u32, ModuleId)>,
}

impl LiveChange {
    fn key(&self, level: u32) -> u32 {
        if self.raising { level } else { u32::MAX - level }
    }

    fn level(&self, key: u32) -> u32 {
        if self.raising { key } else { u32::MAX - key }
    }
}

pub(super) struct StartLevels {
    active: AtomicU32,
    queue: Arc<LevelQueue>,
    live: Mutex<Option<LiveChange>>,
    /// Serializes changes; reentrant so a change may be requested from an
    /// activator running inside another change.
    serial: ReentrantMutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_thread: Mutex<Option<ThreadId>>,
}

impl StartLevels {
    pub(super) fn new() -> Self {
        Self {
            active: AtomicU32::new(0),
            queue: Arc::new(LevelQueue::default()),
            live: Mutex::new(None),
            serial: ReentrantMutex::new(()),
            worker: Mutex::new(None),
            worker_thread: Mutex::new(None),
        }
    }

    pub(super) fn spawn_worker(&self, framework: FrameworkRef) -> Result<(), RegistryError> {
        let queue = self.queue.clone();
        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || serve(queue, framework))
            .map_err(|e| RegistryError::FrameworkState(format!("cannot spawn {}: {}", WORKER_NAME, e)))?;
        *self.worker_thread.lock() = Some(handle.thread().id());
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    fn on_worker(&self) -> bool {
        *self.worker_thread.lock() == Some(thread::current().id())
    }

    fn has_worker(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Stop serving requests and wait for the worker to exit.
    pub(super) fn stop_worker(&self) {
        self.queue.stop();
        if self.on_worker() {
            return;
        }
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("start level worker panicked");
            }
        }
    }

    /// Stop serving requests without waiting.
    pub(super) fn release_worker(&self) {
        self.queue.stop();
    }

    /// Queue `id` into a running raise that will reach `level`.
    pub(super) fn offer(&self, level: u32, id: ModuleId) {
        let mut live = self.live.lock();
        let Some(change) = live.as_mut() else {
            return;
        };
        if change.raising
            && level <= change.target
            && level > self.active.load(Ordering::SeqCst)
        {
            let key = change.key(level);
            change.pending.insert((key, id));
            debug!(module = %id, level, "Module joined running start level change");
        }
    }

    fn next(&self) -> Option<u32> {
        let mut live = self.live.lock();
        let change = live.as_mut()?;
        let (key, _) = change.pending.first().copied()?;
        Some(change.level(key))
    }

    fn pop(&self) -> Option<(u32, ModuleId)> {
        let mut live = self.live.lock();
        let change = live.as_mut()?;
        let (key, id) = change.pending.pop_first()?;
        Some((change.level(key), id))
    }
}

fn serve(queue: Arc<LevelQueue>, framework: FrameworkRef) {
    debug!("start level worker running");
    while let Some(request) = queue.next() {
        let Some(framework) = framework.upgrade() else {
            request.finish();
            break;
        };
        framework.change_start_level(request.target);
        drop(framework);
        request.finish();
    }
    debug!("start level worker exiting");
}

impl Framework {
    pub fn active_start_level(&self) -> u32 {
        self.start_levels.active.load(Ordering::SeqCst)
    }

    /// Request a new active start level and return without waiting.
    pub fn set_active_start_level(&self, level: u32) -> Result<(), RegistryError> {
        self.check_start_level_request(level)?;
        self.request_start_level(level, false);
        Ok(())
    }

    /// Request a new active start level and wait until it is reached.
    pub fn set_active_start_level_and_wait(&self, level: u32) -> Result<(), RegistryError> {
        self.check_start_level_request(level)?;
        self.request_start_level(level, true);
        Ok(())
    }

    fn check_start_level_request(&self, level: u32) -> Result<(), RegistryError> {
        self.ensure_accepting()?;
        if level == 0 {
            return Err(ModuleError::InvalidStartLevel(level).into());
        }
        Ok(())
    }

    pub(super) fn request_start_level(&self, target: u32, wait: bool) {
        let levels = &self.start_levels;
        if !levels.has_worker() || levels.on_worker() {
            self.change_start_level(target);
            return;
        }

        let done = wait.then(|| Arc::new(Completion::default()));
        let request = LevelRequest {
            target,
            done: done.clone(),
        };
        match levels.queue.push(request) {
            Ok(()) => {
                if let Some(done) = done {
                    done.wait();
                }
            }
            Err(_) => self.change_start_level(target),
        }
    }

    fn change_start_level(&self, target: u32) {
        let levels = &self.start_levels;
        let _serial = levels.serial.lock();
        let current = self.active_start_level();
        let raising = target > current;
        info!(from = current, to = target, "Changing start level");

        let mut change = LiveChange {
            raising,
            target,
            pending: BTreeSet::new(),
        };
        {
            let _global = match self.locks.acquire_global() {
                Ok(guard) => guard,
                Err(e) => {
                    error!("start level change aborted: {}", e);
                    self.error_event(None, &e);
                    return;
                }
            };
            for module in self.installed.load().modules() {
                if module.is_fragment() {
                    continue;
                }
                let level = module.start_level();
                let affected = if raising {
                    level > current && level <= target
                } else {
                    level <= current && level > target
                };
                if affected {
                    let key = change.key(level);
                    change.pending.insert((key, module.id()));
                }
            }
        }
        let previous = levels.live.lock().replace(change);

        while let Some((level, id)) = levels.pop() {
            let step = if raising { level } else { level - 1 };
            levels.active.store(step, Ordering::SeqCst);
            let Some(module) = self.module(id) else {
                continue;
            };
            if raising {
                self.start_at_level(&module);
            } else {
                self.stop_at_level(&module);
            }
            if levels.next() != Some(level) {
                debug!(level = step, "Start level reached");
            }
        }

        *levels.live.lock() = previous;
        levels.active.store(target, Ordering::SeqCst);
        info!(level = target, "Start level changed");
        self.framework_event(FrameworkEvent::new(FrameworkEventKind::StartLevelChanged));
    }

    fn start_at_level(&self, module: &Arc<Module>) {
        let eligible = module.is_persistently_active()
            && module.start_level() <= self.active_start_level()
            && matches!(module.state(), ModuleState::Installed | ModuleState::Resolved);
        if !eligible {
            return;
        }
        if let Err(e) = self.run_start(module, StartOptions::transient(), true) {
            warn!(module = %module.id(), "start during level change failed: {}", e);
            self.report_error(module.id(), &e);
        }
    }

    fn stop_at_level(&self, module: &Arc<Module>) {
        let eligible = module.start_level() > self.active_start_level()
            && matches!(module.state(), ModuleState::Active | ModuleState::Starting);
        if !eligible {
            return;
        }
        if let Err(e) = self.run_stop(module, StopOptions::transient()) {
            warn!(module = %module.id(), "stop during level change failed: {}", e);
            self.report_error(module.id(), &e);
        }
    }

    /// Change a module's start level, starting or stopping it to match the
    /// active start level.
    pub fn set_module_start_level(&self, id: ModuleId, level: u32) -> Result<(), RegistryError> {
        if level == 0 {
            return Err(ModuleError::InvalidStartLevel(level).into());
        }
        let module = self.module_or_err(id)?;
        if module.is_fragment() {
            return Err(ModuleError::Fragment(module.symbolic_name()).into());
        }
        {
            let _guard = self
                .locks
                .acquire_module(&module, StateMask::all().difference(StateMask::UNINSTALLED))?;
            module.store_start_level(level);
        }

        let active = self.active_start_level();
        if level <= active {
            self.start_at_level(&module);
        } else if matches!(module.state(), ModuleState::Active | ModuleState::Starting) {
            self.stop_at_level(&module);
        } else if module.is_persistently_active() {
            self.start_levels.offer(level, id);
        }
        Ok(())
    }
}
