//! The module registry: installs modules, resolves them, and drives their
//! lifecycle.

mod commit;
mod index;
mod lifecycle;
mod refresh;
mod resolve;
mod start_level;
mod state;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use parking_lot::Mutex;
use tracing::info;

use wirebox_protocols::{
    Activator, CapabilityId, EventSink, FrameworkEvent, FrameworkEventKind, ModuleContent,
    ModuleDescriptor, ModuleEvent, ModuleEventKind, ModuleId, NoopActivator, NoopContent,
    RegistryError,
};

use crate::dependencies::Dependencies;
use crate::events::TracingEventSink;
use crate::hooks::HookRegistry;
use crate::install_lock::InstallLocks;
use crate::lock::LockManager;
use crate::module::Module;
use crate::resolver::{AdmissiblePredicate, ResolverState};
use crate::wiring::Wire;
use index::{Cow, InstalledIndex};
use start_level::StartLevels;

pub use lifecycle::{StartOptions, StopOptions};
pub use state::{FrameworkState, ShutdownSignal};

#[cfg(test)]
#[path = "framework_tests.rs"]
mod tests;

/// Framework-wide settings.
#[derive(Debug, Clone)]
pub struct FrameworkSettings {
    /// Start level reached by [`Framework::start`].
    pub beginning_start_level: u32,
    /// Start level given to modules whose descriptor names none.
    pub initial_module_start_level: u32,
    /// Environments this framework provides; empty accepts every module.
    pub execution_environments: Vec<String>,
    /// Extra attributes to index per capability namespace.
    pub index_attributes: HashMap<String, Vec<String>>,
    /// Serve start level changes on a dedicated thread.
    pub start_level_worker: bool,
}

impl Default for FrameworkSettings {
    fn default() -> Self {
        Self {
            beginning_start_level: 1,
            initial_module_start_level: 1,
            execution_environments: Vec::new(),
            index_attributes: HashMap::new(),
            start_level_worker: true,
        }
    }
}

/// Builder for [`Framework`].
pub struct FrameworkBuilder {
    settings: FrameworkSettings,
    activator: Arc<dyn Activator>,
    content: Arc<dyn ModuleContent>,
    events: Arc<dyn EventSink>,
    hooks: Arc<HookRegistry>,
    admissible: Option<AdmissiblePredicate>,
}

impl Default for FrameworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameworkBuilder {
    pub fn new() -> Self {
        Self {
            settings: FrameworkSettings::default(),
            activator: Arc::new(NoopActivator),
            content: Arc::new(NoopContent),
            events: Arc::new(TracingEventSink),
            hooks: Arc::new(HookRegistry::new()),
            admissible: None,
        }
    }

    pub fn settings(mut self, settings: FrameworkSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn activator(mut self, activator: Arc<dyn Activator>) -> Self {
        self.activator = activator;
        self
    }

    pub fn content(mut self, content: Arc<dyn ModuleContent>) -> Self {
        self.content = content;
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn admissible(mut self, predicate: AdmissiblePredicate) -> Self {
        self.admissible = Some(predicate);
        self
    }

    pub fn build(self) -> Result<Arc<Framework>, RegistryError> {
        let mut resolver_state = ResolverState::new()
            .with_execution_environments(self.settings.execution_environments.clone());
        for (ns, attributes) in &self.settings.index_attributes {
            resolver_state = resolver_state.with_index_attributes(ns.clone(), attributes.clone());
        }
        if let Some(admissible) = self.admissible {
            resolver_state = resolver_state.with_admissible(admissible);
        }

        let framework = Arc::new(Framework {
            state: AtomicU8::new(FrameworkState::Created as u8),
            locks: LockManager::new(),
            install_locks: InstallLocks::new(),
            installed: Cow::new(InstalledIndex::default()),
            uninstalled: Cow::new(Vec::new()),
            next_module_id: AtomicU64::new(1),
            resolver_state: Mutex::new(resolver_state),
            resolving: Mutex::new(None),
            dependencies: Dependencies::new(),
            hooks: self.hooks,
            activator: self.activator,
            content: self.content,
            events: self.events,
            shutdown_signal: ShutdownSignal::new(),
            start_levels: StartLevels::new(),
            settings: self.settings,
        });

        if framework.settings.start_level_worker {
            framework
                .start_levels
                .spawn_worker(Arc::downgrade(&framework))?;
        }
        Ok(framework)
    }
}

/// A dynamic module registry.
pub struct Framework {
    settings: FrameworkSettings,
    state: AtomicU8,
    locks: LockManager,
    install_locks: InstallLocks,
    installed: Cow<InstalledIndex>,
    uninstalled: Cow<Vec<Arc<Module>>>,
    next_module_id: AtomicU64,
    /// Always locked after the global lock.
    resolver_state: Mutex<ResolverState>,
    /// Thread currently inside a resolve, used to reject nested resolves.
    resolving: Mutex<Option<ThreadId>>,
    dependencies: Dependencies,
    hooks: Arc<HookRegistry>,
    activator: Arc<dyn Activator>,
    content: Arc<dyn ModuleContent>,
    events: Arc<dyn EventSink>,
    shutdown_signal: ShutdownSignal,
    start_levels: StartLevels,
}

impl Framework {
    pub fn builder() -> FrameworkBuilder {
        FrameworkBuilder::new()
    }

    pub fn settings(&self) -> &FrameworkSettings {
        &self.settings
    }

    pub fn state(&self) -> FrameworkState {
        FrameworkState::from(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: FrameworkState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown_signal
    }

    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// Raise to the beginning start level.
    pub fn start(&self) -> Result<(), RegistryError> {
        let swapped = self.state.compare_exchange(
            FrameworkState::Created as u8,
            FrameworkState::Starting as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if let Err(current) = swapped {
            return Err(RegistryError::FrameworkState(
                FrameworkState::from(current).to_string(),
            ));
        }
        info!(level = self.settings.beginning_start_level, "Framework starting...");

        self.request_start_level(self.settings.beginning_start_level, true);

        self.set_state(FrameworkState::Running);
        self.framework_event(FrameworkEvent::new(FrameworkEventKind::Started));
        info!("Framework started");
        Ok(())
    }

    /// Lower to start level 0, stopping every module, then stop.
    pub fn stop(&self) -> Result<(), RegistryError> {
        let current = self.state();
        if !matches!(current, FrameworkState::Running | FrameworkState::Starting) {
            return Err(RegistryError::FrameworkState(current.to_string()));
        }
        self.set_state(FrameworkState::ShuttingDown);
        info!("Framework shutting down...");

        self.shutdown_signal.trigger();
        self.request_start_level(0, true);
        self.start_levels.stop_worker();

        self.set_state(FrameworkState::Stopped);
        self.framework_event(FrameworkEvent::new(FrameworkEventKind::Stopped));
        info!("Framework stopped");
        Ok(())
    }

    fn ensure_accepting(&self) -> Result<(), RegistryError> {
        let state = self.state();
        if state.accepts_operations() {
            Ok(())
        } else {
            Err(RegistryError::FrameworkState(state.to_string()))
        }
    }

    /// Install a module from `location`.
    ///
    /// Installing a location twice returns the module already installed there.
    pub fn install(
        &self,
        location: &str,
        descriptor: ModuleDescriptor,
    ) -> Result<Arc<Module>, RegistryError> {
        self.ensure_accepting()?;
        let _install = self.install_locks.acquire(location);

        if let Some(existing) = self.module_by_location(location) {
            return Ok(existing);
        }

        descriptor.validate()?;
        let id = ModuleId(self.next_module_id.fetch_add(1, Ordering::SeqCst));
        let module = Arc::new(Module::new(
            id,
            location,
            descriptor,
            self.settings.initial_module_start_level,
        )?);

        {
            let _global = self.locks.acquire_global()?;
            if self.has_duplicate(&module) {
                return Err(RegistryError::Duplicate {
                    symbolic_name: module.symbolic_name(),
                    version: module.version(),
                });
            }
            self.installed.update(|index| index.insert(module.clone()));
            self.resolver_state
                .lock()
                .add_revision(module.current_revision());
        }

        info!(module = %id, name = %module.symbolic_name(), location, "Module installed");
        self.module_event(ModuleEventKind::Installed, &module);
        Ok(module)
    }

    /// Whether another installed module has the same name and version as the
    /// current revision of `module`.
    fn has_duplicate(&self, module: &Module) -> bool {
        let revision = module.current_revision();
        self.installed.load().modules().any(|other| {
            other.id() != module.id()
                && other.symbolic_name() == revision.symbolic_name()
                && other.version() == *revision.version()
        })
    }

    /// Installed or uninstalled-but-not-refreshed module by id.
    pub fn module(&self, id: ModuleId) -> Option<Arc<Module>> {
        if let Some(module) = self.installed.load().get(id) {
            return Some(module.clone());
        }
        self.uninstalled
            .load()
            .iter()
            .find(|module| module.id() == id)
            .cloned()
    }

    fn module_or_err(&self, id: ModuleId) -> Result<Arc<Module>, RegistryError> {
        self.module(id).ok_or(RegistryError::NotFound(id))
    }

    /// Installed modules in id order.
    pub fn modules(&self) -> Vec<Arc<Module>> {
        self.installed.load().modules().cloned().collect()
    }

    pub fn module_by_location(&self, location: &str) -> Option<Arc<Module>> {
        self.installed.load().by_location(location).cloned()
    }

    /// Uninstalled modules still awaiting a refresh.
    pub fn uninstalled_modules(&self) -> Vec<Arc<Module>> {
        self.uninstalled.load().iter().cloned().collect()
    }

    /// Required wires of the module's current wiring.
    pub fn wires(&self, id: ModuleId) -> Vec<Wire> {
        self.module(id)
            .and_then(|module| module.wiring())
            .map(|wiring| wiring.required_wires())
            .unwrap_or_default()
    }

    /// Modules wired to any revision of `id`.
    pub fn dependents(&self, id: ModuleId) -> BTreeSet<ModuleId> {
        let Some(module) = self.module(id) else {
            return BTreeSet::new();
        };
        module
            .revisions()
            .iter()
            .flat_map(|revision| self.dependencies.dependents(revision.id()))
            .map(|revision| revision.module)
            .filter(|dependent| *dependent != id)
            .collect()
    }

    /// Capability ids currently indexed for candidate queries, per namespace.
    pub fn indexed_capabilities(&self) -> BTreeMap<String, BTreeSet<CapabilityId>> {
        self.resolver_state.lock().indexed_capabilities()
    }

    fn module_event(&self, kind: ModuleEventKind, module: &Module) {
        self.events.module_event(&ModuleEvent {
            kind,
            module: module.id(),
            symbolic_name: module.symbolic_name(),
        });
    }

    fn framework_event(&self, event: FrameworkEvent) {
        self.events.framework_event(&event);
    }

    fn error_event(&self, module: Option<ModuleId>, error: &dyn std::fmt::Display) {
        self.framework_event(FrameworkEvent::error(module, error.to_string()));
    }
}

impl Drop for Framework {
    fn drop(&mut self) {
        self.start_levels.release_worker();
    }
}

/// Weak handle used by the start level worker.
pub(crate) type FrameworkRef = Weak<Framework>;
