//! Module state transitions.

use std::sync::Arc;

use tracing::{info, warn};

use wirebox_protocols::{
    ModuleDescriptor, ModuleError, ModuleEventKind, ModuleId, ModuleState, RegistryError,
    StateMask,
};

use super::Framework;
use crate::module::Module;
use crate::revision::Revision;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Leave the recorded persistent state untouched.
    pub transient: bool,
}

impl StartOptions {
    pub fn transient() -> Self {
        Self { transient: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOptions {
    /// Leave the recorded persistent state untouched.
    pub transient: bool,
}

impl StopOptions {
    pub fn transient() -> Self {
        Self { transient: true }
    }
}

fn not_uninstalled() -> StateMask {
    StateMask::all().difference(StateMask::UNINSTALLED)
}

fn revisable() -> StateMask {
    StateMask::INSTALLED | StateMask::RESOLVED | StateMask::ACTIVE
}

impl Framework {
    /// Start a module, resolving it first if needed.
    ///
    /// A module above the active start level is only marked for activation
    /// and started once the level is reached.
    pub fn start_module(&self, id: ModuleId, options: StartOptions) -> Result<(), RegistryError> {
        let module = self.module_or_err(id)?;
        self.run_start(&module, options, false)
    }

    pub fn stop_module(&self, id: ModuleId, options: StopOptions) -> Result<(), RegistryError> {
        let module = self.module_or_err(id)?;
        self.run_stop(&module, options)
    }

    /// Start `module`. `level_change` is set when called by a start level
    /// change that already ordered this module.
    pub(super) fn run_start(
        &self,
        module: &Arc<Module>,
        options: StartOptions,
        level_change: bool,
    ) -> Result<(), RegistryError> {
        if module.is_fragment() {
            return Err(ModuleError::Fragment(module.symbolic_name()).into());
        }

        let guard = self.locks.acquire_module(module, not_uninstalled())?;

        if !options.transient {
            module.set_persistently_active(true);
        }

        let level = module.start_level();
        let active = self.active_start_level();
        if level > active {
            if options.transient {
                return Err(ModuleError::StartLevelTooHigh {
                    module: module.symbolic_name(),
                    level,
                    active,
                }
                .into());
            }
            if !level_change {
                self.start_levels.offer(level, module.id());
            }
            info!(module = %module.id(), level, active, "Start deferred until start level is reached");
            return Ok(());
        }

        match module.state() {
            ModuleState::Starting | ModuleState::Stopping => {
                return Err(ModuleError::Transitioning {
                    module: module.symbolic_name(),
                    state: module.state(),
                }
                .into());
            }
            ModuleState::Active => return Ok(()),
            ModuleState::Installed => {
                self.resolve(std::slice::from_ref(module), &[])?;
            }
            ModuleState::Resolved | ModuleState::Uninstalled => {}
        }

        self.locks.set_state(module, ModuleState::Starting);
        self.module_event(ModuleEventKind::Starting, module);
        drop(guard);

        let revision = module.current_revision().to_ref();
        let result = self.activator.activate(&revision);

        let _guard = self.locks.acquire_module(module, StateMask::STARTING)?;
        match result {
            Ok(()) => {
                self.locks.set_state(module, ModuleState::Active);
                info!(module = %module.id(), name = %revision.symbolic_name, "Module started");
                self.module_event(ModuleEventKind::Started, module);
                Ok(())
            }
            Err(source) => {
                self.locks.set_state(module, ModuleState::Stopping);
                self.module_event(ModuleEventKind::Stopping, module);
                self.activator.release(&revision);
                self.locks.set_state(module, ModuleState::Resolved);
                self.module_event(ModuleEventKind::Stopped, module);

                let error = ModuleError::Activation {
                    module: module.symbolic_name(),
                    source,
                };
                warn!(module = %module.id(), "{}", error);
                self.error_event(Some(module.id()), &error);
                Err(error.into())
            }
        }
    }

    pub(super) fn run_stop(
        &self,
        module: &Arc<Module>,
        options: StopOptions,
    ) -> Result<(), RegistryError> {
        if module.is_fragment() {
            return Err(ModuleError::Fragment(module.symbolic_name()).into());
        }

        let guard = self.locks.acquire_module(module, not_uninstalled())?;

        if !options.transient {
            module.set_persistently_active(false);
        }

        match module.state() {
            ModuleState::Starting | ModuleState::Stopping => {
                return Err(ModuleError::Transitioning {
                    module: module.symbolic_name(),
                    state: module.state(),
                }
                .into());
            }
            ModuleState::Installed | ModuleState::Resolved | ModuleState::Uninstalled => {
                return Ok(());
            }
            ModuleState::Active => {}
        }

        self.locks.set_state(module, ModuleState::Stopping);
        self.module_event(ModuleEventKind::Stopping, module);

        let revision = module.current_revision().to_ref();
        let result = self.activator.deactivate(&revision);
        self.activator.release(&revision);

        self.locks.set_state(module, ModuleState::Resolved);
        drop(guard);
        info!(module = %module.id(), name = %revision.symbolic_name, "Module stopped");
        self.module_event(ModuleEventKind::Stopped, module);

        result.map_err(|source| {
            let error = ModuleError::Deactivation {
                module: module.symbolic_name(),
                source,
            };
            self.error_event(Some(module.id()), &error);
            error.into()
        })
    }

    /// Report an error from a transition the caller does not see.
    /// Activation failures were reported where they happened.
    pub(super) fn report_error(&self, id: ModuleId, error: &RegistryError) {
        let reported = matches!(
            error,
            RegistryError::Module(ModuleError::Activation { .. } | ModuleError::Deactivation { .. })
        );
        if !reported {
            self.error_event(Some(id), error);
        }
    }

    /// Replace a module's revision.
    ///
    /// An active module is stopped first and restarted afterwards. If the new
    /// revision is rejected the previous one is restored.
    pub fn update(&self, id: ModuleId, descriptor: ModuleDescriptor) -> Result<(), RegistryError> {
        self.ensure_accepting()?;
        let module = self.module_or_err(id)?;
        let guard = self.locks.acquire_module(&module, revisable())?;

        let previous_state = module.state();
        let was_active = previous_state == ModuleState::Active;
        if was_active {
            if let Err(e) = self.run_stop(&module, StopOptions::transient()) {
                warn!(module = %id, "stop before update failed: {}", e);
                self.report_error(id, &e);
            }
        }

        let old = module.current_revision();
        let result = self.revise(&module, descriptor);

        if result.is_ok() {
            self.locks.set_state(&module, ModuleState::Installed);
            if previous_state != ModuleState::Installed {
                self.module_event(ModuleEventKind::Unresolved, &module);
            }
            info!(module = %id, version = %module.version(), "Module updated");
            self.module_event(ModuleEventKind::Updated, &module);

            if !self.dependencies.has_dependents(old.id()) {
                if let Err(e) = self.refresh(Some(&[id])) {
                    self.report_error(id, &e);
                }
            }
        }

        if was_active {
            if let Err(e) = self.run_start(&module, StartOptions::transient(), false) {
                warn!(module = %id, "restart after update failed: {}", e);
                self.report_error(id, &e);
            }
        }
        drop(guard);
        result.map(|_| ())
    }

    /// Swap in a new revision under the global lock, rolling back if it
    /// clashes with an installed module.
    fn revise(
        &self,
        module: &Arc<Module>,
        descriptor: ModuleDescriptor,
    ) -> Result<Arc<Revision>, RegistryError> {
        descriptor.validate()?;
        let _global = self.locks.acquire_global()?;
        let revision = module.revise(descriptor)?;

        if self.has_duplicate(module) {
            module.rollback_revision();
            warn!(module = %module.id(), "update rolled back");
            return Err(RegistryError::Duplicate {
                symbolic_name: revision.symbolic_name().to_string(),
                version: revision.version().clone(),
            });
        }

        self.resolver_state.lock().add_revision(revision.clone());
        Ok(revision)
    }

    /// Uninstall a module, stopping it first if active.
    ///
    /// The module stays queryable by id until a refresh purges it, which
    /// happens at once when nothing is wired to it.
    pub fn uninstall(&self, id: ModuleId) -> Result<(), RegistryError> {
        self.ensure_accepting()?;
        let module = self.module_or_err(id)?;
        let guard = self.locks.acquire_module(&module, revisable())?;
        // Taken before any side effect so an interrupted call changes nothing.
        let global = self.locks.acquire_global()?;

        let previous_state = module.state();
        if previous_state == ModuleState::Active {
            if let Err(e) = self.run_stop(&module, StopOptions::default()) {
                warn!(module = %id, "stop before uninstall failed: {}", e);
                self.report_error(id, &e);
            }
        }
        module.set_persistently_active(false);

        self.installed.update(|index| {
            index.remove(id);
        });
        self.uninstalled.update(|list| list.push(module.clone()));
        self.locks.set_state(&module, ModuleState::Uninstalled);
        drop(global);
        drop(guard);
        info!(module = %id, name = %module.symbolic_name(), "Module uninstalled");
        if previous_state != ModuleState::Installed {
            self.module_event(ModuleEventKind::Unresolved, &module);
        }
        self.module_event(ModuleEventKind::Uninstalled, &module);

        let wired = module
            .revisions()
            .iter()
            .any(|revision| self.dependencies.has_dependents(revision.id()));
        if !wired {
            self.refresh(Some(&[id]))?;
        }
        Ok(())
    }
}
