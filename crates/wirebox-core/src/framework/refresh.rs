//! Refreshing modules: discarding stale wirings and purging uninstalled
//! modules and superseded revisions.

use std::sync::Arc;

use tracing::{debug, info, warn};

use wirebox_protocols::{
    FrameworkEvent, FrameworkEventKind, ModuleEventKind, ModuleId, ModuleState, RegistryError,
    StateMask,
};

use super::Framework;
use super::lifecycle::{StartOptions, StopOptions};
use crate::module::Module;
use crate::resolver::ResolverState;
use crate::revision::Revision;

impl Framework {
    /// Refresh the given modules and everything wired to them.
    ///
    /// With `None`, targets every uninstalled module and every module with
    /// superseded revisions. Affected modules that were active are stopped,
    /// unresolved and started again.
    pub fn refresh(&self, ids: Option<&[ModuleId]>) -> Result<(), RegistryError> {
        let _global = self.locks.acquire_global()?;

        let targets: Vec<Arc<Module>> = match ids {
            Some(ids) => ids.iter().filter_map(|id| self.module(*id)).collect(),
            None => self
                .uninstalled_modules()
                .into_iter()
                .chain(self.modules().into_iter().filter(|m| m.is_removal_pending()))
                .collect(),
        };

        let roots = targets
            .iter()
            .flat_map(|module| module.revisions())
            .map(|revision| revision.id());
        let closure: Vec<Arc<Module>> = self
            .dependencies
            .dependent_closure(roots)
            .into_iter()
            .filter_map(|id| self.module(id))
            .collect();
        if closure.is_empty() {
            return Ok(());
        }
        info!(modules = closure.len(), "Refreshing modules");

        let mut restart = Vec::new();
        for module in closure.iter().rev() {
            if module.is_fragment() {
                continue;
            }
            if matches!(module.state(), ModuleState::Active | ModuleState::Starting) {
                match self.run_stop(module, StopOptions::transient()) {
                    Ok(()) => restart.push(module.clone()),
                    Err(e) => {
                        warn!(module = %module.id(), "stop during refresh failed: {}", e);
                        self.report_error(module.id(), &e);
                    }
                }
            }
        }

        let mut unresolved = Vec::new();
        {
            let mut state = self.resolver_state.lock();
            for module in &closure {
                if module.state() == ModuleState::Uninstalled {
                    self.purge(&mut state, module);
                } else if self.reset(&mut state, module)? {
                    unresolved.push(module.clone());
                }
            }
        }

        for module in &unresolved {
            self.module_event(ModuleEventKind::Unresolved, module);
        }

        for module in restart.iter().rev() {
            if module.state() == ModuleState::Uninstalled {
                continue;
            }
            if let Err(e) = self.run_start(module, StartOptions::transient(), false) {
                warn!(module = %module.id(), "restart after refresh failed: {}", e);
                self.report_error(module.id(), &e);
            }
        }

        self.framework_event(FrameworkEvent::new(FrameworkEventKind::PackagesRefreshed));
        Ok(())
    }

    /// Forget an uninstalled module entirely.
    fn purge(&self, state: &mut ResolverState, module: &Arc<Module>) {
        for revision in module.revisions() {
            self.dispose(state, &revision);
            self.dependencies.remove_revision(revision.id());
        }
        module.purge_old_revisions();
        let id = module.id();
        self.uninstalled.update(|list| list.retain(|m| m.id() != id));
        debug!(module = %id, "Module purged");
    }

    /// Return a module to INSTALLED with only its current revision.
    /// Returns whether it had been resolved.
    fn reset(&self, state: &mut ResolverState, module: &Arc<Module>) -> Result<bool, RegistryError> {
        let _guard = self.locks.acquire_module(module, StateMask::all())?;
        let was_resolved = module.state() != ModuleState::Installed;
        self.locks.set_state(module, ModuleState::Installed);

        for revision in module.purge_old_revisions() {
            self.dispose(state, &revision);
            self.dependencies.remove_revision(revision.id());
        }
        let current = module.current_revision();
        self.dispose(state, &current);
        self.dependencies.remove_revision(current.id());
        state.add_revision(current);

        Ok(was_resolved)
    }

    /// Drop a revision's wiring and its index entries.
    fn dispose(&self, state: &mut ResolverState, revision: &Arc<Revision>) {
        if revision.wiring().is_some() && !revision.is_fragment() {
            self.content.detach(&revision.to_ref());
        }
        revision.set_wiring(None);
        state.remove_revision(revision.id());
    }
}

