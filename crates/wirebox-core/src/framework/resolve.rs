//! Resolve entry points of the framework.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use wirebox_protocols::{
    ModuleEvent, ModuleEventKind, ModuleId, ModuleState, RegistryError, ResolveError, RevisionId,
    RevisionRef,
};

use super::Framework;
use crate::hooks::HookSession;
use crate::module::Module;
use crate::resolver::{ResolverState, Resolver};
use crate::revision::Revision;

/// Marks the current thread as resolving until dropped. Taken under the
/// global lock.
struct ResolvingGuard<'a> {
    slot: &'a Mutex<Option<thread::ThreadId>>,
}

impl<'a> ResolvingGuard<'a> {
    fn enter(slot: &'a Mutex<Option<thread::ThreadId>>) -> Result<Self, ResolveError> {
        let me = thread::current().id();
        let mut current = slot.lock();
        if *current == Some(me) {
            return Err(ResolveError::NestedResolve);
        }
        *current = Some(me);
        Ok(Self { slot })
    }
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock() = None;
    }
}

impl Framework {
    /// Resolve the given modules, or every unresolved module for `None`.
    ///
    /// Resolution is optional: modules that cannot resolve stay INSTALLED.
    /// Returns whether all of them resolved.
    pub fn resolve_modules(&self, ids: Option<&[ModuleId]>) -> Result<bool, RegistryError> {
        self.ensure_accepting()?;
        let modules: Vec<Arc<Module>> = match ids {
            Some(ids) => ids
                .iter()
                .map(|id| self.module_or_err(*id))
                .collect::<Result<_, _>>()?,
            None => self.modules(),
        };
        let targets: Vec<Arc<Module>> = modules
            .into_iter()
            .filter(|m| m.state() == ModuleState::Installed)
            .collect();
        if targets.is_empty() {
            return Ok(true);
        }

        self.resolve(&[], &targets)?;
        Ok(targets.iter().all(|m| m.state() != ModuleState::Installed))
    }

    /// Resolve one module, failing with the reason when it cannot resolve.
    pub fn resolve_module(&self, id: ModuleId) -> Result<(), RegistryError> {
        self.ensure_accepting()?;
        let module = self.module_or_err(id)?;
        if module.state() != ModuleState::Installed {
            return Ok(());
        }
        self.resolve(&[module], &[])?;
        Ok(())
    }

    /// Resolve `mandatory` and `optional` modules in one session.
    pub(crate) fn resolve(
        &self,
        mandatory: &[Arc<Module>],
        optional: &[Arc<Module>],
    ) -> Result<(), ResolveError> {
        match self.resolve_locked(mandatory, optional) {
            Ok(events) => {
                for event in &events {
                    self.events.module_event(event);
                }
                Ok(())
            }
            Err(e) => {
                if matches!(e, ResolveError::Unresolved { .. }) {
                    for module in mandatory.iter().filter(|m| m.state() == ModuleState::Installed) {
                        self.module_event(ModuleEventKind::ResolutionFailed, module);
                    }
                }
                Err(e)
            }
        }
    }

    fn resolve_locked(
        &self,
        mandatory: &[Arc<Module>],
        optional: &[Arc<Module>],
    ) -> Result<Vec<ModuleEvent>, ResolveError> {
        let _global = self.locks.acquire_global()?;
        let _resolving = ResolvingGuard::enter(&self.resolving)?;
        let span = info_span!("resolve", session = %Uuid::new_v4());
        let _enter = span.enter();

        let mut state = self.resolver_state.lock();

        let mandatory_ids: Vec<RevisionId> =
            mandatory.iter().map(|m| m.current_revision().id()).collect();
        let optional_ids: Vec<RevisionId> =
            optional.iter().map(|m| m.current_revision().id()).collect();
        let triggers: Vec<RevisionRef> = mandatory
            .iter()
            .chain(optional)
            .map(|m| m.current_revision().to_ref())
            .collect();

        let mut session = HookSession::begin(self.hooks.snapshot(), &triggers)?;
        let whitelist = whitelist(&state, &mut session)?;

        if let Some(allowed) = &whitelist {
            for module in mandatory {
                let revision = module.current_revision();
                if !revision.is_resolved() && !allowed.contains(&revision.id()) {
                    return Err(ResolveError::HookPrevented(revision.to_ref().to_string()));
                }
            }
        }

        let ondemand: BTreeSet<RevisionId> = state
            .fragments()
            .filter(|f| !f.is_resolved())
            .map(|f| f.id())
            .collect();

        let result = Resolver::new(&state, &mut session)
            .with_whitelist(whitelist)
            .resolve(&mandatory_ids, &optional_ids, &ondemand);
        let ended = session.end();
        let wires = match (result, ended) {
            (_, Err(hook)) => return Err(hook.into()),
            (Err(e), Ok(())) => {
                info!("Resolve failed: {}", e);
                return Err(e);
            }
            (Ok(wires), Ok(())) => wires,
        };

        debug!(revisions = wires.len(), "committing wire map");
        self.commit(&mut state, wires)
    }

    /// Resolve `package` for a module through its dynamic requirements.
    ///
    /// Returns the providing revision, or `None` when the module has no
    /// dynamic requirement for the package or no provider resolves.
    pub fn resolve_dynamic(
        &self,
        id: ModuleId,
        package: &str,
    ) -> Result<Option<RevisionId>, RegistryError> {
        let module = self.module_or_err(id)?;
        let revision = module.current_revision();
        let Some(wiring) = module.wiring() else {
            return Ok(None);
        };
        if let Some(existing) = wiring.import_source(package) {
            return Ok(Some(existing));
        }
        if wiring.exports_package(package) {
            return Ok(None);
        }

        let (provider, events) = self.resolve_dynamic_locked(&revision, package)?;
        for event in &events {
            self.events.module_event(event);
        }
        Ok(provider)
    }

    fn resolve_dynamic_locked(
        &self,
        revision: &Arc<Revision>,
        package: &str,
    ) -> Result<(Option<RevisionId>, Vec<ModuleEvent>), ResolveError> {
        let _global = self.locks.acquire_global()?;
        let _resolving = ResolvingGuard::enter(&self.resolving)?;
        let span = info_span!("resolve_dynamic", session = %Uuid::new_v4(), package);
        let _enter = span.enter();

        let mut state = self.resolver_state.lock();

        // Another thread may have wired the package while we waited.
        let Some(wiring) = revision.wiring() else {
            return Ok((None, Vec::new()));
        };
        if let Some(existing) = wiring.import_source(package) {
            return Ok((Some(existing), Vec::new()));
        }

        let mut session = HookSession::begin(self.hooks.snapshot(), &[revision.to_ref()])?;
        let whitelist = whitelist(&state, &mut session)?;
        let ondemand: BTreeSet<RevisionId> = state
            .fragments()
            .filter(|f| !f.is_resolved())
            .map(|f| f.id())
            .collect();

        let result = Resolver::new(&state, &mut session)
            .with_whitelist(whitelist)
            .resolve_dynamic(revision.id(), package, &ondemand);
        session.end()?;
        let Some(resolution) = result? else {
            debug!("no dynamic provider");
            return Ok((None, Vec::new()));
        };

        let events = self.commit(&mut state, resolution.wires)?;
        let wire = resolution.wire;
        let provider = wire.provider;
        info!(requirer = %wire.requirer, provider = %provider, "dynamic wire added");
        self.dependencies.add(provider, wire.requirer);
        wiring.add_dynamic_wire(wire);
        Ok((Some(provider), events))
    }
}

/// Revisions the hooks allow to resolve, or `None` when no hook narrowed
/// the unresolved set.
fn whitelist(
    state: &ResolverState,
    session: &mut HookSession,
) -> Result<Option<BTreeSet<RevisionId>>, ResolveError> {
    if session.is_empty() {
        return Ok(None);
    }
    let mut candidates: Vec<RevisionRef> = state.unresolved_revisions().map(|r| r.to_ref()).collect();
    let before = candidates.len();
    session.filter_resolvable(&mut candidates)?;
    if candidates.len() < before {
        warn!(
            filtered = before - candidates.len(),
            "resolver hooks excluded unresolved revisions"
        );
        Ok(Some(candidates.iter().map(|r| r.id).collect()))
    } else {
        Ok(None)
    }
}
