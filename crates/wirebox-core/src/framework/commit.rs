//! Applying a wire map.
//!
//! Every wiring is built before anything is published. Only once all of
//! them exist are they attached, indexed and reflected in module states.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, warn};

use wirebox_protocols::{
    Capability, LockError, ModuleEvent, ModuleEventKind, ModuleState, ResolveError, RevisionId,
    RevisionRef, StateMask, namespace,
};

use super::Framework;
use crate::lock::ModuleLockGuard;
use crate::resolver::{ResolverState, WireMap};
use crate::revision::Revision;
use crate::wiring::{Wire, Wiring};

/// Built but unpublished wirings.
struct Transaction {
    built: Vec<(Arc<Revision>, Vec<Arc<Revision>>, Arc<Wiring>)>,
}

impl Framework {
    /// Commit `wires` and return the resolved events to fire once the
    /// caller has released its locks.
    ///
    /// Caller holds the global lock and the resolver state.
    pub(super) fn commit(
        &self,
        state: &mut ResolverState,
        wires: WireMap,
    ) -> Result<Vec<ModuleEvent>, ResolveError> {
        if wires.is_empty() {
            return Ok(Vec::new());
        }

        let mut hosts: BTreeMap<RevisionId, Vec<RevisionId>> = BTreeMap::new();
        for wire in wires.values().flatten().filter(|w| w.is_host_wire()) {
            hosts.entry(wire.provider).or_default().push(wire.requirer);
        }

        let transaction = self.build_wirings(state, &wires, &hosts)?;
        let locks = match self.lock_resolving(&transaction) {
            Ok(locks) => locks,
            Err(e) => {
                warn!("cannot lock resolving modules: {}", e);
                self.discard(&transaction);
                return Err(e.into());
            }
        };
        let events = self.apply(state, transaction);
        drop(locks);
        Ok(events)
    }

    fn build_wirings(
        &self,
        state: &ResolverState,
        wires: &WireMap,
        hosts: &BTreeMap<RevisionId, Vec<RevisionId>>,
    ) -> Result<Transaction, ResolveError> {
        let mut transaction = Transaction { built: Vec::new() };

        for (id, required) in wires {
            if state.is_fragment(*id) {
                continue;
            }
            let Some(revision) = state.revision(*id).cloned() else {
                continue;
            };
            let fragments: Vec<Arc<Revision>> = hosts
                .get(id)
                .into_iter()
                .flatten()
                .filter_map(|fragment| state.revision(*fragment).cloned())
                .collect();
            let fragment_refs: Vec<RevisionRef> = fragments.iter().map(|f| f.to_ref()).collect();

            let wiring = Wiring::new(
                *id,
                required.clone(),
                fragment_refs.clone(),
                effective_capabilities(&revision, &fragments),
                self.required_packages(state, wires, hosts, required),
            );

            if let Err(source) = self.content.attach(&revision.to_ref(), &fragment_refs) {
                warn!(revision = %id, "wiring construction failed: {}", source);
                self.discard(&transaction);
                return Err(ResolveError::CommitFailed {
                    module: revision.to_ref().to_string(),
                    source,
                });
            }
            transaction.built.push((revision, fragments, Arc::new(wiring)));
        }
        Ok(transaction)
    }

    /// Detach the content of every wiring built so far.
    fn discard(&self, transaction: &Transaction) {
        for (built, _, _) in &transaction.built {
            self.content.detach(&built.to_ref());
        }
    }

    /// Lock every module whose revision the transaction resolves.
    fn lock_resolving(&self, transaction: &Transaction) -> Result<Vec<ModuleLockGuard<'_>>, LockError> {
        let mut locks = Vec::new();
        for (revision, fragments, _) in &transaction.built {
            for resolved in fragments.iter().chain(std::iter::once(revision)) {
                if let Some(module) = self.module(resolved.id().module) {
                    locks.push(self.locks.acquire_module(&module, StateMask::all())?);
                }
            }
        }
        Ok(locks)
    }

    /// Publish a fully built transaction. Cannot fail; the caller holds the
    /// lock of every affected module.
    fn apply(&self, state: &mut ResolverState, transaction: Transaction) -> Vec<ModuleEvent> {
        for (revision, fragments, wiring) in &transaction.built {
            revision.set_wiring(Some(wiring.clone()));
            for fragment in fragments {
                fragment.set_wiring(Some(wiring.clone()));
            }
        }

        for (revision, fragments, wiring) in &transaction.built {
            state.add_revision(revision.clone());
            for fragment in fragments {
                state.add_revision(fragment.clone());
                self.dependencies.add(revision.id(), fragment.id());
                self.dependencies.add(fragment.id(), revision.id());
            }
            state.remove_substituted_capabilities(revision.id());
            for wire in wiring.required_wires() {
                debug!(wire = %wire, "wire committed");
                self.dependencies.add(wire.provider, wire.requirer);
            }
        }

        let mut events = Vec::new();
        for (revision, fragments, _) in &transaction.built {
            for resolved in fragments.iter().chain(std::iter::once(revision)) {
                if let Some(event) = self.mark_resolved(resolved) {
                    events.push(event);
                }
            }
        }
        events
    }

    fn mark_resolved(&self, revision: &Revision) -> Option<ModuleEvent> {
        let module = self.module(revision.id().module)?;
        if module.state() != ModuleState::Installed || module.current_revision().id() != revision.id() {
            return None;
        }
        self.locks.set_state(&module, ModuleState::Resolved);
        Some(ModuleEvent {
            kind: ModuleEventKind::Resolved,
            module: module.id(),
            symbolic_name: module.symbolic_name(),
        })
    }

    /// Packages visible through module requirements, following re-exports.
    fn required_packages(
        &self,
        state: &ResolverState,
        wires: &WireMap,
        hosts: &BTreeMap<RevisionId, Vec<RevisionId>>,
        required: &[Wire],
    ) -> BTreeMap<String, BTreeSet<RevisionId>> {
        let mut packages: BTreeMap<String, BTreeSet<RevisionId>> = BTreeMap::new();
        let mut visited = BTreeSet::new();
        let mut stack: Vec<RevisionId> = required
            .iter()
            .filter(|w| w.capability.namespace == namespace::MODULE)
            .map(|w| w.provider)
            .collect();

        while let Some(provider) = stack.pop() {
            if !visited.insert(provider) {
                continue;
            }

            let (exports, provider_wires) = match wires.get(&provider) {
                Some(pending) => {
                    let revision = state.revision(provider);
                    let fragments: Vec<Arc<Revision>> = hosts
                        .get(&provider)
                        .into_iter()
                        .flatten()
                        .filter_map(|f| state.revision(*f).cloned())
                        .collect();
                    let exports = revision
                        .map(|r| effective_capabilities(r, &fragments))
                        .unwrap_or_default();
                    (exports, pending.clone())
                }
                None => match state.revision(provider).and_then(|r| r.wiring()) {
                    Some(wiring) => (wiring.capabilities().to_vec(), wiring.required_wires()),
                    None => continue,
                },
            };

            for capability in exports.iter().filter(|c| c.namespace == namespace::PACKAGE) {
                if let Some(name) = capability.name() {
                    packages.entry(name.to_string()).or_default().insert(provider);
                }
            }
            stack.extend(
                provider_wires
                    .iter()
                    .filter(|w| w.capability.namespace == namespace::MODULE && w.requirement.is_reexport())
                    .map(|w| w.provider),
            );
        }
        packages
    }
}

/// Declared capabilities of a host plus those its fragments contribute.
fn effective_capabilities(host: &Revision, fragments: &[Arc<Revision>]) -> Vec<Arc<Capability>> {
    let mut capabilities = host.capabilities().to_vec();
    for fragment in fragments {
        capabilities.extend(
            fragment
                .capabilities()
                .iter()
                .filter(|c| c.namespace != namespace::MODULE && c.namespace != namespace::HOST)
                .cloned(),
        );
    }
    capabilities
}
