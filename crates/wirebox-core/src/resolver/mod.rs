//! Transactional capability resolver.
//!
//! A resolve runs in three steps. Discovery walks outward from the root
//! revisions with an explicit work queue, asking [`ResolverState`] and the
//! resolver hooks for the providers of every requirement. Settling then
//! fails revisions whose mandatory requirements have no live provider left,
//! repeating until nothing changes. Finally the wire map is built by
//! following each surviving root's chosen providers.
//!
//! Before discovery, one unresolved singleton is selected per symbolic
//! name; the others take no part in the session. Settling also enforces
//! `uses` constraints, re-picking providers until no requirer would see
//! two sources of a constrained package.
//!
//! The resolver never mutates anything; committing the result is up to the
//! caller.

mod candidates;
pub mod state;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use wirebox_protocols::{
    Capability, Directives, Filter, Requirement, RequirementId, ResolveError, RevisionId, Unsatisfied,
    namespace,
};

use crate::hooks::HookSession;
use crate::revision::Revision;
use crate::wiring::Wire;
use candidates::{Candidates, describe};
pub use state::{AdmissiblePredicate, ResolverState};

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;

/// Wires to commit, keyed by requiring revision.
pub type WireMap = BTreeMap<RevisionId, Vec<Wire>>;

/// Outcome of a successful dynamic resolve.
#[derive(Debug, Clone)]
pub struct DynamicResolution {
    /// The new wire to append to the requirer's wiring.
    pub wire: Wire,
    /// Wiring for a provider that had to be resolved first.
    pub wires: WireMap,
}

pub struct Resolver<'a> {
    state: &'a ResolverState,
    hooks: &'a mut HookSession,
    whitelist: Option<BTreeSet<RevisionId>>,
    /// Unresolved singletons that lost selection.
    excluded: BTreeSet<RevisionId>,
}

impl<'a> Resolver<'a> {
    pub fn new(state: &'a ResolverState, hooks: &'a mut HookSession) -> Self {
        Self {
            state,
            hooks,
            whitelist: None,
            excluded: BTreeSet::new(),
        }
    }

    /// Restrict which unresolved revisions may resolve in this session.
    pub fn with_whitelist(mut self, whitelist: Option<BTreeSet<RevisionId>>) -> Self {
        self.whitelist = whitelist;
        self
    }

    fn is_allowed(&self, id: RevisionId) -> bool {
        self.whitelist.as_ref().is_none_or(|allowed| allowed.contains(&id))
    }

    /// Select one unresolved singleton per symbolic name and exclude the
    /// rest.
    ///
    /// Nothing is selected for a name that already has a resolved
    /// singleton. Otherwise the highest allowed version wins, ties going to
    /// the lowest module id.
    fn select_singletons(&mut self) {
        let state = self.state;
        let mut groups: BTreeMap<&str, Vec<&Arc<Revision>>> = BTreeMap::new();
        for revision in state.revisions().filter(|r| r.is_singleton()) {
            groups.entry(revision.symbolic_name()).or_default().push(revision);
        }

        self.excluded.clear();
        for (name, group) in groups {
            let selected = if group.iter().any(|r| r.is_resolved()) {
                None
            } else {
                group
                    .iter()
                    .filter(|r| self.is_allowed(r.id()))
                    .max_by(|a, b| a.version().cmp(b.version()).then_with(|| b.id().cmp(&a.id())))
                    .map(|r| r.id())
            };
            for revision in group {
                if revision.is_resolved() || Some(revision.id()) == selected {
                    continue;
                }
                debug!(revision = %revision.id(), name, "singleton not selected");
                self.excluded.insert(revision.id());
            }
        }
    }

    /// Resolve `mandatory` and `optional` roots.
    ///
    /// A failed mandatory root fails the whole call. Failed optional roots
    /// and on-demand fragments are left out of the result.
    pub fn resolve(
        &mut self,
        mandatory: &[RevisionId],
        optional: &[RevisionId],
        ondemand_fragments: &BTreeSet<RevisionId>,
    ) -> Result<WireMap, ResolveError> {
        let roots: Vec<RevisionId> = mandatory
            .iter()
            .chain(optional)
            .copied()
            .filter(|id| !self.state.is_resolved(*id))
            .collect();

        self.select_singletons();
        let mut candidates = Candidates::default();
        self.populate(&mut candidates, roots.clone(), ondemand_fragments)?;
        candidates.settle(self.state);

        for id in mandatory {
            if let Some(unsatisfied) = candidates.failed.get(id) {
                return Err(ResolveError::Unresolved {
                    module: describe(self.state, *id),
                    unsatisfied: unsatisfied.clone(),
                });
            }
        }
        for id in optional {
            if let Some(unsatisfied) = candidates.failed.get(id) {
                debug!(revision = %id, missing = unsatisfied.len(), "optional root did not resolve");
            }
        }

        Ok(candidates.wire_map(self.state, &roots))
    }

    /// Resolve `package` for a resolved revision with dynamic requirements.
    ///
    /// `None` when the revision cannot or need not import the package
    /// dynamically, or when no provider resolves.
    pub fn resolve_dynamic(
        &mut self,
        id: RevisionId,
        package: &str,
        ondemand_fragments: &BTreeSet<RevisionId>,
    ) -> Result<Option<DynamicResolution>, ResolveError> {
        if package.is_empty() {
            return Ok(None);
        }
        let Some(revision) = self.state.revision(id).cloned() else {
            return Ok(None);
        };
        if revision.is_fragment() {
            return Ok(None);
        }
        let Some(wiring) = revision.wiring() else {
            return Ok(None);
        };
        if wiring.exports_package(package) || wiring.has_package_source(package) {
            return Ok(None);
        }

        let mut dynamic: Vec<Arc<Requirement>> = revision.dynamic_requirements().cloned().collect();
        for fragment in wiring.fragments() {
            if let Some(fragment) = self.state.revision(fragment.id) {
                dynamic.extend(fragment.dynamic_requirements().cloned());
            }
        }
        if dynamic.is_empty() {
            return Ok(None);
        }

        self.select_singletons();
        let lookup = Requirement {
            id: RequirementId::synthetic(id),
            namespace: namespace::PACKAGE.to_string(),
            filter: Some(Filter::equal(namespace::PACKAGE, package)),
            directives: Directives::new(),
        };
        let mut candidates = self.state.candidates(&lookup, false);
        candidates.retain(|c| {
            self.state.resolved_host_of(c.revision()) != id && !self.excluded.contains(&c.revision())
        });

        let Some(requirement) = dynamic
            .into_iter()
            .find(|d| candidates.iter().any(|c| d.matches(c)))
        else {
            return Ok(None);
        };
        candidates.retain(|c| {
            requirement.matches(c)
                && (self.state.is_resolved(c.revision()) || self.is_allowed(c.revision()))
        });
        self.hooks.filter_matches(&requirement, &mut candidates)?;

        let wire_requirement = Arc::new(Requirement {
            id: requirement.id,
            namespace: namespace::PACKAGE.to_string(),
            filter: lookup.filter,
            directives: requirement.directives.clone(),
        });

        for capability in candidates {
            let owner = capability.revision();
            if self.state.is_resolved(owner) {
                let provider = self.state.resolved_host_of(owner);
                return Ok(Some(DynamicResolution {
                    wire: Wire {
                        requirer: id,
                        requirement: wire_requirement,
                        provider,
                        capability,
                    },
                    wires: WireMap::new(),
                }));
            }

            let mut session = Candidates::default();
            self.populate(&mut session, vec![owner], ondemand_fragments)?;
            session.settle(self.state);
            if session.failed.contains_key(&owner) {
                debug!(provider = %owner, package, "dynamic candidate did not resolve");
                continue;
            }
            let Some(provider) = session.provider_of(self.state, &capability) else {
                continue;
            };
            let wires = session.wire_map(self.state, &[owner]);
            return Ok(Some(DynamicResolution {
                wire: Wire {
                    requirer: id,
                    requirement: wire_requirement,
                    provider,
                    capability,
                },
                wires,
            }));
        }

        Ok(None)
    }

    fn find_providers(&mut self, requirement: &Requirement) -> Result<Vec<Arc<Capability>>, ResolveError> {
        let mut found = self.state.candidates(requirement, true);
        found.retain(|c| {
            let owner = c.revision();
            !self.excluded.contains(&owner) && (self.state.is_resolved(owner) || self.is_allowed(owner))
        });
        self.hooks.filter_matches(requirement, &mut found)?;
        Ok(found)
    }

    /// Visit every unresolved revision reachable from `roots`, recording
    /// providers per requirement.
    fn populate(
        &mut self,
        candidates: &mut Candidates,
        roots: Vec<RevisionId>,
        ondemand_fragments: &BTreeSet<RevisionId>,
    ) -> Result<(), ResolveError> {
        let mut queue: VecDeque<RevisionId> = roots.into();

        loop {
            while let Some(id) = queue.pop_front() {
                if self.state.is_resolved(id) || !candidates.visited.insert(id) {
                    continue;
                }
                let Some(revision) = self.state.revision(id).cloned() else {
                    candidates.fail(id, vec![blocker(id, "revision is not installed")]);
                    continue;
                };
                if !self.is_allowed(id) {
                    candidates.fail(
                        id,
                        vec![blocker(id, "resolution was prevented by a resolver hook")],
                    );
                    continue;
                }
                if self.excluded.contains(&id) {
                    candidates.fail(
                        id,
                        vec![blocker(id, "another singleton revision of the same name is selected")],
                    );
                    continue;
                }
                if let Err(message) = self.state.check_execution_environment(id) {
                    candidates.fail(id, vec![blocker(id, &message)]);
                    continue;
                }

                for requirement in revision.requirements().iter().filter(|r| !r.is_dynamic()) {
                    let providers = self.find_providers(requirement)?;
                    for capability in &providers {
                        let owner = capability.revision();
                        if !self.state.is_resolved(owner) && !candidates.visited.contains(&owner) {
                            queue.push_back(owner);
                        }
                    }
                    debug!(requirement = %requirement, providers = providers.len(), "candidates found");
                    candidates.providers.insert(requirement.id, providers);
                }
            }

            for fragment_id in ondemand_fragments {
                if candidates.visited.contains(fragment_id)
                    || self.state.is_resolved(*fragment_id)
                    || !self.is_allowed(*fragment_id)
                    || self.excluded.contains(fragment_id)
                {
                    continue;
                }
                let Some(host_requirement) = self
                    .state
                    .revision(*fragment_id)
                    .and_then(|r| r.host_requirement().cloned())
                else {
                    continue;
                };
                let host_in_session = self
                    .state
                    .candidates(&host_requirement, true)
                    .iter()
                    .any(|c| candidates.visited.contains(&c.revision()));
                if host_in_session {
                    queue.push_back(*fragment_id);
                }
            }

            if queue.is_empty() {
                return Ok(());
            }
        }
    }
}

fn blocker(id: RevisionId, message: &str) -> Unsatisfied {
    Unsatisfied {
        requirement: RequirementId::synthetic(id),
        description: message.to_string(),
        cause: None,
    }
}
