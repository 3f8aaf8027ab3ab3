//! Per-resolve candidate bookkeeping.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use wirebox_protocols::{
    Capability, CapabilityId, Requirement, RequirementId, RevisionId, Unsatisfied, namespace,
};

use super::WireMap;
use super::state::ResolverState;
use crate::revision::Revision;
use crate::wiring::Wire;

/// Everything one resolve learned about the revisions it visited.
#[derive(Debug, Default)]
pub(super) struct Candidates {
    /// Unresolved revisions pulled into the session.
    pub visited: BTreeSet<RevisionId>,
    /// Hook-filtered providers per requirement, best first.
    pub providers: BTreeMap<RequirementId, Vec<Arc<Capability>>>,
    pub failed: BTreeMap<RevisionId, Vec<Unsatisfied>>,
    /// Fragment to chosen host.
    pub attached: BTreeMap<RevisionId, RevisionId>,
    /// Providers ruled out per requirement by `uses` constraints.
    pub rejected: BTreeMap<RequirementId, BTreeSet<CapabilityId>>,
}

impl Candidates {
    pub fn fail(&mut self, id: RevisionId, unsatisfied: Vec<Unsatisfied>) {
        self.failed.entry(id).or_insert(unsatisfied);
    }

    pub fn is_live(&self, id: RevisionId) -> bool {
        self.visited.contains(&id) && !self.failed.contains_key(&id)
    }

    /// Whether `capability` can still back a wire in this session.
    pub fn is_valid(&self, state: &ResolverState, capability: &Capability) -> bool {
        let owner = capability.revision();
        if state.is_resolved(owner) {
            return true;
        }
        self.is_live(owner) && (!state.is_fragment(owner) || self.attached.contains_key(&owner))
    }

    /// Revision whose wiring ends up holding `capability`.
    pub fn provider_of(&self, state: &ResolverState, capability: &Capability) -> Option<RevisionId> {
        let owner = capability.revision();
        if state.is_resolved(owner) {
            return Some(state.resolved_host_of(owner));
        }
        if state.is_fragment(owner) {
            return self.attached.get(&owner).copied();
        }
        Some(owner)
    }

    fn is_rejected(&self, requirement: RequirementId, capability: CapabilityId) -> bool {
        self.rejected
            .get(&requirement)
            .is_some_and(|rejected| rejected.contains(&capability))
    }

    pub fn first_valid(&self, state: &ResolverState, requirement: &Requirement) -> Option<Arc<Capability>> {
        self.providers
            .get(&requirement.id)?
            .iter()
            .filter(|capability| !self.is_rejected(requirement.id, capability.id))
            .find(|capability| self.is_valid(state, capability))
            .cloned()
    }

    /// Fail revisions until every live one has what it needs.
    ///
    /// Failures only accumulate, so this terminates.
    pub fn settle(&mut self, state: &ResolverState) {
        loop {
            let mut changed = false;

            self.attached.clear();
            let fragments: Vec<RevisionId> = self
                .visited
                .iter()
                .copied()
                .filter(|id| state.is_fragment(*id) && !self.failed.contains_key(id))
                .collect();
            for fragment in fragments {
                let Some(host_requirement) = state
                    .revision(fragment)
                    .and_then(|r| r.host_requirement().cloned())
                else {
                    continue;
                };
                let host = self.providers.get(&host_requirement.id).and_then(|caps| {
                    caps.iter()
                        .map(|c| c.revision())
                        .find(|owner| self.is_live(*owner) && !state.is_fragment(*owner))
                });
                match host {
                    Some(host) => {
                        self.attached.insert(fragment, host);
                    }
                    None => {
                        let missing = self.unsatisfied(state, &host_requirement);
                        self.fail(fragment, vec![missing]);
                        changed = true;
                    }
                }
            }

            let live: Vec<RevisionId> = self
                .visited
                .iter()
                .copied()
                .filter(|id| !self.failed.contains_key(id))
                .collect();
            for id in live {
                let Some(revision) = state.revision(id) else {
                    continue;
                };
                let missing: Vec<Unsatisfied> = revision
                    .requirements()
                    .iter()
                    .filter(|r| !r.is_dynamic() && !r.is_optional() && r.namespace != namespace::HOST)
                    .filter(|r| self.first_valid(state, r).is_none())
                    .map(|r| self.unsatisfied(state, r))
                    .collect();
                if !missing.is_empty() {
                    self.fail(id, missing);
                    changed = true;
                }
            }

            if !changed {
                changed = self.enforce_uses(state);
            }
            if !changed {
                break;
            }
        }
    }

    /// Reject one provider for every live revision whose package space
    /// would see two sources of a package named in a `uses` directive.
    ///
    /// The requirer's own import of the used package is re-picked when it
    /// has another candidate; otherwise the capability carrying the
    /// constraint is dropped for that requirement.
    fn enforce_uses(&mut self, state: &ResolverState) -> bool {
        let live: Vec<RevisionId> = self
            .visited
            .iter()
            .copied()
            .filter(|id| !self.failed.contains_key(id) && !state.is_fragment(*id))
            .collect();
        let mut changed = false;
        for id in live {
            if let Some((requirement, capability)) = self.uses_conflict(state, id) {
                debug!(revision = %id, requirement = %requirement, capability = %capability, "uses constraint conflict");
                self.rejected.entry(requirement).or_default().insert(capability);
                changed = true;
            }
        }
        changed
    }

    fn uses_conflict(&self, state: &ResolverState, id: RevisionId) -> Option<(RequirementId, CapabilityId)> {
        let requirements = self.package_requirements(state, id);
        for requirement in &requirements {
            let Some(capability) = self.first_valid(state, requirement) else {
                continue;
            };
            let Some(provider) = self.provider_of(state, &capability) else {
                continue;
            };
            if provider == id {
                continue;
            }
            for used in capability.uses() {
                let (Some(mine), Some(theirs)) = (
                    self.package_source(state, id, used),
                    self.package_source(state, provider, used),
                ) else {
                    continue;
                };
                if mine == theirs {
                    continue;
                }

                let own_import = requirements.iter().find_map(|r| {
                    self.first_valid(state, r)
                        .filter(|c| c.name() == Some(used))
                        .map(|c| (r, c))
                });
                if let Some((own, current)) = own_import {
                    let has_alternative = self.providers.get(&own.id).is_some_and(|caps| {
                        caps.iter().any(|c| {
                            c.id != current.id
                                && !self.is_rejected(own.id, c.id)
                                && self.is_valid(state, c)
                        })
                    });
                    if has_alternative {
                        return Some((own.id, current.id));
                    }
                }
                return Some((requirement.id, capability.id));
            }
        }
        None
    }

    /// Package requirements of `id` and the fragments attached to it.
    fn package_requirements(&self, state: &ResolverState, id: RevisionId) -> Vec<Arc<Requirement>> {
        self.with_fragments(id)
            .filter_map(|member| state.revision(member))
            .flat_map(|revision| revision.requirements().iter())
            .filter(|r| !r.is_dynamic() && r.namespace == namespace::PACKAGE)
            .cloned()
            .collect()
    }

    fn with_fragments(&self, id: RevisionId) -> impl Iterator<Item = RevisionId> + '_ {
        std::iter::once(id).chain(
            self.attached
                .iter()
                .filter(move |(_, host)| **host == id)
                .map(|(fragment, _)| *fragment),
        )
    }

    /// Where `id` would get `package` from: an import, else its own export.
    fn package_source(&self, state: &ResolverState, id: RevisionId, package: &str) -> Option<RevisionId> {
        if state.is_resolved(id) {
            let wiring = state.revision(id)?.wiring()?;
            return wiring
                .import_source(package)
                .or_else(|| wiring.exports_package(package).then_some(id));
        }
        let imported = self
            .package_requirements(state, id)
            .iter()
            .filter_map(|r| self.first_valid(state, r))
            .find(|c| c.name() == Some(package));
        if let Some(capability) = imported {
            return self.provider_of(state, &capability);
        }
        let exported = self
            .with_fragments(id)
            .filter_map(|member| state.revision(member))
            .any(|revision| {
                revision
                    .capabilities_in(namespace::PACKAGE)
                    .any(|c| c.name() == Some(package))
            });
        exported.then_some(id)
    }

    pub fn unsatisfied(&self, state: &ResolverState, requirement: &Requirement) -> Unsatisfied {
        let providers = self.providers.get(&requirement.id).map(Vec::as_slice).unwrap_or_default();

        let failed_provider = providers.iter().find_map(|capability| {
            let owner = capability.revision();
            self.failed.get(&owner).map(|unsatisfied| (owner, unsatisfied))
        });

        let cause = match failed_provider {
            Some((owner, unsatisfied)) => Some(format!(
                "Unable to resolve {}: missing requirement {}",
                describe(state, owner),
                unsatisfied
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            None if self.rejected.contains_key(&requirement.id) => {
                Some("candidates violate the uses constraints of its other providers".to_string())
            }
            None if providers.is_empty() && !state.candidates(requirement, true).is_empty() => {
                Some("candidates were filtered out by a resolver hook".to_string())
            }
            None if providers.is_empty() && !state.candidates(requirement, false).is_empty() => {
                Some("candidates declare mandatory attributes the filter does not reference".to_string())
            }
            None => None,
        };

        Unsatisfied {
            requirement: requirement.id,
            description: requirement.to_string(),
            cause,
        }
    }

    /// Wires for every revision reachable from the live `roots`.
    pub fn wire_map(&self, state: &ResolverState, roots: &[RevisionId]) -> WireMap {
        let mut map = WireMap::new();
        let mut stack: Vec<RevisionId> = roots.iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if map.contains_key(&id) || state.is_resolved(id) || !self.is_live(id) {
                continue;
            }
            if state.is_fragment(id) {
                if let Some(host) = self.attached.get(&id) {
                    stack.push(*host);
                }
                continue;
            }
            let Some(revision) = state.revision(id) else {
                continue;
            };

            let fragments: Vec<(RevisionId, &Arc<Revision>)> = self
                .attached
                .iter()
                .filter(|(_, host)| **host == id)
                .filter_map(|(fragment, _)| state.revision(*fragment).map(|r| (*fragment, r)))
                .collect();

            let mut requirements: Vec<Arc<Requirement>> = revision
                .requirements()
                .iter()
                .filter(|r| !r.is_dynamic())
                .cloned()
                .collect();
            for (_, fragment) in &fragments {
                requirements.extend(
                    fragment
                        .requirements()
                        .iter()
                        .filter(|r| !r.is_dynamic() && r.namespace != namespace::HOST)
                        .cloned(),
                );
            }

            let mut wires = Vec::new();
            for requirement in requirements {
                let Some(capability) = self.first_valid(state, &requirement) else {
                    continue;
                };
                let Some(provider) = self.provider_of(state, &capability) else {
                    continue;
                };
                if provider == id {
                    continue;
                }
                if !state.is_resolved(provider) {
                    stack.push(provider);
                }
                wires.push(Wire {
                    requirer: id,
                    requirement,
                    provider,
                    capability,
                });
            }
            map.insert(id, wires);

            for (fragment_id, fragment) in fragments {
                let Some(host_requirement) = fragment.host_requirement() else {
                    continue;
                };
                let host_capability = self
                    .providers
                    .get(&host_requirement.id)
                    .and_then(|caps| caps.iter().find(|c| c.revision() == id))
                    .cloned();
                if let Some(capability) = host_capability {
                    map.insert(
                        fragment_id,
                        vec![Wire {
                            requirer: fragment_id,
                            requirement: host_requirement.clone(),
                            provider: id,
                            capability,
                        }],
                    );
                }
            }
        }
        map
    }
}

pub(super) fn describe(state: &ResolverState, id: RevisionId) -> String {
    state
        .revision(id)
        .map(|r| r.to_ref().to_string())
        .unwrap_or_else(|| format!("revision {}", id))
}
