//! Capability index over every known revision.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use wirebox_protocols::{Capability, CapabilityId, Requirement, RevisionId, namespace};

use crate::capability_set::CapabilitySet;
use crate::revision::Revision;

/// Decides whether a capability may satisfy a requirement at all.
pub type AdmissiblePredicate = Arc<dyn Fn(&Requirement, &Capability) -> bool + Send + Sync>;

/// Revisions and their capabilities as seen by the resolver.
///
/// Unresolved revisions contribute their declared capabilities, resolved
/// hosts their effective wiring capabilities, resolved fragments nothing.
pub struct ResolverState {
    revisions: BTreeMap<RevisionId, Arc<Revision>>,
    fragments: BTreeSet<RevisionId>,
    sets: BTreeMap<String, CapabilitySet>,
    indexed: HashMap<RevisionId, Vec<CapabilityId>>,
    extra_index_attributes: HashMap<String, Vec<String>>,
    execution_environments: Vec<String>,
    admissible: Option<AdmissiblePredicate>,
}

impl fmt::Debug for ResolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverState")
            .field("revisions", &self.revisions.keys().collect::<Vec<_>>())
            .field("fragments", &self.fragments)
            .field("namespaces", &self.sets.keys().collect::<Vec<_>>())
            .field("execution_environments", &self.execution_environments)
            .finish()
    }
}

impl Default for ResolverState {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolverState {
    pub fn new() -> Self {
        Self {
            revisions: BTreeMap::new(),
            fragments: BTreeSet::new(),
            sets: BTreeMap::new(),
            indexed: HashMap::new(),
            extra_index_attributes: HashMap::new(),
            execution_environments: Vec::new(),
            admissible: None,
        }
    }

    /// Index `namespace` by these attributes in addition to the attribute
    /// named after the namespace itself.
    pub fn with_index_attributes(mut self, ns: impl Into<String>, attributes: Vec<String>) -> Self {
        self.extra_index_attributes.insert(ns.into(), attributes);
        self
    }

    pub fn with_execution_environments(mut self, environments: Vec<String>) -> Self {
        self.execution_environments = environments;
        self
    }

    pub fn with_admissible(mut self, predicate: AdmissiblePredicate) -> Self {
        self.admissible = Some(predicate);
        self
    }

    /// Index `revision`, replacing whatever was indexed for it before.
    pub fn add_revision(&mut self, revision: Arc<Revision>) {
        let id = revision.id();
        self.unindex(id);

        if revision.is_fragment() {
            self.fragments.insert(id);
        }

        let capabilities: Vec<Arc<Capability>> = match revision.wiring() {
            Some(_) if revision.is_fragment() => Vec::new(),
            Some(wiring) => wiring.capabilities().to_vec(),
            None => revision.capabilities().to_vec(),
        };

        let mut ids = Vec::with_capacity(capabilities.len());
        for capability in capabilities {
            ids.push(capability.id);
            self.set_for(&capability.namespace).add(capability);
        }
        self.indexed.insert(id, ids);
        self.revisions.insert(id, revision);
    }

    pub fn remove_revision(&mut self, id: RevisionId) {
        self.unindex(id);
        self.fragments.remove(&id);
        self.revisions.remove(&id);
    }

    fn unindex(&mut self, id: RevisionId) {
        let Some(ids) = self.indexed.remove(&id) else {
            return;
        };
        for cap_id in ids {
            for set in self.sets.values_mut() {
                if set.remove(cap_id).is_some() {
                    break;
                }
            }
        }
    }

    fn set_for(&mut self, ns: &str) -> &mut CapabilitySet {
        let extras = self.extra_index_attributes.get(ns).cloned().unwrap_or_default();
        self.sets.entry(ns.to_string()).or_insert_with(|| {
            let mut attributes = vec![ns.to_string()];
            attributes.extend(extras);
            CapabilitySet::new(attributes)
        })
    }

    pub fn revision(&self, id: RevisionId) -> Option<&Arc<Revision>> {
        self.revisions.get(&id)
    }

    pub fn contains(&self, id: RevisionId) -> bool {
        self.revisions.contains_key(&id)
    }

    pub fn is_resolved(&self, id: RevisionId) -> bool {
        self.revisions.get(&id).is_some_and(|r| r.is_resolved())
    }

    pub fn is_fragment(&self, id: RevisionId) -> bool {
        self.fragments.contains(&id)
    }

    pub fn fragments(&self) -> impl Iterator<Item = &Arc<Revision>> {
        self.fragments.iter().filter_map(|id| self.revisions.get(id))
    }

    pub fn revisions(&self) -> impl Iterator<Item = &Arc<Revision>> {
        self.revisions.values()
    }

    pub fn unresolved_revisions(&self) -> impl Iterator<Item = &Arc<Revision>> {
        self.revisions.values().filter(|r| !r.is_resolved())
    }

    /// Host wiring owner for a resolved fragment, the revision itself otherwise.
    pub fn resolved_host_of(&self, id: RevisionId) -> RevisionId {
        match self.revisions.get(&id) {
            Some(revision) if revision.is_fragment() => revision
                .wiring()
                .map(|wiring| wiring.revision())
                .unwrap_or(id),
            _ => id,
        }
    }

    /// Capabilities able to satisfy `requirement`, best candidate first.
    pub fn candidates(&self, requirement: &Requirement, obey_mandatory: bool) -> Vec<Arc<Capability>> {
        let Some(set) = self.sets.get(&requirement.namespace) else {
            return Vec::new();
        };
        let mut found = set.matches(requirement.filter.as_ref(), obey_mandatory);

        found.retain(|capability| {
            if capability.namespace == namespace::HOST && self.is_resolved(capability.revision()) {
                return false;
            }
            self.admissible
                .as_ref()
                .is_none_or(|admissible| admissible(requirement, capability.as_ref()))
        });

        found.sort_by(|a, b| self.compare(a, b));
        found
    }

    /// Resolved providers first, then higher version, then lower module id.
    fn compare(&self, a: &Capability, b: &Capability) -> Ordering {
        let a_resolved = self.is_resolved(a.revision());
        let b_resolved = self.is_resolved(b.revision());
        b_resolved
            .cmp(&a_resolved)
            .then_with(|| b.version().cmp(&a.version()))
            .then_with(|| a.revision().module.cmp(&b.revision().module))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Drop exports of `id` that its wiring imports from another provider.
    pub fn remove_substituted_capabilities(&mut self, id: RevisionId) {
        let Some(wiring) = self.revisions.get(&id).and_then(|r| r.wiring()) else {
            return;
        };
        let substituted: Vec<CapabilityId> = wiring
            .capabilities_in(namespace::PACKAGE)
            .filter(|capability| {
                capability
                    .name()
                    .and_then(|name| wiring.import_source(name))
                    .is_some_and(|provider| provider != id)
            })
            .map(|capability| capability.id)
            .collect();

        let Some(set) = self.sets.get_mut(namespace::PACKAGE) else {
            return;
        };
        for cap_id in substituted {
            if set.remove(cap_id).is_some() {
                debug!(revision = %id, capability = %cap_id, "export substituted by import");
                if let Some(ids) = self.indexed.get_mut(&id) {
                    ids.retain(|indexed| *indexed != cap_id);
                }
            }
        }
    }

    /// Whether `id` can run in one of the configured execution environments.
    pub fn check_execution_environment(&self, id: RevisionId) -> Result<(), String> {
        let Some(revision) = self.revisions.get(&id) else {
            return Ok(());
        };
        let required = &revision.descriptor().execution_environments;
        if self.execution_environments.is_empty() || required.is_empty() {
            return Ok(());
        }
        if required.iter().any(|env| self.execution_environments.contains(env)) {
            Ok(())
        } else {
            Err(format!(
                "Unresolved requirement: execution environment {} is not one of {}",
                required.join(", "),
                self.execution_environments.join(", ")
            ))
        }
    }

    /// Indexed capability ids per namespace.
    pub fn indexed_capabilities(&self) -> BTreeMap<String, BTreeSet<CapabilityId>> {
        self.sets
            .iter()
            .map(|(ns, set)| (ns.clone(), set.ids()))
            .collect()
    }
}
