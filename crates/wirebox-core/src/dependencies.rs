//! Provider to requirer bookkeeping for committed wires.

use std::collections::BTreeSet;

use dashmap::DashMap;

use wirebox_protocols::{ModuleId, RevisionId};

/// Tracks which revisions depend on which providers.
#[derive(Debug, Default)]
pub struct Dependencies {
    dependents: DashMap<RevisionId, BTreeSet<RevisionId>>,
    providers: DashMap<RevisionId, BTreeSet<RevisionId>>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, provider: RevisionId, requirer: RevisionId) {
        if provider == requirer {
            return;
        }
        self.dependents.entry(provider).or_default().insert(requirer);
        self.providers.entry(requirer).or_default().insert(provider);
    }

    pub fn dependents(&self, provider: RevisionId) -> BTreeSet<RevisionId> {
        self.dependents
            .get(&provider)
            .map(|set| set.clone())
            .unwrap_or_default()
    }

    pub fn has_dependents(&self, provider: RevisionId) -> bool {
        self.dependents.get(&provider).is_some_and(|set| !set.is_empty())
    }

    pub fn providers(&self, requirer: RevisionId) -> BTreeSet<RevisionId> {
        self.providers
            .get(&requirer)
            .map(|set| set.clone())
            .unwrap_or_default()
    }

    /// Forget the wires `requirer` holds on its providers.
    pub fn remove_requirer(&self, requirer: RevisionId) {
        let Some((_, providers)) = self.providers.remove(&requirer) else {
            return;
        };
        for provider in providers {
            let empty = match self.dependents.get_mut(&provider) {
                Some(mut set) => {
                    set.remove(&requirer);
                    set.is_empty()
                }
                None => false,
            };
            if empty {
                self.dependents.remove_if(&provider, |_, set| set.is_empty());
            }
        }
    }

    /// Forget a revision entirely, both as requirer and as provider.
    pub fn remove_revision(&self, revision: RevisionId) {
        self.remove_requirer(revision);
        if let Some((_, requirers)) = self.dependents.remove(&revision) {
            for requirer in requirers {
                if let Some(mut set) = self.providers.get_mut(&requirer) {
                    set.remove(&revision);
                }
            }
        }
    }

    /// Modules reachable from `roots` by following dependents, roots included.
    pub fn dependent_closure(&self, roots: impl IntoIterator<Item = RevisionId>) -> BTreeSet<ModuleId> {
        let mut visited = BTreeSet::new();
        let mut stack: Vec<RevisionId> = roots.into_iter().collect();
        let mut modules = BTreeSet::new();
        while let Some(revision) = stack.pop() {
            if !visited.insert(revision) {
                continue;
            }
            modules.insert(revision.module);
            stack.extend(self.dependents(revision));
        }
        modules
    }
}
