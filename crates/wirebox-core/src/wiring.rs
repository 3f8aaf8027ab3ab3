//! Committed wires and wirings.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use wirebox_protocols::{Capability, Requirement, RevisionId, RevisionRef, namespace};

#[cfg(test)]
#[path = "wiring_tests.rs"]
mod tests;

/// A requirement bound to the capability that satisfies it.
#[derive(Debug, Clone, PartialEq)]
pub struct Wire {
    pub requirer: RevisionId,
    pub requirement: Arc<Requirement>,
    pub provider: RevisionId,
    pub capability: Arc<Capability>,
}

impl Wire {
    /// Tuple identifying this wire for comparisons across resolves.
    pub fn key(&self) -> (RevisionId, u32, RevisionId, u32) {
        (
            self.requirer,
            self.requirement.id.index,
            self.provider,
            self.capability.id.index,
        )
    }

    pub fn is_host_wire(&self) -> bool {
        self.capability.namespace == namespace::HOST
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.requirer, self.provider, self.capability)
    }
}

/// The committed resolution of one host revision.
#[derive(Debug)]
pub struct Wiring {
    revision: RevisionId,
    required: Vec<Wire>,
    fragments: Vec<RevisionRef>,
    capabilities: Vec<Arc<Capability>>,
    imported_packages: BTreeMap<String, RevisionId>,
    required_packages: BTreeMap<String, BTreeSet<RevisionId>>,
    dynamic: RwLock<Vec<Wire>>,
}

impl Wiring {
    /// `capabilities` are the effective capabilities of the host and its
    /// fragments; `required_packages` maps each package visible through
    /// module requirements (including re-exports) to its providers.
    pub fn new(
        revision: RevisionId,
        required: Vec<Wire>,
        fragments: Vec<RevisionRef>,
        capabilities: Vec<Arc<Capability>>,
        required_packages: BTreeMap<String, BTreeSet<RevisionId>>,
    ) -> Self {
        let imported_packages = required
            .iter()
            .filter(|w| w.capability.namespace == namespace::PACKAGE)
            .filter_map(|w| w.capability.name().map(|name| (name.to_string(), w.provider)))
            .collect();
        Self {
            revision,
            required,
            fragments,
            capabilities,
            imported_packages,
            required_packages,
            dynamic: RwLock::new(Vec::new()),
        }
    }

    pub fn revision(&self) -> RevisionId {
        self.revision
    }

    /// Every wire this wiring requires, dynamic wires last.
    pub fn required_wires(&self) -> Vec<Wire> {
        let mut wires = self.required.clone();
        wires.extend(self.dynamic.read().iter().cloned());
        wires
    }

    pub fn fragments(&self) -> &[RevisionRef] {
        &self.fragments
    }

    pub fn capabilities(&self) -> &[Arc<Capability>] {
        &self.capabilities
    }

    pub fn capabilities_in<'a>(&'a self, ns: &'a str) -> impl Iterator<Item = &'a Arc<Capability>> {
        self.capabilities.iter().filter(move |c| c.namespace == ns)
    }

    pub fn exports_package(&self, package: &str) -> bool {
        self.capabilities_in(namespace::PACKAGE)
            .any(|c| c.name() == Some(package))
    }

    pub fn required_packages(&self) -> &BTreeMap<String, BTreeSet<RevisionId>> {
        &self.required_packages
    }

    /// Provider of `package` through an import, static or dynamic.
    pub fn import_source(&self, package: &str) -> Option<RevisionId> {
        if let Some(provider) = self.imported_packages.get(package) {
            return Some(*provider);
        }
        self.dynamic
            .read()
            .iter()
            .find(|w| w.capability.name() == Some(package))
            .map(|w| w.provider)
    }

    /// Whether `package` is already reachable through this wiring.
    pub fn has_package_source(&self, package: &str) -> bool {
        self.import_source(package).is_some() || self.required_packages.contains_key(package)
    }

    pub(crate) fn add_dynamic_wire(&self, wire: Wire) {
        self.dynamic.write().push(wire);
    }
}
