//! Module revisions.

use std::sync::Arc;

use parking_lot::RwLock;

use wirebox_protocols::{
    Capability, ModuleDescriptor, ParseError, Requirement, RevisionId, RevisionRef, Version,
    namespace,
};

use crate::wiring::Wiring;

/// One immutable revision of a module's declared metadata.
///
/// The only mutable part is the attached wiring. A resolved fragment points
/// at its host's wiring.
#[derive(Debug)]
pub struct Revision {
    id: RevisionId,
    descriptor: ModuleDescriptor,
    capabilities: Vec<Arc<Capability>>,
    requirements: Vec<Arc<Requirement>>,
    wiring: RwLock<Option<Arc<Wiring>>>,
}

impl Revision {
    pub fn from_descriptor(id: RevisionId, descriptor: ModuleDescriptor) -> Result<Self, ParseError> {
        let capabilities = descriptor
            .build_capabilities(id)?
            .into_iter()
            .map(Arc::new)
            .collect();
        let requirements = descriptor
            .build_requirements(id)?
            .into_iter()
            .map(Arc::new)
            .collect();
        Ok(Self {
            id,
            descriptor,
            capabilities,
            requirements,
            wiring: RwLock::new(None),
        })
    }

    pub fn id(&self) -> RevisionId {
        self.id
    }

    pub fn symbolic_name(&self) -> &str {
        &self.descriptor.symbolic_name
    }

    pub fn version(&self) -> &Version {
        &self.descriptor.version
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn is_fragment(&self) -> bool {
        self.descriptor.is_fragment()
    }

    pub fn is_singleton(&self) -> bool {
        self.descriptor.singleton
    }

    pub fn capabilities(&self) -> &[Arc<Capability>] {
        &self.capabilities
    }

    pub fn capabilities_in<'a>(&'a self, ns: &'a str) -> impl Iterator<Item = &'a Arc<Capability>> {
        self.capabilities.iter().filter(move |c| c.namespace == ns)
    }

    pub fn requirements(&self) -> &[Arc<Requirement>] {
        &self.requirements
    }

    pub fn host_requirement(&self) -> Option<&Arc<Requirement>> {
        self.requirements.iter().find(|r| r.namespace == namespace::HOST)
    }

    pub fn dynamic_requirements(&self) -> impl Iterator<Item = &Arc<Requirement>> {
        self.requirements.iter().filter(|r| r.is_dynamic())
    }

    pub fn wiring(&self) -> Option<Arc<Wiring>> {
        self.wiring.read().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.wiring.read().is_some()
    }

    pub(crate) fn set_wiring(&self, wiring: Option<Arc<Wiring>>) {
        *self.wiring.write() = wiring;
    }

    pub fn to_ref(&self) -> RevisionRef {
        RevisionRef {
            id: self.id,
            symbolic_name: self.descriptor.symbolic_name.clone(),
            version: self.descriptor.version.clone(),
            fragment: self.is_fragment(),
        }
    }
}
