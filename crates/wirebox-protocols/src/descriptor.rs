//! Module descriptors: the declared identity, capabilities and requirements
//! of one module revision.

use serde::{Deserialize, Serialize};

use crate::capability::{Capability, Requirement, VERSION_ATTRIBUTE, directive, namespace};
use crate::error::ParseError;
use crate::filter::Filter;
use crate::types::{
    AttrValue, Attributes, CapabilityId, Directives, RequirementId, RevisionId, Version,
    VersionRange, normalize_attributes,
};

/// Declared metadata of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub symbolic_name: String,
    #[serde(default)]
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_level: Option<u32>,
    /// At most one singleton revision per symbolic name resolves.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub singleton: bool,
    /// Execution environments this module can run in; any one suffices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub execution_environments: Vec<String>,
    #[serde(default, rename = "capability", skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<CapabilitySpec>,
    #[serde(default, rename = "requirement", skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<RequirementSpec>,
}

/// A capability as written in a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub namespace: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub directives: Directives,
}

impl CapabilitySpec {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            attributes: Attributes::new(),
            directives: Directives::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_directive(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.insert(name.into(), value.into());
        self
    }
}

/// A requirement as written in a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementSpec {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default)]
    pub directives: Directives,
}

impl RequirementSpec {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            filter: None,
            directives: Directives::new(),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_directive(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.insert(name.into(), value.into());
        self
    }

    pub fn optional(self) -> Self {
        self.with_directive(directive::RESOLUTION, directive::RESOLUTION_OPTIONAL)
    }

    pub fn dynamic(self) -> Self {
        self.with_directive(directive::RESOLUTION, directive::RESOLUTION_DYNAMIC)
    }
}

impl ModuleDescriptor {
    pub fn new(symbolic_name: impl Into<String>, version: Version) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version,
            start_level: None,
            singleton: false,
            execution_environments: Vec::new(),
            capabilities: Vec::new(),
            requirements: Vec::new(),
        }
    }

    pub fn with_start_level(mut self, level: u32) -> Self {
        self.start_level = Some(level);
        self
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    pub fn requires_environment(mut self, environment: impl Into<String>) -> Self {
        self.execution_environments.push(environment.into());
        self
    }

    pub fn with_capability(mut self, capability: CapabilitySpec) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_requirement(mut self, requirement: RequirementSpec) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn export_package(self, package: &str, version: Version) -> Self {
        self.with_capability(
            CapabilitySpec::new(namespace::PACKAGE)
                .with_attribute(namespace::PACKAGE, package)
                .with_attribute(VERSION_ATTRIBUTE, version),
        )
    }

    /// Export `package`, constraining importers to share this module's
    /// providers of `uses`.
    pub fn export_package_using(self, package: &str, version: Version, uses: &[&str]) -> Self {
        self.with_capability(
            CapabilitySpec::new(namespace::PACKAGE)
                .with_attribute(namespace::PACKAGE, package)
                .with_attribute(VERSION_ATTRIBUTE, version)
                .with_directive(directive::USES, uses.join(",")),
        )
    }

    pub fn import_package(self, package: &str) -> Self {
        self.with_requirement(package_requirement(package, None))
    }

    pub fn import_package_in(self, package: &str, range: &VersionRange) -> Self {
        self.with_requirement(package_requirement(package, Some(range)))
    }

    pub fn optional_import(self, package: &str) -> Self {
        self.with_requirement(package_requirement(package, None).optional())
    }

    /// Declare a late-bound import; `pattern` may end in `*`.
    pub fn dynamic_import(self, pattern: &str) -> Self {
        self.with_requirement(
            RequirementSpec::new(namespace::PACKAGE)
                .with_filter(format!("({}={})", namespace::PACKAGE, pattern))
                .dynamic(),
        )
    }

    pub fn require_module(self, symbolic_name: &str) -> Self {
        self.with_requirement(module_requirement(symbolic_name))
    }

    pub fn require_module_reexport(self, symbolic_name: &str) -> Self {
        self.with_requirement(
            module_requirement(symbolic_name)
                .with_directive(directive::VISIBILITY, directive::VISIBILITY_REEXPORT),
        )
    }

    /// Make this module a fragment of the named host.
    pub fn fragment_of(self, host: &str) -> Self {
        self.with_requirement(
            RequirementSpec::new(namespace::HOST)
                .with_filter(format!("({}={})", namespace::HOST, host)),
        )
    }

    pub fn is_fragment(&self) -> bool {
        self.requirements.iter().any(|r| r.namespace == namespace::HOST)
    }

    fn invalid(&self, message: impl Into<String>) -> ParseError {
        ParseError::Descriptor {
            module: self.symbolic_name.clone(),
            message: message.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ParseError> {
        if self.symbolic_name.trim().is_empty() {
            return Err(self.invalid("symbolic name is empty"));
        }
        let hosts = self
            .requirements
            .iter()
            .filter(|r| r.namespace == namespace::HOST)
            .count();
        if hosts > 1 {
            return Err(self.invalid("more than one host requirement"));
        }
        if self.is_fragment()
            && self
                .capabilities
                .iter()
                .any(|c| c.namespace == namespace::HOST)
        {
            return Err(self.invalid("a fragment cannot accept fragments"));
        }
        if self.start_level == Some(0) {
            return Err(self.invalid("start level 0 is reserved for the framework"));
        }
        Ok(())
    }

    /// Capabilities of a revision built from this descriptor.
    ///
    /// Non-fragments implicitly provide a module identity capability and a
    /// host capability, both carrying the module version.
    pub fn build_capabilities(&self, revision: RevisionId) -> Result<Vec<Capability>, ParseError> {
        self.validate()?;
        let mut specs = Vec::new();
        if !self.is_fragment() {
            for ns in [namespace::MODULE, namespace::HOST] {
                specs.push(
                    CapabilitySpec::new(ns)
                        .with_attribute(ns, self.symbolic_name.as_str())
                        .with_attribute(VERSION_ATTRIBUTE, self.version.clone()),
                );
            }
        }
        specs.extend(self.capabilities.iter().cloned());

        specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| -> Result<Capability, ParseError> {
                let mut attributes = spec.attributes;
                normalize_attributes(&mut attributes)?;
                Ok(Capability {
                    id: CapabilityId {
                        revision,
                        index: index as u32,
                    },
                    namespace: spec.namespace,
                    attributes,
                    directives: spec.directives,
                })
            })
            .collect()
    }

    pub fn build_requirements(&self, revision: RevisionId) -> Result<Vec<Requirement>, ParseError> {
        self.validate()?;
        self.requirements
            .iter()
            .enumerate()
            .map(|(index, spec)| -> Result<Requirement, ParseError> {
                let filter = spec.filter.as_deref().map(Filter::parse).transpose()?;
                Ok(Requirement {
                    id: RequirementId {
                        revision,
                        index: index as u32,
                    },
                    namespace: spec.namespace.clone(),
                    filter,
                    directives: spec.directives.clone(),
                })
            })
            .collect()
    }
}

fn package_requirement(package: &str, range: Option<&VersionRange>) -> RequirementSpec {
    let name = format!("({}={})", namespace::PACKAGE, package);
    let filter = match range {
        Some(range) => format!("(&{}{})", name, range.to_filter(VERSION_ATTRIBUTE)),
        None => name,
    };
    RequirementSpec::new(namespace::PACKAGE).with_filter(filter)
}

fn module_requirement(symbolic_name: &str) -> RequirementSpec {
    RequirementSpec::new(namespace::MODULE)
        .with_filter(format!("({}={})", namespace::MODULE, symbolic_name))
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
