//! Capabilities, requirements and the well-known namespaces.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::Filter;
use crate::types::{AttrValue, Attributes, CapabilityId, Directives, RequirementId, RevisionId, Version};

/// Built-in namespaces. Each is indexed by the attribute of the same name.
pub mod namespace {
    /// Exported packages. The package name is the `wirebox.package` attribute.
    pub const PACKAGE: &str = "wirebox.package";
    /// Module identity, used for whole-module requirements.
    pub const MODULE: &str = "wirebox.module";
    /// Host identity, matched by fragments.
    pub const HOST: &str = "wirebox.host";
}

/// Directive names and values understood by the resolver.
pub mod directive {
    pub const RESOLUTION: &str = "resolution";
    pub const RESOLUTION_OPTIONAL: &str = "optional";
    pub const RESOLUTION_DYNAMIC: &str = "dynamic";
    pub const MANDATORY: &str = "mandatory";
    pub const VISIBILITY: &str = "visibility";
    pub const VISIBILITY_REEXPORT: &str = "reexport";
    /// Packages whose provider an importer of this package must share.
    pub const USES: &str = "uses";
}

/// Attribute carrying a capability's version.
pub const VERSION_ATTRIBUTE: &str = "version";

/// How a requirement participates in resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Mandatory,
    Optional,
    Dynamic,
}

/// A fact a revision provides. Immutable once published.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    pub id: CapabilityId,
    pub namespace: String,
    pub attributes: Attributes,
    pub directives: Directives,
}

impl Capability {
    pub fn revision(&self) -> RevisionId {
        self.id.revision
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// The value of the attribute named after the namespace, e.g. the
    /// package name of a package capability.
    pub fn name(&self) -> Option<&str> {
        self.attributes.get(&self.namespace).and_then(AttrValue::as_str)
    }

    pub fn version(&self) -> Version {
        self.attributes
            .get(VERSION_ATTRIBUTE)
            .and_then(AttrValue::as_version)
            .cloned()
            .unwrap_or_default()
    }

    /// Attributes a requirement must mention to match when mandatory
    /// attributes are obeyed.
    pub fn mandatory_attributes(&self) -> Vec<&str> {
        self.list_directive(directive::MANDATORY)
    }

    /// Packages named by the `uses` directive.
    pub fn uses(&self) -> Vec<&str> {
        self.list_directive(directive::USES)
    }

    fn list_directive(&self, name: &str) -> Vec<&str> {
        self.directives
            .get(name)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id.revision, self.namespace)?;
        for (name, value) in &self.attributes {
            write!(f, "; {}={}", name, value)?;
        }
        Ok(())
    }
}

/// A fact a revision needs from some provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub id: RequirementId,
    pub namespace: String,
    /// `None` matches every capability in the namespace.
    pub filter: Option<Filter>,
    pub directives: Directives,
}

impl Requirement {
    pub fn revision(&self) -> RevisionId {
        self.id.revision
    }

    pub fn resolution(&self) -> Resolution {
        match self.directives.get(directive::RESOLUTION).map(String::as_str) {
            Some(directive::RESOLUTION_OPTIONAL) => Resolution::Optional,
            Some(directive::RESOLUTION_DYNAMIC) => Resolution::Dynamic,
            _ => Resolution::Mandatory,
        }
    }

    pub fn is_optional(&self) -> bool {
        self.resolution() == Resolution::Optional
    }

    pub fn is_dynamic(&self) -> bool {
        self.resolution() == Resolution::Dynamic
    }

    /// Whether packages reached through this module requirement are
    /// re-exported to the requirer's own dependents.
    pub fn is_reexport(&self) -> bool {
        self.directives.get(directive::VISIBILITY).map(String::as_str)
            == Some(directive::VISIBILITY_REEXPORT)
    }

    /// Namespace and filter match, ignoring mandatory attributes.
    pub fn matches(&self, capability: &Capability) -> bool {
        self.namespace == capability.namespace
            && self
                .filter
                .as_ref()
                .is_none_or(|filter| filter.matches(&capability.attributes))
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.id.revision, self.namespace)?;
        match &self.filter {
            Some(filter) => write!(f, "; {}", filter),
            None => write!(f, "; *"),
        }
    }
}
