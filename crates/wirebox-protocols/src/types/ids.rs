//! Stable handles for modules, revisions, capabilities and requirements.
//!
//! The registry hands out these small copyable ids instead of references so
//! that snapshots can be shared across threads without borrowing live state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique id of an installed module. Never reused within one framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One revision of a module. `seq` grows by one on every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId {
    pub module: ModuleId,
    pub seq: u32,
}

impl RevisionId {
    pub fn new(module: ModuleId, seq: u32) -> Self {
        Self { module, seq }
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.seq)
    }
}

/// Position of a capability within its revision's declared list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CapabilityId {
    pub revision: RevisionId,
    pub index: u32,
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#c{}", self.revision, self.index)
    }
}

/// Position of a requirement within its revision's declared list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequirementId {
    pub revision: RevisionId,
    pub index: u32,
}

impl RequirementId {
    /// Index reserved for requirements synthesized by the registry itself.
    pub const SYNTHETIC_INDEX: u32 = u32::MAX;

    pub fn synthetic(revision: RevisionId) -> Self {
        Self {
            revision,
            index: Self::SYNTHETIC_INDEX,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.index == Self::SYNTHETIC_INDEX
    }
}

impl fmt::Display for RequirementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#r{}", self.revision, self.index)
    }
}
