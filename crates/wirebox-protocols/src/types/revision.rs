//! Read-only summary of a revision handed to external collaborators.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{RevisionId, Version};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionRef {
    pub id: RevisionId,
    pub symbolic_name: String,
    pub version: Version,
    pub fragment: bool,
}

impl fmt::Display for RevisionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.symbolic_name, self.version, self.id)
    }
}
