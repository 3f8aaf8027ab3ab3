//! Module descriptor sources.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use wirebox_protocols::ModuleDescriptor;

use super::default_true;

/// Where module descriptors come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModulesConfig {
    /// Descriptor files installed at startup, in order.
    #[serde(default)]
    pub descriptors: Vec<PathBuf>,

    /// Persistently start every installed module.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            descriptors: Vec::new(),
            autostart: default_true(),
        }
    }
}

/// A descriptor file: a list of `[[module]]` tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DescriptorFile {
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleDescriptor>,
}
