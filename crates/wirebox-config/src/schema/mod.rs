//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

mod schema_modules;

pub use schema_modules::*;

/// Shared default helper used by submodules.
pub(crate) fn default_true() -> bool {
    true
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub framework: FrameworkConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub modules: ModulesConfig,
}

/// Framework configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameworkConfig {
    /// Start level reached when the framework starts.
    #[serde(default = "default_start_level")]
    pub beginning_start_level: u32,

    /// Start level of modules whose descriptor names none.
    #[serde(default = "default_start_level")]
    pub initial_module_start_level: u32,

    /// Execution environments the framework provides.
    #[serde(default)]
    pub execution_environments: Vec<String>,

    /// Serve start level changes on a dedicated thread.
    #[serde(default = "default_true")]
    pub start_level_worker: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            beginning_start_level: default_start_level(),
            initial_module_start_level: default_start_level(),
            execution_environments: Vec::new(),
            start_level_worker: default_true(),
        }
    }
}

fn default_start_level() -> u32 {
    1
}

/// Resolver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Extra capability attributes to index, per namespace.
    #[serde(default)]
    pub index_attributes: HashMap<String, Vec<String>>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    /// Directory for daily rolling log files; console only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file_prefix() -> String {
    "wirebox".to_string()
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
