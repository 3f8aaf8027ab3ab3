//! Building a framework and its modules from configuration.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use wirebox_config::{Config, ConfigError, ConfigLoader};
use wirebox_core::{Framework, FrameworkSettings};
use wirebox_protocols::{ModuleDescriptor, RegistryError};

/// A descriptor and the location it is installed from.
pub(crate) struct ModuleSource {
    pub location: String,
    pub descriptor: ModuleDescriptor,
}

pub(crate) fn settings(config: &Config) -> FrameworkSettings {
    FrameworkSettings {
        beginning_start_level: config.framework.beginning_start_level,
        initial_module_start_level: config.framework.initial_module_start_level,
        execution_environments: config.framework.execution_environments.clone(),
        index_attributes: config.resolver.index_attributes.clone(),
        start_level_worker: config.framework.start_level_worker,
    }
}

pub(crate) fn build_framework(config: &Config) -> Result<Arc<Framework>, RegistryError> {
    Framework::builder().settings(settings(config)).build()
}

/// Descriptor files from the config followed by those given on the
/// command line.
pub(crate) fn descriptor_files(config: &Config, extra: &[PathBuf]) -> Vec<PathBuf> {
    config
        .modules
        .descriptors
        .iter()
        .chain(extra)
        .map(|path| ConfigLoader::expand_path(path))
        .collect()
}

pub(crate) fn load_modules(config: &Config, extra: &[PathBuf]) -> Result<Vec<ModuleSource>, ConfigError> {
    let mut sources = Vec::new();
    for path in descriptor_files(config, extra) {
        let descriptors = ConfigLoader::load_descriptors(&path)?;
        info!(file = %path.display(), modules = descriptors.len(), "Loaded descriptors");
        for (index, descriptor) in descriptors.into_iter().enumerate() {
            sources.push(ModuleSource {
                location: format!("file:{}#{}", path.display(), index),
                descriptor,
            });
        }
    }
    Ok(sources)
}
