//! Configuration validation.

use std::collections::HashSet;
use std::fmt;

use wirebox_protocols::ModuleDescriptor;

use crate::error::ConfigError;
use crate::schema::Config;

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_framework(config, &mut result);
        Self::validate_resolver(config, &mut result);
        Self::validate_logging(config, &mut result);
        Self::validate_modules(config, &mut result);

        Ok(result)
    }

    fn validate_framework(config: &Config, result: &mut ValidationResult) {
        let framework = &config.framework;
        if framework.beginning_start_level == 0 {
            result.add_error(ValidationError::new(
                "framework.beginning_start_level",
                "Start level 0 is reserved for a stopped framework",
            ));
        }

        if framework.initial_module_start_level == 0 {
            result.add_error(ValidationError::new(
                "framework.initial_module_start_level",
                "Modules cannot be assigned start level 0",
            ));
        }

        if framework.initial_module_start_level > framework.beginning_start_level {
            result.add_warning(ValidationWarning::new(
                "framework.initial_module_start_level",
                format!(
                    "Modules without a start level ({}) will not start at the beginning start level ({})",
                    framework.initial_module_start_level, framework.beginning_start_level
                ),
            ));
        }

        if framework.execution_environments.iter().any(|e| e.trim().is_empty()) {
            result.add_error(ValidationError::new(
                "framework.execution_environments",
                "Execution environment names cannot be empty",
            ));
        }
    }

    fn validate_resolver(config: &Config, result: &mut ValidationResult) {
        for (namespace, attributes) in &config.resolver.index_attributes {
            let path = format!("resolver.index_attributes.{}", namespace);
            if namespace.trim().is_empty() {
                result.add_error(ValidationError::new(path.clone(), "Namespace cannot be empty"));
            }
            if attributes.is_empty() {
                result.add_warning(ValidationWarning::new(path.clone(), "No attributes listed"));
            }
            if attributes.iter().any(|a| a.trim().is_empty()) {
                result.add_error(ValidationError::new(path, "Attribute names cannot be empty"));
            }
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.to_lowercase();
        // Directive lists are left to the filter parser.
        let is_directive = level.contains('=') || level.contains(',');
        if !is_directive && !LOG_LEVELS.contains(&level.as_str()) {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!(
                    "Unknown log level '{}', valid values: {:?}",
                    config.logging.level, LOG_LEVELS
                ),
            ));
        }

        if config.logging.file_prefix.is_empty() {
            result.add_error(ValidationError::new(
                "logging.file_prefix",
                "Log file prefix cannot be empty",
            ));
        }

        if let Some(directory) = &config.logging.directory {
            if !directory.exists() {
                result.add_warning(ValidationWarning::new(
                    "logging.directory",
                    format!("Log directory does not exist and will be created: {:?}", directory),
                ));
            }
        }
    }

    fn validate_modules(config: &Config, result: &mut ValidationResult) {
        for path in &config.modules.descriptors {
            if !path.exists() {
                result.add_error(ValidationError::new(
                    "modules.descriptors",
                    format!("Descriptor file does not exist: {:?}", path),
                ));
            }
        }
    }

    /// Check a set of descriptors against each other and the framework
    /// configuration before installing them.
    pub fn validate_descriptors(config: &Config, descriptors: &[ModuleDescriptor]) -> ValidationResult {
        let mut result = ValidationResult::default();
        let mut seen = HashSet::new();
        let provided: HashSet<&str> = config
            .framework
            .execution_environments
            .iter()
            .map(String::as_str)
            .collect();

        for (index, descriptor) in descriptors.iter().enumerate() {
            let path = format!("module[{}]", index);

            if let Err(e) = descriptor.validate() {
                result.add_error(ValidationError::new(path.clone(), e.to_string()));
            }

            if !seen.insert((descriptor.symbolic_name.as_str(), descriptor.version.clone())) {
                result.add_error(ValidationError::new(
                    path.clone(),
                    format!(
                        "Duplicate module {} {}",
                        descriptor.symbolic_name, descriptor.version
                    ),
                ));
            }

            let level = descriptor
                .start_level
                .unwrap_or(config.framework.initial_module_start_level);
            if level > config.framework.beginning_start_level {
                result.add_warning(ValidationWarning::new(
                    format!("{}.start_level", path),
                    format!(
                        "{} starts at level {}, above the beginning start level {}",
                        descriptor.symbolic_name, level, config.framework.beginning_start_level
                    ),
                ));
            }

            let unsupported = !provided.is_empty()
                && !descriptor.execution_environments.is_empty()
                && !descriptor
                    .execution_environments
                    .iter()
                    .any(|e| provided.contains(e.as_str()));
            if unsupported {
                result.add_warning(ValidationWarning::new(
                    format!("{}.execution_environments", path),
                    format!(
                        "{} requires {:?}, none of which the framework provides",
                        descriptor.symbolic_name, descriptor.execution_environments
                    ),
                ));
            }
        }

        result
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
