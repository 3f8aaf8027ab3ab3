//! Check subcommand: validate configuration and descriptor files.

use std::path::PathBuf;

use wirebox_config::{Config, ConfigLoader, ConfigValidator, ValidationError};

use crate::setup;

pub(crate) fn check(config: &Config, descriptors: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    let mut result = ConfigValidator::validate(config)?;

    let mut loaded = Vec::new();
    for path in setup::descriptor_files(config, descriptors) {
        match ConfigLoader::load_descriptors(&path) {
            Ok(mut found) => loaded.append(&mut found),
            Err(e) => result.add_error(ValidationError::new(path.display().to_string(), e.to_string())),
        }
    }
    let modules = ConfigValidator::validate_descriptors(config, &loaded);
    result.errors.extend(modules.errors);
    result.warnings.extend(modules.warnings);

    for warning in &result.warnings {
        println!("warning: {}", warning);
    }
    for error in &result.errors {
        println!("error: {}", error);
    }

    if !result.is_valid() {
        return Err(format!("{} error(s) found", result.errors.len()).into());
    }
    println!("OK: {} module descriptor(s) checked", loaded.len());
    Ok(())
}
