//! Configuration loader.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use wirebox_protocols::ModuleDescriptor;

use crate::error::ConfigError;
use crate::schema::{Config, DescriptorFile};

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let content = Self::read(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Load the config at `path`, or at the default location, falling back
    /// to defaults when no file exists there.
    pub fn load_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Config::default()),
            },
        }
    }

    /// `~/.wirebox/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".wirebox").join("config.toml"))
    }

    /// Load and validate the module descriptors in a descriptor file.
    pub fn load_descriptors(path: &Path) -> Result<Vec<ModuleDescriptor>, ConfigError> {
        let content = Self::read(path)?;
        Self::parse_descriptors(&content, &path.display().to_string())
    }

    /// Parse descriptors from a string; `origin` names the source in errors.
    pub fn parse_descriptors(content: &str, origin: &str) -> Result<Vec<ModuleDescriptor>, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let file: DescriptorFile = toml::from_str(&expanded)?;
        for descriptor in &file.modules {
            descriptor
                .validate()
                .map_err(|source| ConfigError::Descriptor {
                    file: origin.to_string(),
                    source,
                })?;
        }
        Ok(file.modules)
    }

    fn read(path: &Path) -> Result<String, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Ok(fs::read_to_string(path)?)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.wirebox/logs`).
    pub fn expand_path(path: &Path) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.framework.beginning_start_level, 1);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
            [framework]
            beginning_start_level = 3
            initial_module_start_level = 2
            execution_environments = ["rust-1.85"]
            start_level_worker = false

            [resolver.index_attributes]
            "wirebox.package" = ["vendor"]

            [logging]
            level = "debug"
            json = true
            directory = "~/.wirebox/logs"

            [modules]
            descriptors = ["modules.toml"]
            autostart = false
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.framework.beginning_start_level, 3);
        assert_eq!(config.framework.initial_module_start_level, 2);
        assert!(!config.framework.start_level_worker);
        assert_eq!(config.resolver.index_attributes.len(), 1);
        assert!(config.logging.json);
        assert_eq!(config.modules.descriptors, vec![PathBuf::from("modules.toml")]);
        assert!(!config.modules.autostart);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[framework]").unwrap();
        writeln!(file, "beginning_start_level = 6").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.framework.beginning_start_level, 6);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_with_explicit_missing_path() {
        let result = ConfigLoader::load_or_default(Some(Path::new("/nonexistent/wirebox.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("framework = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: This test runs in isolation and sets a unique test-only env var
        unsafe {
            std::env::set_var("WIREBOX_TEST_LEVEL", "warn");
        }
        let config = ConfigLoader::load_str("[logging]\nlevel = \"${WIREBOX_TEST_LEVEL}\"").unwrap();
        assert_eq!(config.logging.level, "warn");
        unsafe {
            std::env::remove_var("WIREBOX_TEST_LEVEL");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${WIREBOX_NONEXISTENT_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let expanded = ConfigLoader::expand_path(Path::new("~/logs"));
        assert!(!expanded.starts_with("~"));
        assert!(expanded.ends_with("logs"));
    }

    #[test]
    fn test_expand_path_no_tilde() {
        let path = Path::new("/var/log/wirebox");
        assert_eq!(ConfigLoader::expand_path(path), path);
    }

    #[test]
    fn test_default_path_under_home() {
        if let Some(path) = ConfigLoader::default_path() {
            assert!(path.ends_with(".wirebox/config.toml"));
        }
    }

    #[test]
    fn test_load_descriptors_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [[module]]
            symbolic_name = "acme.log"
            version = "1.0.0"

            [[module]]
            symbolic_name = "acme.app"
            start_level = 2
            "#
        )
        .unwrap();

        let descriptors = ConfigLoader::load_descriptors(file.path()).unwrap();
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[1].start_level, Some(2));
    }

    #[test]
    fn test_invalid_descriptor_rejected() {
        let content = r#"
            [[module]]
            symbolic_name = "acme.bad"
            start_level = 0
        "#;
        let err = ConfigLoader::parse_descriptors(content, "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Descriptor { .. }));
        assert!(err.to_string().contains("inline"));
    }
}
