use super::*;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.framework.beginning_start_level, 1);
    assert_eq!(config.framework.initial_module_start_level, 1);
    assert!(config.framework.start_level_worker);
    assert!(config.resolver.index_attributes.is_empty());
    assert!(config.modules.descriptors.is_empty());
}

#[test]
fn test_logging_config_default() {
    let logging = LoggingConfig::default();
    assert_eq!(logging.level, "info");
    assert!(!logging.json);
    assert!(logging.directory.is_none());
    assert_eq!(logging.file_prefix, "wirebox");
}

#[test]
fn test_modules_config_default() {
    let modules = ModulesConfig::default();
    assert!(modules.autostart);
}

#[test]
fn test_framework_config_partial_toml() {
    let framework: FrameworkConfig = toml::from_str(
        r#"
            beginning_start_level = 4
            execution_environments = ["rust-1.85"]
        "#,
    )
    .unwrap();
    assert_eq!(framework.beginning_start_level, 4);
    assert_eq!(framework.initial_module_start_level, 1);
    assert_eq!(framework.execution_environments, vec!["rust-1.85"]);
    assert!(framework.start_level_worker);
}

#[test]
fn test_resolver_index_attributes() {
    let resolver: ResolverConfig = toml::from_str(
        r#"
            [index_attributes]
            "wirebox.package" = ["vendor"]
        "#,
    )
    .unwrap();
    assert_eq!(resolver.index_attributes["wirebox.package"], vec!["vendor"]);
}

#[test]
fn test_descriptor_file_parses_modules() {
    let file: DescriptorFile = toml::from_str(
        r#"
            [[module]]
            symbolic_name = "acme.log"
            version = "1.2.0"

            [[module.capability]]
            namespace = "wirebox.package"
            attributes = { "wirebox.package" = "acme.log.api" }

            [[module]]
            symbolic_name = "acme.app"

            [[module.requirement]]
            namespace = "wirebox.package"
            filter = "(wirebox.package=acme.log.api)"
        "#,
    )
    .unwrap();
    assert_eq!(file.modules.len(), 2);
    assert_eq!(file.modules[0].symbolic_name, "acme.log");
    assert_eq!(file.modules[0].capabilities.len(), 1);
    assert_eq!(file.modules[1].requirements.len(), 1);
}

#[test]
fn test_config_serialization_roundtrip() {
    let config = Config::default();
    let text = toml::to_string(&config).unwrap();
    let parsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(parsed.logging.level, config.logging.level);
}
