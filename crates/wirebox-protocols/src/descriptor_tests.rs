use super::*;
use crate::types::ModuleId;

fn rev() -> RevisionId {
    RevisionId::new(ModuleId(1), 0)
}

#[test]
fn test_descriptor_new() {
    let d = ModuleDescriptor::new("acme.log", Version::new(1, 0, 0));
    assert_eq!(d.symbolic_name, "acme.log");
    assert!(d.capabilities.is_empty());
    assert!(!d.is_fragment());
}

#[test]
fn test_identity_capabilities_are_implicit() {
    let d = ModuleDescriptor::new("acme.log", Version::new(1, 2, 0))
        .export_package("acme.log.api", Version::new(1, 0, 0));
    let caps = d.build_capabilities(rev()).unwrap();

    assert_eq!(caps.len(), 3);
    assert_eq!(caps[0].namespace, namespace::MODULE);
    assert_eq!(caps[0].name(), Some("acme.log"));
    assert_eq!(caps[0].version(), Version::new(1, 2, 0));
    assert_eq!(caps[1].namespace, namespace::HOST);
    assert_eq!(caps[2].name(), Some("acme.log.api"));
    assert_eq!(caps[2].id.index, 2);
}

#[test]
fn test_fragment_has_no_identity_capabilities() {
    let d = ModuleDescriptor::new("acme.log.nl", Version::new(1, 0, 0))
        .fragment_of("acme.log")
        .export_package("acme.log.nl", Version::new(1, 0, 0));
    assert!(d.is_fragment());

    let caps = d.build_capabilities(rev()).unwrap();
    assert_eq!(caps.len(), 1);
    assert_eq!(caps[0].namespace, namespace::PACKAGE);
}

#[test]
fn test_build_requirements_parses_filters() {
    let range = VersionRange::parse("[1.0,2.0)").unwrap();
    let d = ModuleDescriptor::new("acme.app", Version::new(1, 0, 0))
        .import_package_in("acme.log.api", &range)
        .optional_import("acme.metrics")
        .dynamic_import("acme.plugins.*");
    let reqs = d.build_requirements(rev()).unwrap();

    assert_eq!(reqs.len(), 3);
    assert!(reqs[0].filter.is_some());
    assert!(reqs[1].is_optional());
    assert!(reqs[2].is_dynamic());
    assert_eq!(
        reqs[0].filter.as_ref().unwrap().required_equalities(),
        vec![(namespace::PACKAGE, "acme.log.api")]
    );
}

#[test]
fn test_invalid_filter_is_reported() {
    let d = ModuleDescriptor::new("acme.app", Version::default())
        .with_requirement(RequirementSpec::new(namespace::PACKAGE).with_filter("(broken"));
    assert!(d.build_requirements(rev()).is_err());
}

#[test]
fn test_validate_rejects_two_hosts() {
    let d = ModuleDescriptor::new("frag", Version::default())
        .fragment_of("a")
        .fragment_of("b");
    let err = d.validate().unwrap_err();
    assert!(err.to_string().contains("more than one host"));
}

#[test]
fn test_validate_rejects_empty_name_and_level_zero() {
    assert!(ModuleDescriptor::new("", Version::default()).validate().is_err());
    assert!(
        ModuleDescriptor::new("a", Version::default())
            .with_start_level(0)
            .validate()
            .is_err()
    );
}

#[test]
fn test_descriptor_from_toml() {
    let content = r#"
        symbolic_name = "acme.web"
        version = "2.1.0"
        start_level = 3

        [[capability]]
        namespace = "wirebox.package"
        attributes = { "wirebox.package" = "acme.web.api", version = "2.1" }

        [[requirement]]
        namespace = "wirebox.package"
        filter = "(wirebox.package=acme.log.api)"
        directives = { resolution = "optional" }
    "#;
    let d: ModuleDescriptor = toml::from_str(content).unwrap();
    assert_eq!(d.version, Version::new(2, 1, 0));
    assert_eq!(d.start_level, Some(3));

    let caps = d.build_capabilities(rev()).unwrap();
    assert_eq!(caps[2].version(), Version::new(2, 1, 0));
    let reqs = d.build_requirements(rev()).unwrap();
    assert!(reqs[0].is_optional());
}

#[test]
fn test_descriptor_serialization_roundtrip() {
    let d = ModuleDescriptor::new("acme.log", Version::new(1, 0, 0))
        .export_package("acme.log.api", Version::new(1, 0, 0))
        .require_module_reexport("acme.base");
    let json = serde_json::to_string(&d).unwrap();
    let parsed: ModuleDescriptor = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.symbolic_name, "acme.log");
    assert_eq!(parsed.requirements.len(), 1);
}

#[test]
fn test_singleton_and_uses_from_toml() {
    let content = r#"
        symbolic_name = "acme.db"
        singleton = true

        [[capability]]
        namespace = "wirebox.package"
        attributes = { "wirebox.package" = "acme.db.pool" }
        directives = { uses = "acme.db.api, acme.log.api" }
    "#;
    let d: ModuleDescriptor = toml::from_str(content).unwrap();
    assert!(d.singleton);

    let caps = d.build_capabilities(rev()).unwrap();
    assert_eq!(caps[2].uses(), vec!["acme.db.api", "acme.log.api"]);
    assert!(!ModuleDescriptor::new("acme.web", Version::default()).singleton);
}
