//! End-to-end tests for the module registry.
//!
//! These drive a [`Framework`] through installs, resolves and lifecycle
//! transitions and check what collaborators observe.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread;
use std::time::Duration;

use proptest::prelude::*;

use wirebox_core::{Framework, FrameworkSettings, HookRegistry, StartOptions, StopOptions};
use wirebox_protocols::{
    Activator, BoxError, Capability, CapabilitySpec, EventSink, FrameworkEvent, FrameworkEventKind, HookError,
    ModuleContent, ModuleDescriptor, ModuleEvent, ModuleEventKind, ModuleId, ModuleState,
    RegistryError, Requirement, ResolveError, ResolverHook, ResolverHookFactory, RevisionRef,
    Shrinkable, VERSION_ATTRIBUTE, Version, namespace,
};

// ============================================================================
// Test Helpers
// ============================================================================

#[derive(Default)]
struct RecordingSink {
    modules: Mutex<Vec<ModuleEvent>>,
    framework: Mutex<Vec<FrameworkEvent>>,
}

impl RecordingSink {
    fn kinds_for(&self, id: ModuleId) -> Vec<ModuleEventKind> {
        self.modules
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.module == id)
            .map(|e| e.kind)
            .collect()
    }

    fn errors(&self) -> usize {
        self.framework
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == FrameworkEventKind::Error)
            .count()
    }
}

impl EventSink for RecordingSink {
    fn module_event(&self, event: &ModuleEvent) {
        self.modules.lock().unwrap().push(event.clone());
    }

    fn framework_event(&self, event: &FrameworkEvent) {
        self.framework.lock().unwrap().push(event.clone());
    }
}

/// Records activation order and refuses modules named in `failing`.
#[derive(Default)]
struct OrderedActivator {
    started: Mutex<Vec<String>>,
    failing: Mutex<Vec<String>>,
}

impl Activator for OrderedActivator {
    fn activate(&self, module: &RevisionRef) -> Result<(), BoxError> {
        if self.failing.lock().unwrap().contains(&module.symbolic_name) {
            return Err(format!("{} refused to start", module.symbolic_name).into());
        }
        self.started.lock().unwrap().push(module.symbolic_name.clone());
        Ok(())
    }

    fn deactivate(&self, _module: &RevisionRef) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Content that fails to attach wirings for one host.
struct FailingContent {
    host: String,
    attached: AtomicUsize,
    detached: AtomicUsize,
}

impl FailingContent {
    fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            attached: AtomicUsize::new(0),
            detached: AtomicUsize::new(0),
        }
    }
}

impl ModuleContent for FailingContent {
    fn attach(&self, host: &RevisionRef, _fragments: &[RevisionRef]) -> Result<(), BoxError> {
        if host.symbolic_name == self.host {
            return Err("content unavailable".into());
        }
        self.attached.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach(&self, _host: &RevisionRef) {
        self.detached.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hook factory hiding every capability offered by `hidden`.
struct HidingHookFactory {
    hidden: String,
    ended: Arc<AtomicUsize>,
    valid: AtomicBool,
}

impl HidingHookFactory {
    fn new(hidden: &str) -> Self {
        Self {
            hidden: hidden.to_string(),
            ended: Arc::new(AtomicUsize::new(0)),
            valid: AtomicBool::new(true),
        }
    }
}

struct HidingHook {
    hidden: String,
    ended: Arc<AtomicUsize>,
}

impl ResolverHook for HidingHook {
    fn filter_matches(
        &mut self,
        _requirement: &Requirement,
        candidates: &mut Shrinkable<'_, Arc<Capability>>,
    ) -> Result<(), BoxError> {
        let hidden = self.hidden.clone();
        candidates.retain(|c| !provided_by(c, &hidden));
        Ok(())
    }

    fn end(&mut self) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }
}

fn provided_by(capability: &Capability, name: &str) -> bool {
    capability
        .attribute("provider")
        .and_then(|v| v.as_str())
        .is_some_and(|provider| provider == name)
}

impl ResolverHookFactory for HidingHookFactory {
    fn name(&self) -> &str {
        "hide-provider"
    }

    fn begin(&self, _triggers: &[RevisionRef]) -> Result<Box<dyn ResolverHook>, BoxError> {
        Ok(Box::new(HidingHook {
            hidden: self.hidden.clone(),
            ended: self.ended.clone(),
        }))
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }
}

type MatchCallback = Arc<dyn Fn(&Requirement) -> Result<(), BoxError> + Send + Sync>;

/// Hook factory that vetoes one symbolic name and runs `on_matches` for
/// every requirement the resolver looks up.
struct CallbackHookFactory {
    veto: Option<String>,
    on_matches: MatchCallback,
}

impl CallbackHookFactory {
    fn vetoing(name: &str) -> Self {
        Self {
            veto: Some(name.to_string()),
            on_matches: Arc::new(|_: &Requirement| -> Result<(), BoxError> { Ok(()) }),
        }
    }

    fn on_matches(callback: MatchCallback) -> Self {
        Self {
            veto: None,
            on_matches: callback,
        }
    }
}

struct CallbackHook {
    veto: Option<String>,
    on_matches: MatchCallback,
}

impl ResolverHook for CallbackHook {
    fn filter_resolvable(&mut self, candidates: &mut Shrinkable<'_, RevisionRef>) -> Result<(), BoxError> {
        if let Some(veto) = &self.veto {
            candidates.retain(|r| &r.symbolic_name != veto);
        }
        Ok(())
    }

    fn filter_matches(
        &mut self,
        requirement: &Requirement,
        _candidates: &mut Shrinkable<'_, Arc<Capability>>,
    ) -> Result<(), BoxError> {
        (self.on_matches)(requirement)
    }
}

impl ResolverHookFactory for CallbackHookFactory {
    fn name(&self) -> &str {
        "callback"
    }

    fn begin(&self, _triggers: &[RevisionRef]) -> Result<Box<dyn ResolverHook>, BoxError> {
        Ok(Box::new(CallbackHook {
            veto: self.veto.clone(),
            on_matches: self.on_matches.clone(),
        }))
    }
}

fn hooked(factory: CallbackHookFactory) -> Arc<Framework> {
    let hooks = Arc::new(HookRegistry::new());
    hooks.register(Arc::new(factory)).unwrap();
    let framework = Framework::builder()
        .settings(settings())
        .hooks(hooks)
        .build()
        .unwrap();
    framework.start().unwrap();
    framework
}

fn settings() -> FrameworkSettings {
    FrameworkSettings {
        start_level_worker: false,
        ..FrameworkSettings::default()
    }
}

fn running() -> (Arc<Framework>, Arc<RecordingSink>, Arc<OrderedActivator>) {
    let sink = Arc::new(RecordingSink::default());
    let activator = Arc::new(OrderedActivator::default());
    let framework = Framework::builder()
        .settings(settings())
        .event_sink(sink.clone())
        .activator(activator.clone())
        .build()
        .unwrap();
    framework.start().unwrap();
    (framework, sink, activator)
}

fn v(major: u32) -> Version {
    Version::new(major, 0, 0)
}

/// Exporter whose package capability names its provider.
fn exporter(name: &str, package: &str) -> ModuleDescriptor {
    ModuleDescriptor::new(name, v(1)).with_capability(
        CapabilitySpec::new(namespace::PACKAGE)
            .with_attribute(namespace::PACKAGE, package)
            .with_attribute(VERSION_ATTRIBUTE, v(1))
            .with_attribute("provider", name),
    )
}

fn importer(name: &str, package: &str) -> ModuleDescriptor {
    ModuleDescriptor::new(name, v(1)).import_package(package)
}

fn assert_wiring_matches_state(framework: &Framework) {
    for module in framework.modules() {
        let has_wiring = module.current_revision().wiring().is_some();
        let resolved = !matches!(module.state(), ModuleState::Installed | ModuleState::Uninstalled);
        assert_eq!(
            has_wiring,
            resolved,
            "module {} is {} but wiring presence is {}",
            module.id(),
            module.state(),
            has_wiring
        );
    }
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_import_wires_to_exporter() {
    let (fw, sink, _) = running();
    let x = fw.install("mem:x", importer("x", "foo")).unwrap();
    let y = fw.install("mem:y", exporter("y", "foo")).unwrap();

    assert!(fw.resolve_modules(Some(&[x.id()])).unwrap());

    let wires = fw.wires(x.id());
    assert_eq!(wires.len(), 1);
    assert_eq!(wires[0].requirer, x.current_revision().id());
    assert_eq!(wires[0].provider, y.current_revision().id());
    assert_eq!(x.state(), ModuleState::Resolved);
    assert_eq!(y.state(), ModuleState::Resolved);
    assert!(sink.kinds_for(x.id()).contains(&ModuleEventKind::Resolved));
    assert_wiring_matches_state(&fw);
}

#[test]
fn test_fragment_contributes_to_host() {
    let (fw, _, _) = running();
    let host = fw.install("mem:h", exporter("h", "host.api")).unwrap();
    let fragment = fw
        .install(
            "mem:f",
            ModuleDescriptor::new("f", v(1))
                .fragment_of("h")
                .export_package("frag.extra", v(1)),
        )
        .unwrap();

    assert!(fw.resolve_modules(Some(&[host.id()])).unwrap());

    let wiring = host.wiring().unwrap();
    assert_eq!(wiring.fragments().len(), 1);
    assert_eq!(wiring.fragments()[0].id, fragment.current_revision().id());
    assert!(wiring.exports_package("host.api"));
    assert!(wiring.exports_package("frag.extra"));
    assert_eq!(fragment.state(), ModuleState::Resolved);

    let consumer = fw.install("mem:c", importer("c", "frag.extra")).unwrap();
    assert!(fw.resolve_modules(Some(&[consumer.id()])).unwrap());
    assert_eq!(fw.wires(consumer.id())[0].provider.module, host.id());
    assert_wiring_matches_state(&fw);
}

#[test]
fn test_hook_filtering_fails_resolution() {
    let factory = Arc::new(HidingHookFactory::new("y"));
    let ended = factory.ended.clone();
    let hooks = Arc::new(HookRegistry::new());
    hooks.register(factory).unwrap();

    let sink = Arc::new(RecordingSink::default());
    let fw = Framework::builder()
        .settings(settings())
        .event_sink(sink.clone())
        .hooks(hooks)
        .build()
        .unwrap();
    fw.start().unwrap();

    let x = fw.install("mem:x", importer("x", "foo")).unwrap();
    fw.install("mem:y", exporter("y", "foo")).unwrap();

    let err = fw.start_module(x.id(), StartOptions::default()).unwrap_err();
    let RegistryError::Resolve(resolve) = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(resolve.unsatisfied().len(), 1);
    assert_eq!(resolve.unsatisfied()[0].requirement.revision, x.current_revision().id());
    assert!(err.to_string().contains("wirebox.package=foo"));
    assert_eq!(ended.load(Ordering::SeqCst), 1);
    assert_eq!(x.state(), ModuleState::Installed);
    assert!(sink.kinds_for(x.id()).contains(&ModuleEventKind::ResolutionFailed));
}

#[test]
fn test_invalid_hook_factory_fails_resolve() {
    let factory = Arc::new(HidingHookFactory::new("nobody"));
    factory.valid.store(false, Ordering::SeqCst);
    let hooks = Arc::new(HookRegistry::new());
    hooks.register(factory).unwrap();

    let fw = Framework::builder()
        .settings(settings())
        .hooks(hooks)
        .build()
        .unwrap();
    let y = fw.install("mem:y", exporter("y", "foo")).unwrap();

    let err = fw.resolve_modules(None).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Resolve(ResolveError::Hook(HookError::Unregistered(_)))
    ));
    assert_eq!(y.state(), ModuleState::Installed);
}

#[test]
fn test_commit_failure_leaves_nothing_resolved() {
    let content = Arc::new(FailingContent::new("y"));
    let fw = Framework::builder()
        .settings(settings())
        .content(content.clone())
        .build()
        .unwrap();
    let x = fw.install("mem:x", importer("x", "foo")).unwrap();
    let y = fw.install("mem:y", exporter("y", "foo")).unwrap();
    let before = fw.indexed_capabilities();

    let err = fw.resolve_modules(Some(&[x.id()])).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Resolve(ResolveError::CommitFailed { .. })
    ));
    assert_eq!(x.state(), ModuleState::Installed);
    assert_eq!(y.state(), ModuleState::Installed);
    assert!(x.current_revision().wiring().is_none());
    assert!(y.current_revision().wiring().is_none());
    assert_eq!(fw.indexed_capabilities(), before);
    assert_eq!(
        content.attached.load(Ordering::SeqCst),
        content.detached.load(Ordering::SeqCst)
    );
    assert_wiring_matches_state(&fw);
}

#[test]
fn test_dynamic_import_appends_wire() {
    let (fw, _, _) = running();
    let dynamic = fw
        .install("mem:d", ModuleDescriptor::new("d", v(1)).dynamic_import("dyn.*"))
        .unwrap();
    let provider = fw.install("mem:e", exporter("e", "dyn.api")).unwrap();
    assert!(fw.resolve_modules(Some(&[dynamic.id()])).unwrap());
    assert!(fw.wires(dynamic.id()).is_empty());
    assert_eq!(provider.state(), ModuleState::Installed);

    let source = fw.resolve_dynamic(dynamic.id(), "dyn.api").unwrap();
    assert_eq!(source, Some(provider.current_revision().id()));
    assert_eq!(provider.state(), ModuleState::Resolved);
    assert_eq!(fw.wires(dynamic.id()).len(), 1);
    assert!(fw.dependents(provider.id()).contains(&dynamic.id()));

    let again = fw.resolve_dynamic(dynamic.id(), "dyn.api").unwrap();
    assert_eq!(again, source);
    assert_eq!(fw.wires(dynamic.id()).len(), 1);

    assert_eq!(fw.resolve_dynamic(dynamic.id(), "other.api").unwrap(), None);
    assert_eq!(fw.resolve_dynamic(dynamic.id(), "dyn.missing").unwrap(), None);
}

#[test]
fn test_hook_veto_of_mandatory_module_is_reported() {
    let fw = hooked(CallbackHookFactory::vetoing("x"));
    let x = fw.install("mem:x", ModuleDescriptor::new("x", v(1))).unwrap();
    let y = fw.install("mem:y", ModuleDescriptor::new("y", v(1))).unwrap();

    let err = fw.resolve_module(x.id()).unwrap_err();
    let RegistryError::Resolve(ResolveError::HookPrevented(module)) = &err else {
        panic!("unexpected error: {err}");
    };
    assert!(module.starts_with("x "));
    assert_eq!(x.state(), ModuleState::Installed);

    // Optional resolution skips the vetoed module and carries on.
    assert!(!fw.resolve_modules(None).unwrap());
    assert_eq!(x.state(), ModuleState::Installed);
    assert_eq!(y.state(), ModuleState::Resolved);
    assert_wiring_matches_state(&fw);
}

#[test]
fn test_failing_filter_matches_aborts_resolve() {
    let fw = hooked(CallbackHookFactory::on_matches(Arc::new(
        |_: &Requirement| -> Result<(), BoxError> { Err("matching is closed".into()) },
    )));
    let x = fw.install("mem:x", importer("x", "foo")).unwrap();
    let y = fw.install("mem:y", exporter("y", "foo")).unwrap();

    let err = fw.resolve_module(x.id()).unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Resolve(ResolveError::Hook(HookError::Rejected { ref hook, .. })) if hook == "callback"
    ));
    assert!(err.to_string().contains("matching is closed"));
    assert_eq!(x.state(), ModuleState::Installed);
    assert_eq!(y.state(), ModuleState::Installed);
    assert_wiring_matches_state(&fw);
}

#[test]
fn test_resolve_from_inside_a_hook_is_rejected() {
    let slot: Arc<OnceLock<Weak<Framework>>> = Arc::default();
    let nested: Arc<Mutex<Vec<bool>>> = Arc::default();
    let callback: MatchCallback = {
        let slot = slot.clone();
        let nested = nested.clone();
        Arc::new(move |_: &Requirement| -> Result<(), BoxError> {
            if let Some(framework) = slot.get().and_then(Weak::upgrade) {
                let result = framework.resolve_modules(None);
                nested.lock().unwrap().push(matches!(
                    result,
                    Err(RegistryError::Resolve(ResolveError::NestedResolve))
                ));
            }
            Ok(())
        })
    };
    let fw = hooked(CallbackHookFactory::on_matches(callback));
    assert!(slot.set(Arc::downgrade(&fw)).is_ok());

    let x = fw.install("mem:x", importer("x", "foo")).unwrap();
    fw.install("mem:y", exporter("y", "foo")).unwrap();

    assert!(fw.resolve_modules(Some(&[x.id()])).unwrap());
    let nested = nested.lock().unwrap();
    assert!(!nested.is_empty());
    assert!(nested.iter().all(|rejected| *rejected));
    assert_eq!(x.state(), ModuleState::Resolved);
    assert_wiring_matches_state(&fw);
}

#[test]
fn test_only_one_singleton_per_name_resolves() {
    let (fw, sink, _) = running();
    let old = fw
        .install("mem:db-1", ModuleDescriptor::new("db", v(1)).singleton())
        .unwrap();
    let new = fw
        .install("mem:db-2", ModuleDescriptor::new("db", v(2)).singleton())
        .unwrap();

    assert!(!fw.resolve_modules(None).unwrap());
    assert_eq!(new.state(), ModuleState::Resolved);
    assert_eq!(old.state(), ModuleState::Installed);

    let err = fw.resolve_module(old.id()).unwrap_err();
    assert!(err.to_string().contains("singleton"));
    assert!(sink.kinds_for(old.id()).contains(&ModuleEventKind::ResolutionFailed));

    // Once the resolved singleton is gone the other one may resolve.
    fw.uninstall(new.id()).unwrap();
    assert!(fw.resolve_modules(Some(&[old.id()])).unwrap());
    assert_eq!(old.state(), ModuleState::Resolved);
    assert_wiring_matches_state(&fw);
}

#[test]
fn test_reexported_packages_follow_module_requirements() {
    let (fw, _, _) = running();
    let base = fw.install("mem:base", exporter("base", "base.api")).unwrap();
    let mid = fw
        .install("mem:mid", exporter("mid", "mid.api").require_module_reexport("base"))
        .unwrap();
    let top = fw
        .install("mem:top", ModuleDescriptor::new("top", v(1)).require_module("mid"))
        .unwrap();
    let plain = fw
        .install("mem:plain", exporter("plain", "plain.api").require_module("base"))
        .unwrap();
    let user = fw
        .install("mem:user", ModuleDescriptor::new("user", v(1)).require_module("plain"))
        .unwrap();

    assert!(fw.resolve_modules(None).unwrap());

    let packages = top.wiring().unwrap().required_packages().clone();
    assert_eq!(packages.len(), 2);
    assert!(packages["mid.api"].contains(&mid.current_revision().id()));
    assert!(packages["base.api"].contains(&base.current_revision().id()));

    let packages = user.wiring().unwrap().required_packages().clone();
    assert!(packages.contains_key("plain.api"));
    assert!(!packages.contains_key("base.api"));
    assert!(plain.wiring().unwrap().has_package_source("base.api"));
    assert_wiring_matches_state(&fw);
}

#[test]
fn test_reexport_cycle_resolves_and_terminates() {
    let (fw, _, _) = running();
    let a = fw
        .install("mem:a", exporter("a", "a.api").require_module_reexport("b"))
        .unwrap();
    let b = fw
        .install("mem:b", exporter("b", "b.api").require_module_reexport("a"))
        .unwrap();
    let c = fw
        .install("mem:c", ModuleDescriptor::new("c", v(1)).require_module("a"))
        .unwrap();

    assert!(fw.resolve_modules(Some(&[c.id()])).unwrap());
    assert_eq!(a.state(), ModuleState::Resolved);
    assert_eq!(b.state(), ModuleState::Resolved);

    let packages = c.wiring().unwrap().required_packages().clone();
    assert_eq!(
        packages.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["a.api", "b.api"]
    );
    assert!(packages["a.api"].contains(&a.current_revision().id()));
    assert!(packages["b.api"].contains(&b.current_revision().id()));
    assert!(a.wiring().unwrap().has_package_source("a.api"));
    assert!(fw.dependents(a.id()).contains(&b.id()));
    assert!(fw.dependents(b.id()).contains(&a.id()));
    assert_wiring_matches_state(&fw);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_deferred_start_follows_level_order() {
    let (fw, _, activator) = running();
    let late = fw
        .install("mem:late", exporter("late", "late.api").with_start_level(5))
        .unwrap();
    fw.start_module(late.id(), StartOptions::default()).unwrap();
    assert_eq!(late.state(), ModuleState::Installed);
    assert!(late.is_persistently_active());

    for (name, level) in [("four", 4), ("two", 2), ("three", 3)] {
        let module = fw
            .install(&format!("mem:{name}"), exporter(name, name).with_start_level(level))
            .unwrap();
        fw.start_module(module.id(), StartOptions::default()).unwrap();
    }
    assert!(activator.started.lock().unwrap().is_empty());

    fw.set_active_start_level(5).unwrap();
    assert_eq!(fw.active_start_level(), 5);
    assert_eq!(late.state(), ModuleState::Active);
    assert_eq!(
        *activator.started.lock().unwrap(),
        vec!["two", "three", "four", "late"]
    );
}

#[test]
fn test_lowering_stops_in_reverse_level_order() {
    let (fw, sink, _) = running();
    fw.set_active_start_level(3).unwrap();
    let mut ids = Vec::new();
    for (name, level) in [("a", 2), ("b", 3), ("c", 2)] {
        let module = fw
            .install(&format!("mem:{name}"), exporter(name, name).with_start_level(level))
            .unwrap();
        fw.start_module(module.id(), StartOptions::default()).unwrap();
        ids.push(module.id());
    }

    fw.set_active_start_level(1).unwrap();

    let stopped: Vec<ModuleId> = sink
        .modules
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.kind == ModuleEventKind::Stopped)
        .map(|e| e.module)
        .collect();
    assert_eq!(stopped, vec![ids[1], ids[0], ids[2]]);
    for id in ids {
        let module = fw.module(id).unwrap();
        assert_eq!(module.state(), ModuleState::Resolved);
        assert!(module.is_persistently_active());
    }
}

#[test]
fn test_failed_start_in_level_change_is_isolated() {
    let (fw, sink, activator) = running();
    activator.failing.lock().unwrap().push("bad".to_string());
    let bad = fw
        .install("mem:bad", exporter("bad", "bad").with_start_level(2))
        .unwrap();
    let good = fw
        .install("mem:good", exporter("good", "good").with_start_level(3))
        .unwrap();
    fw.start_module(bad.id(), StartOptions::default()).unwrap();
    fw.start_module(good.id(), StartOptions::default()).unwrap();

    fw.set_active_start_level(3).unwrap();
    assert_eq!(bad.state(), ModuleState::Resolved);
    assert_eq!(good.state(), ModuleState::Active);
    assert_eq!(sink.errors(), 1);
}

#[test]
fn test_stop_resolved_module_fires_nothing() {
    let (fw, sink, _) = running();
    let module = fw.install("mem:a", exporter("a", "foo")).unwrap();
    fw.resolve_modules(None).unwrap();
    let before = sink.kinds_for(module.id()).len();

    fw.stop_module(module.id(), StopOptions::default()).unwrap();
    fw.stop_module(module.id(), StopOptions::default()).unwrap();
    assert_eq!(sink.kinds_for(module.id()).len(), before);
    assert_eq!(module.state(), ModuleState::Resolved);
}

#[test]
fn test_update_active_module_rollback_keeps_it_active() {
    let (fw, sink, _) = running();
    fw.install("mem:other", exporter("other", "bar")).unwrap();
    let module = fw.install("mem:a", exporter("a", "foo")).unwrap();
    fw.start_module(module.id(), StartOptions::default()).unwrap();
    let revision = module.current_revision().id();

    let err = fw.update(module.id(), exporter("other", "foo")).unwrap_err();
    assert!(matches!(err, RegistryError::Duplicate { .. }));
    assert_eq!(module.current_revision().id(), revision);
    assert_eq!(module.state(), ModuleState::Active);
    assert!(module.is_persistently_active());

    let kinds = sink.kinds_for(module.id());
    assert!(kinds.ends_with(&[
        ModuleEventKind::Stopping,
        ModuleEventKind::Stopped,
        ModuleEventKind::Starting,
        ModuleEventKind::Started
    ]));
    assert!(!kinds.contains(&ModuleEventKind::Updated));
}

#[test]
fn test_update_wired_module_keeps_old_revision_until_refresh() {
    let (fw, _, _) = running();
    let provider = fw.install("mem:p", exporter("p", "foo")).unwrap();
    let consumer = fw.install("mem:c", importer("c", "foo")).unwrap();
    fw.start_module(consumer.id(), StartOptions::default()).unwrap();
    let old = provider.current_revision().id();

    fw.update(provider.id(), exporter("p", "foo").with_start_level(1))
        .unwrap();
    assert!(provider.is_removal_pending());
    assert_eq!(provider.state(), ModuleState::Installed);
    assert_eq!(fw.wires(consumer.id())[0].provider, old);
    assert_wiring_matches_state(&fw);

    fw.refresh(None).unwrap();
    assert!(!provider.is_removal_pending());
    assert_eq!(consumer.state(), ModuleState::Active);
    assert_eq!(fw.wires(consumer.id())[0].provider, provider.current_revision().id());
    assert_wiring_matches_state(&fw);
}

#[test]
fn test_concurrent_start_stop_never_overlap() {
    struct SlowActivator {
        in_flight: AtomicUsize,
        overlapped: AtomicBool,
    }

    impl SlowActivator {
        fn enter(&self) {
            if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_millis(2));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Activator for SlowActivator {
        fn activate(&self, _module: &RevisionRef) -> Result<(), BoxError> {
            self.enter();
            Ok(())
        }

        fn deactivate(&self, _module: &RevisionRef) -> Result<(), BoxError> {
            self.enter();
            Ok(())
        }
    }

    let activator = Arc::new(SlowActivator {
        in_flight: AtomicUsize::new(0),
        overlapped: AtomicBool::new(false),
    });
    let fw = Framework::builder()
        .settings(settings())
        .activator(activator.clone())
        .build()
        .unwrap();
    fw.start().unwrap();
    let id = fw.install("mem:a", exporter("a", "foo")).unwrap().id();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let fw = fw.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    let _ = if i % 2 == 0 {
                        fw.start_module(id, StartOptions::default())
                    } else {
                        fw.stop_module(id, StopOptions::default())
                    };
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(!activator.overlapped.load(Ordering::SeqCst));
    let state = fw.module(id).unwrap().state();
    assert!(matches!(state, ModuleState::Active | ModuleState::Resolved));
    assert_wiring_matches_state(&fw);
}

// ============================================================================
// Determinism
// ============================================================================

fn build_graph(imports: &[Vec<usize>]) -> Arc<Framework> {
    let fw = Framework::builder().settings(settings()).build().unwrap();
    for (i, needed) in imports.iter().enumerate() {
        let mut descriptor = ModuleDescriptor::new(format!("m{i}"), v(1))
            .export_package(&format!("p{}", i % 3), v(1 + i as u32));
        for package in needed {
            descriptor = descriptor.import_package(&format!("p{package}"));
        }
        fw.install(&format!("mem:m{i}"), descriptor).unwrap();
    }
    fw
}

fn wire_keys(fw: &Framework) -> Vec<(u64, Vec<String>)> {
    fw.modules()
        .iter()
        .map(|m| {
            let wires = fw.wires(m.id()).iter().map(|w| w.to_string()).collect();
            (m.id().0, wires)
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_resolution_is_deterministic(
        imports in prop::collection::vec(prop::collection::vec(0usize..4, 0..3), 1..7)
    ) {
        let first = build_graph(&imports);
        let second = build_graph(&imports);
        let first_ok = first.resolve_modules(None).unwrap();
        let second_ok = second.resolve_modules(None).unwrap();

        prop_assert_eq!(first_ok, second_ok);
        prop_assert_eq!(wire_keys(&first), wire_keys(&second));
        assert_wiring_matches_state(&first);
    }
}
