//! One resolve's view of the registered hooks.

use std::sync::Arc;

use tracing::debug;

use wirebox_protocols::{
    Capability, HookError, Requirement, ResolverHook, ResolverHookFactory, RevisionRef, Shrinkable,
};

/// Hooks opened for a single resolve.
///
/// Every opened hook sees `end` exactly once, on [`end`](Self::end) or on drop.
pub struct HookSession {
    hooks: Vec<(Arc<dyn ResolverHookFactory>, Box<dyn ResolverHook>)>,
    ended: bool,
}

impl HookSession {
    /// A session with no hooks.
    pub fn empty() -> Self {
        Self {
            hooks: Vec::new(),
            ended: false,
        }
    }

    /// Open a hook from each factory. If any `begin` fails, the hooks opened
    /// so far are ended and the error is returned.
    pub fn begin(
        factories: Vec<Arc<dyn ResolverHookFactory>>,
        triggers: &[RevisionRef],
    ) -> Result<Self, HookError> {
        let mut session = Self::empty();
        for factory in factories {
            let hook = factory.begin(triggers).map_err(|source| HookError::Rejected {
                hook: factory.name().to_string(),
                source,
            })?;
            debug!(hook = factory.name(), "resolver hook opened");
            session.hooks.push((factory, hook));
        }
        Ok(session)
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Let every hook shrink the set of revisions allowed to resolve.
    pub fn filter_resolvable(&mut self, candidates: &mut Vec<RevisionRef>) -> Result<(), HookError> {
        for (factory, hook) in &mut self.hooks {
            hook.filter_resolvable(&mut Shrinkable::new(candidates))
                .map_err(|source| HookError::Rejected {
                    hook: factory.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Let every hook shrink the candidates of one requirement.
    pub fn filter_matches(
        &mut self,
        requirement: &Requirement,
        candidates: &mut Vec<Arc<Capability>>,
    ) -> Result<(), HookError> {
        for (factory, hook) in &mut self.hooks {
            hook.filter_matches(requirement, &mut Shrinkable::new(candidates))
                .map_err(|source| HookError::Rejected {
                    hook: factory.name().to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// End every hook, then fail if any factory went away mid-session.
    pub fn end(mut self) -> Result<(), HookError> {
        self.end_hooks();
        match self.hooks.iter().find(|(factory, _)| !factory.is_valid()) {
            Some((factory, _)) => Err(HookError::Unregistered(factory.name().to_string())),
            None => Ok(()),
        }
    }

    fn end_hooks(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        for (_, hook) in &mut self.hooks {
            hook.end();
        }
    }
}

impl Drop for HookSession {
    fn drop(&mut self) {
        self.end_hooks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use wirebox_protocols::{BoxError, ModuleId, RevisionId, Version};

    #[derive(Default)]
    struct Recorder {
        ended: AtomicUsize,
        invalid: AtomicBool,
        fail_begin: bool,
    }

    struct RecordingHook(Arc<Recorder>);

    impl ResolverHook for RecordingHook {
        fn filter_resolvable(&mut self, candidates: &mut Shrinkable<'_, RevisionRef>) -> Result<(), BoxError> {
            candidates.retain(|r| r.symbolic_name != "vetoed");
            Ok(())
        }

        fn end(&mut self) {
            self.0.ended.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Factory(&'static str, Arc<Recorder>);

    impl ResolverHookFactory for Factory {
        fn name(&self) -> &str {
            self.0
        }

        fn begin(&self, _triggers: &[RevisionRef]) -> Result<Box<dyn ResolverHook>, BoxError> {
            if self.1.fail_begin {
                return Err("begin refused".into());
            }
            Ok(Box::new(RecordingHook(self.1.clone())))
        }

        fn is_valid(&self) -> bool {
            !self.1.invalid.load(Ordering::SeqCst)
        }
    }

    fn revision(name: &str, module: u64) -> RevisionRef {
        RevisionRef {
            id: RevisionId::new(ModuleId(module), 0),
            symbolic_name: name.to_string(),
            version: Version::default(),
            fragment: false,
        }
    }

    #[test]
    fn test_filter_resolvable_and_end() {
        let recorder = Arc::new(Recorder::default());
        let factory: Arc<dyn ResolverHookFactory> = Arc::new(Factory("veto", recorder.clone()));
        let mut session = HookSession::begin(vec![factory], &[]).unwrap();

        let mut candidates = vec![revision("kept", 1), revision("vetoed", 2)];
        session.filter_resolvable(&mut candidates).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].symbolic_name, "kept");

        session.end().unwrap();
        assert_eq!(recorder.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_begin_ends_opened_hooks() {
        let opened = Arc::new(Recorder::default());
        let failing = Arc::new(Recorder {
            fail_begin: true,
            ..Default::default()
        });
        let factories: Vec<Arc<dyn ResolverHookFactory>> = vec![
            Arc::new(Factory("first", opened.clone())),
            Arc::new(Factory("second", failing)),
        ];

        let err = HookSession::begin(factories, &[]).err().unwrap();
        assert!(matches!(err, HookError::Rejected { ref hook, .. } if hook == "second"));
        assert_eq!(opened.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_factory_fails_end() {
        let recorder = Arc::new(Recorder::default());
        let factory: Arc<dyn ResolverHookFactory> = Arc::new(Factory("gone", recorder.clone()));
        let session = HookSession::begin(vec![factory], &[]).unwrap();
        recorder.invalid.store(true, Ordering::SeqCst);

        let err = session.end().unwrap_err();
        assert!(matches!(err, HookError::Unregistered(ref name) if name == "gone"));
        assert_eq!(recorder.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_ends_hooks_once() {
        let recorder = Arc::new(Recorder::default());
        let factory: Arc<dyn ResolverHookFactory> = Arc::new(Factory("once", recorder.clone()));
        drop(HookSession::begin(vec![factory], &[]).unwrap());
        assert_eq!(recorder.ended.load(Ordering::SeqCst), 1);
    }
}
