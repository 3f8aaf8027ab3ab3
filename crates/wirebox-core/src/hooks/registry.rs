//! Registered resolver hook factories.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use wirebox_protocols::{RegistryError, ResolverHookFactory};

/// Thread-safe registry of hook factories keyed by name.
///
/// Resolves take a [`snapshot`](Self::snapshot) at session start; changes
/// made afterwards do not affect a running session.
#[derive(Default)]
pub struct HookRegistry {
    factories: DashMap<String, (u64, Arc<dyn ResolverHookFactory>)>,
    next_seq: AtomicU64,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory.
    ///
    /// Returns an error if a factory with the same name is already registered.
    pub fn register(&self, factory: Arc<dyn ResolverHookFactory>) -> Result<(), RegistryError> {
        let name = factory.name().to_string();
        match self.factories.entry(name) {
            Entry::Occupied(entry) => {
                Err(RegistryError::HookAlreadyRegistered(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                entry.insert((seq, factory));
                Ok(())
            }
        }
    }

    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        self.factories
            .remove(name)
            .ok_or_else(|| RegistryError::HookNotFound(name.to_string()))?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ResolverHookFactory>> {
        self.factories.get(name).map(|entry| entry.1.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered factories in registration order.
    pub fn snapshot(&self) -> Vec<Arc<dyn ResolverHookFactory>> {
        let mut entries: Vec<(u64, Arc<dyn ResolverHookFactory>)> = self
            .factories
            .iter()
            .map(|entry| (entry.0, entry.1.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, factory)| factory).collect()
    }

    pub fn list_names(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|factory| factory.name().to_string())
            .collect()
    }
}
