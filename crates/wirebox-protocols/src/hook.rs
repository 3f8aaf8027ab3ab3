//! Resolver hook protocol.
//!
//! A hook factory is asked for a fresh [`ResolverHook`] at the start of every
//! resolution session. Hooks may only narrow what the resolver considers:
//! they receive [`Shrinkable`] views that support removal but not insertion.

use std::sync::Arc;

use crate::capability::{Capability, Requirement};
use crate::error::BoxError;
use crate::types::RevisionRef;

/// Registered source of resolver hooks.
pub trait ResolverHookFactory: Send + Sync {
    /// Unique name used for registration and error reporting.
    fn name(&self) -> &str;

    /// Open a hook for one session. `triggers` are the revisions whose
    /// resolution was requested.
    fn begin(&self, triggers: &[RevisionRef]) -> Result<Box<dyn ResolverHook>, BoxError>;

    /// Whether the service backing this factory is still available. A factory
    /// that turns invalid mid-session fails the whole resolve.
    fn is_valid(&self) -> bool {
        true
    }
}

/// Per-session hook instance.
pub trait ResolverHook: Send {
    /// Remove revisions that must not be resolved in this session.
    fn filter_resolvable(&mut self, _candidates: &mut Shrinkable<'_, RevisionRef>) -> Result<(), BoxError> {
        Ok(())
    }

    /// Remove capabilities that must not satisfy `requirement`.
    fn filter_matches(
        &mut self,
        _requirement: &Requirement,
        _candidates: &mut Shrinkable<'_, Arc<Capability>>,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called exactly once when the session ends, successful or not.
    fn end(&mut self) {}
}

/// A view over a collection that can only lose elements.
pub struct Shrinkable<'a, T> {
    items: &'a mut Vec<T>,
}

impl<'a, T> Shrinkable<'a, T> {
    pub fn new(items: &'a mut Vec<T>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn retain<F: FnMut(&T) -> bool>(&mut self, keep: F) {
        self.items.retain(keep);
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
