//! Installed modules.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use wirebox_protocols::{ModuleDescriptor, ModuleId, ModuleState, ParseError, RevisionId, Version};

use crate::revision::Revision;
use crate::wiring::Wiring;

#[derive(Debug)]
struct Revisions {
    current: Arc<Revision>,
    /// Older revisions still wired by other modules, oldest first.
    pending_removal: Vec<Arc<Revision>>,
    next_seq: u32,
}

/// A module installed from one location.
///
/// State changes go through [`LockManager::set_state`](crate::lock::LockManager::set_state)
/// so lock waiters observe them.
#[derive(Debug)]
pub struct Module {
    id: ModuleId,
    location: String,
    state: AtomicU8,
    persistently_active: AtomicBool,
    start_level: AtomicU32,
    revisions: RwLock<Revisions>,
    last_modified: RwLock<DateTime<Utc>>,
}

impl Module {
    pub fn new(
        id: ModuleId,
        location: impl Into<String>,
        descriptor: ModuleDescriptor,
        default_start_level: u32,
    ) -> Result<Self, ParseError> {
        let start_level = descriptor.start_level.unwrap_or(default_start_level);
        let revision = Revision::from_descriptor(RevisionId::new(id, 0), descriptor)?;
        Ok(Self {
            id,
            location: location.into(),
            state: AtomicU8::new(ModuleState::Installed as u8),
            persistently_active: AtomicBool::new(false),
            start_level: AtomicU32::new(start_level),
            revisions: RwLock::new(Revisions {
                current: Arc::new(revision),
                pending_removal: Vec::new(),
                next_seq: 1,
            }),
            last_modified: RwLock::new(Utc::now()),
        })
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn state(&self) -> ModuleState {
        ModuleState::from(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn store_state(&self, state: ModuleState) {
        self.state.store(state as u8, Ordering::SeqCst);
        *self.last_modified.write() = Utc::now();
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        *self.last_modified.read()
    }

    pub fn current_revision(&self) -> Arc<Revision> {
        self.revisions.read().current.clone()
    }

    /// Every revision, current first.
    pub fn revisions(&self) -> Vec<Arc<Revision>> {
        let revisions = self.revisions.read();
        let mut all = vec![revisions.current.clone()];
        all.extend(revisions.pending_removal.iter().rev().cloned());
        all
    }

    pub fn is_removal_pending(&self) -> bool {
        !self.revisions.read().pending_removal.is_empty()
    }

    pub fn symbolic_name(&self) -> String {
        self.current_revision().symbolic_name().to_string()
    }

    pub fn version(&self) -> Version {
        self.current_revision().version().clone()
    }

    pub fn is_fragment(&self) -> bool {
        self.current_revision().is_fragment()
    }

    /// The current wiring. Absent while INSTALLED or UNINSTALLED.
    pub fn wiring(&self) -> Option<Arc<Wiring>> {
        match self.state() {
            ModuleState::Installed | ModuleState::Uninstalled => None,
            _ => self.current_revision().wiring(),
        }
    }

    pub fn start_level(&self) -> u32 {
        self.start_level.load(Ordering::SeqCst)
    }

    pub(crate) fn store_start_level(&self, level: u32) {
        self.start_level.store(level, Ordering::SeqCst);
    }

    pub fn is_persistently_active(&self) -> bool {
        self.persistently_active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_persistently_active(&self, active: bool) {
        self.persistently_active.store(active, Ordering::SeqCst);
    }

    /// Make a new revision current; the previous one becomes pending removal.
    pub(crate) fn revise(&self, descriptor: ModuleDescriptor) -> Result<Arc<Revision>, ParseError> {
        let mut revisions = self.revisions.write();
        let id = RevisionId::new(self.id, revisions.next_seq);
        let revision = Arc::new(Revision::from_descriptor(id, descriptor)?);
        revisions.next_seq += 1;
        let previous = std::mem::replace(&mut revisions.current, revision.clone());
        revisions.pending_removal.push(previous);
        Ok(revision)
    }

    /// Undo the last [`revise`](Self::revise), returning the discarded revision.
    pub(crate) fn rollback_revision(&self) -> Option<Arc<Revision>> {
        let mut revisions = self.revisions.write();
        let previous = revisions.pending_removal.pop()?;
        Some(std::mem::replace(&mut revisions.current, previous))
    }

    /// Drop every revision but the current one, returning the dropped ones.
    pub(crate) fn purge_old_revisions(&self) -> Vec<Arc<Revision>> {
        std::mem::take(&mut self.revisions.write().pending_removal)
    }
}
