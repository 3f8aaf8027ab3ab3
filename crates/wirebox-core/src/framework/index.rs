//! Copy-on-write module indices.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use wirebox_protocols::ModuleId;

use crate::module::Module;

/// A value replaced wholesale on every write.
///
/// Readers clone the current `Arc` and never observe a partial update.
#[derive(Debug, Default)]
pub(crate) struct Cow<T> {
    current: RwLock<Arc<T>>,
}

impl<T: Clone> Cow<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    pub fn load(&self) -> Arc<T> {
        self.current.read().clone()
    }

    pub fn update(&self, change: impl FnOnce(&mut T)) {
        let mut current = self.current.write();
        let mut next = (**current).clone();
        change(&mut next);
        *current = Arc::new(next);
    }
}

/// Installed modules by id and by location.
#[derive(Debug, Default, Clone)]
pub(crate) struct InstalledIndex {
    by_id: BTreeMap<ModuleId, Arc<Module>>,
    by_location: HashMap<String, Arc<Module>>,
}

impl InstalledIndex {
    pub fn insert(&mut self, module: Arc<Module>) {
        self.by_location
            .insert(module.location().to_string(), module.clone());
        self.by_id.insert(module.id(), module);
    }

    pub fn remove(&mut self, id: ModuleId) -> Option<Arc<Module>> {
        let module = self.by_id.remove(&id)?;
        self.by_location.remove(module.location());
        Some(module)
    }

    pub fn get(&self, id: ModuleId) -> Option<&Arc<Module>> {
        self.by_id.get(&id)
    }

    pub fn by_location(&self, location: &str) -> Option<&Arc<Module>> {
        self.by_location.get(location)
    }

    /// Modules in id order.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.by_id.values()
    }
}
