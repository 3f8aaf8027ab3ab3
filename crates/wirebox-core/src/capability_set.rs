//! Attribute-indexed capability storage.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use wirebox_protocols::{AttrValue, Capability, CapabilityId, Filter};

#[cfg(test)]
#[path = "capability_set_tests.rs"]
mod tests;

#[derive(Debug, Default)]
struct AttributeIndex {
    by_value: HashMap<String, BTreeSet<CapabilityId>>,
    /// Capabilities whose value for the attribute is not a string, e.g. a
    /// version or a number. Equality on these needs the typed comparison.
    untyped: BTreeSet<CapabilityId>,
}

/// Capabilities of one namespace, indexed by one or more attribute names.
#[derive(Debug, Default)]
pub struct CapabilitySet {
    capabilities: BTreeMap<CapabilityId, Arc<Capability>>,
    indices: BTreeMap<String, AttributeIndex>,
}

impl CapabilitySet {
    pub fn new<I, S>(index_attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            capabilities: BTreeMap::new(),
            indices: index_attributes
                .into_iter()
                .map(|name| (name.into(), AttributeIndex::default()))
                .collect(),
        }
    }

    pub fn index_attributes(&self) -> impl Iterator<Item = &str> {
        self.indices.keys().map(String::as_str)
    }

    pub fn add(&mut self, capability: Arc<Capability>) {
        let id = capability.id;
        for (name, index) in &mut self.indices {
            let Some(value) = capability.attribute(name) else {
                continue;
            };
            if !fully_indexed(value) {
                index.untyped.insert(id);
            }
            for key in value.index_keys() {
                index.by_value.entry(key.to_string()).or_default().insert(id);
            }
        }
        self.capabilities.insert(id, capability);
    }

    pub fn remove(&mut self, id: CapabilityId) -> Option<Arc<Capability>> {
        let capability = self.capabilities.remove(&id)?;
        for (name, index) in &mut self.indices {
            let Some(value) = capability.attribute(name) else {
                continue;
            };
            index.untyped.remove(&id);
            for key in value.index_keys() {
                if let Some(ids) = index.by_value.get_mut(key) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        index.by_value.remove(key);
                    }
                }
            }
        }
        Some(capability)
    }

    pub fn contains(&self, id: CapabilityId) -> bool {
        self.capabilities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Capability>> {
        self.capabilities.values()
    }

    pub fn ids(&self) -> BTreeSet<CapabilityId> {
        self.capabilities.keys().copied().collect()
    }

    /// Capabilities matching `filter`; `None` matches everything.
    ///
    /// With `obey_mandatory`, a capability only matches if the filter
    /// references every attribute listed in its `mandatory` directive.
    pub fn matches(&self, filter: Option<&Filter>, obey_mandatory: bool) -> Vec<Arc<Capability>> {
        let narrowed = filter.and_then(|f| self.narrow(f));
        let referenced = filter.map(Filter::referenced_attributes).unwrap_or_default();

        let accept = |capability: &Arc<Capability>| {
            if !filter.is_none_or(|f| f.matches(&capability.attributes)) {
                return false;
            }
            !obey_mandatory
                || capability
                    .mandatory_attributes()
                    .iter()
                    .all(|name| referenced.contains(name))
        };

        match narrowed {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.capabilities.get(id))
                .filter(|c| accept(c))
                .cloned()
                .collect(),
            None => self.capabilities.values().filter(|c| accept(c)).cloned().collect(),
        }
    }

    /// Smallest candidate id set implied by the indexed equality terms of
    /// `filter`, or `None` when no indexed term applies.
    fn narrow(&self, filter: &Filter) -> Option<BTreeSet<CapabilityId>> {
        let mut best: Option<BTreeSet<CapabilityId>> = None;
        for (attribute, value) in filter.required_equalities() {
            let Some(index) = self.indices.get(attribute) else {
                continue;
            };
            let mut ids = index.by_value.get(value).cloned().unwrap_or_default();
            ids.extend(index.untyped.iter().copied());
            if best.as_ref().is_none_or(|b| ids.len() < b.len()) {
                best = Some(ids);
            }
        }
        best
    }
}

fn fully_indexed(value: &AttrValue) -> bool {
    match value {
        AttrValue::String(_) => true,
        AttrValue::List(items) => items.iter().all(|v| matches!(v, AttrValue::String(_))),
        _ => false,
    }
}
