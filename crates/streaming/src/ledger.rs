use std::collections::BTreeMap;

use foundation::{ResourceId, SourceLocation};

/// Actual state: which locations are loaded, and under which resource id.
///
/// An entry exists exactly when a load for that location completed and no
/// unload has been issued since. Only the reconciler writes to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: BTreeMap<SourceLocation, ResourceId>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, location: &SourceLocation) -> Option<&ResourceId> {
        self.entries.get(location)
    }

    pub fn contains(&self, location: &SourceLocation) -> bool {
        self.entries.contains_key(location)
    }

    pub fn locations(&self) -> impl Iterator<Item = &SourceLocation> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SourceLocation, &ResourceId)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn insert(&mut self, location: SourceLocation, id: ResourceId) -> Option<ResourceId> {
        self.entries.insert(location, id)
    }

    pub(crate) fn remove(&mut self, location: &SourceLocation) -> Option<ResourceId> {
        self.entries.remove(location)
    }
}
