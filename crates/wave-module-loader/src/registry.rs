//! Name-indexed table of loaded modules

use crate::descriptor::{ModuleDescriptor, ModuleSnapshot};
use std::collections::HashMap;
use std::path::Path;

/// Registry of loaded modules
///
/// Holds one descriptor per name and at most one per source path. The
/// registry does no locking of its own: every call happens while the
/// lifecycle controller holds its lock.
#[derive(Debug, Default)]
pub(crate) struct ModuleRegistry {
    modules: HashMap<String, ModuleDescriptor>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether no loaded module comes from `path`
    pub(crate) fn try_reserve_path(&self, path: &Path) -> bool {
        self.find_by_path(path).is_none()
    }

    /// Insert a descriptor
    ///
    /// Rejects it, handing it back, if its name or path is already taken.
    pub(crate) fn insert(
        &mut self,
        descriptor: ModuleDescriptor,
    ) -> Result<(), ModuleDescriptor> {
        if self.modules.contains_key(&descriptor.name)
            || !self.try_reserve_path(descriptor.path())
        {
            return Err(descriptor);
        }

        self.modules.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Remove a descriptor by name
    pub(crate) fn remove(&mut self, name: &str) -> Option<ModuleDescriptor> {
        self.modules.remove(name)
    }

    /// Find a descriptor by name
    pub(crate) fn find(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(name)
    }

    /// Find the descriptor loaded from `path`
    pub(crate) fn find_by_path(&self, path: &Path) -> Option<&ModuleDescriptor> {
        self.modules.values().find(|d| d.path() == path)
    }

    /// Snapshots of every descriptor, sorted by name
    pub(crate) fn list_all(&self) -> Vec<ModuleSnapshot> {
        let mut snapshots: Vec<_> = self.modules.values().map(|d| d.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Names of every descriptor, sorted
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.modules.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn len(&self) -> usize {
        self.modules.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
