//! Lookup of package managers by name.

use crate::manager::builtin;
use crate::manager::command::CommandManager;
use crate::manager::{BoxedManager, PackageManager};
use declarative::canonical_manager;
use std::collections::BTreeMap;

/// Package managers keyed by canonical name.
///
/// Lookups accept aliases (`homebrew`, `uvx`, ...). Aliases match in any
/// case; canonical names must match exactly.
#[derive(Default)]
pub struct ManagerRegistry {
    managers: BTreeMap<String, BoxedManager>,
}

impl ManagerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in manager.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for spec in builtin::ALL {
            registry.register(Box::new(CommandManager::new(*spec)));
        }
        registry
    }

    /// Add a manager, replacing any manager with the same canonical name.
    pub fn register(&mut self, manager: BoxedManager) {
        let name = canonical_manager(manager.name());
        if self.managers.insert(name.clone(), manager).is_some() {
            log::debug!("replaced package manager {name}");
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_manager(mut self, manager: BoxedManager) -> Self {
        self.register(manager);
        self
    }

    /// The manager registered under `name` or one of its aliases.
    pub fn get(&self, name: &str) -> Option<&dyn PackageManager> {
        self.managers
            .get(&canonical_manager(name))
            .map(Box::as_ref)
    }

    /// Whether `name` resolves to a registered manager.
    pub fn contains(&self, name: &str) -> bool {
        self.managers.contains_key(&canonical_manager(name))
    }

    /// Canonical names of all registered managers, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.managers.keys().map(String::as_str).collect()
    }

    /// Iterate over registered managers in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn PackageManager> {
        self.managers.values().map(Box::as_ref)
    }

    /// Number of registered managers.
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    /// Whether no managers are registered.
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("managers", &self.names())
            .finish()
    }
}
