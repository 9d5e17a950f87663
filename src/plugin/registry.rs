//! Plugin registry: `Name -> Plugin` lookup.

use super::{Plugin, PluginError};
use std::collections::HashMap;
use std::sync::Arc;

/// An explicit, caller-constructed registry of plugins.
///
/// No process-wide singleton is used: a `Registry` is built once at startup
/// and handed to a [`crate::workstream::Workstream`] at construction; every
/// Action is bound to a reference into it at submit time.
#[derive(Default, Clone)]
pub struct Registry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    /// Register a plugin, calling its `init()` exactly once before it
    /// becomes visible to lookups.
    ///
    /// Returns an error if a plugin with the same name is already
    /// registered, or if `init()` fails.
    pub fn register(&mut self, mut plugin: impl Plugin + 'static) -> Result<(), PluginError> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(PluginError::permanent(
                3,
                format!("plugin already registered: {name}"),
            ));
        }
        plugin.init()?;
        self.plugins.insert(name, Arc::new(plugin));
        Ok(())
    }

    /// Look up a plugin by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Look up a plugin, converting an absent name into the stable
    /// `plugin not found` permanent error the Action Runner and validation
    /// both rely on.
    pub fn require(&self, name: &str) -> Result<Arc<dyn Plugin>, PluginError> {
        self.get(name).ok_or_else(|| PluginError::plugin_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
