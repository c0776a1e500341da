//! Plugin registry: plugins by name, bindings by check point.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::catalog::CheckpointCatalog;
use crate::error::{Error, Result};
use crate::plugin::{Binding, Detector, Plugin, PluginHandle};

#[derive(Default)]
struct RegistryState {
    plugins: HashMap<String, Arc<Plugin>>,
    /// Bindings per check point, in registration order.
    bindings: HashMap<String, Vec<Binding>>,
    generation: u64,
}

/// Owns every plugin and every binding for one evaluation session.
///
/// Readers (dispatch) and writers (`construct`, `register`, `reset`) are
/// serialized by a single reader/writer lock, so a `reset` is never observed
/// half-done.
pub struct PluginRegistry {
    catalog: Arc<CheckpointCatalog>,
    state: RwLock<RegistryState>,
}

impl PluginRegistry {
    /// Create a registry with an empty binding list for every catalog check point.
    pub fn new(catalog: Arc<CheckpointCatalog>) -> Self {
        let state = RegistryState {
            bindings: empty_bindings(&catalog),
            ..RegistryState::default()
        };
        Self {
            catalog,
            state: RwLock::new(state),
        }
    }

    pub fn catalog(&self) -> &Arc<CheckpointCatalog> {
        &self.catalog
    }

    /// Create a plugin, replacing any plugin already registered under `name`.
    ///
    /// Bindings created by a replaced plugin stay in place and keep pointing at it.
    pub fn construct(&self, name: &str) -> Result<PluginHandle<'_>> {
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "Plugin name must be a non-empty string".to_string(),
            ));
        }

        let plugin = Arc::new(Plugin::new(name));
        let replaced = self
            .write()
            .plugins
            .insert(name.to_string(), Arc::clone(&plugin));

        if replaced.is_some() {
            info!(plugin = name, "Plugin replaced");
        } else {
            debug!(plugin = name, "Plugin constructed");
        }

        Ok(PluginHandle::new(self, plugin))
    }

    pub(crate) fn bind(
        &self,
        plugin: &Arc<Plugin>,
        checkpoint: &str,
        detector: Arc<dyn Detector>,
    ) -> Result<()> {
        if checkpoint.is_empty() {
            return Err(Error::InvalidArgument(
                "Check point name must be a non-empty string".to_string(),
            ));
        }

        if !self.catalog.is_known(checkpoint) {
            warn!(
                plugin = plugin.name(),
                checkpoint,
                "[{}] Unknown check point name '{}'",
                plugin.name(),
                checkpoint
            );
            return Ok(());
        }

        self.write()
            .bindings
            .entry(checkpoint.to_string())
            .or_default()
            .push(Binding::new(detector, Arc::clone(plugin)));

        debug!(plugin = plugin.name(), checkpoint, "Detection function registered");
        Ok(())
    }

    /// Drop every plugin and binding, leaving each catalog check point with an empty list.
    pub fn reset(&self) {
        let mut state = self.write();
        state.plugins.clear();
        state.bindings = empty_bindings(&self.catalog);
        state.generation = state.generation.wrapping_add(1);
        info!(generation = state.generation, "Plugin registry reset");
    }

    /// Number of resets since creation.
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    pub fn plugin(&self, name: &str) -> Option<Arc<Plugin>> {
        self.read().plugins.get(name).cloned()
    }

    /// Registered plugin names, sorted.
    pub fn plugin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().plugins.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of the bindings of `checkpoint`, or `None` when it has no binding list.
    pub fn bindings(&self, checkpoint: &str) -> Option<Vec<Binding>> {
        self.read().bindings.get(checkpoint).cloned()
    }

    pub fn binding_count(&self, checkpoint: &str) -> usize {
        self.read()
            .bindings
            .get(checkpoint)
            .map_or(0, Vec::len)
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new(Arc::new(CheckpointCatalog::default()))
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("PluginRegistry")
            .field("plugins", &state.plugins.len())
            .field("checkpoints", &state.bindings.len())
            .field("generation", &state.generation)
            .finish()
    }
}

fn empty_bindings(catalog: &CheckpointCatalog) -> HashMap<String, Vec<Binding>> {
    catalog
        .iter()
        .map(|name| (name.to_string(), Vec::new()))
        .collect()
}
