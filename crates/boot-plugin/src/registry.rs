use std::sync::Arc;

use tracing::{debug, error, info};

use crate::error::{PluginError, PluginResult};
use crate::plugin::Plugin;

/// Named collection of plugins loaded once at startup.
///
/// Plugins are registered under a fixed name and loaded by
/// [`load_all`](PluginRegistry::load_all) in ascending `order`; plugins with
/// equal order keep their registration order.
///
/// # Example
///
/// ```rust
/// use boot_plugin::{BoxError, Plugin, PluginRegistry};
/// use std::sync::Arc;
///
/// struct Noop;
///
/// #[async_trait::async_trait]
/// impl Plugin for Noop {
///     fn enabled(&self) -> bool { true }
///     fn order(&self) -> i64 { 0 }
///     async fn load(&self) -> Result<(), BoxError> { Ok(()) }
/// }
///
/// let mut registry = PluginRegistry::new();
/// registry.register("noop", Arc::new(Noop)).expect("unique name");
/// assert!(registry.contains("noop"));
/// ```
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<(String, Arc<dyn Plugin>)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under `name`.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::DuplicatePlugin` if the name is taken.
    pub fn register(&mut self, name: impl Into<String>, plugin: Arc<dyn Plugin>) -> PluginResult<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(PluginError::DuplicatePlugin { name });
        }
        debug!(plugin = %name, "Registered plugin");
        self.plugins.push((name, plugin));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, p)| Arc::clone(p))
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Names of enabled plugins in the order they would be loaded
    pub fn load_order(&self) -> Vec<String> {
        let mut enabled: Vec<(i64, usize, &str)> = self
            .plugins
            .iter()
            .enumerate()
            .filter(|(_, (_, p))| p.enabled())
            .map(|(idx, (name, p))| (p.order(), idx, name.as_str()))
            .collect();
        enabled.sort_by_key(|&(order, idx, _)| (order, idx));
        enabled.into_iter().map(|(_, _, name)| name.to_string()).collect()
    }

    /// Load every enabled plugin, stopping at the first failure.
    ///
    /// Returns the names of the plugins that loaded.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::LoadFailed` naming the plugin whose `load` failed.
    pub async fn load_all(&self) -> PluginResult<Vec<String>> {
        let mut loaded = Vec::new();
        for name in self.load_order() {
            let Some(plugin) = self.get(&name) else {
                continue;
            };
            if let Err(source) = plugin.load().await {
                error!(plugin = %name, error = %source, "Plugin failed to load");
                return Err(PluginError::LoadFailed { name, source });
            }
            info!(plugin = %name, "Plugin loaded");
            loaded.push(name);
        }
        Ok(loaded)
    }
}
