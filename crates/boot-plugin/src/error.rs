//! Error types for plugin registration and loading

use thiserror::Error;

/// Boxed error returned by a plugin's `load`
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for registry operations
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors raised by the plugin registry
#[derive(Error, Debug)]
pub enum PluginError {
    /// A plugin with this name is already registered
    #[error("Plugin already registered: {name}")]
    DuplicatePlugin { name: String },

    /// A plugin returned an error from `load`
    #[error("Plugin '{name}' failed to load: {source}")]
    LoadFailed {
        name: String,
        #[source]
        source: BoxError,
    },
}
