//! # Boot Plugin
//!
//! Host-side contract for plugins that run once at process startup.
//!
//! - **[Plugin]**: the `enabled` / `order` / `load` lifecycle a plugin implements
//! - **[PluginRegistry]**: registers plugins by name and loads them in order
//! - **[ConfigSource]**: string-keyed configuration with typed lookups
//!   ([MapSource], [EnvSource], [Layered])

pub mod config;
pub mod error;
pub mod plugin;
pub mod registry;

pub use config::{ConfigError, ConfigSource, ConfigSourceExt, EnvSource, Layered, MapSource};
pub use error::{BoxError, PluginError, PluginResult};
pub use plugin::Plugin;
pub use registry::PluginRegistry;
