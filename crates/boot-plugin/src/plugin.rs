use async_trait::async_trait;

use crate::error::BoxError;

/// Lifecycle contract between a plugin and its host.
///
/// The host reads [`enabled`](Plugin::enabled) and [`order`](Plugin::order)
/// to decide whether and when to call [`load`](Plugin::load). A plugin that
/// returns an error from `load` is treated as a startup failure.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Whether the host should load this plugin at all
    fn enabled(&self) -> bool;

    /// Load ordering hint, lower values load first
    fn order(&self) -> i64;

    /// Perform the plugin's startup work
    async fn load(&self) -> Result<(), BoxError>;
}
