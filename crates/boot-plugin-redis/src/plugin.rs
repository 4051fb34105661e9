use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use boot_plugin::{BoxError, ConfigSource, Plugin, PluginRegistry, PluginResult};
use tracing::{info, warn};

use crate::config::{self, DEFAULT_ENABLED, DEFAULT_ORDER, RedisDeployment};
use crate::connect::connect;
use crate::error::{ConnectorError, ConnectorResult};
use crate::handle::RedisHandle;

/// Name the connector registers under
pub const PLUGIN_NAME: &str = "redis";

/// Startup plugin that connects to redis and publishes the verified handle.
///
/// The handle lives in the plugin itself rather than in a global; consumers
/// receive the `Arc<RedisPlugin>` (or the handle) from the host. `load` runs
/// at most once successfully: a second call is rejected with
/// [`ConnectorError::AlreadyLoaded`] and the first handle stays in place.
pub struct RedisPlugin {
    source: Arc<dyn ConfigSource>,
    slot: OnceLock<RedisHandle>,
}

impl RedisPlugin {
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self {
            source,
            slot: OnceLock::new(),
        }
    }

    /// The published handle, once `load` has succeeded
    pub fn handle(&self) -> Option<&RedisHandle> {
        self.slot.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Read configuration, connect, probe and publish.
    ///
    /// # Errors
    ///
    /// `AlreadyLoaded` if a handle is already published, `InvalidTopology`
    /// for an unknown `type`, otherwise the validation, construction or probe
    /// error. Nothing is published on error.
    pub async fn try_load(&self) -> ConnectorResult<()> {
        if self.is_loaded() {
            return Err(ConnectorError::AlreadyLoaded);
        }

        let deployment = RedisDeployment::from_source(self.source.as_ref())?;
        let handle = connect(&deployment).await?;

        self.slot
            .set(handle)
            .map_err(|_| ConnectorError::AlreadyLoaded)?;
        info!(topology = %deployment.topology(), "Redis handle published");
        Ok(())
    }
}

#[async_trait]
impl Plugin for RedisPlugin {
    fn enabled(&self) -> bool {
        config::enabled(self.source.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, default = DEFAULT_ENABLED, "Ignoring malformed enabled flag");
            DEFAULT_ENABLED
        })
    }

    fn order(&self) -> i64 {
        config::order(self.source.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, default = DEFAULT_ORDER, "Ignoring malformed load order");
            DEFAULT_ORDER
        })
    }

    async fn load(&self) -> Result<(), BoxError> {
        self.try_load().await.map_err(Into::into)
    }
}

/// Register a [`RedisPlugin`] reading from `source` under [`PLUGIN_NAME`].
///
/// # Errors
///
/// Returns `PluginError::DuplicatePlugin` if the name is already taken.
pub fn register(
    registry: &mut PluginRegistry,
    source: Arc<dyn ConfigSource>,
) -> PluginResult<Arc<RedisPlugin>> {
    let plugin = Arc::new(RedisPlugin::new(source));
    registry.register(PLUGIN_NAME, plugin.clone())?;
    Ok(plugin)
}
