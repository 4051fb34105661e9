//! # Boot Plugin Redis
//!
//! Startup connector for Redis-compatible stores. At load time it reads the
//! `boot.redis.*` configuration, builds a client for one of three topologies,
//! verifies it with `PING` and publishes the handle.
//!
//! ## Topologies
//!
//! - **single**: pooled connection to one node ([deadpool_redis])
//! - **cluster**: cluster client; every primary and replica is pinged
//! - **sentinel**: master resolved through sentinels
//!
//! ## Example
//!
//! ```rust,no_run
//! use boot_plugin::{MapSource, PluginRegistry};
//! use boot_plugin_redis::{register, Slot};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = MapSource::new()
//!         .with("boot.redis.type", "single")
//!         .with("boot.redis.address", "localhost:6379");
//!
//!     let mut registry = PluginRegistry::new();
//!     let redis = register(&mut registry, Arc::new(source))?;
//!     registry.load_all().await?;
//!
//!     let handle = redis.handle().expect("loaded");
//!     assert_eq!(handle.slot(), Slot::Client);
//!     let mut conn = handle.connection().await?;
//!     let _: () = redis::cmd("SET").arg("k").arg("v").query_async(&mut conn).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connect;
pub mod error;
pub mod handle;
pub mod plugin;
pub mod probe;

pub use config::{NodeAuth, RedisDeployment, Topology};
pub use connect::{build_handle, connect};
pub use error::{ConnectorError, ConnectorResult};
pub use handle::{ClusterHandle, RedisConnection, RedisHandle, SentinelConnection, SentinelHandle, Slot};
pub use plugin::{PLUGIN_NAME, RedisPlugin, register};
