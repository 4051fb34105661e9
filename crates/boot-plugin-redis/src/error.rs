//! Error types for the redis connector

use boot_plugin::ConfigError;
use redis::RedisError;
use thiserror::Error;

use crate::config::Topology;

/// Result type for connector operations
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Errors that can occur while building or health-checking a redis client
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// `type` is not one of the supported topologies
    #[error("not found redis type:[{value}], please use [single,cluster,sentinel]")]
    InvalidTopology { value: String },

    /// A configuration value could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Configuration parsed but is not usable
    #[error("Invalid redis configuration: {0}")]
    Validation(String),

    /// The client library rejected the connection parameters
    #[error("Failed to create {topology} redis client: {source}")]
    Client {
        topology: Topology,
        #[source]
        source: RedisError,
    },

    /// The connection pool could not be created or handed out a connection
    #[error("Redis {topology} pool error: {message}")]
    Pool { topology: Topology, message: String },

    /// A connection could not be checked out from a published handle
    #[error("Failed to get {topology} redis connection: {source}")]
    Connection {
        topology: Topology,
        #[source]
        source: RedisError,
    },

    /// The liveness probe failed
    #[error("Redis {topology} ping failed: {source}")]
    Probe {
        topology: Topology,
        #[source]
        source: RedisError,
    },

    /// The cluster's shard layout could not be read
    #[error("Redis cluster discovery failed: {0}")]
    ClusterDiscovery(String),

    /// One cluster shard failed its probe
    #[error("Redis cluster shard {shard} ping failed: {source}")]
    ShardProbe {
        shard: String,
        #[source]
        source: RedisError,
    },

    /// `load` was called after a handle had already been published
    #[error("Redis plugin already loaded")]
    AlreadyLoaded,
}

impl ConnectorError {
    /// Topology the failing operation was attempting, when known
    pub fn topology(&self) -> Option<Topology> {
        match self {
            ConnectorError::Client { topology, .. }
            | ConnectorError::Pool { topology, .. }
            | ConnectorError::Connection { topology, .. }
            | ConnectorError::Probe { topology, .. } => Some(*topology),
            ConnectorError::ClusterDiscovery(_) | ConnectorError::ShardProbe { .. } => {
                Some(Topology::Cluster)
            }
            _ => None,
        }
    }

    /// The client library's error, if this failure came from it
    pub fn redis_error(&self) -> Option<&RedisError> {
        match self {
            ConnectorError::Client { source, .. }
            | ConnectorError::Connection { source, .. }
            | ConnectorError::Probe { source, .. }
            | ConnectorError::ShardProbe { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Report a failed checkout as a failed liveness check
    pub(crate) fn into_probe(self) -> Self {
        match self {
            ConnectorError::Connection { topology, source } => {
                ConnectorError::Probe { topology, source }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn refused() -> RedisError {
        RedisError::from(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "connection refused",
        ))
    }

    #[test]
    fn test_connection_error_keeps_topology_and_source() {
        let err = ConnectorError::Connection {
            topology: Topology::Sentinel,
            source: refused(),
        };
        assert_eq!(err.topology(), Some(Topology::Sentinel));
        assert!(err.redis_error().is_some());
        assert!(err.to_string().starts_with("Failed to get sentinel redis connection"));
    }

    #[test]
    fn test_into_probe_only_converts_checkout_failures() {
        let converted = ConnectorError::Connection {
            topology: Topology::Single,
            source: refused(),
        }
        .into_probe();
        assert!(matches!(
            converted,
            ConnectorError::Probe {
                topology: Topology::Single,
                ..
            }
        ));

        let untouched = ConnectorError::Validation("x".into()).into_probe();
        assert!(matches!(untouched, ConnectorError::Validation(_)));
    }
}
