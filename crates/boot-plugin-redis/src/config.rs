//! Redis connector configuration
//!
//! Settings are read from a [`ConfigSource`] under three namespaces:
//!
//! - `boot.redis.` - `enabled`, `order`, `type`, `db`, `poolSize`, `address`,
//!   `username`, `password`
//! - `boot.redis.cluster.` - `cluster` (node list), `username`, `password`
//! - `boot.redis.sentinel.` - `masterName`, `address` (sentinel list),
//!   `username`, `password`
//!
//! Sentinel deployments authenticate against the data nodes with the common
//! `boot.redis.username` / `boot.redis.password` and against the sentinels
//! with the sentinel-scoped pair.

use std::fmt;
use std::str::FromStr;

use boot_plugin::{ConfigSource, ConfigSourceExt};

use crate::error::{ConnectorError, ConnectorResult};

pub const CONFIG_PREFIX: &str = "boot.redis.";
pub const CLUSTER_CONFIG_PREFIX: &str = "boot.redis.cluster.";
pub const SENTINEL_CONFIG_PREFIX: &str = "boot.redis.sentinel.";

pub const DEFAULT_ENABLED: bool = true;
pub const DEFAULT_ORDER: i64 = 10;
pub const DEFAULT_TOPOLOGY: Topology = Topology::Single;
pub const DEFAULT_DB: i64 = 0;
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const MAX_POOL_SIZE: usize = 1000;

fn key(prefix: &str, name: &str) -> String {
    format!("{prefix}{name}")
}

/// Redis deployment shape selected by `boot.redis.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Topology {
    /// One node, no sharding or failover
    #[default]
    Single,
    /// Sharded cluster
    Cluster,
    /// Master discovered through sentinels
    Sentinel,
}

impl Topology {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topology::Single => "single",
            Topology::Cluster => "cluster",
            Topology::Sentinel => "sentinel",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topology {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Topology::Single),
            "cluster" => Ok(Topology::Cluster),
            "sentinel" => Ok(Topology::Sentinel),
            other => Err(ConnectorError::InvalidTopology {
                value: other.to_string(),
            }),
        }
    }
}

/// Credentials for one set of servers. Empty strings count as unset.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct NodeAuth {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl NodeAuth {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self {
            username: username.filter(|u| !u.is_empty()),
            password: password.filter(|p| !p.is_empty()),
        }
    }

    fn from_source<S: ConfigSource + ?Sized>(source: &S, prefix: &str) -> Self {
        Self::new(
            source.get_string(&key(prefix, "username")),
            source.get_string(&key(prefix, "password")),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

impl fmt::Debug for NodeAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Connection parameters for one of the three topologies
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisDeployment {
    /// Single redis instance
    Standalone {
        address: String,
        auth: NodeAuth,
        db: i64,
        pool_size: usize,
    },
    /// Redis Cluster deployment
    Cluster { nodes: Vec<String>, auth: NodeAuth },
    /// Redis Sentinel for high availability
    Sentinel {
        master_name: String,
        sentinels: Vec<String>,
        sentinel_auth: NodeAuth,
        node_auth: NodeAuth,
        db: i64,
        pool_size: usize,
    },
}

impl RedisDeployment {
    /// Config for a standalone node
    pub fn standalone(address: impl Into<String>) -> Self {
        RedisDeployment::Standalone {
            address: address.into(),
            auth: NodeAuth::default(),
            db: DEFAULT_DB,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Config for a cluster reached through the given seed nodes
    pub fn cluster(nodes: Vec<String>) -> Self {
        RedisDeployment::Cluster {
            nodes,
            auth: NodeAuth::default(),
        }
    }

    /// Config for a sentinel-managed master
    pub fn sentinel(master_name: impl Into<String>, sentinels: Vec<String>) -> Self {
        RedisDeployment::Sentinel {
            master_name: master_name.into(),
            sentinels,
            sentinel_auth: NodeAuth::default(),
            node_auth: NodeAuth::default(),
            db: DEFAULT_DB,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Set data-node credentials
    pub fn with_auth(mut self, username: Option<String>, password: Option<String>) -> Self {
        match &mut self {
            RedisDeployment::Standalone { auth, .. } | RedisDeployment::Cluster { auth, .. } => {
                *auth = NodeAuth::new(username, password);
            }
            RedisDeployment::Sentinel { node_auth, .. } => {
                *node_auth = NodeAuth::new(username, password);
            }
        }
        self
    }

    /// Set sentinel credentials; no effect on other topologies
    pub fn with_sentinel_auth(mut self, username: Option<String>, password: Option<String>) -> Self {
        if let RedisDeployment::Sentinel { sentinel_auth, .. } = &mut self {
            *sentinel_auth = NodeAuth::new(username, password);
        }
        self
    }

    /// Set the database index; clusters only have database 0
    pub fn with_db(mut self, database: i64) -> Self {
        match &mut self {
            RedisDeployment::Standalone { db, .. } | RedisDeployment::Sentinel { db, .. } => {
                *db = database;
            }
            RedisDeployment::Cluster { .. } => {}
        }
        self
    }

    /// Set connection pool size
    pub fn with_pool_size(mut self, size: usize) -> Self {
        match &mut self {
            RedisDeployment::Standalone { pool_size, .. }
            | RedisDeployment::Sentinel { pool_size, .. } => {
                *pool_size = size;
            }
            RedisDeployment::Cluster { .. } => {}
        }
        self
    }

    pub fn topology(&self) -> Topology {
        match self {
            RedisDeployment::Standalone { .. } => Topology::Single,
            RedisDeployment::Cluster { .. } => Topology::Cluster,
            RedisDeployment::Sentinel { .. } => Topology::Sentinel,
        }
    }

    /// Read the deployment selected by `boot.redis.type`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::InvalidTopology` for an unknown `type`, and
    /// `ConnectorError::Config` if a numeric value is malformed.
    pub fn from_source<S: ConfigSource + ?Sized>(source: &S) -> ConnectorResult<Self> {
        let topology = match source.get_string(&key(CONFIG_PREFIX, "type")) {
            Some(raw) => raw.parse::<Topology>()?,
            None => DEFAULT_TOPOLOGY,
        };

        let db = source
            .get_i64(&key(CONFIG_PREFIX, "db"))?
            .unwrap_or(DEFAULT_DB);
        let pool_size = source
            .get_usize(&key(CONFIG_PREFIX, "poolSize"))?
            .unwrap_or(DEFAULT_POOL_SIZE);

        let deployment = match topology {
            Topology::Single => RedisDeployment::Standalone {
                address: source
                    .get_string(&key(CONFIG_PREFIX, "address"))
                    .unwrap_or_default(),
                auth: NodeAuth::from_source(source, CONFIG_PREFIX),
                db,
                pool_size,
            },
            Topology::Cluster => RedisDeployment::Cluster {
                nodes: source.get_string_list(&key(CLUSTER_CONFIG_PREFIX, "cluster")),
                auth: NodeAuth::from_source(source, CLUSTER_CONFIG_PREFIX),
            },
            Topology::Sentinel => RedisDeployment::Sentinel {
                master_name: source
                    .get_string(&key(SENTINEL_CONFIG_PREFIX, "masterName"))
                    .unwrap_or_default(),
                sentinels: source.get_string_list(&key(SENTINEL_CONFIG_PREFIX, "address")),
                sentinel_auth: NodeAuth::from_source(source, SENTINEL_CONFIG_PREFIX),
                node_auth: NodeAuth::from_source(source, CONFIG_PREFIX),
                db,
                pool_size,
            },
        };

        Ok(deployment)
    }

    /// Validate configuration
    pub fn validate(&self) -> ConnectorResult<()> {
        match self {
            RedisDeployment::Standalone {
                address,
                db,
                pool_size,
                ..
            } => {
                if address.trim().is_empty() {
                    return Err(ConnectorError::Validation(
                        "boot.redis.address cannot be empty".to_string(),
                    ));
                }
                validate_db(*db)?;
                validate_pool_size(*pool_size)?;
            }
            RedisDeployment::Cluster { nodes, .. } => {
                if nodes.is_empty() {
                    return Err(ConnectorError::Validation(
                        "boot.redis.cluster.cluster must list at least one node".to_string(),
                    ));
                }
            }
            RedisDeployment::Sentinel {
                master_name,
                sentinels,
                db,
                pool_size,
                ..
            } => {
                if sentinels.is_empty() {
                    return Err(ConnectorError::Validation(
                        "boot.redis.sentinel.address must list at least one sentinel".to_string(),
                    ));
                }
                if master_name.trim().is_empty() {
                    return Err(ConnectorError::Validation(
                        "boot.redis.sentinel.masterName cannot be empty".to_string(),
                    ));
                }
                validate_db(*db)?;
                validate_pool_size(*pool_size)?;
            }
        }

        Ok(())
    }
}

fn validate_db(db: i64) -> ConnectorResult<()> {
    if db < 0 {
        return Err(ConnectorError::Validation(format!(
            "boot.redis.db must be >= 0, got {db}"
        )));
    }
    Ok(())
}

fn validate_pool_size(pool_size: usize) -> ConnectorResult<()> {
    if pool_size == 0 {
        return Err(ConnectorError::Validation(
            "boot.redis.poolSize cannot be zero".to_string(),
        ));
    }
    if pool_size > MAX_POOL_SIZE {
        return Err(ConnectorError::Validation(format!(
            "boot.redis.poolSize too large (max {MAX_POOL_SIZE}), got {pool_size}"
        )));
    }
    Ok(())
}

/// `boot.redis.enabled`, defaulting to `true`
pub fn enabled<S: ConfigSource + ?Sized>(source: &S) -> ConnectorResult<bool> {
    Ok(source
        .get_bool(&key(CONFIG_PREFIX, "enabled"))?
        .unwrap_or(DEFAULT_ENABLED))
}

/// `boot.redis.order`, defaulting to `10`
pub fn order<S: ConfigSource + ?Sized>(source: &S) -> ConnectorResult<i64> {
    Ok(source
        .get_i64(&key(CONFIG_PREFIX, "order"))?
        .unwrap_or(DEFAULT_ORDER))
}

/// Give a bare `host:port` the `redis://` scheme.
pub fn normalize_address(address: &str) -> String {
    let address = address.trim();
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{address}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boot_plugin::MapSource;
    use rstest::rstest;

    #[rstest]
    #[case("single", Topology::Single)]
    #[case("cluster", Topology::Cluster)]
    #[case("sentinel", Topology::Sentinel)]
    fn test_topology_parse(#[case] raw: &str, #[case] expected: Topology) {
        assert_eq!(raw.parse::<Topology>().unwrap(), expected);
        assert_eq!(expected.to_string(), raw);
    }

    #[rstest]
    #[case("error")]
    #[case("Single")]
    #[case("")]
    fn test_topology_rejects_unknown(#[case] raw: &str) {
        let err = raw.parse::<Topology>().unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("not found redis type:[{raw}], please use [single,cluster,sentinel]")
        );
    }

    #[test]
    fn test_defaults_when_unset() {
        let source = MapSource::new();
        assert!(enabled(&source).unwrap());
        assert_eq!(order(&source).unwrap(), 10);

        let deployment = RedisDeployment::from_source(&source).unwrap();
        assert_eq!(
            deployment,
            RedisDeployment::Standalone {
                address: String::new(),
                auth: NodeAuth::default(),
                db: 0,
                pool_size: 10,
            }
        );
    }

    #[test]
    fn test_standalone_from_source() {
        let source = MapSource::new()
            .with("boot.redis.address", "10.1.1.1:6380")
            .with("boot.redis.username", "app")
            .with("boot.redis.password", "s3cret")
            .with("boot.redis.db", "4")
            .with("boot.redis.poolSize", "25");

        let deployment = RedisDeployment::from_source(&source).unwrap();
        assert_eq!(deployment.topology(), Topology::Single);
        assert_eq!(
            deployment,
            RedisDeployment::standalone("10.1.1.1:6380")
                .with_auth(Some("app".into()), Some("s3cret".into()))
                .with_db(4)
                .with_pool_size(25)
        );
        assert!(deployment.validate().is_ok());
    }

    #[test]
    fn test_cluster_and_sentinel_use_separate_namespaces() {
        let source = MapSource::new()
            .with("boot.redis.type", "sentinel")
            .with("boot.redis.username", "node-user")
            .with("boot.redis.password", "node-pass")
            .with_list("boot.redis.cluster.cluster", ["c1:7000"])
            .with("boot.redis.cluster.password", "cluster-pass")
            .with("boot.redis.sentinel.masterName", "mymaster")
            .with_list("boot.redis.sentinel.address", ["s1:26379", "s2:26379"])
            .with("boot.redis.sentinel.password", "sentinel-pass");

        let deployment = RedisDeployment::from_source(&source).unwrap();
        match deployment {
            RedisDeployment::Sentinel {
                master_name,
                sentinels,
                sentinel_auth,
                node_auth,
                db,
                pool_size,
            } => {
                assert_eq!(master_name, "mymaster");
                assert_eq!(sentinels, vec!["s1:26379", "s2:26379"]);
                assert_eq!(sentinel_auth.password.as_deref(), Some("sentinel-pass"));
                assert_eq!(sentinel_auth.username, None);
                assert_eq!(node_auth.username.as_deref(), Some("node-user"));
                assert_eq!(node_auth.password.as_deref(), Some("node-pass"));
                assert_eq!(db, 0);
                assert_eq!(pool_size, 10);
            }
            other => panic!("expected sentinel deployment, got {other:?}"),
        }
    }

    #[test]
    fn test_cluster_from_source() {
        let source = MapSource::new()
            .with("boot.redis.type", "cluster")
            .with("boot.redis.cluster.cluster", "n1:7000,n2:7001 n3:7002")
            .with("boot.redis.cluster.username", "ops")
            .with("boot.redis.cluster.password", "")
            .with("boot.redis.password", "ignored-for-cluster");

        let deployment = RedisDeployment::from_source(&source).unwrap();
        assert_eq!(
            deployment,
            RedisDeployment::cluster(vec![
                "n1:7000".to_string(),
                "n2:7001".to_string(),
                "n3:7002".to_string(),
            ])
            .with_auth(Some("ops".into()), None)
        );
    }

    #[test]
    fn test_malformed_numbers_are_config_errors() {
        let source = MapSource::new().with("boot.redis.poolSize", "many");
        let err = RedisDeployment::from_source(&source).unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));

        let source = MapSource::new().with("boot.redis.order", "first");
        assert!(order(&source).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(RedisDeployment::standalone("").validate().is_err());
        assert!(
            RedisDeployment::standalone("localhost:6379")
                .with_pool_size(0)
                .validate()
                .is_err()
        );
        assert!(
            RedisDeployment::standalone("localhost:6379")
                .with_db(-1)
                .validate()
                .is_err()
        );
        assert!(RedisDeployment::cluster(vec![]).validate().is_err());
        assert!(
            RedisDeployment::sentinel("", vec!["s1:26379".into()])
                .validate()
                .is_err()
        );
        assert!(
            RedisDeployment::sentinel("mymaster", vec![])
                .validate()
                .is_err()
        );
        assert!(
            RedisDeployment::sentinel("mymaster", vec!["s1:26379".into()])
                .validate()
                .is_ok()
        );

        // Oversized pools are rejected before a pool or semaphore is built
        assert!(
            RedisDeployment::standalone("localhost:6379")
                .with_pool_size(MAX_POOL_SIZE)
                .validate()
                .is_ok()
        );
        assert!(matches!(
            RedisDeployment::standalone("localhost:6379")
                .with_pool_size(MAX_POOL_SIZE + 1)
                .validate(),
            Err(ConnectorError::Validation(_))
        ));
        assert!(matches!(
            RedisDeployment::sentinel("mymaster", vec!["s1:26379".into()])
                .with_pool_size(usize::MAX)
                .validate(),
            Err(ConnectorError::Validation(_))
        ));
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("localhost:6379"), "redis://localhost:6379");
        assert_eq!(normalize_address(" rediss://h:1 "), "rediss://h:1");
    }

    #[test]
    fn test_node_auth_debug_redacts_password() {
        let auth = NodeAuth::new(Some("user".into()), Some("hunter2".into()));
        let printed = format!("{auth:?}");
        assert!(printed.contains("user"));
        assert!(!printed.contains("hunter2"));
        assert!(NodeAuth::new(Some(String::new()), None).is_empty());
    }
}
