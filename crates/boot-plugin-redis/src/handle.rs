//! Client handles produced by a successful load
//!
//! [`RedisHandle`] wraps whichever client the topology needs and exposes the
//! same capabilities for all of them: a liveness probe and a connection that
//! implements [`ConnectionLike`], so `redis::AsyncCommands` works the same way
//! against a single node, a cluster or a sentinel-managed master.

use std::fmt;
use std::sync::Arc;

use deadpool_redis::{Connection as PooledConnection, Pool, PoolError};
use redis::aio::{ConnectionLike, MultiplexedConnection};
use redis::cluster::ClusterClient;
use redis::cluster_async::ClusterConnection;
use redis::sentinel::SentinelClient;
use redis::{Cmd, ConnectionInfo, Pipeline, RedisFuture, Value};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::config::Topology;
use crate::error::{ConnectorError, ConnectorResult};
use crate::probe;

/// Which of the two well-known slots a handle occupies.
///
/// Standalone and sentinel clients share the `Client` slot; clusters have
/// their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Client,
    Cluster,
}

/// Cluster client plus the seed nodes used to read the cluster layout
#[derive(Clone)]
pub struct ClusterHandle {
    client: ClusterClient,
    seeds: Vec<ConnectionInfo>,
}

impl ClusterHandle {
    pub(crate) fn new(client: ClusterClient, seeds: Vec<ConnectionInfo>) -> Self {
        Self { client, seeds }
    }

    pub fn client(&self) -> &ClusterClient {
        &self.client
    }

    /// Seed nodes with the cluster credentials applied
    pub fn seeds(&self) -> &[ConnectionInfo] {
        &self.seeds
    }

    pub async fn connection(&self) -> ConnectorResult<ClusterConnection> {
        self.client
            .get_async_connection()
            .await
            .map_err(|source| ConnectorError::Connection {
                topology: Topology::Cluster,
                source,
            })
    }

    /// Ping every primary and replica the cluster reports
    pub async fn ping_shards(&self) -> ConnectorResult<()> {
        self.connection().await.map_err(ConnectorError::into_probe)?;

        let (seed, shards) = probe::discover_shards(&self.seeds).await?;
        probe::ping_shards(shards, seed).await
    }
}

/// Sentinel client with connection checkouts bounded by the pool size.
///
/// The sentinel client resolves the current master on every checkout, so a
/// failover is picked up by the next connection.
#[derive(Clone)]
pub struct SentinelHandle {
    client: Arc<Mutex<SentinelClient>>,
    permits: Arc<Semaphore>,
    master_name: String,
    pool_size: usize,
}

impl SentinelHandle {
    pub(crate) fn new(client: SentinelClient, master_name: String, pool_size: usize) -> Self {
        Self {
            client: Arc::new(Mutex::new(client)),
            permits: Arc::new(Semaphore::new(pool_size)),
            master_name,
            pool_size,
        }
    }

    pub fn master_name(&self) -> &str {
        &self.master_name
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Connect to the current master; the permit is held until the
    /// connection is dropped.
    pub async fn connection(&self) -> ConnectorResult<SentinelConnection> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ConnectorError::Pool {
                topology: Topology::Sentinel,
                message: e.to_string(),
            })?;

        let connection_error = |source| ConnectorError::Connection {
            topology: Topology::Sentinel,
            source,
        };
        // Resolving the master needs `&mut SentinelClient`, so resolutions
        // are serialized; the master connection is opened after the lock is
        // released.
        let master = self
            .client
            .lock()
            .await
            .async_get_client()
            .await
            .map_err(connection_error)?;
        let conn = master
            .get_multiplexed_async_connection()
            .await
            .map_err(connection_error)?;

        Ok(SentinelConnection {
            conn,
            _permit: permit,
        })
    }
}

/// Master connection that keeps its checkout permit alive
pub struct SentinelConnection {
    conn: MultiplexedConnection,
    _permit: OwnedSemaphorePermit,
}

impl ConnectionLike for SentinelConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        self.conn.req_packed_command(cmd)
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        self.conn.req_packed_commands(cmd, offset, count)
    }

    fn get_db(&self) -> i64 {
        self.conn.get_db()
    }
}

/// Live client for one of the three topologies
#[derive(Clone)]
pub enum RedisHandle {
    /// Pooled standalone client
    Single(Pool),
    /// Cluster client
    Cluster(ClusterHandle),
    /// Failover client resolved through sentinels
    Sentinel(SentinelHandle),
}

impl fmt::Debug for RedisHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedisHandle::Single(pool) => f
                .debug_struct("RedisHandle::Single")
                .field("max_size", &pool.status().max_size)
                .finish(),
            RedisHandle::Cluster(handle) => f
                .debug_struct("RedisHandle::Cluster")
                .field(
                    "seeds",
                    &handle
                        .seeds
                        .iter()
                        .map(|seed| seed.addr.to_string())
                        .collect::<Vec<_>>(),
                )
                .finish(),
            RedisHandle::Sentinel(handle) => f
                .debug_struct("RedisHandle::Sentinel")
                .field("master_name", &handle.master_name)
                .field("pool_size", &handle.pool_size)
                .finish(),
        }
    }
}

fn pool_error(err: PoolError) -> ConnectorError {
    match err {
        PoolError::Backend(source) => ConnectorError::Connection {
            topology: Topology::Single,
            source,
        },
        other => ConnectorError::Pool {
            topology: Topology::Single,
            message: other.to_string(),
        },
    }
}

impl RedisHandle {
    pub fn topology(&self) -> Topology {
        match self {
            RedisHandle::Single(_) => Topology::Single,
            RedisHandle::Cluster(_) => Topology::Cluster,
            RedisHandle::Sentinel(_) => Topology::Sentinel,
        }
    }

    pub fn slot(&self) -> Slot {
        match self {
            RedisHandle::Single(_) | RedisHandle::Sentinel(_) => Slot::Client,
            RedisHandle::Cluster(_) => Slot::Cluster,
        }
    }

    pub fn as_pool(&self) -> Option<&Pool> {
        match self {
            RedisHandle::Single(pool) => Some(pool),
            _ => None,
        }
    }

    pub fn as_cluster(&self) -> Option<&ClusterHandle> {
        match self {
            RedisHandle::Cluster(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn as_sentinel(&self) -> Option<&SentinelHandle> {
        match self {
            RedisHandle::Sentinel(handle) => Some(handle),
            _ => None,
        }
    }

    /// Check out a connection
    pub async fn connection(&self) -> ConnectorResult<RedisConnection> {
        match self {
            RedisHandle::Single(pool) => pool
                .get()
                .await
                .map(RedisConnection::Single)
                .map_err(pool_error),
            RedisHandle::Cluster(handle) => handle.connection().await.map(RedisConnection::Cluster),
            RedisHandle::Sentinel(handle) => {
                handle.connection().await.map(RedisConnection::Sentinel)
            }
        }
    }

    /// Liveness probe; clusters are probed on every shard
    pub async fn ping(&self) -> ConnectorResult<()> {
        if let RedisHandle::Cluster(handle) = self {
            return handle.ping_shards().await;
        }

        let topology = self.topology();
        let mut conn = self
            .connection()
            .await
            .map_err(ConnectorError::into_probe)?;
        probe::ping(&mut conn)
            .await
            .map_err(|source| ConnectorError::Probe { topology, source })
    }
}

/// Connection checked out from a [`RedisHandle`]
pub enum RedisConnection {
    Single(PooledConnection),
    Cluster(ClusterConnection),
    Sentinel(SentinelConnection),
}

impl ConnectionLike for RedisConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        match self {
            RedisConnection::Single(conn) => conn.req_packed_command(cmd),
            RedisConnection::Cluster(conn) => conn.req_packed_command(cmd),
            RedisConnection::Sentinel(conn) => conn.req_packed_command(cmd),
        }
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        match self {
            RedisConnection::Single(conn) => conn.req_packed_commands(cmd, offset, count),
            RedisConnection::Cluster(conn) => conn.req_packed_commands(cmd, offset, count),
            RedisConnection::Sentinel(conn) => conn.req_packed_commands(cmd, offset, count),
        }
    }

    fn get_db(&self) -> i64 {
        match self {
            RedisConnection::Single(conn) => conn.get_db(),
            RedisConnection::Cluster(conn) => conn.get_db(),
            RedisConnection::Sentinel(conn) => conn.get_db(),
        }
    }
}
