//! Client construction per topology
//!
//! [`build_handle`] turns a [`RedisDeployment`] into a client without any
//! network traffic; [`connect`] additionally probes it and only returns a
//! handle that answered.

use deadpool_redis::{Config as PoolConfig, PoolConfig as PoolSizing, Runtime};
use redis::cluster::ClusterClientBuilder;
use redis::sentinel::{SentinelClient, SentinelNodeConnectionInfo, SentinelServerType};
use redis::{ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo, RedisResult};
use tracing::{error, info};

use crate::config::{NodeAuth, RedisDeployment, normalize_address};
use crate::error::{ConnectorError, ConnectorResult};
use crate::handle::{ClusterHandle, RedisHandle, SentinelHandle};

/// Connection info for one node with credentials and database applied
pub fn connection_info(address: &str, auth: &NodeAuth, db: i64) -> RedisResult<ConnectionInfo> {
    let mut info = normalize_address(address).into_connection_info()?;
    if auth.username.is_some() {
        info.redis.username = auth.username.clone();
    }
    if auth.password.is_some() {
        info.redis.password = auth.password.clone();
    }
    info.redis.db = db;
    Ok(info)
}

pub(crate) fn host_of(info: &ConnectionInfo) -> String {
    match &info.addr {
        ConnectionAddr::Tcp(host, _) => host.clone(),
        ConnectionAddr::TcpTls { host, .. } => host.clone(),
        _ => String::new(),
    }
}

/// Create the client for a deployment without contacting any server.
///
/// # Errors
///
/// Returns `ConnectorError::Validation` if the deployment is incomplete or
/// out of range, `ConnectorError::Client` or `ConnectorError::Pool` if the
/// client library rejects the parameters.
pub fn build_handle(deployment: &RedisDeployment) -> ConnectorResult<RedisHandle> {
    deployment.validate()?;

    let topology = deployment.topology();
    let client_error = |source| ConnectorError::Client { topology, source };

    match deployment {
        RedisDeployment::Standalone {
            address,
            auth,
            db,
            pool_size,
        } => {
            let info = connection_info(address, auth, *db).map_err(client_error)?;
            let mut pool_config = PoolConfig::from_connection_info(info);
            pool_config.pool = Some(PoolSizing::new(*pool_size));
            let pool = pool_config
                .create_pool(Some(Runtime::Tokio1))
                .map_err(|e| ConnectorError::Pool {
                    topology,
                    message: format!("Failed to create connection pool: {e}"),
                })?;

            Ok(RedisHandle::Single(pool))
        }
        RedisDeployment::Cluster { nodes, auth } => {
            let seeds: Vec<String> = nodes.iter().map(|n| normalize_address(n)).collect();
            let seed_infos = seeds
                .iter()
                .map(|seed| connection_info(seed, auth, 0))
                .collect::<RedisResult<Vec<_>>>()
                .map_err(client_error)?;

            let mut builder = ClusterClientBuilder::new(seeds);
            if let Some(username) = &auth.username {
                builder = builder.username(username.clone());
            }
            if let Some(password) = &auth.password {
                builder = builder.password(password.clone());
            }
            let client = builder.build().map_err(client_error)?;

            Ok(RedisHandle::Cluster(ClusterHandle::new(client, seed_infos)))
        }
        RedisDeployment::Sentinel {
            master_name,
            sentinels,
            sentinel_auth,
            node_auth,
            db,
            pool_size,
        } => {
            let sentinel_infos = sentinels
                .iter()
                .map(|s| connection_info(s, sentinel_auth, 0))
                .collect::<RedisResult<Vec<_>>>()
                .map_err(client_error)?;

            let node_info = SentinelNodeConnectionInfo {
                tls_mode: None,
                redis_connection_info: Some(RedisConnectionInfo {
                    db: *db,
                    username: node_auth.username.clone(),
                    password: node_auth.password.clone(),
                    ..Default::default()
                }),
            };

            let client = SentinelClient::build(
                sentinel_infos,
                master_name.clone(),
                Some(node_info),
                SentinelServerType::Master,
            )
            .map_err(client_error)?;

            Ok(RedisHandle::Sentinel(SentinelHandle::new(
                client,
                master_name.clone(),
                *pool_size,
            )))
        }
    }
}

/// Build, probe and return a handle for `deployment`.
///
/// Single attempt: no retry and no timeout beyond the client library's own.
///
/// # Errors
///
/// Returns `ConnectorError::Validation` before any network activity if the
/// deployment is incomplete, otherwise the construction or probe error.
pub async fn connect(deployment: &RedisDeployment) -> ConnectorResult<RedisHandle> {
    let topology = deployment.topology();
    info!(topology = %topology, "Connecting to redis");

    let handle = build_handle(deployment)?;
    match handle.ping().await {
        Ok(()) => {
            info!(topology = %topology, "Redis connection verified");
            Ok(handle)
        }
        Err(e) => {
            error!(topology = %topology, error = %e, "Redis probe failed");
            Err(e)
        }
    }
}
