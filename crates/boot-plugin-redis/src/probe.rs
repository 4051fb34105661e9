//! Connectivity probes
//!
//! A probe is a single `PING` round-trip. Clusters are probed node by node:
//! the layout is read with `CLUSTER SLOTS` from the first seed that answers,
//! every primary and replica is pinged concurrently, and the first failing
//! node in slot order decides the result.

use futures::future::join_all;
use redis::aio::ConnectionLike;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisError, RedisResult, Value};
use tracing::debug;

use crate::config::Topology;
use crate::connect::host_of;
use crate::error::{ConnectorError, ConnectorResult};

/// A cluster node and the first slot range it serves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    pub start_slot: u16,
    pub end_slot: u16,
    pub host: String,
    pub port: u16,
    /// `false` for replicas of the range
    pub primary: bool,
}

impl Shard {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Send `PING` over any async connection
pub async fn ping<C: ConnectionLike + Send>(conn: &mut C) -> RedisResult<()> {
    let _: String = redis::cmd("PING").query_async(conn).await?;
    Ok(())
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::BulkString(bytes) => std::str::from_utf8(bytes).ok()?.parse().ok(),
        Value::SimpleString(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
        Value::SimpleString(s) => Some(s.clone()),
        Value::Nil => Some(String::new()),
        _ => None,
    }
}

fn malformed(detail: &str) -> ConnectorError {
    ConnectorError::ClusterDiscovery(format!("malformed CLUSTER SLOTS reply: {detail}"))
}

fn parse_node(
    node: &Value,
    start: u16,
    end: u16,
    answering_host: &str,
) -> ConnectorResult<(String, u16)> {
    let Value::Array(fields) = node else {
        return Err(malformed("node is not an array"));
    };
    if fields.len() < 2 {
        return Err(malformed("node has fewer than 2 fields"));
    }
    let host = value_as_string(&fields[0]).ok_or_else(|| malformed("invalid host"))?;
    let port = value_as_i64(&fields[1])
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| malformed("invalid port"))?;

    match host.as_str() {
        "" => Ok((answering_host.to_string(), port)),
        "?" => Err(ConnectorError::ClusterDiscovery(format!(
            "node serving slots {start}-{end} has an unknown endpoint"
        ))),
        _ => Ok((host, port)),
    }
}

/// Extract every distinct node from a `CLUSTER SLOTS` reply.
///
/// Each entry is `[start, end, [host, port, ..], replicas..]`. An empty host
/// means the node that answered, whose host is `answering_host`; `?` means
/// the node's endpoint is unknown and fails discovery.
///
/// Nodes come back sorted by their lowest slot, each primary ahead of its
/// replicas. A node serving several ranges is listed once.
pub fn parse_cluster_slots(reply: &Value, answering_host: &str) -> ConnectorResult<Vec<Shard>> {
    let Value::Array(entries) = reply else {
        return Err(malformed("expected an array"));
    };

    let mut nodes = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Array(fields) = entry else {
            return Err(malformed("slot entry is not an array"));
        };
        if fields.len() < 3 {
            return Err(malformed("slot entry has fewer than 3 fields"));
        }

        let start = value_as_i64(&fields[0])
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| malformed("invalid start slot"))?;
        let end = value_as_i64(&fields[1])
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| malformed("invalid end slot"))?;

        for (idx, node) in fields[2..].iter().enumerate() {
            let (host, port) = parse_node(node, start, end, answering_host)?;
            nodes.push(Shard {
                start_slot: start,
                end_slot: end,
                host,
                port,
                primary: idx == 0,
            });
        }
    }

    nodes.sort_by_key(|shard| (shard.start_slot, !shard.primary));

    let mut shards: Vec<Shard> = Vec::new();
    for shard in nodes {
        if !shards
            .iter()
            .any(|s| s.host == shard.host && s.port == shard.port)
        {
            shards.push(shard);
        }
    }
    Ok(shards)
}

/// Connection info for another node, keeping the scheme, TLS settings and
/// credentials of `template`
pub fn node_connection_info(template: &ConnectionInfo, host: &str, port: u16) -> ConnectionInfo {
    let mut info = template.clone();
    info.addr = match &template.addr {
        ConnectionAddr::TcpTls {
            insecure,
            tls_params,
            ..
        } => ConnectionAddr::TcpTls {
            host: host.to_string(),
            port,
            insecure: *insecure,
            tls_params: tls_params.clone(),
        },
        _ => ConnectionAddr::Tcp(host.to_string(), port),
    };
    info
}

async fn cluster_slots(seed: &ConnectionInfo) -> RedisResult<Value> {
    let client = Client::open(seed.clone())?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    redis::cmd("CLUSTER").arg("SLOTS").query_async(&mut conn).await
}

/// Read the cluster layout from the first seed that answers.
///
/// Returns the answering seed with the nodes; the seed's connection settings
/// are the template for reaching the other nodes.
pub async fn discover_shards(
    seeds: &[ConnectionInfo],
) -> ConnectorResult<(&ConnectionInfo, Vec<Shard>)> {
    let mut last_error: Option<RedisError> = None;
    for seed in seeds {
        match cluster_slots(seed).await {
            Ok(reply) => {
                let shards = parse_cluster_slots(&reply, &host_of(seed))?;
                debug!(seed = %seed.addr, nodes = shards.len(), "Read cluster layout");
                return Ok((seed, shards));
            }
            Err(e) => {
                debug!(seed = %seed.addr, error = %e, "Seed did not return cluster layout");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(source) => Err(ConnectorError::Probe {
            topology: Topology::Cluster,
            source,
        }),
        None => Err(ConnectorError::ClusterDiscovery(
            "no seed nodes configured".to_string(),
        )),
    }
}

/// Ping one node over a fresh connection built from `template`
pub async fn ping_shard(shard: &Shard, template: &ConnectionInfo) -> RedisResult<()> {
    let info = node_connection_info(template, &shard.host, shard.port);
    let client = Client::open(info)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    ping(&mut conn).await
}

/// Reduce per-node results to the overall result.
///
/// The first failure in iteration order wins.
pub fn first_shard_failure<I>(results: I) -> ConnectorResult<()>
where
    I: IntoIterator<Item = (Shard, RedisResult<()>)>,
{
    for (shard, result) in results {
        if let Err(source) = result {
            return Err(ConnectorError::ShardProbe {
                shard: shard.address(),
                source,
            });
        }
    }
    Ok(())
}

/// Ping every node concurrently and report the first failing one
pub async fn ping_shards(shards: Vec<Shard>, template: &ConnectionInfo) -> ConnectorResult<()> {
    if shards.is_empty() {
        return Err(ConnectorError::ClusterDiscovery(
            "cluster reported no slot owners".to_string(),
        ));
    }

    let results = join_all(shards.iter().map(|shard| async move {
        let result = ping_shard(shard, template).await;
        debug!(
            shard = %shard.address(),
            slots = %format!("{}-{}", shard.start_slot, shard.end_slot),
            primary = shard.primary,
            ok = result.is_ok(),
            "Pinged cluster node"
        );
        result
    }))
    .await;

    first_shard_failure(shards.into_iter().zip(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeAuth;
    use crate::connect::connection_info;
    use std::io;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    fn node(host: &str, port: i64, id: &str) -> Value {
        Value::Array(vec![bulk(host), Value::Int(port), bulk(id)])
    }

    fn slot_entry(start: i64, end: i64, host: &str, port: i64) -> Value {
        Value::Array(vec![
            Value::Int(start),
            Value::Int(end),
            node(host, port, "node-id"),
        ])
    }

    fn shard(start: u16, end: u16, host: &str, port: u16) -> Shard {
        Shard {
            start_slot: start,
            end_slot: end,
            host: host.to_string(),
            port,
            primary: true,
        }
    }

    fn replica(start: u16, end: u16, host: &str, port: u16) -> Shard {
        Shard {
            primary: false,
            ..shard(start, end, host, port)
        }
    }

    #[test]
    fn test_parse_cluster_slots_sorted_and_deduplicated() {
        let reply = Value::Array(vec![
            slot_entry(10923, 16383, "10.0.0.3", 7002),
            slot_entry(0, 5460, "10.0.0.1", 7000),
            slot_entry(5461, 10922, "10.0.0.2", 7001),
            // A primary owning a second, non-contiguous range
            slot_entry(16000, 16001, "10.0.0.1", 7000),
        ]);

        let shards = parse_cluster_slots(&reply, "seed").unwrap();
        assert_eq!(
            shards,
            vec![
                shard(0, 5460, "10.0.0.1", 7000),
                shard(5461, 10922, "10.0.0.2", 7001),
                shard(10923, 16383, "10.0.0.3", 7002),
            ]
        );
    }

    #[test]
    fn test_parse_cluster_slots_includes_replicas() {
        let reply = Value::Array(vec![
            Value::Array(vec![
                Value::Int(8192),
                Value::Int(16383),
                node("10.0.0.2", 7001, "b"),
                node("10.0.0.12", 7011, "b1"),
            ]),
            Value::Array(vec![
                Value::Int(0),
                Value::Int(8191),
                node("10.0.0.1", 7000, "a"),
                node("10.0.0.11", 7010, "a1"),
                node("10.0.0.21", 7020, "a2"),
            ]),
            // Second range of the first shard lists the same nodes again
            Value::Array(vec![
                Value::Int(16383),
                Value::Int(16383),
                node("10.0.0.1", 7000, "a"),
                node("10.0.0.11", 7010, "a1"),
            ]),
        ]);

        let shards = parse_cluster_slots(&reply, "seed").unwrap();
        assert_eq!(
            shards,
            vec![
                shard(0, 8191, "10.0.0.1", 7000),
                replica(0, 8191, "10.0.0.11", 7010),
                replica(0, 8191, "10.0.0.21", 7020),
                shard(8192, 16383, "10.0.0.2", 7001),
                replica(8192, 16383, "10.0.0.12", 7011),
            ]
        );
    }

    #[test]
    fn test_parse_cluster_slots_empty_host_is_answering_node() {
        let reply = Value::Array(vec![Value::Array(vec![
            Value::Int(0),
            Value::Int(16383),
            node("", 7000, "a"),
            Value::Array(vec![Value::Nil, Value::Int(7001)]),
        ])]);
        let shards = parse_cluster_slots(&reply, "seed.local").unwrap();
        assert_eq!(shards[0].address(), "seed.local:7000");
        assert_eq!(shards[1].address(), "seed.local:7001");
    }

    #[test]
    fn test_parse_cluster_slots_unknown_endpoint_fails() {
        let reply = Value::Array(vec![slot_entry(0, 16383, "?", 7000)]);
        let err = parse_cluster_slots(&reply, "seed.local").unwrap_err();
        match err {
            ConnectorError::ClusterDiscovery(msg) => assert!(msg.contains("0-16383")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_cluster_slots_rejects_malformed() {
        assert!(parse_cluster_slots(&Value::Nil, "seed").is_err());
        let short = Value::Array(vec![Value::Array(vec![Value::Int(0), Value::Int(1)])]);
        assert!(matches!(
            parse_cluster_slots(&short, "seed"),
            Err(ConnectorError::ClusterDiscovery(_))
        ));
        let bad_port = Value::Array(vec![slot_entry(0, 1, "h", 70000)]);
        assert!(parse_cluster_slots(&bad_port, "seed").is_err());
    }

    #[test]
    fn test_node_connection_info_keeps_tls_and_credentials() {
        let mut seed = connection_info(
            "seed.local:7000",
            &NodeAuth::new(Some("app".into()), Some("pw".into())),
            0,
        )
        .unwrap();
        seed.addr = ConnectionAddr::TcpTls {
            host: "seed.local".into(),
            port: 7000,
            insecure: true,
            tls_params: None,
        };

        let info = node_connection_info(&seed, "10.0.0.2", 7001);

        match &info.addr {
            ConnectionAddr::TcpTls {
                host,
                port,
                insecure,
                ..
            } => {
                assert_eq!(host, "10.0.0.2");
                assert_eq!(*port, 7001);
                assert!(*insecure);
            }
            other => panic!("expected a TLS address, got {other:?}"),
        }
        assert_eq!(info.redis.username.as_deref(), Some("app"));
        assert_eq!(info.redis.password.as_deref(), Some("pw"));

        let plain = connection_info("seed.local:7000", &NodeAuth::default(), 0).unwrap();
        assert!(matches!(
            node_connection_info(&plain, "10.0.0.2", 7001).addr,
            ConnectionAddr::Tcp(ref host, 7001) if host == "10.0.0.2"
        ));
    }

    #[test]
    fn test_first_shard_failure_reports_failing_shard() {
        let refused = || {
            RedisError::from(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))
        };
        let results = vec![
            (shard(0, 5460, "a", 7000), Ok(())),
            (replica(0, 5460, "a1", 7010), Err(refused())),
            (shard(10923, 16383, "c", 7002), Err(refused())),
        ];

        let err = first_shard_failure(results).unwrap_err();
        match err {
            ConnectorError::ShardProbe { shard, source } => {
                assert_eq!(shard, "a1:7010");
                assert!(source.to_string().contains("refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_first_shard_failure_all_ok() {
        let results = vec![
            (shard(0, 8191, "a", 7000), Ok(())),
            (shard(8192, 16383, "b", 7001), Ok(())),
        ];
        assert!(first_shard_failure(results).is_ok());
    }

    #[tokio::test]
    async fn test_ping_shards_requires_shards() {
        let template = connection_info("127.0.0.1:1", &NodeAuth::default(), 0).unwrap();
        let err = ping_shards(Vec::new(), &template).await.unwrap_err();
        assert!(matches!(err, ConnectorError::ClusterDiscovery(_)));
    }

    #[tokio::test]
    async fn test_ping_shards_unreachable_shard() {
        let template = connection_info("127.0.0.1:1", &NodeAuth::default(), 0).unwrap();
        let shards = vec![shard(0, 16383, "127.0.0.1", 1)];
        let err = ping_shards(shards, &template).await.unwrap_err();
        assert!(matches!(err, ConnectorError::ShardProbe { ref shard, .. } if shard == "127.0.0.1:1"));
    }

    #[tokio::test]
    async fn test_discover_shards_tries_every_seed() {
        let seeds = vec![
            connection_info("127.0.0.1:1", &NodeAuth::default(), 0).unwrap(),
            connection_info("127.0.0.1:2", &NodeAuth::default(), 0).unwrap(),
        ];
        let err = discover_shards(&seeds).await.unwrap_err();
        assert_eq!(err.topology(), Some(Topology::Cluster));
        assert!(err.redis_error().is_some());

        let err = discover_shards(&[]).await.unwrap_err();
        assert!(matches!(err, ConnectorError::ClusterDiscovery(_)));
    }
}
