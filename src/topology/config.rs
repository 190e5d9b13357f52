use crate::connection::config::ConnectionConfig;
use crate::core::{DatabaseNaming, DbError, Result, ShardId, Target};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Shared credentials for every database in the topology
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Address of the write-capable primary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostConfig {
    pub host: String,
    pub port: u16,
}

/// One read-only mirror and its selection weight
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Pool bound and checkout timeout applied to every handle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub connect_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout_ms: 30_000,
        }
    }
}

/// Master/shard/replica layout consumed by the topology builder
///
/// # Examples
///
/// ```
/// use shardgate::TopologyConfig;
///
/// let config = TopologyConfig::from_json_str(r#"{
///     "credentials": { "username": "game", "password": "secret" },
///     "master": { "host": "db-primary", "port": 3306 },
///     "shard_count": 2,
///     "replicas": [{ "host": "db-replica-1", "port": 3306, "weight": 3 }]
/// }"#).unwrap();
///
/// assert_eq!(config.shard_ids(), vec![1, 2]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologyConfig {
    pub credentials: Credentials,
    pub master: HostConfig,
    #[serde(default)]
    pub shard_count: u32,
    /// Explicit shard ids; defaults to `1..=shard_count`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_ids: Option<Vec<ShardId>>,
    #[serde(default)]
    pub replicas: Vec<ReplicaConfig>,
    #[serde(default = "default_prefix")]
    pub database_prefix: String,
    #[serde(default)]
    pub pool: PoolConfig,
}

fn default_prefix() -> String {
    "game".to_string()
}

impl TopologyConfig {
    pub fn new(username: &str, password: &str, host: &str, port: u16) -> Self {
        Self {
            credentials: Credentials {
                username: username.to_string(),
                password: password.to_string(),
            },
            master: HostConfig {
                host: host.to_string(),
                port,
            },
            shard_count: 0,
            shard_ids: None,
            replicas: Vec::new(),
            database_prefix: default_prefix(),
            pool: PoolConfig::default(),
        }
    }

    pub fn shard_count(mut self, count: u32) -> Self {
        self.shard_count = count;
        self
    }

    pub fn with_shard_ids(mut self, ids: Vec<ShardId>) -> Self {
        self.shard_ids = Some(ids);
        self
    }

    pub fn replica(mut self, host: &str, port: u16, weight: u32) -> Self {
        self.replicas.push(ReplicaConfig {
            host: host.to_string(),
            port,
            weight,
        });
        self
    }

    pub fn database_prefix(mut self, prefix: &str) -> Self {
        self.database_prefix = prefix.to_string();
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| DbError::ConfigError(format!("invalid topology config: {}", e)))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DbError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Configured shard ids in ascending order
    pub fn shard_ids(&self) -> Vec<ShardId> {
        let mut ids = match &self.shard_ids {
            Some(ids) => ids.clone(),
            None => (1..=self.shard_count).collect(),
        };
        ids.sort_unstable();
        ids
    }

    pub fn naming(&self) -> DatabaseNaming {
        DatabaseNaming::new(self.database_prefix.clone())
    }

    pub fn replica_weights(&self) -> Vec<u32> {
        self.replicas.iter().map(|r| r.weight).collect()
    }

    /// Connection config for `target` on the given host
    pub fn connection_config(&self, host: &str, port: u16, target: Target) -> ConnectionConfig {
        ConnectionConfig::new(&self.credentials.username, &self.credentials.password)
            .host(host)
            .port(port)
            .database(&self.naming().for_target(target))
            .max_connections(self.pool.max_connections)
            .connect_timeout(Duration::from_millis(self.pool.connect_timeout_ms))
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(DbError::ConfigError(msg));

        if self.credentials.username.is_empty() {
            return fail("username cannot be empty".to_string());
        }
        if self.database_prefix.trim().is_empty() {
            return fail("database_prefix cannot be empty".to_string());
        }
        check_host("master", &self.master.host, self.master.port)?;

        if let Some(ids) = &self.shard_ids {
            let mut seen = HashSet::new();
            for id in ids {
                if *id == 0 {
                    return fail("shard id 0 is reserved".to_string());
                }
                if !seen.insert(*id) {
                    return fail(format!("shard id {} appears more than once", id));
                }
            }
        }

        for (index, replica) in self.replicas.iter().enumerate() {
            check_host(&format!("replica-{}", index), &replica.host, replica.port)?;
        }
        if !self.replicas.is_empty() && self.replicas.iter().all(|r| r.weight == 0) {
            return fail("at least one replica must have a weight > 0".to_string());
        }

        if self.pool.max_connections == 0 {
            return fail("pool.max_connections must be > 0".to_string());
        }
        if self.pool.connect_timeout_ms == 0 {
            return fail("pool.connect_timeout_ms must be > 0".to_string());
        }

        Ok(())
    }
}

fn check_host(name: &str, host: &str, port: u16) -> Result<()> {
    if host.trim().is_empty() {
        return Err(DbError::ConfigError(format!("{} host cannot be empty", name)));
    }
    if port == 0 {
        return Err(DbError::ConfigError(format!("{} port must be > 0", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TopologyConfig {
        TopologyConfig::new("game", "secret", "primary", 3306).shard_count(2)
    }

    #[test]
    fn test_shard_ids_default_and_override() {
        assert_eq!(base().shard_ids(), vec![1, 2]);
        assert_eq!(base().with_shard_ids(vec![9, 4]).shard_ids(), vec![4, 9]);
        assert!(base().shard_count(0).shard_ids().is_empty());
    }

    #[test]
    fn test_json_defaults() {
        let config = TopologyConfig::from_json_str(
            r#"{
                "credentials": { "username": "game", "password": "secret" },
                "master": { "host": "primary", "port": 3306 },
                "shard_count": 3,
                "replicas": [{ "host": "r1", "port": 3307 }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.database_prefix, "game");
        assert_eq!(config.replicas[0].weight, 1);
        assert_eq!(config.pool, PoolConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let err = TopologyConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, DbError::ConfigError(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_validate_rejects_bad_layouts() {
        assert!(base().with_shard_ids(vec![1, 1]).validate().is_err());
        assert!(base().with_shard_ids(vec![0]).validate().is_err());
        assert!(base().replica("r1", 3306, 0).validate().is_err());
        assert!(base().replica("", 3306, 1).validate().is_err());
        assert!(
            TopologyConfig::new("game", "secret", "primary", 0)
                .validate()
                .is_err()
        );
        assert!(
            base()
                .pool(PoolConfig {
                    connect_timeout_ms: 0,
                    ..PoolConfig::default()
                })
                .validate()
                .is_err()
        );

        // A zero-weight replica next to a weighted one is fine
        assert!(base().replica("r1", 3306, 0).replica("r2", 3306, 2).validate().is_ok());
    }

    #[test]
    fn test_connection_config_naming() {
        let config = base().database_prefix("arena");
        let conn = config.connection_config("r1", 3307, Target::Shard(2));

        assert_eq!(conn.database, "arena_shard_2");
        assert_eq!(conn.address(), "r1:3307/arena_shard_2");
        assert_eq!(conn.username, "game");
    }
}
