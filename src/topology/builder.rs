use super::Topology;
use super::config::TopologyConfig;
use crate::connection::{ConnectionHandle, Connector};
use crate::core::{DbError, Location, Result, ShardId, Target};
use crate::replica::WeightTable;
use std::collections::BTreeMap;
use tracing::{error, info};

/// Opens every handle of a topology, failing fast on the first error
///
/// Order: write master, write shards, then for each replica its master
/// mirror followed by its shard mirrors. Nothing is published unless
/// every connection opens.
pub struct TopologyBuilder<'a, C> {
    config: &'a TopologyConfig,
    connector: &'a C,
}

impl<'a, C: Connector> TopologyBuilder<'a, C> {
    pub fn new(config: &'a TopologyConfig, connector: &'a C) -> Self {
        Self { config, connector }
    }

    pub async fn build(self) -> Result<Topology<C::Pool>> {
        self.config.validate()?;
        let shard_ids = self.config.shard_ids();
        let primary = &self.config.master;

        let master_write = self
            .open(&primary.host, primary.port, Location::primary(Target::Master))
            .await?;
        let shard_write = self
            .open_shards(&primary.host, primary.port, &shard_ids, None)
            .await?;

        let mut master_replicas = Vec::with_capacity(self.config.replicas.len());
        let mut shard_replicas = Vec::with_capacity(self.config.replicas.len());
        for (index, replica) in self.config.replicas.iter().enumerate() {
            let master = self
                .open(&replica.host, replica.port, Location::replica(index, Target::Master))
                .await?;
            let shards = self
                .open_shards(&replica.host, replica.port, &shard_ids, Some(index))
                .await?;
            master_replicas.push(master);
            shard_replicas.push(shards);
        }

        let weights = WeightTable::new(self.config.replica_weights());
        let topology = Topology::from_parts(
            master_write,
            shard_write,
            master_replicas,
            shard_replicas,
            weights,
        )?;

        info!(
            shards = topology.shard_count(),
            replicas = topology.replica_count(),
            weights = ?topology.replica_weights(),
            "topology ready"
        );
        Ok(topology)
    }

    async fn open_shards(
        &self,
        host: &str,
        port: u16,
        shard_ids: &[ShardId],
        replica: Option<usize>,
    ) -> Result<BTreeMap<ShardId, ConnectionHandle<C::Pool>>> {
        let mut shards = BTreeMap::new();
        for shard_id in shard_ids {
            let target = Target::Shard(*shard_id);
            let location = match replica {
                Some(index) => Location::replica(index, target),
                None => Location::primary(target),
            };
            shards.insert(*shard_id, self.open(host, port, location).await?);
        }
        Ok(shards)
    }

    async fn open(
        &self,
        host: &str,
        port: u16,
        location: Location,
    ) -> Result<ConnectionHandle<C::Pool>> {
        let config = self.config.connection_config(host, port, location.target);

        match self.connector.connect(&config).await {
            Ok(pool) => {
                info!(%location, url = %config.redacted_url(), "database opened");
                Ok(ConnectionHandle::new(location, &config, pool))
            }
            Err(source) => {
                error!(%location, url = %config.redacted_url(), error = %source, "database setup failed");
                Err(DbError::ConnectError {
                    location,
                    database: config.database.clone(),
                    source,
                })
            }
        }
    }
}

/// Build the full handle matrix for `config`
pub async fn build_topology<C: Connector>(
    config: &TopologyConfig,
    connector: &C,
) -> Result<Topology<C::Pool>> {
    TopologyBuilder::new(config, connector).build().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::memory::{Fault, MemoryConnector};
    use crate::core::Side;

    fn config() -> TopologyConfig {
        TopologyConfig::new("game", "secret", "primary", 3306)
            .shard_count(2)
            .replica("replica-a", 3306, 1)
            .replica("replica-b", 3306, 3)
    }

    #[tokio::test]
    async fn test_build_opens_every_database() {
        let connector = MemoryConnector::new();
        let topology = build_topology(&config(), &connector).await.unwrap();

        // (1 master + 2 shards) x (primary + 2 replicas)
        assert_eq!(connector.databases().len(), 9);
        assert_eq!(topology.handles().count(), 9);
        assert_eq!(topology.replica_weights(), &[1, 3]);
        assert_eq!(topology.shard_ids().collect::<Vec<_>>(), vec![1, 2]);

        let mirror = topology.shard_replicas(1).unwrap().get(&2).unwrap();
        assert_eq!(mirror.location(), Location::replica(1, Target::Shard(2)));
        assert_eq!(mirror.pool().database().address(), "replica-b:3306/game_shard_2");
    }

    #[tokio::test]
    async fn test_build_fails_fast_with_location() {
        let connector = MemoryConnector::new();
        connector
            .database("replica-a:3306/game_shard_1")
            .inject(Fault::Connect);

        let err = build_topology(&config(), &connector).await.unwrap_err();
        match err {
            DbError::ConnectError {
                location, database, ..
            } => {
                assert_eq!(location.side, Side::Replica(0));
                assert_eq!(location.target, Target::Shard(1));
                assert_eq!(database, "game_shard_1");
            }
            other => panic!("expected ConnectError, got {:?}", other),
        }

        // Replica B was never attempted
        assert_eq!(connector.database("replica-b:3306/game_master").connects(), 0);
    }

    #[tokio::test]
    async fn test_invalid_config_opens_nothing() {
        let connector = MemoryConnector::new();
        let bad = config().replica("", 3306, 1);

        let err = build_topology(&bad, &connector).await.unwrap_err();
        assert!(matches!(err, DbError::ConfigError(_)));
        assert!(connector.databases().is_empty());
    }
}
