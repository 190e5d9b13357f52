// ============================================================================
// Topology
// ============================================================================
//
// The immutable, process-lifetime map of every logical database to its
// connection handle:
//
//   write side     master            shard 1 .. shard N
//   replica 0      master mirror     shard mirrors
//   replica K      master mirror     shard mirrors
//
// Built once at startup and shared read-only by every request.
//
// ============================================================================

pub mod builder;
pub mod config;

pub use builder::{TopologyBuilder, build_topology};
pub use config::{Credentials, HostConfig, PoolConfig, ReplicaConfig, TopologyConfig};

use crate::connection::{ConnectionHandle, DatabasePool, PoolStats};
use crate::core::{DbError, Location, Result, ShardId};
use crate::replica::WeightTable;
use std::collections::BTreeMap;

pub struct Topology<P> {
    master_write: ConnectionHandle<P>,
    shard_write: BTreeMap<ShardId, ConnectionHandle<P>>,
    master_replicas: Vec<ConnectionHandle<P>>,
    shard_replicas: Vec<BTreeMap<ShardId, ConnectionHandle<P>>>,
    weights: WeightTable,
}

impl<P: DatabasePool> Topology<P> {
    /// Assemble a topology, checking its shape invariants
    ///
    /// The replica handle lists and the weight table must have one entry
    /// per replica, and every replica must mirror every write shard.
    pub fn from_parts(
        master_write: ConnectionHandle<P>,
        shard_write: BTreeMap<ShardId, ConnectionHandle<P>>,
        master_replicas: Vec<ConnectionHandle<P>>,
        shard_replicas: Vec<BTreeMap<ShardId, ConnectionHandle<P>>>,
        weights: WeightTable,
    ) -> Result<Self> {
        if master_replicas.len() != shard_replicas.len() || master_replicas.len() != weights.len()
        {
            return Err(DbError::ConfigError(format!(
                "replica count mismatch: {} master mirrors, {} shard maps, {} weights",
                master_replicas.len(),
                shard_replicas.len(),
                weights.len()
            )));
        }
        if !weights.is_empty() && !weights.is_selectable() {
            return Err(DbError::ConfigError(
                "replica weights must sum to > 0".to_string(),
            ));
        }
        for (index, mirror) in shard_replicas.iter().enumerate() {
            if let Some(missing) = shard_write.keys().find(|id| !mirror.contains_key(id)) {
                return Err(DbError::ConfigError(format!(
                    "replica {} has no handle for shard {}",
                    index, missing
                )));
            }
        }

        Ok(Self {
            master_write,
            shard_write,
            master_replicas,
            shard_replicas,
            weights,
        })
    }
}

impl<P> Topology<P> {
    pub fn master_write(&self) -> &ConnectionHandle<P> {
        &self.master_write
    }

    pub fn shard_write(&self, shard_id: ShardId) -> Option<&ConnectionHandle<P>> {
        self.shard_write.get(&shard_id)
    }

    pub fn shard_writes(&self) -> &BTreeMap<ShardId, ConnectionHandle<P>> {
        &self.shard_write
    }

    pub fn master_replica(&self, replica: usize) -> Option<&ConnectionHandle<P>> {
        self.master_replicas.get(replica)
    }

    pub fn shard_replicas(&self, replica: usize) -> Option<&BTreeMap<ShardId, ConnectionHandle<P>>> {
        self.shard_replicas.get(replica)
    }

    /// Shard ids in ascending order
    pub fn shard_ids(&self) -> impl Iterator<Item = ShardId> + '_ {
        self.shard_write.keys().copied()
    }

    pub fn shard_count(&self) -> usize {
        self.shard_write.len()
    }

    pub fn replica_count(&self) -> usize {
        self.master_replicas.len()
    }

    pub fn replica_weights(&self) -> &[u32] {
        self.weights.weights()
    }

    pub fn weight_table(&self) -> &WeightTable {
        &self.weights
    }

    /// Every handle: write side first, then each replica in order
    pub fn handles(&self) -> impl Iterator<Item = &ConnectionHandle<P>> {
        std::iter::once(&self.master_write)
            .chain(self.shard_write.values())
            .chain(
                self.master_replicas
                    .iter()
                    .zip(&self.shard_replicas)
                    .flat_map(|(master, shards)| std::iter::once(master).chain(shards.values())),
            )
    }
}

impl<P: DatabasePool> Topology<P> {
    pub fn pool_stats(&self) -> Vec<(Location, PoolStats)> {
        self.handles()
            .map(|handle| (handle.location(), handle.stats()))
            .collect()
    }
}

impl<P> std::fmt::Debug for Topology<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topology")
            .field("shards", &self.shard_write.keys().collect::<Vec<_>>())
            .field("replicas", &self.master_replicas.len())
            .field("weights", &self.weights.weights())
            .finish()
    }
}
