// ============================================================================
// Connection Router
// ============================================================================
//
// Resolves (mode, target, replica index) to a handle in the topology.
// Write ignores the replica index. Read goes to the given replica's mirror.
// Backup is reserved and always rejected, never answered by fallback.
//
// ============================================================================

use crate::connection::ConnectionHandle;
use crate::core::{DbError, Mode, Result, ShardId, Target};
use crate::topology::Topology;
use std::collections::BTreeMap;

impl<P> Topology<P> {
    /// Resolve a logical database handle
    ///
    /// # Errors
    /// - `UnsupportedMode` for [`Mode::Backup`]
    /// - `ConnectionNotFound` for an unknown shard or replica index
    pub fn resolve(&self, mode: Mode, target: Target, replica: usize) -> Result<&ConnectionHandle<P>> {
        match target {
            Target::Master => match mode {
                Mode::Write => Ok(self.master_write()),
                Mode::Read => self.master_replica(replica).ok_or_else(|| {
                    DbError::ConnectionNotFound(format!("replica {} has no master mirror", replica))
                }),
                Mode::Backup => Err(DbError::UnsupportedMode(mode)),
            },
            Target::Shard(shard_id) => {
                let shards = self.shard_map(mode, replica)?;
                shards.get(&shard_id).ok_or_else(|| {
                    DbError::ConnectionNotFound(format!("{} ({} side)", target, mode))
                })
            }
        }
    }

    /// Resolve with a mode code such as `"W"`, `"R"` or `"BAK"`
    pub fn resolve_str(&self, mode: &str, target: Target, replica: usize) -> Result<&ConnectionHandle<P>> {
        self.resolve(mode.parse()?, target, replica)
    }

    /// Shard id to handle map for the mode
    pub fn shard_map(&self, mode: Mode, replica: usize) -> Result<&BTreeMap<ShardId, ConnectionHandle<P>>> {
        match mode {
            Mode::Write => Ok(self.shard_writes()),
            Mode::Read => self.shard_replicas(replica).ok_or_else(|| {
                DbError::ConnectionNotFound(format!("replica {} has no shard mirrors", replica))
            }),
            Mode::Backup => Err(DbError::UnsupportedMode(mode)),
        }
    }
}
