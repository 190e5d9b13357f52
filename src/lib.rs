// ============================================================================
// Shardgate Library
// ============================================================================
//
// Data-access core for a sharded, replicated backend: one write master,
// N shards, and weighted read replicas mirroring both. Builds the handle
// topology once, picks a replica per request, and coordinates the
// request's transactions across the master and every shard.
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod facade;
pub mod replica;
pub mod routing;
pub mod topology;
pub mod transaction;

// Re-export main types for convenience
pub use core::{DatabaseNaming, DbError, DriverError, Location, Mode, Result, ShardId, Side, Target};
pub use facade::Database;

pub use connection::{
    ConnectionHandle, Connector, DatabasePool, DriverTransaction, PoolStats,
    config::ConnectionConfig,
    memory::{Fault, MemoryConnector, MemoryDatabase, MemoryPool, MemoryTransaction},
};
pub use replica::{RandomSource, ReplicaSelector, ScriptedRandom, SeededRandom, ThreadRandom, WeightTable};
pub use topology::{
    Credentials, HostConfig, PoolConfig, ReplicaConfig, Topology, TopologyBuilder,
    TopologyConfig, build_topology,
};
pub use transaction::{
    Completion, CompletionReport, RequestScope, TargetOutcome, Transaction, TransactionId,
    TransactionState,
};
