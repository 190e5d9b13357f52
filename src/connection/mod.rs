// ============================================================================
// Connection Factory
// ============================================================================
//
// The seam between the coordinator and a concrete database driver.
// A `Connector` opens one pooled handle per physical database; the pool
// hands out transactions. Pools must support concurrent checkout: every
// request shares the same handles.
//
// ============================================================================

pub mod config;
pub mod memory;

use crate::core::{DriverError, Location};
use async_trait::async_trait;
use config::ConnectionConfig;
use std::fmt;
use std::sync::Arc;

/// Opens pooled handles to physical databases.
#[async_trait]
pub trait Connector: Send + Sync {
    type Pool: DatabasePool;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Pool, DriverError>;
}

/// A thread-safe pool for one physical database.
#[async_trait]
pub trait DatabasePool: Send + Sync + 'static {
    type Transaction: DriverTransaction;

    /// Check out a connection and start a transaction on it
    async fn begin(&self) -> Result<Self::Transaction, DriverError>;

    fn stats(&self) -> PoolStats;
}

/// One open driver-level transaction.
#[async_trait]
pub trait DriverTransaction: Send + 'static {
    async fn commit(&mut self) -> Result<(), DriverError>;

    async fn rollback(&mut self) -> Result<(), DriverError>;
}

/// Connection pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// Shared handle to one logical database in the topology
///
/// Cloning is cheap; all clones point at the same pool.
pub struct ConnectionHandle<P> {
    location: Location,
    database: String,
    redacted_url: String,
    pool: Arc<P>,
}

impl<P: DatabasePool> ConnectionHandle<P> {
    pub fn new(location: Location, config: &ConnectionConfig, pool: P) -> Self {
        Self {
            location,
            database: config.database.clone(),
            redacted_url: config.redacted_url(),
            pool: Arc::new(pool),
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// Logical database name
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn redacted_url(&self) -> &str {
        &self.redacted_url
    }

    /// Underlying driver pool, for repositories issuing statements
    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Whether both handles share the same pool
    pub fn same_pool(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pool, &other.pool)
    }
}

impl<P> Clone for ConnectionHandle<P> {
    fn clone(&self) -> Self {
        Self {
            location: self.location,
            database: self.database.clone(),
            redacted_url: self.redacted_url.clone(),
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<P> fmt::Debug for ConnectionHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("location", &self.location)
            .field("database", &self.database)
            .field("url", &self.redacted_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_display() {
        let stats = PoolStats {
            total_connections: 4,
            available_connections: 3,
            active_connections: 1,
            max_connections: 10,
        };
        assert_eq!(
            stats.to_string(),
            "Pool Stats: 1/4 active, 3 available, max 10"
        );
    }
}
