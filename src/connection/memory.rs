// ============================================================================
// In-memory driver
// ============================================================================
//
// A process-local stand-in for a real database driver. Every physical
// database is identified by its `host:port/database` address and keeps
// counters for connects, begins, commits and rollbacks. Faults can be
// injected per database to exercise the coordinator's error paths, and
// any operation can be made to stall to exercise cancellation.
//
// Checkout is bounded by a semaphore sized to `max_connections`; a
// transaction holds its permit until it is committed, rolled back or dropped.
//
// ============================================================================

use super::config::ConnectionConfig;
use super::{Connector, DatabasePool, DriverTransaction, PoolStats};
use crate::core::DriverError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Operation that can be made to fail on a [`MemoryDatabase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Connect,
    Begin,
    Commit,
    Rollback,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Connect => write!(f, "connect"),
            Fault::Begin => write!(f, "begin"),
            Fault::Commit => write!(f, "commit"),
            Fault::Rollback => write!(f, "rollback"),
        }
    }
}

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Injected {operation} failure on {address}")]
    Injected { operation: Fault, address: String },

    #[error("Connection pool timeout: no connections available for {0}")]
    PoolTimeout(String),

    #[error("Invalid connection config: {0}")]
    InvalidConfig(String),

    #[error("Transaction {0} already finished")]
    Finished(u64),
}

/// Counters and fault switches for one physical database
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    address: String,
    connects: AtomicU64,
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    open: AtomicUsize,
    next_txn_id: AtomicU64,
    fail_connect: AtomicBool,
    fail_begin: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
    latency: Mutex<HashMap<Fault, Duration>>,
}

impl MemoryDatabase {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            ..Self::default()
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of transactions successfully begun
    pub fn begins(&self) -> u64 {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Transactions begun but not yet committed, rolled back or dropped
    pub fn open_transactions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn inject(&self, fault: Fault) {
        self.switch(fault).store(true, Ordering::SeqCst);
    }

    pub fn clear(&self, fault: Fault) {
        self.switch(fault).store(false, Ordering::SeqCst);
    }

    /// Make `operation` sleep for `duration` before it runs
    pub fn delay(&self, operation: Fault, duration: Duration) {
        self.latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation, duration);
    }

    async fn pause(&self, operation: Fault) {
        let delay = self
            .latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&operation)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn switch(&self, fault: Fault) -> &AtomicBool {
        match fault {
            Fault::Connect => &self.fail_connect,
            Fault::Begin => &self.fail_begin,
            Fault::Commit => &self.fail_commit,
            Fault::Rollback => &self.fail_rollback,
        }
    }

    fn check(&self, fault: Fault) -> Result<(), MemoryError> {
        if self.switch(fault).load(Ordering::SeqCst) {
            return Err(MemoryError::Injected {
                operation: fault,
                address: self.address.clone(),
            });
        }
        Ok(())
    }
}

/// Connector creating in-memory pools
///
/// Clones share the same set of databases, so a test can keep one clone to
/// inspect counters while the topology builder uses another.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    databases: Arc<Mutex<HashMap<String, Arc<MemoryDatabase>>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or register) the database at `host:port/database`
    pub fn database(&self, address: &str) -> Arc<MemoryDatabase> {
        let mut databases = self
            .databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            databases
                .entry(address.to_string())
                .or_insert_with(|| Arc::new(MemoryDatabase::new(address))),
        )
    }

    /// All databases registered so far, sorted by address
    pub fn databases(&self) -> Vec<Arc<MemoryDatabase>> {
        let databases = self
            .databases
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<_> = databases.values().cloned().collect();
        all.sort_by(|a, b| a.address.cmp(&b.address));
        all
    }

    /// Sum of begins across every database
    pub fn total_begins(&self) -> u64 {
        self.databases().iter().map(|db| db.begins()).sum()
    }

    pub fn total_open_transactions(&self) -> usize {
        self.databases().iter().map(|db| db.open_transactions()).sum()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Pool = MemoryPool;

    async fn connect(&self, config: &ConnectionConfig) -> Result<MemoryPool, DriverError> {
        config.validate().map_err(MemoryError::InvalidConfig)?;

        let database = self.database(&config.address());
        database.pause(Fault::Connect).await;
        database.check(Fault::Connect)?;
        database.connects.fetch_add(1, Ordering::SeqCst);

        Ok(MemoryPool {
            database,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
            connect_timeout: config.connect_timeout,
        })
    }
}

/// Semaphore-bounded pool over one [`MemoryDatabase`]
#[derive(Debug)]
pub struct MemoryPool {
    database: Arc<MemoryDatabase>,
    permits: Arc<Semaphore>,
    max_connections: usize,
    connect_timeout: Duration,
}

impl MemoryPool {
    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.database
    }

    async fn checkout(&self) -> Result<OwnedSemaphorePermit, MemoryError> {
        let acquire = Arc::clone(&self.permits).acquire_owned();
        match tokio::time::timeout(self.connect_timeout, acquire).await {
            Ok(Ok(permit)) => Ok(permit),
            _ => Err(MemoryError::PoolTimeout(self.database.address.clone())),
        }
    }
}

#[async_trait]
impl DatabasePool for MemoryPool {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, DriverError> {
        let permit = self.checkout().await?;
        self.database.pause(Fault::Begin).await;
        self.database.check(Fault::Begin)?;

        self.database.begins.fetch_add(1, Ordering::SeqCst);
        self.database.open.fetch_add(1, Ordering::SeqCst);
        let id = self.database.next_txn_id.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(MemoryTransaction {
            id,
            database: Arc::clone(&self.database),
            permit: Some(permit),
        })
    }

    fn stats(&self) -> PoolStats {
        let available = self.permits.available_permits();
        PoolStats {
            total_connections: self.max_connections,
            available_connections: available,
            active_connections: self.max_connections.saturating_sub(available),
            max_connections: self.max_connections,
        }
    }
}

/// Transaction holding one pool permit until it finishes
#[derive(Debug)]
pub struct MemoryTransaction {
    id: u64,
    database: Arc<MemoryDatabase>,
    permit: Option<OwnedSemaphorePermit>,
}

impl MemoryTransaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.database
    }

    pub fn is_open(&self) -> bool {
        self.permit.is_some()
    }

    fn ensure_open(&self) -> Result<(), MemoryError> {
        if self.permit.is_none() {
            return Err(MemoryError::Finished(self.id));
        }
        Ok(())
    }

    fn finish(&mut self) {
        if self.permit.take().is_some() {
            self.database.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl DriverTransaction for MemoryTransaction {
    async fn commit(&mut self) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.database.pause(Fault::Commit).await;
        self.database.check(Fault::Commit)?;
        self.database.commits.fetch_add(1, Ordering::SeqCst);
        self.finish();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.ensure_open()?;
        self.database.pause(Fault::Rollback).await;
        self.database.check(Fault::Rollback)?;
        self.database.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.finish();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(database: &str) -> ConnectionConfig {
        ConnectionConfig::new("game", "secret")
            .host("primary")
            .database(database)
            .max_connections(2)
            .connect_timeout(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_connect_registers_database() {
        let connector = MemoryConnector::new();
        let pool = connector.connect(&config("game_master")).await.unwrap();

        assert_eq!(pool.database().address(), "primary:3306/game_master");
        assert_eq!(connector.database("primary:3306/game_master").connects(), 1);
    }

    #[tokio::test]
    async fn test_injected_connect_failure() {
        let connector = MemoryConnector::new();
        connector
            .database("primary:3306/game_master")
            .inject(Fault::Connect);

        let err = connector.connect(&config("game_master")).await.unwrap_err();
        assert!(err.to_string().contains("connect"));
    }

    #[tokio::test]
    async fn test_transaction_lifecycle_counters() {
        let connector = MemoryConnector::new();
        let pool = connector.connect(&config("game_shard_1")).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        assert_eq!(pool.database().open_transactions(), 1);
        assert_eq!(pool.stats().active_connections, 1);

        tx.commit().await.unwrap();
        assert_eq!(pool.database().commits(), 1);
        assert_eq!(pool.database().open_transactions(), 0);
        assert_eq!(pool.stats().available_connections, 2);

        // Finished transactions reject further work
        assert!(tx.rollback().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_transaction_open() {
        let connector = MemoryConnector::new();
        let pool = connector.connect(&config("game_shard_1")).await.unwrap();
        pool.database().inject(Fault::Commit);

        let mut tx = pool.begin().await.unwrap();
        assert!(tx.commit().await.is_err());
        assert!(tx.is_open());

        tx.rollback().await.unwrap();
        assert_eq!(pool.database().rollbacks(), 1);
        assert!(!tx.is_open());
    }

    #[tokio::test]
    async fn test_pool_exhaustion_times_out() {
        let connector = MemoryConnector::new();
        let pool = connector.connect(&config("game_master")).await.unwrap();

        let _tx1 = pool.begin().await.unwrap();
        let _tx2 = pool.begin().await.unwrap();

        let result = pool.begin().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delayed_commit_can_be_cancelled() {
        let connector = MemoryConnector::new();
        let pool = connector.connect(&config("game_master")).await.unwrap();
        pool.database().delay(Fault::Commit, Duration::from_secs(5));

        let mut tx = pool.begin().await.unwrap();
        let cancelled = tokio::time::timeout(Duration::from_millis(20), tx.commit()).await;

        assert!(cancelled.is_err());
        assert!(tx.is_open());
        assert_eq!(pool.database().commits(), 0);

        tx.rollback().await.unwrap();
        assert_eq!(pool.database().open_transactions(), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_returns_permit() {
        let connector = MemoryConnector::new();
        let pool = connector.connect(&config("game_master")).await.unwrap();

        {
            let _tx = pool.begin().await.unwrap();
            assert_eq!(pool.stats().active_connections, 1);
        }

        assert_eq!(pool.stats().active_connections, 0);
        assert_eq!(pool.database().open_transactions(), 0);
    }
}
