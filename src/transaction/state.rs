// ============================================================================
// Per-target Transaction
// ============================================================================
//
// One write transaction on one logical database. It leaves `Active` only
// once the driver confirms the commit or rollback. A driver error, or a call
// dropped before it returns, leaves it `Active` for the next attempt.
//
// ============================================================================

use crate::connection::{ConnectionHandle, DatabasePool, DriverTransaction};
use crate::core::{DbError, Location, Result, Target};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Process-unique sequence number tagging a transaction in log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    fn next() -> Self {
        TransactionId(SEQUENCE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_active(self) -> bool {
        self == TransactionState::Active
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled back",
        })
    }
}

/// A write transaction bound to one logical database
///
/// Owned exclusively by the request scope that began it.
#[derive(Debug)]
pub struct Transaction<T> {
    id: TransactionId,
    location: Location,
    database: String,
    state: TransactionState,
    inner: T,
    start_time: Instant,
}

impl<T: DriverTransaction> Transaction<T> {
    /// Begin a transaction on the given handle
    pub async fn begin<P>(handle: &ConnectionHandle<P>) -> Result<Self>
    where
        P: DatabasePool<Transaction = T>,
    {
        let location = handle.location();
        let inner = handle
            .pool()
            .begin()
            .await
            .map_err(|source| DbError::BeginError {
                target: location.target,
                source,
            })?;

        Ok(Self::from_driver(location, handle.database(), inner))
    }

    /// Wrap an already-open driver transaction
    pub fn from_driver(location: Location, database: &str, inner: T) -> Self {
        Self {
            id: TransactionId::next(),
            location,
            database: database.to_string(),
            state: TransactionState::Active,
            inner,
            start_time: Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn target(&self) -> Target {
        self.location.target
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Driver transaction for issuing statements
    ///
    /// # Errors
    /// Returns error if transaction is no longer active
    pub fn driver(&mut self) -> Result<&mut T> {
        self.ensure_active()?;
        Ok(&mut self.inner)
    }

    /// Commit; on failure the transaction stays active
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.inner
            .commit()
            .await
            .map_err(|source| DbError::CommitError {
                target: self.location.target,
                source,
            })?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Roll back; on failure the transaction stays active
    pub async fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.inner
            .rollback()
            .await
            .map_err(|source| DbError::RollbackError {
                target: self.location.target,
                source,
            })?;
        self.state = TransactionState::RolledBack;
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::TransactionClosed(self.id, self.state));
        }
        Ok(())
    }
}
