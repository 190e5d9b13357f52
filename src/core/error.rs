use super::types::{Location, Mode, Target};
use crate::transaction::{CompletionReport, TransactionId, TransactionState};
use thiserror::Error;

/// Error type produced by database drivers behind the [`crate::connection`] traits.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to connect {location} ({database}): {source}")]
    ConnectError {
        location: Location,
        database: String,
        #[source]
        source: DriverError,
    },

    #[error("Failed to begin transaction on {target}: {source}")]
    BeginError {
        target: Target,
        #[source]
        source: DriverError,
    },

    #[error("Failed to commit transaction on {target}: {source}")]
    CommitError {
        target: Target,
        #[source]
        source: DriverError,
    },

    #[error("Failed to rollback transaction on {target}: {source}")]
    RollbackError {
        target: Target,
        #[source]
        source: DriverError,
    },

    /// A shard failed to begin and rolling back the shards already begun
    /// also failed; the partial set was dropped, not kept open.
    #[error("{cause}; cleanup incomplete: {cleanup}")]
    BeginAborted {
        #[source]
        cause: Box<DbError>,
        cleanup: CompletionReport,
    },

    #[error("Commit incomplete: {0}")]
    IncompleteCommit(CompletionReport),

    #[error("Rollback incomplete: {0}")]
    IncompleteRollback(CompletionReport),

    #[error("Transaction not found for {0}")]
    TransactionNotFound(Target),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Invalid mode '{0}'")]
    InvalidMode(String),

    #[error("Mode {0} is not supported")]
    UnsupportedMode(Mode),

    #[error("No replica available for selection")]
    NoReplicaAvailable,

    #[error("Transaction {0} is already {1}")]
    TransactionClosed(TransactionId, TransactionState),
}

impl DbError {
    /// Startup errors stop the process from serving; everything else is per request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DbError::ConfigError(_) | DbError::ConnectError { .. })
    }

    /// Only a failed begin is worth retrying the whole request for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::BeginError { .. })
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
