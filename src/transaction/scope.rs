// ============================================================================
// Request Scope (Transaction Coordinator)
// ============================================================================
//
// Owns every write transaction opened while serving one inbound request.
//
//   master:  NotStarted ──begin──> Open ──commit/rollback──> Closed
//   shards:  NotStarted ──begin all──> Open ──commit/rollback──> Closed
//
// Shards are begun all at once: a request moving data between two shards
// needs both transactions open before either commits. If any shard fails
// to begin, the ones already begun are rolled back before the error is
// returned, so the scope never holds a partial shard set.
//
// Commit and rollback are best effort per target and report every outcome.
// Rollback with nothing open is a no-op, so callers can run it on every
// exit path.
//
// ============================================================================

use super::outcome::{Completion, CompletionReport, TargetOutcome};
use super::state::Transaction;
use crate::connection::{ConnectionHandle, DatabasePool};
use crate::core::{DbError, Mode, Result, ShardId, Target};
use crate::topology::Topology;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

type Tx<P> = Transaction<<P as DatabasePool>::Transaction>;

/// Transaction and replica state owned by one inbound request
pub struct RequestScope<P: DatabasePool> {
    id: Uuid,
    topology: Arc<Topology<P>>,
    selected_replica: Option<usize>,
    master_tx: Option<Tx<P>>,
    shard_tx: BTreeMap<ShardId, Tx<P>>,
    master_tx_started: bool,
    shard_tx_started: bool,
}

impl<P: DatabasePool> RequestScope<P> {
    /// Create a scope bound to the topology
    ///
    /// `selected_replica` is fixed for the lifetime of the scope; every
    /// read-mode lookup goes to the same replica.
    pub fn new(topology: Arc<Topology<P>>, selected_replica: Option<usize>) -> Self {
        Self {
            id: Uuid::new_v4(),
            topology,
            selected_replica,
            master_tx: None,
            shard_tx: BTreeMap::new(),
            master_tx_started: false,
            shard_tx_started: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topology(&self) -> &Arc<Topology<P>> {
        &self.topology
    }

    pub fn selected_replica(&self) -> Option<usize> {
        self.selected_replica
    }

    pub fn master_tx_started(&self) -> bool {
        self.master_tx_started
    }

    pub fn shard_tx_started(&self) -> bool {
        self.shard_tx_started
    }

    /// Targets that currently hold an open transaction
    pub fn open_targets(&self) -> Vec<Target> {
        let master = self.master_tx.as_ref().map(|_| Target::Master);
        master
            .into_iter()
            .chain(self.shard_tx.keys().map(|id| Target::Shard(*id)))
            .collect()
    }

    pub fn has_open_transactions(&self) -> bool {
        self.master_tx.is_some() || !self.shard_tx.is_empty()
    }

    // ------------------------------------------------------------------
    // Begin
    // ------------------------------------------------------------------

    /// Begin the master transaction unless already started
    ///
    /// On failure the scope stays not-started so the begin can be retried.
    pub async fn master_begin(&mut self) -> Result<()> {
        if self.master_tx_started {
            return Ok(());
        }

        let tx = Transaction::begin(self.topology.master_write()).await?;
        debug!(scope = %self.id, txn = %tx.id(), target = %Target::Master, "transaction started");

        self.master_tx = Some(tx);
        self.master_tx_started = true;
        Ok(())
    }

    /// Begin a transaction on every shard, all or nothing
    pub async fn shard_begin_all(&mut self) -> Result<()> {
        if self.shard_tx_started {
            return Ok(());
        }

        let mut begun: BTreeMap<ShardId, Tx<P>> = BTreeMap::new();
        for (shard_id, handle) in self.topology.shard_writes() {
            match Transaction::begin(handle).await {
                Ok(tx) => {
                    debug!(scope = %self.id, txn = %tx.id(), target = %Target::Shard(*shard_id), "transaction started");
                    begun.insert(*shard_id, tx);
                }
                Err(err) => {
                    warn!(
                        scope = %self.id,
                        target = %Target::Shard(*shard_id),
                        error = %err,
                        rolling_back = begun.len(),
                        "shard begin failed"
                    );
                    let cleanup = Self::discard(self.id, begun).await;
                    if cleanup.is_success() {
                        return Err(err);
                    }
                    return Err(DbError::BeginAborted {
                        cause: Box::new(err),
                        cleanup,
                    });
                }
            }
        }

        self.shard_tx = begun;
        self.shard_tx_started = true;
        Ok(())
    }

    /// Roll back transactions begun by a failed begin-all
    ///
    /// Transactions whose rollback fails are still dropped; the driver
    /// releases their connections.
    async fn discard(scope: Uuid, begun: BTreeMap<ShardId, Tx<P>>) -> CompletionReport {
        let mut report = CompletionReport::new(Completion::Rollback);
        for (shard_id, mut tx) in begun {
            let target = Target::Shard(shard_id);
            match tx.rollback().await {
                Ok(()) => report.record(target, TargetOutcome::RolledBack),
                Err(err) => {
                    warn!(scope = %scope, target = %target, error = %err, "cleanup rollback failed");
                    report.record(target, TargetOutcome::Failed(err));
                }
            }
        }
        report
    }

    // ------------------------------------------------------------------
    // Commit / Rollback
    // ------------------------------------------------------------------

    /// Commit the master transaction, then every open shard transaction
    ///
    /// Each target is attempted regardless of the others. Committed
    /// transactions leave the scope; failed ones stay open for rollback.
    pub async fn commit(&mut self) -> Result<CompletionReport> {
        self.finish(Completion::Commit).await
    }

    /// Roll back whatever is open; a no-op when nothing is
    pub async fn rollback(&mut self) -> Result<CompletionReport> {
        self.finish(Completion::Rollback).await
    }

    async fn finish(&mut self, kind: Completion) -> Result<CompletionReport> {
        let mut report = CompletionReport::new(kind);

        // Transactions stay in the scope until their call succeeds, so a
        // cancelled commit or rollback leaves them reachable for cleanup.
        match self.master_tx.as_mut() {
            Some(tx) => match Self::finish_one(tx, kind).await {
                Ok(outcome) => {
                    debug!(scope = %self.id, txn = %tx.id(), target = %Target::Master, "transaction {}", kind);
                    self.master_tx = None;
                    self.master_tx_started = false;
                    report.record(Target::Master, outcome);
                }
                Err(err) => {
                    warn!(scope = %self.id, target = %Target::Master, error = %err, "{} failed", kind);
                    report.record(Target::Master, TargetOutcome::Failed(err));
                }
            },
            None => report.record(Target::Master, TargetOutcome::NotOpen),
        }

        let shard_ids: Vec<ShardId> = self.topology.shard_ids().collect();
        for shard_id in shard_ids {
            let target = Target::Shard(shard_id);
            let Some(tx) = self.shard_tx.get_mut(&shard_id) else {
                report.record(target, TargetOutcome::NotOpen);
                continue;
            };

            match Self::finish_one(tx, kind).await {
                Ok(outcome) => {
                    debug!(scope = %self.id, txn = %tx.id(), target = %target, "transaction {}", kind);
                    self.shard_tx.remove(&shard_id);
                    report.record(target, outcome);
                }
                Err(err) => {
                    warn!(scope = %self.id, target = %target, error = %err, "{} failed", kind);
                    report.record(target, TargetOutcome::Failed(err));
                }
            }
        }

        if self.shard_tx.is_empty() {
            self.shard_tx_started = false;
        }

        report.into_result()
    }

    async fn finish_one(tx: &mut Tx<P>, kind: Completion) -> Result<TargetOutcome> {
        match kind {
            Completion::Commit => tx.commit().await.map(|_| TargetOutcome::Committed),
            Completion::Rollback => tx.rollback().await.map(|_| TargetOutcome::RolledBack),
        }
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Open transaction for the target, beginning it first if needed
    ///
    /// Asking for any shard begins all shards; later lookups for other
    /// shards reuse those transactions.
    pub async fn transaction(&mut self, target: Target) -> Result<&mut Tx<P>> {
        match target {
            Target::Master => {
                if !self.master_tx_started {
                    self.master_begin().await?;
                }
                self.master_tx
                    .as_mut()
                    .ok_or(DbError::TransactionNotFound(target))
            }
            Target::Shard(shard_id) => {
                if !self.shard_tx_started {
                    self.shard_begin_all().await?;
                }
                self.shard_tx
                    .get_mut(&shard_id)
                    .ok_or(DbError::TransactionNotFound(target))
            }
        }
    }

    /// Connection handle for the mode using this request's replica
    pub fn connection(&self, mode: Mode, target: Target) -> Result<&ConnectionHandle<P>> {
        let replica = match mode {
            Mode::Read => self.selected_replica.ok_or(DbError::NoReplicaAvailable)?,
            Mode::Write | Mode::Backup => self.selected_replica.unwrap_or(0),
        };
        self.topology.resolve(mode, target, replica)
    }

    /// Whole shard map for the mode using this request's replica
    pub fn shard_map(&self, mode: Mode) -> Result<&BTreeMap<ShardId, ConnectionHandle<P>>> {
        let replica = match mode {
            Mode::Read => self.selected_replica.ok_or(DbError::NoReplicaAvailable)?,
            Mode::Write | Mode::Backup => self.selected_replica.unwrap_or(0),
        };
        self.topology.shard_map(mode, replica)
    }
}

impl<P: DatabasePool> Drop for RequestScope<P> {
    fn drop(&mut self) {
        if self.has_open_transactions() {
            warn!(
                scope = %self.id,
                open = ?self.open_targets(),
                "RequestScope dropped with open transactions; rollback was not called"
            );
        }
    }
}
