use crate::connection::{ConnectionHandle, Connector, DatabasePool};
use crate::core::{Mode, Result, Target};
use crate::replica::{RandomSource, ReplicaSelector, ThreadRandom};
use crate::topology::{Topology, TopologyConfig, build_topology};
use crate::transaction::RequestScope;
use std::sync::Arc;
use tracing::debug;

/// Process-wide entry point: the topology plus the replica selector
///
/// Built once at startup and shared by every request worker.
///
/// # Examples
///
/// ```
/// use shardgate::{Database, MemoryConnector, Target, TopologyConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> shardgate::Result<()> {
/// let config = TopologyConfig::new("game", "secret", "db-primary", 3306)
///     .shard_count(2)
///     .replica("db-replica-1", 3306, 1);
/// let db = Database::connect(&config, &MemoryConnector::new()).await?;
///
/// let mut scope = db.begin_request();
/// scope.transaction(Target::Shard(2)).await?;
/// scope.commit().await?;
/// scope.rollback().await?;
/// # Ok(())
/// # }
/// ```
pub struct Database<P, R = ThreadRandom> {
    topology: Arc<Topology<P>>,
    selector: ReplicaSelector<R>,
}

impl<P: DatabasePool> Database<P, ThreadRandom> {
    /// Build the topology and use the thread-local random source
    pub async fn connect<C>(config: &TopologyConfig, connector: &C) -> Result<Self>
    where
        C: Connector<Pool = P>,
    {
        let topology = build_topology(config, connector).await?;
        Ok(Self::new(topology))
    }

    pub fn new(topology: Topology<P>) -> Self {
        Self::with_selector(topology, ReplicaSelector::new())
    }
}

impl<P: DatabasePool, R: RandomSource> Database<P, R> {
    pub fn with_selector(topology: Topology<P>, selector: ReplicaSelector<R>) -> Self {
        Self {
            topology: Arc::new(topology),
            selector,
        }
    }

    pub fn topology(&self) -> &Arc<Topology<P>> {
        &self.topology
    }

    /// Draw a replica index; fails when no replica is selectable
    pub fn select_replica(&self) -> Result<usize> {
        self.selector.select_replica(&self.topology)
    }

    /// Open the state for one inbound request
    ///
    /// The replica is chosen here, once. A topology without replicas
    /// yields a scope that can only use write-mode handles.
    pub fn begin_request(&self) -> RequestScope<P> {
        let replica = self.select_replica().ok();
        let scope = RequestScope::new(Arc::clone(&self.topology), replica);
        debug!(scope = %scope.id(), replica = ?replica, "request scope opened");
        scope
    }

    pub fn connection(&self, mode: Mode, target: Target, replica: usize) -> Result<&ConnectionHandle<P>> {
        self.topology.resolve(mode, target, replica)
    }
}
