use super::Command;
use anyhow::{Context, Result, bail};
use shardgate::{
    Database, Location, MemoryConnector, MemoryPool, RandomSource, ReplicaSelector, SeededRandom,
    Target, ThreadRandom, TopologyConfig, build_topology,
};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::info;

pub async fn run(command: Command) -> Result<()> {
    match command {
        Command::Plan { config } => plan(&load(&config)?),
        Command::Simulate {
            config,
            requests,
            concurrency,
            seed,
        } => {
            let config = load(&config)?;
            let connector = MemoryConnector::new();
            let topology = build_topology(&config, &connector)
                .await
                .context("failed to build topology")?;

            match seed {
                Some(seed) => {
                    let selector = ReplicaSelector::with_source(SeededRandom::new(seed));
                    let db = Arc::new(Database::with_selector(topology, selector));
                    simulate(&config, db, &connector, requests, concurrency).await
                }
                None => {
                    let selector = ReplicaSelector::with_source(ThreadRandom);
                    let db = Arc::new(Database::with_selector(topology, selector));
                    simulate(&config, db, &connector, requests, concurrency).await
                }
            }
        }
    }
}

fn load(path: &Path) -> Result<TopologyConfig> {
    let config = TopologyConfig::from_path(path)?;
    config
        .validate()
        .with_context(|| format!("invalid topology in {}", path.display()))?;
    Ok(config)
}

fn plan(config: &TopologyConfig) -> Result<()> {
    let shard_ids = config.shard_ids();
    let targets: Vec<Target> = std::iter::once(Target::Master)
        .chain(shard_ids.iter().map(|id| Target::Shard(*id)))
        .collect();

    println!("Write side ({}:{})", config.master.host, config.master.port);
    for target in &targets {
        let conn = config.connection_config(&config.master.host, config.master.port, *target);
        println!("  {:<20} {}", Location::primary(*target), conn.redacted_url());
    }

    let total: u64 = config.replicas.iter().map(|r| u64::from(r.weight)).sum();
    for (index, replica) in config.replicas.iter().enumerate() {
        let share = if total == 0 {
            0.0
        } else {
            f64::from(replica.weight) * 100.0 / total as f64
        };
        println!(
            "Replica {} ({}:{}) weight {} -> {:.1}% of requests",
            index, replica.host, replica.port, replica.weight, share
        );
        for target in &targets {
            let conn = config.connection_config(&replica.host, replica.port, *target);
            println!("  {:<20} {}", Location::replica(index, *target), conn.redacted_url());
        }
    }
    Ok(())
}

async fn simulate<R>(
    config: &TopologyConfig,
    db: Arc<Database<MemoryPool, R>>,
    connector: &MemoryConnector,
    requests: usize,
    concurrency: usize,
) -> Result<()>
where
    R: RandomSource + 'static,
{
    if concurrency == 0 {
        bail!("concurrency must be > 0");
    }

    let shard_ids = config.shard_ids();
    let mut workers = JoinSet::new();
    for worker in 0..concurrency {
        let db = Arc::clone(&db);
        let shard_ids = shard_ids.clone();
        let share = requests / concurrency + usize::from(worker < requests % concurrency);

        workers.spawn(async move {
            let mut picks = Vec::with_capacity(share);
            for i in 0..share {
                let mut scope = db.begin_request();
                picks.push(scope.selected_replica());

                let outcome = async {
                    scope.transaction(Target::Master).await?;
                    if !shard_ids.is_empty() {
                        let shard = shard_ids[(worker + i) % shard_ids.len()];
                        scope.transaction(Target::Shard(shard)).await?;
                    }
                    scope.commit().await
                }
                .await;
                // Cleanup runs on every path, success included.
                let cleanup = scope.rollback().await;

                outcome?;
                cleanup?;
            }
            Ok::<_, shardgate::DbError>(picks)
        });
    }

    let mut counts = vec![0u64; db.topology().replica_count()];
    let mut write_only = 0u64;
    while let Some(joined) = workers.join_next().await {
        for pick in joined.context("worker panicked")?? {
            match pick {
                Some(index) => counts[index] += 1,
                None => write_only += 1,
            }
        }
    }

    info!(requests, concurrency, "simulation finished");

    let expected = db.topology().weight_table().probabilities();
    for (index, count) in counts.iter().enumerate() {
        let observed = if requests == 0 {
            0.0
        } else {
            *count as f64 * 100.0 / requests as f64
        };
        println!(
            "replica {}: {} requests ({:.1}%, expected {:.1}%)",
            index,
            count,
            observed,
            expected[index] * 100.0
        );
    }
    if write_only > 0 {
        println!("without replica: {} requests", write_only);
    }

    println!(
        "begins {}, still open {}",
        connector.total_begins(),
        connector.total_open_transactions()
    );
    for (location, stats) in db.topology().pool_stats() {
        println!("  {:<20} {}", location, stats);
    }
    Ok(())
}
