/// Replica selection tests
///
/// Weighted selection frequencies and per-request caching
/// Run with: cargo test --test selector_tests

use shardgate::{
    Database, MemoryConnector, Mode, ReplicaSelector, SeededRandom, Target, TopologyConfig,
    WeightTable, build_topology,
};

fn frequencies(weights: Vec<u32>, draws: usize, seed: u64) -> Vec<f64> {
    let table = WeightTable::new(weights);
    let selector = ReplicaSelector::with_source(SeededRandom::new(seed));

    let mut counts = vec![0usize; table.len()];
    for _ in 0..draws {
        counts[selector.select(&table).unwrap()] += 1;
    }
    counts.iter().map(|c| *c as f64 / draws as f64).collect()
}

#[test]
fn test_frequencies_converge_to_weights() {
    let weights = vec![1, 3, 0, 6];
    let expected = WeightTable::new(weights.clone()).probabilities();
    let observed = frequencies(weights, 100_000, 42);

    for (i, (o, e)) in observed.iter().zip(&expected).enumerate() {
        assert!((o - e).abs() < 0.01, "replica {}: observed {} expected {}", i, o, e);
    }
    assert_eq!(observed[2], 0.0);
}

#[test]
fn test_single_weighted_replica_always_selected() {
    let observed = frequencies(vec![0, 0, 5], 1_000, 7);
    assert_eq!(observed, vec![0.0, 0.0, 1.0]);
}

#[test]
fn test_thread_random_respects_zero_weights() {
    let table = WeightTable::new(vec![4, 0, 4]);
    let selector = ReplicaSelector::new();

    for _ in 0..10_000 {
        assert_ne!(selector.select(&table).unwrap(), 1);
    }
}

#[test]
fn test_concurrent_selection() {
    let table = WeightTable::new(vec![1, 1]);
    let selector = ReplicaSelector::with_source(SeededRandom::new(3));

    let counts: Vec<usize> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                s.spawn(|| {
                    (0..5_000)
                        .filter(|_| selector.select(&table).unwrap() == 0)
                        .count()
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    let share = counts.iter().sum::<usize>() as f64 / 20_000.0;
    assert!((share - 0.5).abs() < 0.02, "share {}", share);
}

#[tokio::test]
async fn test_request_keeps_one_replica() {
    let config = TopologyConfig::new("game", "secret", "primary", 3306)
        .shard_count(2)
        .replica("replica-a", 3306, 1)
        .replica("replica-b", 3306, 1)
        .replica("replica-c", 3306, 1);
    let topology = build_topology(&config, &MemoryConnector::new()).await.unwrap();
    let db = Database::with_selector(topology, ReplicaSelector::with_source(SeededRandom::new(11)));

    for _ in 0..20 {
        let scope = db.begin_request();
        let replica = scope.selected_replica().unwrap();

        for target in [Target::Master, Target::Shard(1), Target::Shard(2)] {
            let handle = scope.connection(Mode::Read, target).unwrap();
            assert_eq!(handle.location(), shardgate::Location::replica(replica, target));
        }
    }
}
