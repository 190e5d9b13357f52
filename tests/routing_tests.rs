/// Connection routing tests
///
/// Resolving (mode, target, replica) against a built topology
/// Run with: cargo test --test routing_tests

use shardgate::{
    DbError, Location, MemoryConnector, MemoryPool, Mode, Side, Target, Topology, TopologyConfig,
    build_topology,
};

async fn topology(replicas: &[(&str, u32)]) -> Topology<MemoryPool> {
    let mut config = TopologyConfig::new("game", "secret", "primary", 3306).shard_count(2);
    for (host, weight) in replicas {
        config = config.replica(host, 3306, *weight);
    }
    build_topology(&config, &MemoryConnector::new()).await.unwrap()
}

#[tokio::test]
async fn test_read_and_write_shard_handles() {
    // 1 master + 2 shards + 1 replica of weight 1
    let topology = topology(&[("replica", 1)]).await;

    let read = topology.resolve(Mode::Read, Target::Shard(2), 0).unwrap();
    assert_eq!(read.location(), Location::replica(0, Target::Shard(2)));
    assert_eq!(read.database(), "game_shard_2");
    assert_eq!(read.pool().database().address(), "replica:3306/game_shard_2");

    let write = topology.resolve(Mode::Write, Target::Shard(2), 0).unwrap();
    assert_eq!(write.location(), Location::primary(Target::Shard(2)));
    assert_eq!(write.pool().database().address(), "primary:3306/game_shard_2");

    let write_other_index = topology.resolve(Mode::Write, Target::Shard(2), 7).unwrap();
    assert!(write.same_pool(write_other_index));
    assert!(!write.same_pool(read));
}

#[tokio::test]
async fn test_backup_mode_never_falls_back() {
    let topology = topology(&[("replica", 1)]).await;

    for target in [Target::Master, Target::Shard(1)] {
        match topology.resolve(Mode::Backup, target, 0) {
            Err(DbError::UnsupportedMode(Mode::Backup)) => {}
            other => panic!("expected UnsupportedMode for {}, got {:?}", target, other),
        }
    }
}

#[tokio::test]
async fn test_invalid_mode_string() {
    let topology = topology(&[("replica", 1)]).await;

    assert!(matches!(
        topology.resolve_str("SLAVE", Target::Master, 0),
        Err(DbError::InvalidMode(mode)) if mode == "SLAVE"
    ));
    let read = topology.resolve_str("R", Target::Master, 0).unwrap();
    assert_eq!(read.location().side, Side::Replica(0));
}

#[tokio::test]
async fn test_replica_index_out_of_range() {
    let topology = topology(&[("replica-a", 1), ("replica-b", 2)]).await;

    assert!(topology.resolve(Mode::Read, Target::Shard(1), 1).is_ok());
    assert!(matches!(
        topology.resolve(Mode::Read, Target::Shard(1), 2),
        Err(DbError::ConnectionNotFound(_))
    ));
    assert!(matches!(
        topology.resolve(Mode::Read, Target::Master, 2),
        Err(DbError::ConnectionNotFound(_))
    ));
}

#[tokio::test]
async fn test_shard_map_by_mode() {
    let topology = topology(&[("replica-a", 1), ("replica-b", 2)]).await;

    let writes = topology.shard_map(Mode::Write, 0).unwrap();
    assert_eq!(writes.keys().copied().collect::<Vec<_>>(), vec![1, 2]);

    let mirrors = topology.shard_map(Mode::Read, 1).unwrap();
    for (id, handle) in mirrors {
        assert_eq!(handle.location(), Location::replica(1, Target::Shard(*id)));
    }
}
