use super::weights::WeightTable;
use crate::core::{DbError, Result};
use crate::topology::Topology;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Uniform random draws shared by concurrent requests.
pub trait RandomSource: Send + Sync {
    /// Uniform value in `[0, bound)`; `bound` is always > 0
    fn below(&self, bound: u64) -> u64;
}

/// Thread-local generator per draw; no shared state between workers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn below(&self, bound: u64) -> u64 {
        rand::thread_rng().gen_range(0..bound)
    }
}

/// Reproducible generator for tests and simulations
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn below(&self, bound: u64) -> u64 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..bound)
    }
}

/// Replays a fixed list of positions (modulo the bound), cycling.
#[derive(Debug)]
pub struct ScriptedRandom {
    positions: Vec<u64>,
    next: AtomicUsize,
}

impl ScriptedRandom {
    pub fn new(positions: Vec<u64>) -> Self {
        Self {
            positions,
            next: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn below(&self, bound: u64) -> u64 {
        if self.positions.is_empty() {
            return 0;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.positions.len();
        self.positions[i] % bound
    }
}

/// Picks a replica with probability proportional to its weight
///
/// Draws are independent per call. Callers select once per request and
/// keep the index for the rest of it.
#[derive(Debug, Default)]
pub struct ReplicaSelector<R = ThreadRandom> {
    source: R,
}

impl ReplicaSelector<ThreadRandom> {
    pub fn new() -> Self {
        Self {
            source: ThreadRandom,
        }
    }
}

impl<R: RandomSource> ReplicaSelector<R> {
    pub fn with_source(source: R) -> Self {
        Self { source }
    }

    /// Select a replica index from the weight table
    ///
    /// # Errors
    /// `NoReplicaAvailable` when the table is empty or every weight is zero
    pub fn select(&self, table: &WeightTable) -> Result<usize> {
        if !table.is_selectable() {
            return Err(DbError::NoReplicaAvailable);
        }
        let position = self.source.below(table.total());
        table.index_at(position).ok_or(DbError::NoReplicaAvailable)
    }

    pub fn select_replica<P>(&self, topology: &Topology<P>) -> Result<usize> {
        self.select(topology.weight_table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_positions_map_to_replicas() {
        let selector = ReplicaSelector::with_source(ScriptedRandom::new(vec![0, 1, 2, 3]));
        let table = WeightTable::new(vec![1, 0, 3]);

        let picks: Vec<usize> = (0..4).map(|_| selector.select(&table).unwrap()).collect();
        assert_eq!(picks, vec![0, 2, 2, 2]);
    }

    #[test]
    fn test_no_replicas_is_an_error() {
        let selector = ReplicaSelector::new();
        assert!(matches!(
            selector.select(&WeightTable::new(vec![])),
            Err(DbError::NoReplicaAvailable)
        ));
        assert!(selector.select(&WeightTable::new(vec![0, 0])).is_err());
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let table = WeightTable::new(vec![5, 1, 4]);
        let a = ReplicaSelector::with_source(SeededRandom::new(42));
        let b = ReplicaSelector::with_source(SeededRandom::new(42));

        let picks_a: Vec<usize> = (0..100).map(|_| a.select(&table).unwrap()).collect();
        let picks_b: Vec<usize> = (0..100).map(|_| b.select(&table).unwrap()).collect();
        assert_eq!(picks_a, picks_b);
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let selector = ReplicaSelector::new();
        let table = WeightTable::new(vec![0, 2, 0, 1]);

        for _ in 0..5_000 {
            let picked = selector.select(&table).unwrap();
            assert!(picked == 1 || picked == 3);
        }
    }
}
