/// Immutable weight table for replica selection
///
/// Conceptually replica `i` occupies `weight_i` consecutive slots of a
/// virtual sequence of length `total`; the table stores the cumulative
/// upper bound of each replica's run instead of materializing the slots.
/// Zero-weight replicas occupy no slots and can never be picked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeightTable {
    weights: Vec<u32>,
    cumulative: Vec<u64>,
    total: u64,
}

impl WeightTable {
    pub fn new(weights: Vec<u32>) -> Self {
        let mut cumulative = Vec::with_capacity(weights.len());
        let mut total = 0u64;
        for weight in &weights {
            total += u64::from(*weight);
            cumulative.push(total);
        }

        Self {
            weights,
            cumulative,
            total,
        }
    }

    /// Number of replicas, including zero-weight ones
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &[u32] {
        &self.weights
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Whether at least one replica can be selected
    pub fn is_selectable(&self) -> bool {
        self.total > 0
    }

    /// Replica owning slot `position` of the virtual sequence
    ///
    /// Returns `None` when `position >= total`.
    pub fn index_at(&self, position: u64) -> Option<usize> {
        if position >= self.total {
            return None;
        }
        Some(self.cumulative.partition_point(|bound| *bound <= position))
    }

    /// Exact selection probability of each replica
    pub fn probabilities(&self) -> Vec<f64> {
        self.weights
            .iter()
            .map(|w| {
                if self.total == 0 {
                    0.0
                } else {
                    f64::from(*w) / self.total as f64
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_at_matches_flattened_sequence() {
        let table = WeightTable::new(vec![2, 0, 3, 1]);
        let flattened: Vec<usize> = (0..table.total())
            .map(|p| table.index_at(p).unwrap())
            .collect();

        assert_eq!(flattened, vec![0, 0, 2, 2, 2, 3]);
        assert_eq!(table.index_at(6), None);
    }

    #[test]
    fn test_empty_and_zero_tables() {
        let empty = WeightTable::new(vec![]);
        assert!(empty.is_empty());
        assert!(!empty.is_selectable());
        assert_eq!(empty.index_at(0), None);

        let zeros = WeightTable::new(vec![0, 0]);
        assert_eq!(zeros.len(), 2);
        assert!(!zeros.is_selectable());
    }

    #[test]
    fn test_probabilities() {
        let table = WeightTable::new(vec![1, 3, 0]);
        assert_eq!(table.probabilities(), vec![0.25, 0.75, 0.0]);
    }
}
