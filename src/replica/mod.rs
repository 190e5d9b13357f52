// ============================================================================
// Replica Selection
// ============================================================================

pub mod selector;
pub mod weights;

pub use selector::{RandomSource, ReplicaSelector, ScriptedRandom, SeededRandom, ThreadRandom};
pub use weights::WeightTable;
