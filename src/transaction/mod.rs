// ============================================================================
// Transaction Coordination
// ============================================================================
//
// Per-request begin/commit/rollback across the master and every shard.
//
// ============================================================================

pub mod outcome;
pub mod scope;
pub mod state;

pub use outcome::{Completion, CompletionReport, TargetOutcome};
pub use scope::RequestScope;
pub use state::{Transaction, TransactionId, TransactionState};
