use crate::core::{DbError, Target};
use std::fmt;

/// Which terminal transition a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Commit,
    Rollback,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Commit => write!(f, "commit"),
            Completion::Rollback => write!(f, "rollback"),
        }
    }
}

/// Result of finishing one target.
#[derive(Debug)]
pub enum TargetOutcome {
    Committed,
    RolledBack,
    /// The transaction is still open and can be retried or rolled back
    Failed(DbError),
    /// No transaction was open for the target
    NotOpen,
}

impl TargetOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TargetOutcome::Failed(_))
    }
}

/// Per-target outcomes of a commit or rollback across the whole scope
///
/// Master first, then shards in ascending id order. Every failure observed
/// is kept; nothing is overwritten by a later success.
#[derive(Debug)]
pub struct CompletionReport {
    kind: Completion,
    outcomes: Vec<(Target, TargetOutcome)>,
}

impl CompletionReport {
    pub(crate) fn new(kind: Completion) -> Self {
        Self {
            kind,
            outcomes: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, target: Target, outcome: TargetOutcome) {
        self.outcomes.push((target, outcome));
    }

    pub fn kind(&self) -> Completion {
        self.kind
    }

    pub fn outcomes(&self) -> &[(Target, TargetOutcome)] {
        &self.outcomes
    }

    pub fn outcome(&self, target: Target) -> Option<&TargetOutcome> {
        self.outcomes
            .iter()
            .find(|(t, _)| *t == target)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = (Target, &DbError)> {
        self.outcomes.iter().filter_map(|(target, outcome)| match outcome {
            TargetOutcome::Failed(err) => Some((*target, err)),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        !self.outcomes.iter().any(|(_, outcome)| outcome.is_failure())
    }

    /// Targets that reached the terminal state in this call
    pub fn completed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| {
                matches!(outcome, TargetOutcome::Committed | TargetOutcome::RolledBack)
            })
            .count()
    }

    /// True when nothing was open, so no database call was made
    pub fn is_noop(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| matches!(outcome, TargetOutcome::NotOpen))
    }

    pub(crate) fn into_result(self) -> crate::core::Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(match self.kind {
            Completion::Commit => DbError::IncompleteCommit(self),
            Completion::Rollback => DbError::IncompleteRollback(self),
        })
    }
}

impl fmt::Display for CompletionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed: Vec<String> = self
            .failures()
            .map(|(target, err)| format!("{}: {}", target, err))
            .collect();
        write!(
            f,
            "{} of {} target(s) completed {}",
            self.completed(),
            self.outcomes.len(),
            self.kind
        )?;
        if !failed.is_empty() {
            write!(f, "; failed [{}]", failed.join("; "))?;
        }
        Ok(())
    }
}
