//! Execution engine: precondition checks, event generation and commit.

mod executor;

pub(crate) use executor::{prepare, Prepared};

use crate::event::Event;

/// Outcome of executing a command or transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// A precondition did not hold. Nothing changed.
    Failed,
    /// Every command was a no-op. Nothing changed.
    NoChange,
    /// The change was committed.
    Applied {
        /// Revision the change was committed at.
        revision: u64,
        /// The logged event.
        event: Event,
    },
}

impl ExecutionResult {
    /// Numeric code reported for [`ExecutionResult::Failed`].
    pub const FAILED: i64 = -1;

    /// Numeric code reported for [`ExecutionResult::NoChange`].
    pub const NO_CHANGE: i64 = -2;

    /// Returns the committed revision, or one of the negative sentinel codes.
    #[must_use]
    pub fn code(&self) -> i64 {
        match self {
            ExecutionResult::Failed => Self::FAILED,
            ExecutionResult::NoChange => Self::NO_CHANGE,
            ExecutionResult::Applied { revision, .. } => i64::try_from(*revision).unwrap_or(i64::MAX),
        }
    }

    /// Returns true if the change was committed.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, ExecutionResult::Applied { .. })
    }

    /// Returns true if a precondition failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, ExecutionResult::Failed)
    }

    /// Returns the committed revision.
    #[must_use]
    pub fn revision(&self) -> Option<u64> {
        match self {
            ExecutionResult::Applied { revision, .. } => Some(*revision),
            _ => None,
        }
    }

    /// Returns the committed event.
    #[must_use]
    pub fn event(&self) -> Option<&Event> {
        match self {
            ExecutionResult::Applied { event, .. } => Some(event),
            _ => None,
        }
    }
}
