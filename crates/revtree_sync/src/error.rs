//! Error types for synchronization.

use crate::synchronizer::SyncState;
use revtree_core::CoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a sync cycle.
///
/// Conflicting local changes are not errors; they are reported in the
/// cycle's outcome.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote could not be reached or failed to answer.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the request can be retried.
        retryable: bool,
    },

    /// The remote returned a history that does not continue the local one.
    #[error("remote history starts at revision {actual}, expected {expected}")]
    HistoryGap {
        /// First revision the client asked for.
        expected: u64,
        /// Revision the remote answered with.
        actual: u64,
    },

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// A cycle was started while the synchronizer could not accept one.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: SyncState,
        /// Attempted state.
        to: SyncState,
    },

    /// The local model or log refused an operation.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the failed cycle can be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::HistoryGap { .. } => true,
            _ => false,
        }
    }
}
