//! Local changes the remote history did not keep.

use revtree_core::{Executable, Identifier};
use std::fmt;

/// Why a pending local change was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The remote executed the change and reported a failed precondition.
    RejectedByRemote,
    /// A remote event from another client changed an entity the local
    /// change also changed.
    OverlapsRemote {
        /// Revision of the first overlapping remote event.
        remote_revision: u64,
    },
    /// The change no longer applies on top of the remote history.
    PreconditionFailed,
    /// A `Safe` precondition of the change refers to an earlier local
    /// change that was discarded or left no event of its own.
    DependsOnDiscarded {
        /// Local revision of that earlier change.
        local_revision: u64,
    },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::RejectedByRemote => write!(f, "rejected by remote"),
            ConflictReason::OverlapsRemote { remote_revision } => {
                write!(f, "overlaps remote revision {remote_revision}")
            }
            ConflictReason::PreconditionFailed => write!(f, "precondition failed after rebase"),
            ConflictReason::DependsOnDiscarded { local_revision } => {
                write!(f, "depends on discarded local revision {local_revision}")
            }
        }
    }
}

/// A pending local change discarded during reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConflict {
    /// The discarded change, as it was executed locally.
    pub change: Executable,
    /// Actor of the local change.
    pub actor: Option<Identifier>,
    /// Revision the change had in the local log.
    pub local_revision: u64,
    /// Why it was discarded.
    pub reason: ConflictReason,
}

impl fmt::Display for SyncConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "local revision {} on {} discarded: {}",
            self.local_revision,
            self.change.target(),
            self.reason
        )
    }
}

/// Receives the final fate of one local change.
///
/// Exactly one method is called, once, after the reconciliation that
/// settles the change has been committed.
pub trait ChangeCallback: Send + Sync {
    /// The remote history contains the change. `remote_revision` is `None`
    /// when the remote already was in the resulting state and recorded no
    /// event for it.
    fn on_confirmed(&self, remote_revision: Option<u64>);

    /// The change was discarded.
    fn on_rejected(&self, conflict: &SyncConflict);
}
