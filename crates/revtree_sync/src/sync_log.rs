//! Change log that tracks what the remote has confirmed.

use crate::conflict::ChangeCallback;
use revtree_core::{ChangeLog, CoreError, CoreResult, Event, EventLog, Executable};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// What the remote answered when a pending change was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The remote committed the change at this revision.
    Applied(u64),
    /// The remote was already in the resulting state.
    NoChange,
    /// A precondition failed on the remote.
    Failed,
    /// Never sent: a `Safe` precondition refers to the local revision of an
    /// earlier pending change the remote did not apply.
    Withheld {
        /// Local revision of that earlier change.
        depends_on: u64,
    },
}

impl SubmitOutcome {
    /// Returns true if the remote committed the change.
    #[must_use]
    pub fn is_applied(self) -> bool {
        matches!(self, SubmitOutcome::Applied(_))
    }
}

/// A local change the remote has not confirmed yet.
#[derive(Clone)]
pub struct PendingChange {
    change: Executable,
    event: Event,
    submitted: Option<SubmitOutcome>,
    callback: Option<Arc<dyn ChangeCallback>>,
}

impl PendingChange {
    /// Returns the change as it was executed.
    #[must_use]
    pub fn change(&self) -> &Executable {
        &self.change
    }

    /// Returns the event the change produced locally.
    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Returns the local revision of the change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.event.revision()
    }

    /// Returns the remote's answer, if the change was submitted.
    #[must_use]
    pub fn submitted(&self) -> Option<SubmitOutcome> {
        self.submitted
    }

    pub(crate) fn callback(&self) -> Option<&Arc<dyn ChangeCallback>> {
        self.callback.as_ref()
    }
}

impl fmt::Debug for PendingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingChange")
            .field("revision", &self.revision())
            .field("target", self.change.target())
            .field("submitted", &self.submitted)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Event log of a synchronized model.
///
/// Revisions below [`sync_revision`](Self::sync_revision) are identical to
/// the remote history and can no longer be truncated. Every locally executed
/// change at or above it stays pending until reconciliation confirms or
/// discards it. Replayed events are never pending.
#[derive(Debug, Clone, Default)]
pub struct SyncLog {
    log: ChangeLog,
    sync_revision: u64,
    pending: Vec<PendingChange>,
}

impl SyncLog {
    /// Creates an empty log with nothing synchronized yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a log whose every event is known to match the remote.
    #[must_use]
    pub fn synced(log: ChangeLog) -> Self {
        Self {
            sync_revision: log.current_revision(),
            log,
            pending: Vec::new(),
        }
    }

    /// Returns the first revision not yet confirmed by the remote.
    #[must_use]
    pub fn sync_revision(&self) -> u64 {
        self.sync_revision
    }

    /// Returns the pending changes in log order.
    #[must_use]
    pub fn pending(&self) -> &[PendingChange] {
        &self.pending
    }

    /// Returns true if some local change awaits confirmation.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Returns up to `limit` pending changes that were never submitted.
    #[must_use]
    pub fn unsubmitted(&self, limit: usize) -> Vec<&PendingChange> {
        self.pending
            .iter()
            .filter(|p| p.submitted.is_none())
            .take(limit)
            .collect()
    }

    /// Attaches `callback` to the pending change at `revision`.
    ///
    /// Returns false if no pending change has that revision.
    pub fn attach_callback(&mut self, revision: u64, callback: Arc<dyn ChangeCallback>) -> bool {
        match self.pending_mut(revision) {
            Some(pending) => {
                pending.callback = Some(callback);
                true
            }
            None => false,
        }
    }

    /// Records the remote's answer to the pending change at `revision`.
    ///
    /// Returns false if no pending change has that revision.
    pub fn mark_submitted(&mut self, revision: u64, outcome: SubmitOutcome) -> bool {
        match self.pending_mut(revision) {
            Some(pending) => {
                pending.submitted = Some(outcome);
                true
            }
            None => false,
        }
    }

    /// Splits the submitted pending changes into those the remote
    /// committed, as local to remote revision, and the local revisions of
    /// those it did not.
    #[must_use]
    pub fn submitted_revisions(&self) -> (BTreeMap<u64, u64>, BTreeSet<u64>) {
        let mut applied = BTreeMap::new();
        let mut unapplied = BTreeSet::new();
        for pending in &self.pending {
            match pending.submitted {
                Some(SubmitOutcome::Applied(remote)) => {
                    applied.insert(pending.revision(), remote);
                }
                Some(_) => {
                    unapplied.insert(pending.revision());
                }
                None => {}
            }
        }
        (applied, unapplied)
    }

    pub(crate) fn take_pending(&mut self) -> Vec<PendingChange> {
        std::mem::take(&mut self.pending)
    }

    /// Moves the submission state and callback of `from` onto the pending
    /// change that re-executed it at `revision`.
    pub(crate) fn carry_over(&mut self, revision: u64, from: PendingChange) {
        if let Some(pending) = self.pending_mut(revision) {
            pending.submitted = from.submitted;
            pending.callback = from.callback;
        }
    }

    pub(crate) fn confirm_through(&mut self, revision: u64) {
        self.sync_revision = self.sync_revision.max(revision);
    }

    fn pending_mut(&mut self, revision: u64) -> Option<&mut PendingChange> {
        self.pending.iter_mut().find(|p| p.revision() == revision)
    }
}

impl EventLog for SyncLog {
    fn change_log(&self) -> &ChangeLog {
        &self.log
    }

    fn record(&mut self, executed: Option<&Executable>, event: Event) -> CoreResult<()> {
        let pending = executed.map(|change| PendingChange {
            change: change.clone(),
            event: event.clone(),
            submitted: None,
            callback: None,
        });
        self.log.append(event)?;
        self.pending.extend(pending);
        Ok(())
    }

    fn truncate_from(&mut self, revision: u64) -> CoreResult<Vec<Event>> {
        if revision < self.sync_revision {
            return Err(CoreError::invalid_operation(format!(
                "revision {revision} is confirmed by the remote (synced up to {})",
                self.sync_revision
            )));
        }
        let discarded = self.log.truncate_from(revision)?;
        self.pending.retain(|p| p.revision() < revision);
        Ok(discarded)
    }
}
