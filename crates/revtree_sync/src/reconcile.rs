//! Rebasing pending local changes onto the remote history.

use crate::conflict::{ChangeCallback, ConflictReason, SyncConflict};
use crate::error::{SyncError, SyncResult};
use crate::sync_log::{PendingChange, SubmitOutcome, SyncLog};
use revtree_core::{
    CoreResult, Event, Executable, ExecutionResult, ModelHandle, Precondition, Readable,
    WriteSession,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// What one reconciliation did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// Remote events replayed onto the local model.
    pub remote_applied: usize,
    /// Pending changes found in the remote history.
    pub confirmed: usize,
    /// Pending changes whose result the remote already had.
    pub redundant: usize,
    /// Pending changes executed again on top of the remote events. They stay
    /// pending.
    pub reapplied: usize,
    /// Pending changes that were discarded.
    pub conflicts: Vec<SyncConflict>,
}

impl ReconcileOutcome {
    /// Returns true if no pending change was discarded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

enum Notice {
    Confirmed(Option<u64>),
    Rejected(SyncConflict),
}

/// Makes the local history of `handle` continue the remote history.
///
/// `remote_events` are the remote events at and after the handle's sync
/// revision, in order. The local log is rolled back to the sync revision,
/// the remote events are replayed, and every pending change is settled:
///
/// - a pending change the remote history contains is confirmed;
/// - a pending change that collides with a remote event from elsewhere, or
///   that the remote rejected, is discarded;
/// - a pending change with a `Safe` precondition on an earlier pending change
///   that was discarded or redundant is discarded too;
/// - every other pending change is executed again after the remote events,
///   with `Safe` preconditions on earlier pending changes moved to those
///   changes' new revisions. If it no longer applies it is discarded.
///
/// Callbacks attached to settled changes run after the new state is
/// committed. Nothing changes if an error is returned.
///
/// # Errors
///
/// Returns [`SyncError::HistoryGap`] if `remote_events` do not start at the
/// sync revision or skip a revision, and core errors from replaying them.
pub fn reconcile(
    handle: &ModelHandle<SyncLog>,
    remote_events: &[Event],
) -> SyncResult<ReconcileOutcome> {
    let mut notices = Vec::new();
    let outcome = handle.write_session(|session| rebase(session, remote_events, &mut notices))?;

    for (callback, notice) in notices {
        match notice {
            Notice::Confirmed(revision) => callback.on_confirmed(revision),
            Notice::Rejected(conflict) => callback.on_rejected(&conflict),
        }
    }
    Ok(outcome)
}

fn rebase(
    session: &mut WriteSession<'_, SyncLog>,
    remote: &[Event],
    notices: &mut Vec<(Arc<dyn ChangeCallback>, Notice)>,
) -> SyncResult<ReconcileOutcome> {
    let base = session.log().sync_revision();
    check_contiguous(base, remote)?;

    let mut outcome = ReconcileOutcome::default();
    let nothing_submitted = session.log().pending().iter().all(|p| p.submitted().is_none());
    if remote.is_empty() && nothing_submitted {
        return Ok(outcome);
    }

    let pending = session.log_mut().take_pending();
    let claims = claim_remote_events(base, &pending, remote);
    let claimed: BTreeSet<u64> = claims.iter().flatten().copied().collect();
    let foreign: Vec<&Event> = remote
        .iter()
        .filter(|e| !claimed.contains(&e.revision()))
        .collect();

    session.rollback_from(base)?;
    for event in remote {
        session.apply_event(event)?;
    }
    outcome.remote_applied = remote.len();
    let synced = session.next_revision();
    session.log_mut().confirm_through(synced);

    let mut renumbered = BTreeMap::new();
    let mut dropped = BTreeSet::new();
    for (entry, claim) in pending.into_iter().zip(claims) {
        let local = entry.revision();
        if let Some(remote_revision) = claim {
            renumbered.insert(local, remote_revision);
            outcome.confirmed += 1;
            push_notice(notices, &entry, Notice::Confirmed(Some(remote_revision)));
            continue;
        }

        let reason = match entry.submitted() {
            Some(SubmitOutcome::NoChange) => {
                dropped.insert(local);
                outcome.redundant += 1;
                push_notice(notices, &entry, Notice::Confirmed(None));
                continue;
            }
            Some(SubmitOutcome::Failed) => Some(ConflictReason::RejectedByRemote),
            Some(SubmitOutcome::Withheld { depends_on }) => {
                Some(ConflictReason::DependsOnDiscarded {
                    local_revision: depends_on,
                })
            }
            _ => dropped_dependency(entry.change(), &dropped)
                .map(|local_revision| ConflictReason::DependsOnDiscarded { local_revision })
                .or_else(|| {
                    foreign
                        .iter()
                        .find(|remote_event| collides(remote_event, entry.event()))
                        .map(|remote_event| ConflictReason::OverlapsRemote {
                            remote_revision: remote_event.revision(),
                        })
                }),
        };
        if let Some(reason) = reason {
            dropped.insert(local);
            discard(&mut outcome, notices, entry, reason);
            continue;
        }

        let change = renumber(entry.change(), &renumbered)?;
        let actor = entry.event().actor().cloned();
        match session.execute(actor.as_ref(), change)? {
            ExecutionResult::Applied { revision, .. } => {
                renumbered.insert(local, revision);
                session.log_mut().carry_over(revision, entry);
                outcome.reapplied += 1;
            }
            ExecutionResult::NoChange => {
                dropped.insert(local);
                outcome.redundant += 1;
                push_notice(notices, &entry, Notice::Confirmed(None));
            }
            ExecutionResult::Failed => {
                dropped.insert(local);
                discard(&mut outcome, notices, entry, ConflictReason::PreconditionFailed);
            }
        }
    }

    debug!(
        model = %session.model().address(),
        sync_revision = synced,
        remote = outcome.remote_applied,
        confirmed = outcome.confirmed,
        reapplied = outcome.reapplied,
        conflicts = outcome.conflicts.len(),
        "reconciled"
    );
    Ok(outcome)
}

fn check_contiguous(base: u64, remote: &[Event]) -> SyncResult<()> {
    let mut expected = base;
    for event in remote {
        if event.revision() != expected {
            return Err(SyncError::HistoryGap {
                expected,
                actual: event.revision(),
            });
        }
        expected += 1;
    }
    Ok(())
}

/// For each pending change, the remote revision that holds it, if any.
///
/// A submitted change is held by the remote event at the revision the remote
/// reported. An unsubmitted change is held by a remote event at its own
/// local revision with the same effect.
fn claim_remote_events(base: u64, pending: &[PendingChange], remote: &[Event]) -> Vec<Option<u64>> {
    let mut taken = BTreeSet::new();
    pending
        .iter()
        .map(|entry| {
            let position = match entry.submitted() {
                Some(SubmitOutcome::Applied(revision)) => revision,
                None => entry.revision(),
                Some(_) => return None,
            };
            let remote_event = position
                .checked_sub(base)
                .and_then(|offset| usize::try_from(offset).ok())
                .and_then(|offset| remote.get(offset))?;
            let holds = entry.submitted().is_some() || remote_event.same_change(entry.event());
            (holds && taken.insert(position)).then_some(position)
        })
        .collect()
}

fn collides(remote: &Event, local: &Event) -> bool {
    local
        .atomic_events()
        .iter()
        .any(|atomic| remote.touches(&atomic.changed))
}

/// The first local revision in `dropped` that a `Safe` precondition of
/// `change` refers to.
///
/// Such a precondition names a change that has no event of its own, so it
/// can never hold and must not reach the remote with its local revision.
pub(crate) fn dropped_dependency(change: &Executable, dropped: &BTreeSet<u64>) -> Option<u64> {
    change
        .commands()
        .iter()
        .find_map(|command| match command.precondition() {
            Precondition::Safe(revision) if dropped.contains(&revision) => Some(revision),
            _ => None,
        })
}

/// Rewrites `Safe` preconditions on revisions that moved.
pub(crate) fn renumber(change: &Executable, moved: &BTreeMap<u64, u64>) -> CoreResult<Executable> {
    change.try_map_commands(|command| {
        Ok(match command.precondition() {
            Precondition::Safe(revision) => match moved.get(&revision) {
                Some(&new) => command.clone().with_precondition(Precondition::Safe(new)),
                None => command.clone(),
            },
            _ => command.clone(),
        })
    })
}

fn push_notice(
    notices: &mut Vec<(Arc<dyn ChangeCallback>, Notice)>,
    entry: &PendingChange,
    notice: Notice,
) {
    if let Some(callback) = entry.callback() {
        notices.push((Arc::clone(callback), notice));
    }
}

fn discard(
    outcome: &mut ReconcileOutcome,
    notices: &mut Vec<(Arc<dyn ChangeCallback>, Notice)>,
    entry: PendingChange,
    reason: ConflictReason,
) {
    let conflict = SyncConflict {
        change: entry.change().clone(),
        actor: entry.event().actor().cloned(),
        local_revision: entry.revision(),
        reason,
    };
    warn!(
        revision = conflict.local_revision,
        target = %conflict.change.target(),
        %reason,
        "discarding pending change"
    );
    push_notice(notices, &entry, Notice::Rejected(conflict.clone()));
    outcome.conflicts.push(conflict);
}
