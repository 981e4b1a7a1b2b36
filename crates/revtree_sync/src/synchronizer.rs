//! Client sync cycle: push pending changes, then pull and reconcile.

use crate::config::SyncConfig;
use crate::conflict::ChangeCallback;
use crate::error::{SyncError, SyncResult};
use crate::reconcile::{dropped_dependency, reconcile, renumber, ReconcileOutcome};
use crate::remote::RemoteHistory;
use crate::sync_log::{SubmitOutcome, SyncLog};
use parking_lot::RwLock;
use revtree_core::{Address, Event, Executable, ExecutionResult, Identifier, ModelHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Where the synchronizer is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle has run yet.
    Idle,
    /// Submitting pending changes.
    Pushing,
    /// Fetching and reconciling the remote history.
    Pulling,
    /// The last cycle completed.
    Synced,
    /// The last cycle failed.
    Error,
    /// Waiting before the next attempt.
    RetryWait,
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Pushing | SyncState::Pulling)
    }

    /// Returns true if a new cycle may start.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Counters over the synchronizer's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed cycles.
    pub cycles_completed: u64,
    /// Changes submitted to the remote.
    pub changes_pushed: u64,
    /// Remote events replayed locally.
    pub events_pulled: u64,
    /// Pending changes confirmed by the remote.
    pub changes_confirmed: u64,
    /// Pending changes discarded.
    pub conflicts: u64,
    /// Attempts repeated after a retryable error.
    pub retries: u64,
    /// End of the last completed cycle.
    pub last_sync_time: Option<Instant>,
    /// Message of the last error.
    pub last_error: Option<String>,
}

/// Result of one sync cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// Changes submitted.
    pub pushed: u64,
    /// Remote events fetched.
    pub pulled: u64,
    /// What reconciliation did.
    pub outcome: ReconcileOutcome,
    /// Duration of the cycle.
    pub duration: Duration,
}

impl SyncCycleResult {
    /// Returns true if no pending change was discarded.
    pub fn is_clean(&self) -> bool {
        self.outcome.is_clean()
    }
}

/// Keeps one local model in step with a remote history.
///
/// Local changes go through [`execute`](Self::execute) and take effect
/// immediately. [`sync`](Self::sync) submits them, fetches what the remote
/// recorded since the last confirmed revision and reconciles.
pub struct Synchronizer<R: RemoteHistory> {
    config: SyncConfig,
    handle: Arc<ModelHandle<SyncLog>>,
    remote: Arc<R>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
}

impl<R: RemoteHistory> Synchronizer<R> {
    /// Creates a synchronizer for an existing client handle.
    pub fn new(config: SyncConfig, handle: Arc<ModelHandle<SyncLog>>, remote: Arc<R>) -> Self {
        Self {
            config,
            handle,
            remote,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Creates a synchronizer for a model the client has never seen.
    ///
    /// # Errors
    ///
    /// Returns a core error unless `model` is a model address.
    pub fn for_model(config: SyncConfig, model: Address, remote: Arc<R>) -> SyncResult<Self> {
        let handle = ModelHandle::with_event_log(model, SyncLog::new())?;
        Ok(Self::new(config, Arc::new(handle), remote))
    }

    /// Returns the local model handle.
    pub fn handle(&self) -> &Arc<ModelHandle<SyncLog>> {
        &self.handle
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Returns a copy of the stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the first local revision not confirmed by the remote.
    pub fn sync_revision(&self) -> u64 {
        self.handle.with_log(SyncLog::sync_revision)
    }

    /// Returns the number of pending local changes.
    pub fn pending_count(&self) -> usize {
        self.handle.with_log(|log| log.pending().len())
    }

    /// Stops the running cycle at its next step.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Executes a local change. The configured actor is used when `actor` is
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns core errors from the local handle.
    pub fn execute(
        &self,
        actor: Option<&Identifier>,
        change: impl Into<Executable>,
    ) -> SyncResult<ExecutionResult> {
        let actor = actor.or(self.config.actor.as_ref());
        Ok(self.handle.execute(actor, change)?)
    }

    /// Executes a local change and reports its fate to `callback` once a
    /// later cycle confirms or discards it.
    ///
    /// The callback is not kept if the change fails or changes nothing
    /// locally.
    ///
    /// # Errors
    ///
    /// Returns core errors from the local handle.
    pub fn execute_with_callback(
        &self,
        actor: Option<&Identifier>,
        change: impl Into<Executable>,
        callback: Arc<dyn ChangeCallback>,
    ) -> SyncResult<ExecutionResult> {
        let actor = actor.or(self.config.actor.as_ref());
        let change = change.into();
        let result = self.handle.write_session(|session| {
            let result = session.execute(actor, change)?;
            if let Some(revision) = result.revision() {
                session.log_mut().attach_callback(revision, callback);
            }
            Ok::<_, SyncError>(result)
        })?;
        Ok(result)
    }

    /// Reconciles against remote events fetched by the caller.
    ///
    /// Returns false if some pending change was discarded.
    ///
    /// # Errors
    ///
    /// See [`reconcile`].
    pub fn synchronize(&self, remote_events: &[Event]) -> SyncResult<bool> {
        let outcome = reconcile(&self.handle, remote_events)?;
        self.record_outcome(&outcome);
        Ok(outcome.is_clean())
    }

    /// Runs one push-then-pull cycle.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] if a cycle is already
    /// running, and the first error of the cycle otherwise. Changes submitted
    /// before an error stay marked as submitted.
    pub fn sync(&self) -> SyncResult<SyncCycleResult> {
        self.cancelled.store(false, Ordering::SeqCst);
        self.run_cycle()
    }

    /// Runs cycles until one succeeds, the error is not retryable, or the
    /// configured attempts are used up.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub fn sync_with_retry(&self) -> SyncResult<SyncCycleResult> {
        let retry = &self.config.retry;
        self.cancelled.store(false, Ordering::SeqCst);

        let mut attempt = 0;
        loop {
            if attempt > 0 {
                self.set_state(SyncState::RetryWait);
                std::thread::sleep(retry.delay_for_attempt(attempt));
                self.stats.write().retries += 1;
            }
            self.check_cancelled()?;

            match self.run_cycle() {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt + 1 < retry.attempts() => {
                    warn!(attempt, error = %e, "sync attempt failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn run_cycle(&self) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();
        {
            let mut state = self.state.write();
            if !state.can_start_sync() {
                return Err(SyncError::InvalidStateTransition {
                    from: *state,
                    to: SyncState::Pushing,
                });
            }
            *state = SyncState::Pushing;
        }

        let pushed = self.push_all().map_err(|e| self.handle_error(e))?;
        self.set_state(SyncState::Pulling);
        let (pulled, outcome) = self.pull().map_err(|e| self.handle_error(e))?;
        self.set_state(SyncState::Synced);

        self.record_outcome(&outcome);
        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.changes_pushed += pushed;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }

        let result = SyncCycleResult {
            pushed,
            pulled,
            outcome,
            duration: start.elapsed(),
        };
        debug!(
            model = %self.handle.address(),
            pushed,
            pulled,
            conflicts = result.outcome.conflicts.len(),
            "sync cycle complete"
        );
        Ok(result)
    }

    fn push_all(&self) -> SyncResult<u64> {
        let mut pushed = 0;
        loop {
            let batch: Vec<(u64, Executable, Option<Identifier>)> = self.handle.with_log(|log| {
                log.unsubmitted(self.config.push_batch_size)
                    .into_iter()
                    .map(|p| (p.revision(), p.change().clone(), p.event().actor().cloned()))
                    .collect()
            });
            if batch.is_empty() {
                return Ok(pushed);
            }

            for (revision, change, actor) in batch {
                self.check_cancelled()?;
                let (moved, unapplied) = self.handle.with_log(SyncLog::submitted_revisions);
                if let Some(depends_on) = dropped_dependency(&change, &unapplied) {
                    debug!(
                        model = %self.handle.address(),
                        revision,
                        depends_on,
                        "withholding change that depends on an unapplied change"
                    );
                    self.handle.with_log_mut(|log| {
                        log.mark_submitted(revision, SubmitOutcome::Withheld { depends_on })
                    });
                    continue;
                }
                let change = renumber(&change, &moved)?;
                let outcome = match self.remote.submit(actor.as_ref(), &change)? {
                    ExecutionResult::Applied { revision, .. } => SubmitOutcome::Applied(revision),
                    ExecutionResult::NoChange => SubmitOutcome::NoChange,
                    ExecutionResult::Failed => SubmitOutcome::Failed,
                };
                self.handle
                    .with_log_mut(|log| log.mark_submitted(revision, outcome));
                pushed += 1;
            }
        }
    }

    fn pull(&self) -> SyncResult<(u64, ReconcileOutcome)> {
        self.check_cancelled()?;
        let since = self.sync_revision();
        let events = self.remote.events_since(self.handle.address(), since)?;
        self.check_cancelled()?;
        let outcome = reconcile(&self.handle, &events)?;
        Ok((events.len() as u64, outcome))
    }

    fn record_outcome(&self, outcome: &ReconcileOutcome) {
        let mut stats = self.stats.write();
        stats.events_pulled += outcome.remote_applied as u64;
        stats.changes_confirmed += (outcome.confirmed + outcome.redundant) as u64;
        stats.conflicts += outcome.conflicts.len() as u64;
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    fn handle_error(&self, error: SyncError) -> SyncError {
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
        error
    }
}

impl<R: RemoteHistory> std::fmt::Debug for Synchronizer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("model", self.handle.address())
            .field("state", &self.state())
            .field("sync_revision", &self.sync_revision())
            .field("pending", &self.pending_count())
            .finish()
    }
}
