//! Single-writer owner of one model and its event log.

use crate::address::{Address, Identifier};
use crate::change_log::{ChangeLog, EventLog};
use crate::engine::{prepare, ExecutionResult, Prepared};
use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::listener::{EventListener, ListenerId, ListenerRegistry};
use crate::transaction::Executable;
use crate::tree::{apply_event, undo_event, Model, Readable};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::debug;

struct ModelState<L> {
    model: Arc<Model>,
    log: L,
}

/// Owns a model, its event log and the listeners notified on commit.
///
/// Writers are serialized by an internal lock. Readers take snapshots
/// (`Arc<Model>`) that always reflect a fully committed revision and are
/// never blocked by an execution in progress, except for the instant the
/// new state is swapped in.
///
/// Listeners run after the commit, once every lock is released, so they may
/// read from or execute against the same handle.
pub struct ModelHandle<L: EventLog = ChangeLog> {
    address: Address,
    state: RwLock<ModelState<L>>,
    write_lock: Mutex<()>,
    listeners: Arc<ListenerRegistry>,
}

impl ModelHandle<ChangeLog> {
    /// Creates a handle for a model that does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedAddress`] unless `address` is a model
    /// address.
    pub fn new(address: Address) -> CoreResult<Self> {
        Self::with_event_log(address, ChangeLog::new())
    }
}

impl<L: EventLog> ModelHandle<L> {
    /// Creates a handle by replaying every event of `log` onto a fresh model.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the log does not start at
    /// revision 0, and any replay error.
    pub fn with_event_log(address: Address, log: L) -> CoreResult<Self> {
        let mut model = Model::new(address)?;
        let change_log = log.change_log();
        if change_log.base_revision() != 0 {
            return Err(CoreError::invalid_operation(format!(
                "log of {} starts at revision {}, a snapshot is needed",
                model.address(),
                change_log.base_revision()
            )));
        }
        for event in change_log {
            apply_event(&mut model, event)?;
        }
        Self::from_snapshot(model, log)
    }

    /// Creates a handle from a model snapshot and the log continuing it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RevisionMismatch`] if the log's next revision does
    /// not follow the snapshot's revision.
    pub fn from_snapshot(model: Model, log: L) -> CoreResult<Self> {
        let fresh = !model.exists() && model.revision() == 0;
        let expected = if fresh { 0 } else { model.revision() + 1 };
        let actual = log.change_log().current_revision();
        if actual != expected {
            return Err(CoreError::RevisionMismatch { expected, actual });
        }
        Ok(Self {
            address: model.address().clone(),
            state: RwLock::new(ModelState {
                model: Arc::new(model),
                log,
            }),
            write_lock: Mutex::new(()),
            listeners: Arc::new(ListenerRegistry::default()),
        })
    }

    /// Shares `listeners` with this handle instead of its private registry.
    #[must_use]
    pub fn with_listener_registry(mut self, listeners: Arc<ListenerRegistry>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Returns the model address.
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Returns the last committed state.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Model> {
        Arc::clone(&self.state.read().model)
    }

    /// Returns the model revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.state.read().model.revision()
    }

    /// Returns the revision the next commit will carry.
    #[must_use]
    pub fn next_revision(&self) -> u64 {
        self.state.read().log.change_log().current_revision()
    }

    /// Returns true if the model currently exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.state.read().model.exists()
    }

    /// Returns copies of the logged events at or after `revision`.
    #[must_use]
    pub fn events_since(&self, revision: u64) -> Vec<Event> {
        self.state
            .read()
            .log
            .change_log()
            .events_since(revision)
            .cloned()
            .collect()
    }

    /// Runs `f` with shared access to the event log.
    pub fn with_log<R>(&self, f: impl FnOnce(&L) -> R) -> R {
        f(&self.state.read().log)
    }

    /// Runs `f` with exclusive access to the event log, serialized with
    /// writers.
    pub fn with_log_mut<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        let _guard = self.write_lock.lock();
        f(&mut self.state.write().log)
    }

    /// Returns the listener registry notified by this handle.
    #[must_use]
    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    /// Registers a listener for events at or below `address`.
    pub fn register_listener(
        &self,
        address: Address,
        listener: impl EventListener + 'static,
    ) -> ListenerId {
        self.listeners.register(address, listener)
    }

    /// Removes a listener.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    /// Executes a command or transaction.
    ///
    /// Precondition failures are reported as [`ExecutionResult::Failed`] and
    /// leave the model untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AddressMismatch`] if the change addresses another
    /// model, and log errors.
    pub fn execute(
        &self,
        actor: Option<&Identifier>,
        change: impl Into<Executable>,
    ) -> CoreResult<ExecutionResult> {
        let change = change.into();
        let guard = self.write_lock.lock();
        let (model, revision) = {
            let state = self.state.read();
            (
                Arc::clone(&state.model),
                state.log.change_log().current_revision(),
            )
        };

        let result = match prepare(&model, &change, actor, revision)? {
            Prepared::Failed => ExecutionResult::Failed,
            Prepared::NoChange => ExecutionResult::NoChange,
            Prepared::Commit { model, event } => {
                let mut state = self.state.write();
                state.log.record(Some(&change), event.clone())?;
                state.model = Arc::new(model);
                debug!(model = %self.address, revision, "committed change");
                ExecutionResult::Applied { revision, event }
            }
        };
        drop(guard);

        if let ExecutionResult::Applied { event, .. } = &result {
            self.listeners.notify(event);
        }
        Ok(result)
    }

    /// Replays an event committed elsewhere, such as on a remote.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RevisionMismatch`] unless the event carries the
    /// next revision, and any replay error. The model is unchanged on error.
    pub fn apply_event(&self, event: &Event) -> CoreResult<()> {
        let guard = self.write_lock.lock();
        {
            let mut state = self.state.write();
            let expected = state.log.change_log().current_revision();
            if event.revision() != expected {
                return Err(CoreError::RevisionMismatch {
                    expected,
                    actual: event.revision(),
                });
            }
            let mut model = Model::clone(&state.model);
            apply_event(&mut model, event)?;
            state.log.record(None, event.clone())?;
            state.model = Arc::new(model);
        }
        drop(guard);

        debug!(model = %self.address, revision = event.revision(), "replayed event");
        self.listeners.notify(event);
        Ok(())
    }

    /// Undoes and discards every logged event at or after `revision`.
    ///
    /// Listeners are not notified. Returns the discarded events in log order.
    ///
    /// # Errors
    ///
    /// Returns the log's error if it refuses the truncation, and any undo
    /// error. The model is unchanged on error.
    pub fn rollback_from(&self, revision: u64) -> CoreResult<Vec<Event>> {
        let _guard = self.write_lock.lock();
        let mut state = self.state.write();
        let mut model = Model::clone(&state.model);
        {
            let undone: Vec<&Event> = state.log.change_log().events_since(revision).collect();
            for event in undone.into_iter().rev() {
                undo_event(&mut model, event)?;
            }
        }
        let discarded = state.log.truncate_from(revision)?;
        state.model = Arc::new(model);
        debug!(
            model = %self.address,
            revision,
            discarded = discarded.len(),
            "rolled back"
        );
        Ok(discarded)
    }
}

impl<L: EventLog + Clone> ModelHandle<L> {
    /// Runs several writes as one unit with other writers excluded.
    ///
    /// `f` works on a private copy of the model and log. If it returns `Ok`
    /// the copy replaces the committed state and listeners see every event
    /// the session executed or replayed, in order. If it returns `Err` the
    /// handle is left exactly as it was and nobody is notified.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns.
    pub fn write_session<R, E>(
        &self,
        f: impl FnOnce(&mut WriteSession<'_, L>) -> Result<R, E>,
    ) -> Result<R, E> {
        let guard = self.write_lock.lock();
        let mut session = {
            let state = self.state.read();
            WriteSession {
                address: &self.address,
                model: Model::clone(&state.model),
                log: state.log.clone(),
                emitted: Vec::new(),
            }
        };
        let output = f(&mut session)?;
        let WriteSession {
            model, log, emitted, ..
        } = session;
        {
            let mut state = self.state.write();
            state.model = Arc::new(model);
            state.log = log;
        }
        drop(guard);

        for event in &emitted {
            self.listeners.notify(event);
        }
        Ok(output)
    }
}

/// Exclusive working copy of a model handle, see
/// [`ModelHandle::write_session`].
pub struct WriteSession<'a, L> {
    address: &'a Address,
    model: Model,
    log: L,
    emitted: Vec<Event>,
}

impl<L: EventLog> WriteSession<'_, L> {
    /// Returns the working model.
    #[must_use]
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Returns the working log.
    #[must_use]
    pub fn log(&self) -> &L {
        &self.log
    }

    /// Returns the working log mutably.
    pub fn log_mut(&mut self) -> &mut L {
        &mut self.log
    }

    /// Returns the revision the next commit will carry.
    #[must_use]
    pub fn next_revision(&self) -> u64 {
        self.log.change_log().current_revision()
    }

    /// Same as [`ModelHandle::execute`] on the working copy.
    ///
    /// # Errors
    ///
    /// See [`ModelHandle::execute`].
    pub fn execute(
        &mut self,
        actor: Option<&Identifier>,
        change: impl Into<Executable>,
    ) -> CoreResult<ExecutionResult> {
        let change = change.into();
        let revision = self.next_revision();
        Ok(match prepare(&self.model, &change, actor, revision)? {
            Prepared::Failed => ExecutionResult::Failed,
            Prepared::NoChange => ExecutionResult::NoChange,
            Prepared::Commit { model, event } => {
                self.log.record(Some(&change), event.clone())?;
                self.model = model;
                self.emitted.push(event.clone());
                ExecutionResult::Applied { revision, event }
            }
        })
    }

    /// Same as [`ModelHandle::apply_event`] on the working copy.
    ///
    /// # Errors
    ///
    /// See [`ModelHandle::apply_event`].
    pub fn apply_event(&mut self, event: &Event) -> CoreResult<()> {
        let expected = self.next_revision();
        if event.revision() != expected {
            return Err(CoreError::RevisionMismatch {
                expected,
                actual: event.revision(),
            });
        }
        apply_event(&mut self.model, event)?;
        self.log.record(None, event.clone())?;
        self.emitted.push(event.clone());
        Ok(())
    }

    /// Same as [`ModelHandle::rollback_from`] on the working copy.
    ///
    /// # Errors
    ///
    /// See [`ModelHandle::rollback_from`].
    pub fn rollback_from(&mut self, revision: u64) -> CoreResult<Vec<Event>> {
        for event in self.log.change_log().events_since(revision).rev() {
            undo_event(&mut self.model, event)?;
        }
        let discarded = self.log.truncate_from(revision)?;
        debug!(
            model = %self.address,
            revision,
            discarded = discarded.len(),
            "rolled back working copy"
        );
        Ok(discarded)
    }
}

impl<L: EventLog> std::fmt::Debug for ModelHandle<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ModelHandle")
            .field("address", &self.address)
            .field("exists", &state.model.exists())
            .field("revision", &state.model.revision())
            .field("next_revision", &state.log.change_log().current_revision())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, Precondition};
    use crate::transaction::TransactionBuilder;
    use crate::tree::Container;
    use crate::value::Value;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    fn phonebook() -> ModelHandle {
        let handle = ModelHandle::new(addr("/repo/phonebook")).unwrap();
        let add = Command::add_model(&addr("/repo"), id("phonebook"), Precondition::New).unwrap();
        assert!(handle.execute(None, add).unwrap().is_applied());

        let mut builder = TransactionBuilder::new(addr("/repo/phonebook")).unwrap();
        builder
            .add_object(&addr("/repo/phonebook"), id("john"), Precondition::New)
            .unwrap()
            .add_field(&addr("/repo/phonebook/john"), id("phone"), Precondition::New)
            .unwrap()
            .add_value(
                addr("/repo/phonebook/john/phone"),
                Precondition::New,
                Value::from("555-1234"),
            )
            .unwrap();
        assert!(handle.execute(None, builder.build().unwrap()).unwrap().is_applied());
        handle
    }

    #[test]
    fn revisions_advance_once_per_commit() {
        let handle = phonebook();
        assert_eq!(handle.revision(), 1);
        assert_eq!(handle.next_revision(), 2);

        let mut previous = handle.revision();
        for n in 0..5 {
            let cmd = Command::change_value(
                addr("/repo/phonebook/john/phone"),
                Precondition::Forced,
                Value::from(n),
            )
            .unwrap();
            let result = handle.execute(None, cmd).unwrap();
            let revision = result.revision().unwrap();
            assert_eq!(revision, previous + 1);
            assert_eq!(result.code(), i64::try_from(revision).unwrap());
            previous = revision;
        }
        assert_eq!(handle.with_log(|log| log.len()), 7);
    }

    #[test]
    fn failed_and_no_change_leave_no_trace() {
        let handle = phonebook();
        let before = handle.snapshot();

        let stale = Command::remove_object(&addr("/repo/phonebook"), id("john"), Precondition::Safe(0)).unwrap();
        let result = handle.execute(None, stale).unwrap();
        assert_eq!(result, ExecutionResult::Failed);
        assert_eq!(result.code(), ExecutionResult::FAILED);

        let noop = Command::add_object(&addr("/repo/phonebook"), id("john"), Precondition::Forced).unwrap();
        let result = handle.execute(None, noop).unwrap();
        assert_eq!(result.code(), ExecutionResult::NO_CHANGE);

        assert_eq!(*handle.snapshot(), *before);
        assert_eq!(handle.next_revision(), 2);
    }

    #[test]
    fn listeners_see_whole_transactions_only() {
        let handle = phonebook();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        handle.register_listener(addr("/repo/phonebook"), move |event: &Event| {
            sink.lock().push(event.clone());
        });

        let john = addr("/repo/phonebook/john");
        let mut failing = TransactionBuilder::new(john.clone()).unwrap();
        failing
            .add_field(&john, id("alias"), Precondition::New)
            .unwrap()
            .remove_field(&john, id("phone"), Precondition::Safe(0))
            .unwrap();
        assert!(handle.execute(None, failing.build().unwrap()).unwrap().is_failed());
        assert!(seen.lock().is_empty());

        let mut passing = TransactionBuilder::new(john.clone()).unwrap();
        passing
            .add_field(&john, id("alias"), Precondition::New)
            .unwrap()
            .add_value(addr("/repo/phonebook/john/alias"), Precondition::New, Value::from("Cookie Monster"))
            .unwrap();
        handle.execute(None, passing.build().unwrap()).unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(matches!(seen[0], Event::Atomic(_)));
        assert!(matches!(seen[1], Event::Atomic(_)));
        assert!(matches!(seen[2], Event::Transaction(_)));
    }

    #[test]
    fn listener_may_reenter_handle() {
        let handle = Arc::new(phonebook());
        let observed = Arc::new(Mutex::new(Vec::new()));
        let (inner, sink) = (Arc::downgrade(&handle), Arc::clone(&observed));
        handle.register_listener(addr("/repo/phonebook"), move |_: &Event| {
            if let Some(handle) = inner.upgrade() {
                sink.lock().push(handle.revision());
            }
        });

        let cmd = Command::remove_object(&addr("/repo/phonebook"), id("john"), Precondition::Forced).unwrap();
        handle.execute(None, cmd).unwrap();
        assert!(observed.lock().iter().all(|r| *r == 2));
    }

    #[test]
    fn replaying_the_log_reproduces_the_model() {
        let source = phonebook();
        let cmd = Command::remove_field(&addr("/repo/phonebook/john"), id("phone"), Precondition::Forced).unwrap();
        source.execute(Some(&id("alice")), cmd).unwrap();

        let replica = ModelHandle::new(addr("/repo/phonebook")).unwrap();
        for event in source.events_since(0) {
            replica.apply_event(&event).unwrap();
        }
        assert_eq!(*replica.snapshot(), *source.snapshot());

        let rebuilt = ModelHandle::with_event_log(addr("/repo/phonebook"), source.with_log(Clone::clone)).unwrap();
        assert_eq!(*rebuilt.snapshot(), *source.snapshot());
        assert_eq!(
            source.events_since(2)[0].actor().map(Identifier::as_str),
            Some("alice")
        );
    }

    #[test]
    fn apply_event_rejects_gaps() {
        let source = phonebook();
        let replica = ModelHandle::new(addr("/repo/phonebook")).unwrap();
        let err = replica.apply_event(&source.events_since(1)[0]).unwrap_err();
        assert!(matches!(err, CoreError::RevisionMismatch { expected: 0, actual: 1 }));
    }

    #[test]
    fn rollback_restores_earlier_state() {
        let handle = phonebook();
        let checkpoint = handle.snapshot();

        let john = addr("/repo/phonebook/john");
        handle
            .execute(None, Command::add_field(&john, id("alias"), Precondition::New).unwrap())
            .unwrap();
        handle
            .execute(None, Command::remove_object(&addr("/repo/phonebook"), id("john"), Precondition::Forced).unwrap())
            .unwrap();
        assert!(handle.snapshot().is_empty());

        let discarded = handle.rollback_from(2).unwrap();
        assert_eq!(discarded.len(), 2);
        assert_eq!(*handle.snapshot(), *checkpoint);
        assert_eq!(handle.next_revision(), 2);

        assert!(matches!(
            handle.rollback_from(5),
            Err(CoreError::OutOfRange { .. })
        ));
    }

    #[test]
    fn from_snapshot_checks_revisions() {
        let source = phonebook();
        let snapshot = Model::clone(&source.snapshot());
        assert!(ModelHandle::from_snapshot(snapshot.clone(), ChangeLog::new()).is_err());

        let handle = ModelHandle::from_snapshot(snapshot, ChangeLog::with_base(2)).unwrap();
        let cmd = Command::remove_field(&addr("/repo/phonebook/john"), id("phone"), Precondition::Safe(1)).unwrap();
        assert_eq!(handle.execute(None, cmd).unwrap().revision(), Some(2));

        let err = ModelHandle::with_event_log(addr("/repo/phonebook"), ChangeLog::with_base(2)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn commands_for_other_models_are_rejected() {
        let handle = phonebook();
        let cmd = Command::add_object(&addr("/repo/other"), id("jane"), Precondition::New).unwrap();
        assert!(matches!(
            handle.execute(None, cmd),
            Err(CoreError::AddressMismatch { .. })
        ));
    }

    #[test]
    fn write_session_commits_or_discards_as_a_unit() {
        let handle = phonebook();
        let seen = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&seen);
        handle.register_listener(addr("/repo"), move |_: &Event| *sink.lock() += 1);

        let phone = addr("/repo/phonebook/john/phone");
        let err = handle
            .write_session(|session| -> CoreResult<()> {
                session.rollback_from(1)?;
                session.execute(
                    None,
                    Command::add_object(&addr("/repo/phonebook"), id("jane"), Precondition::New)?,
                )?;
                Err(CoreError::invalid_operation("abort"))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        assert_eq!(handle.next_revision(), 2);
        assert_eq!(*seen.lock(), 0);

        let revision = handle
            .write_session(|session| -> CoreResult<_> {
                let change = Command::change_value(phone.clone(), Precondition::Safe(1), Value::from("555-0000"))?;
                let first = session.execute(None, change)?;
                let second = session.execute(None, Command::remove_value(phone.clone(), Precondition::Forced)?)?;
                assert_eq!(first.revision(), Some(2));
                Ok(second.revision())
            })
            .unwrap();
        assert_eq!(revision, Some(3));
        assert_eq!(handle.next_revision(), 4);
        assert_eq!(*seen.lock(), 2);
        assert!(handle.snapshot().value_at(&phone).is_none());
    }
}
