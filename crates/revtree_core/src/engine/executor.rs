//! Copy-on-write command execution.

use crate::address::{Address, AddressKind, Identifier};
use crate::command::{Action, Command, Precondition};
use crate::error::{CoreError, CoreResult};
use crate::event::{AtomicEvent, Event, TransactionEvent};
use crate::transaction::Executable;
use crate::tree::{Container, Model, Readable};
use std::collections::BTreeSet;
use tracing::debug;

/// Result of running a change against a working copy.
#[derive(Debug)]
pub(crate) enum Prepared {
    /// A precondition failed; the working copy was discarded.
    Failed,
    /// No command had an effect.
    NoChange,
    /// The new model state and the event describing how to reach it.
    Commit {
        /// Post-state, with revisions stamped.
        model: Model,
        /// Event to log.
        event: Event,
    },
}

/// Runs `change` against a working copy of `model`.
///
/// `revision` is the revision a commit will be stamped with. The original
/// model is never modified; on success the caller swaps in the returned
/// post-state.
///
/// # Errors
///
/// Returns [`CoreError::AddressMismatch`] if a command addresses another
/// model. Precondition failures are reported as [`Prepared::Failed`].
pub(crate) fn prepare(
    model: &Model,
    change: &Executable,
    actor: Option<&Identifier>,
    revision: u64,
) -> CoreResult<Prepared> {
    let mut executor = Executor::new(model, actor, revision);
    for command in change.commands() {
        if !model.address().equals_or_contains(command.changed()) {
            return Err(CoreError::address_mismatch(model.address(), command.changed()));
        }
        if let Step::Failed = executor.execute(command)? {
            debug!(command = %command, revision, "precondition failed, discarding change");
            return Ok(Prepared::Failed);
        }
    }
    Ok(executor.finish(change))
}

enum Step {
    Failed,
    Unchanged,
    Changed,
}

struct Executor<'a> {
    original: &'a Model,
    working: Model,
    actor: Option<Identifier>,
    revision: u64,
    /// Entities created by earlier commands of the same change.
    created: BTreeSet<Address>,
    /// Objects and fields to stamp with the new revision on commit.
    touched: BTreeSet<Address>,
    events: Vec<AtomicEvent>,
}

impl<'a> Executor<'a> {
    fn new(original: &'a Model, actor: Option<&Identifier>, revision: u64) -> Self {
        Self {
            original,
            working: original.clone(),
            actor: actor.cloned(),
            revision,
            created: BTreeSet::new(),
            touched: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    fn execute(&mut self, command: &Command) -> CoreResult<Step> {
        if command.is_value_command() {
            return self.set_value(command);
        }
        match (command.changed().kind(), command.action()) {
            (AddressKind::Model, Action::Add) => Ok(self.add_model(command)),
            (AddressKind::Model, Action::Remove) => self.remove_model(command),
            (AddressKind::Object, Action::Add) => self.add_object(command),
            (AddressKind::Object, Action::Remove) => self.remove_object(command),
            (AddressKind::Field, Action::Add) => self.add_field(command),
            (AddressKind::Field, Action::Remove) => self.remove_field(command),
            _ => Err(CoreError::invalid_command(format!("cannot execute {command}"))),
        }
    }

    fn precondition_holds(&self, precondition: Precondition, address: &Address, revision: u64) -> bool {
        match precondition {
            Precondition::Forced => true,
            Precondition::New => self.created.contains(address),
            Precondition::Safe(expected) => expected == revision,
        }
    }

    /// Outcome of adding an entity that is already there.
    fn already_present(command: &Command) -> Step {
        if command.precondition().is_forced() {
            Step::Unchanged
        } else {
            Step::Failed
        }
    }

    /// Outcome of removing an entity that is not there.
    fn already_absent(command: &Command) -> Step {
        Self::already_present(command)
    }

    fn event(&self, action: Action, target: &Address, changed: &Address) -> AtomicEvent {
        AtomicEvent {
            action,
            target: target.clone(),
            changed: changed.clone(),
            actor: self.actor.clone(),
            old_model_revision: self.working.revision(),
            old_object_revision: None,
            old_field_revision: None,
            revision: self.revision,
            old_value: None,
            new_value: None,
            implied: false,
            in_transaction: false,
        }
    }

    fn add_model(&mut self, command: &Command) -> Step {
        if self.working.exists() {
            return Self::already_present(command);
        }
        let event = self.event(Action::Add, command.target(), command.changed());
        self.events.push(event);
        self.working.set_exists(true);
        self.created.insert(command.changed().clone());
        Step::Changed
    }

    fn remove_model(&mut self, command: &Command) -> CoreResult<Step> {
        if !self.working.exists() {
            return Ok(Self::already_absent(command));
        }
        if !self.precondition_holds(command.precondition(), command.changed(), self.working.revision()) {
            return Ok(Step::Failed);
        }
        let object_ids: Vec<Identifier> = self.working.child_ids().cloned().collect();
        for object_id in &object_ids {
            self.purge_object(object_id, true)?;
        }
        let event = self.event(Action::Remove, command.target(), command.changed());
        self.events.push(event);
        self.working.set_exists(false);
        Ok(Step::Changed)
    }

    fn add_object(&mut self, command: &Command) -> CoreResult<Step> {
        if !self.working.exists() {
            return Ok(Step::Failed);
        }
        let id = command.changed().id();
        if self.working.has_child(id) {
            return Ok(Self::already_present(command));
        }
        let event = self.event(Action::Add, command.target(), command.changed());
        self.events.push(event);
        self.working.create_object(id.clone(), self.revision)?;
        self.created.insert(command.changed().clone());
        self.touched.insert(command.changed().clone());
        Ok(Step::Changed)
    }

    fn remove_object(&mut self, command: &Command) -> CoreResult<Step> {
        if !self.working.exists() {
            return Ok(Step::Failed);
        }
        let id = command.changed().id();
        let Some(object) = self.working.object(id) else {
            return Ok(Self::already_absent(command));
        };
        if !self.precondition_holds(command.precondition(), command.changed(), object.revision()) {
            return Ok(Step::Failed);
        }
        self.purge_object(id, false)?;
        Ok(Step::Changed)
    }

    fn add_field(&mut self, command: &Command) -> CoreResult<Step> {
        let changed = command.changed();
        let Some(object) = changed.object_id().and_then(|id| self.working.object(id)) else {
            return Ok(Step::Failed);
        };
        if object.has_child(changed.id()) {
            return Ok(Self::already_present(command));
        }
        let mut event = self.event(Action::Add, command.target(), changed);
        event.old_object_revision = Some(object.revision());
        self.events.push(event);

        let revision = self.revision;
        let object = self.object_mut(changed)?;
        object.create_field(changed.id().clone(), revision)?;
        self.created.insert(changed.clone());
        self.touched.insert(command.target().clone());
        self.touched.insert(changed.clone());
        Ok(Step::Changed)
    }

    fn remove_field(&mut self, command: &Command) -> CoreResult<Step> {
        let changed = command.changed();
        let Some(object) = changed.object_id().and_then(|id| self.working.object(id)) else {
            return Ok(Step::Failed);
        };
        let Some(field) = object.field(changed.id()) else {
            return Ok(Self::already_absent(command));
        };
        if !self.precondition_holds(command.precondition(), changed, field.revision()) {
            return Ok(Step::Failed);
        }
        self.purge_field(changed, false)?;
        Ok(Step::Changed)
    }

    fn set_value(&mut self, command: &Command) -> CoreResult<Step> {
        let changed = command.changed();
        let Some(object) = changed.object_id().and_then(|id| self.working.object(id)) else {
            return Ok(Step::Failed);
        };
        let Some(field) = object.field(changed.id()) else {
            return Ok(Step::Failed);
        };
        if !self.precondition_holds(command.precondition(), changed, field.revision()) {
            return Ok(Step::Failed);
        }

        let old_value = field.value().cloned();
        if !command.precondition().is_forced() {
            let consistent = match command.action() {
                Action::Add => old_value.is_none(),
                Action::Change | Action::Remove => old_value.is_some(),
            };
            if !consistent {
                return Ok(Step::Failed);
            }
        }
        let new_value = command.value().cloned();
        if old_value == new_value {
            return Ok(Step::Unchanged);
        }

        let action = match (&old_value, &new_value) {
            (None, Some(_)) => Action::Add,
            (Some(_), Some(_)) => Action::Change,
            _ => Action::Remove,
        };
        let mut event = self.event(action, changed, changed);
        event.old_object_revision = Some(object.revision());
        event.old_field_revision = Some(field.revision());
        event.old_value = old_value;
        event.new_value = new_value.clone();
        self.events.push(event);

        self.field_mut(changed)?.set_value(new_value);
        if let Some(object_address) = changed.parent() {
            self.touched.insert(object_address);
        }
        self.touched.insert(changed.clone());
        Ok(Step::Changed)
    }

    /// Removes an object and everything below it, deepest first.
    fn purge_object(&mut self, object_id: &Identifier, implied: bool) -> CoreResult<()> {
        let Some(object) = self.working.object(object_id) else {
            return Ok(());
        };
        let object_address = object.address().clone();
        let object_revision = object.revision();
        let field_addresses: Vec<Address> = object.fields().map(|f| f.address().clone()).collect();

        for field_address in &field_addresses {
            self.purge_field(field_address, true)?;
        }

        let model_address = self.working.address().clone();
        let mut event = self.event(Action::Remove, &model_address, &object_address);
        event.old_object_revision = Some(object_revision);
        event.implied = implied;
        self.events.push(event);
        self.working.remove_object(object_id);
        Ok(())
    }

    /// Removes a field, clearing its value first.
    fn purge_field(&mut self, field_address: &Address, implied: bool) -> CoreResult<()> {
        let object_address = field_address
            .parent()
            .ok_or_else(|| CoreError::invalid_command(format!("{field_address} has no object")))?;
        let Some(object) = self.working.object(object_address.id()) else {
            return Ok(());
        };
        let object_revision = object.revision();
        let Some(field) = object.field(field_address.id()) else {
            return Ok(());
        };
        let field_revision = field.revision();

        if let Some(value) = field.value().cloned() {
            let mut event = self.event(Action::Remove, field_address, field_address);
            event.old_object_revision = Some(object_revision);
            event.old_field_revision = Some(field_revision);
            event.old_value = Some(value);
            event.implied = true;
            self.events.push(event);
        }

        let mut event = self.event(Action::Remove, &object_address, field_address);
        event.old_object_revision = Some(object_revision);
        event.old_field_revision = Some(field_revision);
        event.implied = implied;
        self.events.push(event);

        self.object_mut(field_address)?.remove_field(field_address.id());
        self.touched.insert(object_address);
        Ok(())
    }

    fn object_mut(&mut self, address: &Address) -> CoreResult<&mut crate::tree::Object> {
        let id = address
            .object_id()
            .ok_or_else(|| CoreError::invalid_command(format!("{address} has no object")))?;
        self.working
            .object_mut(id)
            .ok_or_else(|| CoreError::invalid_operation(format!("object of {address} vanished")))
    }

    fn field_mut(&mut self, address: &Address) -> CoreResult<&mut crate::tree::Field> {
        self.object_mut(address)?
            .field_mut(address.id())
            .ok_or_else(|| CoreError::invalid_operation(format!("field {address} vanished")))
    }

    fn finish(mut self, change: &Executable) -> Prepared {
        if self.events.is_empty() {
            return Prepared::NoChange;
        }

        let revision = self.revision;
        self.working.set_revision(revision);
        for address in std::mem::take(&mut self.touched) {
            match address.kind() {
                AddressKind::Object => {
                    if let Some(object) = self.working.object_mut(address.id()) {
                        object.set_revision(revision);
                    }
                }
                AddressKind::Field => {
                    if let Ok(field) = self.field_mut(&address) {
                        field.set_revision(revision);
                    }
                }
                _ => {}
            }
        }

        let event = if self.events.len() == 1 {
            let mut events = std::mem::take(&mut self.events);
            match events.pop() {
                Some(event) => Event::Atomic(event),
                None => return Prepared::NoChange,
            }
        } else {
            let mut events = std::mem::take(&mut self.events);
            for event in &mut events {
                event.in_transaction = true;
            }
            let target = change.target().clone();
            let old_object_revision = match target.kind() {
                AddressKind::Object => self.original.object(target.id()).map(|o| o.revision()),
                _ => None,
            };
            Event::Transaction(TransactionEvent {
                actor: self.actor.clone(),
                target,
                old_model_revision: self.original.revision(),
                old_object_revision,
                revision,
                events,
            })
        };

        debug!(
            model = %self.working.address(),
            revision,
            events = event.atomic_events().len(),
            "prepared commit"
        );
        Prepared::Commit {
            model: self.working,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{apply_event, undo_event};
    use crate::value::Value;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    /// Executes changes one after another, like a model handle would.
    struct Harness {
        model: Model,
        next_revision: u64,
    }

    impl Harness {
        fn new() -> Self {
            let mut harness = Self {
                model: Model::new(addr("/repo/phonebook")).unwrap(),
                next_revision: 0,
            };
            let add = Command::add_model(&addr("/repo"), id("phonebook"), Precondition::New).unwrap();
            assert!(matches!(harness.run(add), Prepared::Commit { .. }));
            harness
        }

        fn run(&mut self, change: impl Into<Executable>) -> Prepared {
            let prepared = prepare(&self.model, &change.into(), None, self.next_revision).unwrap();
            if let Prepared::Commit { model, .. } = &prepared {
                self.model = model.clone();
                self.next_revision += 1;
            }
            prepared
        }

        fn revision_of(&self, address: &str) -> Option<u64> {
            self.model.entity(&addr(address)).map(|e| e.revision())
        }
    }

    fn phonebook() -> Harness {
        let mut h = Harness::new();
        let mut builder = crate::TransactionBuilder::new(addr("/repo/phonebook")).unwrap();
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
        assert!(matches!(h.run(builder.build().unwrap()), Prepared::Commit { .. }));
        h
    }

    #[test]
    fn single_command_yields_atomic_event() {
        let mut h = Harness::new();
        let cmd = Command::add_object(&addr("/repo/phonebook"), id("john"), Precondition::New).unwrap();
        let Prepared::Commit { event, model } = h.run(cmd) else {
            panic!("expected commit");
        };
        let Event::Atomic(atomic) = event else {
            panic!("expected atomic event");
        };
        assert_eq!(atomic.action, Action::Add);
        assert_eq!(atomic.revision, 1);
        assert_eq!(atomic.old_model_revision, 0);
        assert!(!atomic.in_transaction);
        assert_eq!(model.revision(), 1);
        assert_eq!(model.object(&id("john")).unwrap().revision(), 1);
    }

    #[test]
    fn stale_safe_command_fails_whole_transaction() {
        let mut h = phonebook();
        let before = h.model.clone();
        let john = addr("/repo/phonebook/john");
        let stale = h.revision_of("/repo/phonebook/john/phone").unwrap() - 1;

        let mut builder = crate::TransactionBuilder::new(john.clone()).unwrap();
        builder
            .add_field(&john, id("alias"), Precondition::Safe(0))
            .unwrap()
            .add_field(&john, id("alias"), Precondition::Forced)
            .unwrap()
            .add_value(addr("/repo/phonebook/john/alias"), Precondition::New, Value::from("Cookie Monster"))
            .unwrap()
            .remove_field(&john, id("phone"), Precondition::Safe(stale))
            .unwrap();

        assert!(matches!(h.run(builder.build().unwrap()), Prepared::Failed));
        assert_eq!(h.model, before);
        assert!(h.model.entity(&addr("/repo/phonebook/john/alias")).is_none());
    }

    #[test]
    fn forced_no_ops_do_not_abort() {
        let mut h = phonebook();
        let john = addr("/repo/phonebook/john");
        let remove = Command::remove_field(&john, id("phone"), Precondition::Forced).unwrap();
        assert!(matches!(h.run(remove.clone()), Prepared::Commit { .. }));
        let object_revision = h.revision_of("/repo/phonebook/john").unwrap();
        let model_revision = h.model.revision();
        assert_eq!(object_revision, model_revision);

        let mut builder = crate::TransactionBuilder::new(john.clone()).unwrap();
        builder
            .add_field(&john, id("alias"), Precondition::Safe(0))
            .unwrap()
            .add_field(&john, id("alias"), Precondition::Forced)
            .unwrap()
            .add_value(addr("/repo/phonebook/john/alias"), Precondition::New, Value::from("Cookie Monster"))
            .unwrap()
            .add_command(remove)
            .unwrap();

        let Prepared::Commit { event, model } = h.run(builder.build().unwrap()) else {
            panic!("expected commit");
        };
        let actions: Vec<(Action, bool)> = event
            .atomic_events()
            .iter()
            .map(|e| (e.action, e.is_value_event()))
            .collect();
        assert_eq!(actions, vec![(Action::Add, false), (Action::Add, true)]);
        assert!(event.atomic_events().iter().all(|e| e.in_transaction));
        assert_eq!(
            model.object(&id("john")).unwrap().revision(),
            object_revision + 1
        );
        assert_eq!(model.revision(), model_revision + 1);
    }

    #[test]
    fn forced_add_twice_is_no_change() {
        let mut h = phonebook();
        let cmd = Command::add_object(&addr("/repo/phonebook"), id("john"), Precondition::Forced).unwrap();
        assert!(matches!(h.run(cmd.clone()), Prepared::NoChange));
        assert!(matches!(h.run(cmd), Prepared::NoChange));

        let safe = Command::add_object(&addr("/repo/phonebook"), id("john"), Precondition::New).unwrap();
        assert!(matches!(h.run(safe), Prepared::Failed));
    }

    #[test]
    fn removal_cascades_deepest_first() {
        let mut h = phonebook();
        let cmd = Command::remove_object(
            &addr("/repo/phonebook"),
            id("john"),
            Precondition::Safe(h.revision_of("/repo/phonebook/john").unwrap()),
        )
        .unwrap();
        let Prepared::Commit { event, .. } = h.run(cmd) else {
            panic!("expected commit");
        };
        let shape: Vec<(AddressKind, bool, bool)> = event
            .atomic_events()
            .iter()
            .map(|e| (e.changed.kind(), e.is_value_event(), e.implied))
            .collect();
        assert_eq!(
            shape,
            vec![
                (AddressKind::Field, true, true),
                (AddressKind::Field, false, true),
                (AddressKind::Object, false, false),
            ]
        );
    }

    #[test]
    fn value_preconditions() {
        let mut h = phonebook();
        let phone = addr("/repo/phonebook/john/phone");
        let current = h.revision_of("/repo/phonebook/john/phone").unwrap();

        // Adding a value to a field that holds one fails unless forced.
        let add = Command::add_value(phone.clone(), Precondition::Safe(current), Value::from("x")).unwrap();
        assert!(matches!(h.run(add), Prepared::Failed));

        // New only matches fields created by the same change.
        let change = Command::change_value(phone.clone(), Precondition::New, Value::from("x")).unwrap();
        assert!(matches!(h.run(change), Prepared::Failed));

        let same = Command::change_value(phone.clone(), Precondition::Safe(current), Value::from("555-1234")).unwrap();
        assert!(matches!(h.run(same), Prepared::NoChange));

        let change = Command::change_value(phone.clone(), Precondition::Safe(current), Value::from("x")).unwrap();
        assert!(matches!(h.run(change), Prepared::Commit { .. }));

        let missing = Command::add_value(addr("/repo/phonebook/john/fax"), Precondition::Forced, Value::from(1)).unwrap();
        assert!(matches!(h.run(missing), Prepared::Failed));
    }

    #[test]
    fn rewriting_nan_is_no_change() {
        let mut h = phonebook();
        let phone = addr("/repo/phonebook/john/phone");
        let nan = || Command::change_value(phone.clone(), Precondition::Forced, Value::from(f64::NAN)).unwrap();

        assert!(matches!(h.run(nan()), Prepared::Commit { .. }));
        let revision = h.revision_of("/repo/phonebook/john/phone");
        assert!(matches!(h.run(nan()), Prepared::NoChange));
        assert_eq!(h.revision_of("/repo/phonebook/john/phone"), revision);

        let negative_zero = Command::change_value(phone.clone(), Precondition::Forced, Value::from(-0.0)).unwrap();
        assert!(matches!(h.run(negative_zero), Prepared::Commit { .. }));
        let zero = Command::change_value(phone, Precondition::Forced, Value::from(0.0)).unwrap();
        assert!(matches!(h.run(zero), Prepared::Commit { .. }));
    }

    #[test]
    fn commands_for_other_models_are_errors() {
        let h = phonebook();
        let cmd = Command::add_object(&addr("/repo/other"), id("xx"), Precondition::New).unwrap();
        let err = prepare(&h.model, &cmd.into(), None, 9).unwrap_err();
        assert!(matches!(err, CoreError::AddressMismatch { .. }));
    }

    #[test]
    fn replay_and_undo_reproduce_states() {
        let mut h = phonebook();
        let before = h.model.clone();

        let mut builder = crate::TransactionBuilder::new(addr("/repo/phonebook")).unwrap();
        builder
            .add_object(&addr("/repo/phonebook"), id("jane"), Precondition::New)
            .unwrap()
            .add_field(&addr("/repo/phonebook/jane"), id("mail"), Precondition::New)
            .unwrap()
            .change_value(addr("/repo/phonebook/john/phone"), Precondition::Forced, Value::from(42))
            .unwrap()
            .remove_object(&addr("/repo/phonebook"), id("john"), Precondition::Forced)
            .unwrap();
        let Prepared::Commit { event, model: after } = h.run(builder.build().unwrap()) else {
            panic!("expected commit");
        };

        let mut replayed = before.clone();
        apply_event(&mut replayed, &event).unwrap();
        assert_eq!(replayed, after);

        undo_event(&mut replayed, &event).unwrap();
        assert_eq!(replayed, before);

        // Replaying onto the wrong revision is refused.
        let mut stale = after.clone();
        assert!(matches!(
            apply_event(&mut stale, &event),
            Err(CoreError::RevisionMismatch { .. })
        ));
    }

    #[test]
    fn remove_model_cascades_and_keeps_revision() {
        let mut h = phonebook();
        let cmd = Command::remove_model(&addr("/repo"), id("phonebook"), Precondition::Forced).unwrap();
        let Prepared::Commit { event, model } = h.run(cmd) else {
            panic!("expected commit");
        };
        assert!(!model.exists());
        assert_eq!(model.revision(), event.revision());
        assert_eq!(
            event.atomic_events().last().map(|e| e.changed.kind()),
            Some(AddressKind::Model)
        );

        let re_add = Command::add_model(&addr("/repo"), id("phonebook"), Precondition::New).unwrap();
        let Prepared::Commit { model, .. } = h.run(re_add) else {
            panic!("expected commit");
        };
        assert!(model.exists());
        assert!(model.is_empty());
        assert_eq!(model.revision(), event.revision() + 1);
    }
}
