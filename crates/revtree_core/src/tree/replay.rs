//! Forward replay and undo of committed events.
//!
//! Both directions work on a caller-owned model and stop at the first
//! inconsistency, leaving the model partially updated. Callers replay onto a
//! working copy and discard it on error.

use super::model::{Model, Object};
use super::traits::{Container, Readable};
use crate::address::{Address, AddressKind, Identifier};
use crate::command::Action;
use crate::error::{CoreError, CoreResult};
use crate::event::{AtomicEvent, Event};

/// Applies a committed event to `model`.
///
/// # Errors
///
/// Returns [`CoreError::RevisionMismatch`] if the model is not at the
/// revision the event was generated against, [`CoreError::AddressMismatch`]
/// if the event belongs to another model, and
/// [`CoreError::InvalidOperation`] if the event does not fit the tree.
pub fn apply_event(model: &mut Model, event: &Event) -> CoreResult<()> {
    if model.revision() != event.old_model_revision() {
        return Err(CoreError::RevisionMismatch {
            expected: model.revision(),
            actual: event.old_model_revision(),
        });
    }
    for atomic in event.atomic_events() {
        apply_atomic(model, atomic)?;
    }
    Ok(())
}

/// Reverts a committed event on `model`, which must be at the event's
/// revision.
///
/// # Errors
///
/// Same conditions as [`apply_event`].
pub fn undo_event(model: &mut Model, event: &Event) -> CoreResult<()> {
    if model.revision() != event.revision() {
        return Err(CoreError::RevisionMismatch {
            expected: model.revision(),
            actual: event.revision(),
        });
    }
    for atomic in event.atomic_events().iter().rev() {
        undo_atomic(model, atomic)?;
    }
    Ok(())
}

fn apply_atomic(model: &mut Model, event: &AtomicEvent) -> CoreResult<()> {
    check_address(model, event)?;
    let revision = event.revision;
    let changed = &event.changed;

    if event.is_value_event() {
        let object = object_mut(model, changed)?;
        object.set_revision(revision);
        let field = object
            .field_mut(changed.id())
            .ok_or_else(|| missing(changed))?;
        field.set_value(event.new_value.clone());
        field.set_revision(revision);
    } else {
        match (changed.kind(), event.action) {
            (AddressKind::Model, Action::Add) => {
                if model.exists() {
                    return Err(conflict(event, "model already exists"));
                }
                model.set_exists(true);
            }
            (AddressKind::Model, Action::Remove) => {
                require_exists(model)?;
                if !model.is_empty() {
                    return Err(conflict(event, "model still has objects"));
                }
                model.set_exists(false);
            }
            (AddressKind::Object, Action::Add) => {
                require_exists(model)?;
                model.create_object(changed.id().clone(), revision)?;
            }
            (AddressKind::Object, Action::Remove) => {
                let object = object_mut(model, changed)?;
                if !object.is_empty() {
                    return Err(conflict(event, "object still has fields"));
                }
                model.remove_object(changed.id());
            }
            (AddressKind::Field, Action::Add) => {
                let object = object_mut(model, changed)?;
                object.create_field(changed.id().clone(), revision)?;
                object.set_revision(revision);
            }
            (AddressKind::Field, Action::Remove) => {
                let object = object_mut(model, changed)?;
                let has_value = object
                    .field(changed.id())
                    .ok_or_else(|| missing(changed))?
                    .value()
                    .is_some();
                if has_value {
                    return Err(conflict(event, "field still has a value"));
                }
                object.remove_field(changed.id());
                object.set_revision(revision);
            }
            _ => return Err(conflict(event, "unsupported event shape")),
        }
    }
    model.set_revision(revision);
    Ok(())
}

fn undo_atomic(model: &mut Model, event: &AtomicEvent) -> CoreResult<()> {
    check_address(model, event)?;
    let changed = &event.changed;

    if event.is_value_event() {
        let old_object = old_object_revision(event)?;
        let old_field = old_field_revision(event)?;
        let object = object_mut(model, changed)?;
        object.set_revision(old_object);
        let field = object
            .field_mut(changed.id())
            .ok_or_else(|| missing(changed))?;
        field.set_value(event.old_value.clone());
        field.set_revision(old_field);
    } else {
        match (changed.kind(), event.action) {
            (AddressKind::Model, Action::Add) => {
                require_exists(model)?;
                if !model.is_empty() {
                    return Err(conflict(event, "model still has objects"));
                }
                model.set_exists(false);
            }
            (AddressKind::Model, Action::Remove) => {
                if model.exists() {
                    return Err(conflict(event, "model already exists"));
                }
                model.set_exists(true);
            }
            (AddressKind::Object, Action::Add) => {
                object_mut(model, changed)?;
                model.remove_object(changed.id());
            }
            (AddressKind::Object, Action::Remove) => {
                require_exists(model)?;
                let old_object = old_object_revision(event)?;
                model.create_object(changed.id().clone(), old_object)?;
            }
            (AddressKind::Field, Action::Add) => {
                let old_object = old_object_revision(event)?;
                let object = object_mut(model, changed)?;
                object
                    .remove_field(changed.id())
                    .ok_or_else(|| missing(changed))?;
                object.set_revision(old_object);
            }
            (AddressKind::Field, Action::Remove) => {
                let old_object = old_object_revision(event)?;
                let old_field = old_field_revision(event)?;
                let object = object_mut(model, changed)?;
                object.create_field(changed.id().clone(), old_field)?;
                object.set_revision(old_object);
            }
            _ => return Err(conflict(event, "unsupported event shape")),
        }
    }
    model.set_revision(event.old_model_revision);
    Ok(())
}

fn check_address(model: &Model, event: &AtomicEvent) -> CoreResult<()> {
    if model.address().equals_or_contains(&event.changed) {
        Ok(())
    } else {
        Err(CoreError::address_mismatch(model.address(), &event.changed))
    }
}

fn require_exists(model: &Model) -> CoreResult<()> {
    if model.exists() {
        Ok(())
    } else {
        Err(missing(model.address()))
    }
}

fn object_mut<'a>(model: &'a mut Model, address: &Address) -> CoreResult<&'a mut Object> {
    require_exists(model)?;
    let object_id: &Identifier = address.object_id().ok_or_else(|| missing(address))?;
    model.object_mut(object_id).ok_or_else(|| missing(address))
}

fn old_object_revision(event: &AtomicEvent) -> CoreResult<u64> {
    event
        .old_object_revision
        .ok_or_else(|| conflict(event, "event lacks the previous object revision"))
}

fn old_field_revision(event: &AtomicEvent) -> CoreResult<u64> {
    event
        .old_field_revision
        .ok_or_else(|| conflict(event, "event lacks the previous field revision"))
}

fn missing(address: &Address) -> CoreError {
    CoreError::invalid_operation(format!("{address} does not exist"))
}

fn conflict(event: &AtomicEvent, reason: &str) -> CoreError {
    CoreError::invalid_operation(format!(
        "cannot replay {} of {} at revision {}: {reason}",
        event.action, event.changed, event.revision
    ))
}
