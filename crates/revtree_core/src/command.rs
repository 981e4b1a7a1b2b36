//! Commands: requested mutations of the tree.

use crate::address::{Address, AddressKind, Identifier};
use crate::error::{CoreError, CoreResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a command or event does to its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Create an entity or give a field a value.
    Add,
    /// Remove an entity or a field's value.
    Remove,
    /// Replace a field's value.
    Change,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Add => f.write_str("add"),
            Action::Remove => f.write_str("remove"),
            Action::Change => f.write_str("change"),
        }
    }
}

/// The condition under which a command may be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Precondition {
    /// Always applies. Adding a present entity or removing an absent one is
    /// a no-op rather than a failure.
    Forced,
    /// The entity must not exist yet (add), or must have been created
    /// earlier in the same transaction (remove and value commands).
    New,
    /// The entity's revision must equal the given revision. For structural
    /// adds this behaves like [`Precondition::New`].
    Safe(u64),
}

impl Precondition {
    /// Returns true for [`Precondition::Forced`].
    #[must_use]
    pub fn is_forced(&self) -> bool {
        matches!(self, Precondition::Forced)
    }
}

/// A requested mutation.
///
/// `changed` is the entity being created, removed or given a new value.
/// `target` is the entity the command is sent to: the parent of `changed`
/// for structural commands, and the field itself for value commands.
/// The granularity of a command is the kind of its target, so adding a
/// model is a repository command and setting a value is a field command.
///
/// Commands are validated on construction and on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CommandRepr")]
pub struct Command {
    action: Action,
    target: Address,
    changed: Address,
    precondition: Precondition,
    value: Option<Value>,
}

#[derive(Deserialize)]
struct CommandRepr {
    action: Action,
    target: Address,
    changed: Address,
    precondition: Precondition,
    #[serde(default)]
    value: Option<Value>,
}

impl TryFrom<CommandRepr> for Command {
    type Error = CoreError;

    fn try_from(repr: CommandRepr) -> CoreResult<Self> {
        let command = Self {
            action: repr.action,
            target: repr.target,
            changed: repr.changed,
            precondition: repr.precondition,
            value: repr.value,
        };
        command.validate()?;
        Ok(command)
    }
}

impl Command {
    /// Creates a structural add of the entity at `changed`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCommand`] if `changed` is not a model,
    /// object or field address.
    pub fn add(changed: Address, precondition: Precondition) -> CoreResult<Self> {
        Self::structural(Action::Add, changed, precondition)
    }

    /// Creates a structural removal of the entity at `changed`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCommand`] if `changed` is not a model,
    /// object or field address.
    pub fn remove(changed: Address, precondition: Precondition) -> CoreResult<Self> {
        Self::structural(Action::Remove, changed, precondition)
    }

    /// Adds model `id` to `repository`.
    pub fn add_model(
        repository: &Address,
        id: Identifier,
        precondition: Precondition,
    ) -> CoreResult<Self> {
        Self::child_command(Action::Add, repository, AddressKind::Repository, id, precondition)
    }

    /// Removes model `id` from `repository`.
    pub fn remove_model(
        repository: &Address,
        id: Identifier,
        precondition: Precondition,
    ) -> CoreResult<Self> {
        Self::child_command(Action::Remove, repository, AddressKind::Repository, id, precondition)
    }

    /// Adds object `id` to `model`.
    pub fn add_object(
        model: &Address,
        id: Identifier,
        precondition: Precondition,
    ) -> CoreResult<Self> {
        Self::child_command(Action::Add, model, AddressKind::Model, id, precondition)
    }

    /// Removes object `id` from `model`.
    pub fn remove_object(
        model: &Address,
        id: Identifier,
        precondition: Precondition,
    ) -> CoreResult<Self> {
        Self::child_command(Action::Remove, model, AddressKind::Model, id, precondition)
    }

    /// Adds field `id` to `object`.
    pub fn add_field(
        object: &Address,
        id: Identifier,
        precondition: Precondition,
    ) -> CoreResult<Self> {
        Self::child_command(Action::Add, object, AddressKind::Object, id, precondition)
    }

    /// Removes field `id` from `object`.
    pub fn remove_field(
        object: &Address,
        id: Identifier,
        precondition: Precondition,
    ) -> CoreResult<Self> {
        Self::child_command(Action::Remove, object, AddressKind::Object, id, precondition)
    }

    /// Gives the field at `field` a value. Unless forced, the field must not
    /// hold a value yet.
    pub fn add_value(field: Address, precondition: Precondition, value: Value) -> CoreResult<Self> {
        Self::value_command(Action::Add, field, precondition, Some(value))
    }

    /// Replaces the value of the field at `field`. Unless forced, the field
    /// must hold a value.
    pub fn change_value(
        field: Address,
        precondition: Precondition,
        value: Value,
    ) -> CoreResult<Self> {
        Self::value_command(Action::Change, field, precondition, Some(value))
    }

    /// Clears the value of the field at `field`. Unless forced, the field
    /// must hold a value.
    pub fn remove_value(field: Address, precondition: Precondition) -> CoreResult<Self> {
        Self::value_command(Action::Remove, field, precondition, None)
    }

    fn structural(action: Action, changed: Address, precondition: Precondition) -> CoreResult<Self> {
        let target = changed.parent().ok_or_else(|| {
            CoreError::invalid_command(format!("{changed} has no parent to {action} it from"))
        })?;
        let command = Self {
            action,
            target,
            changed,
            precondition,
            value: None,
        };
        command.validate()?;
        Ok(command)
    }

    fn child_command(
        action: Action,
        parent: &Address,
        parent_kind: AddressKind,
        id: Identifier,
        precondition: Precondition,
    ) -> CoreResult<Self> {
        if parent.kind() != parent_kind {
            return Err(CoreError::invalid_command(format!(
                "{parent} is not a {parent_kind:?} address"
            )));
        }
        Self::structural(action, parent.child(id)?, precondition)
    }

    fn value_command(
        action: Action,
        field: Address,
        precondition: Precondition,
        value: Option<Value>,
    ) -> CoreResult<Self> {
        let command = Self {
            action,
            target: field.clone(),
            changed: field,
            precondition,
            value,
        };
        command.validate()?;
        Ok(command)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.changed.kind() == AddressKind::Repository {
            return Err(CoreError::invalid_command(
                "repositories cannot be added or removed",
            ));
        }
        if self.target == self.changed {
            if self.changed.kind() != AddressKind::Field {
                return Err(CoreError::invalid_command(format!(
                    "value commands must address a field, got {}",
                    self.changed
                )));
            }
            match (self.action, &self.value) {
                (Action::Add | Action::Change, None) => Err(CoreError::invalid_command(format!(
                    "{} value on {} needs a value",
                    self.action, self.changed
                ))),
                (Action::Remove, Some(_)) => Err(CoreError::invalid_command(format!(
                    "remove value on {} must not carry a value",
                    self.changed
                ))),
                _ => Ok(()),
            }
        } else {
            if self.changed.parent().as_ref() != Some(&self.target) {
                return Err(CoreError::invalid_command(format!(
                    "{} is not a child of {}",
                    self.changed, self.target
                )));
            }
            if self.action == Action::Change {
                return Err(CoreError::invalid_command(format!(
                    "only field values can be changed, not {}",
                    self.changed
                )));
            }
            if self.value.is_some() {
                return Err(CoreError::invalid_command(format!(
                    "structural command on {} must not carry a value",
                    self.changed
                )));
            }
            Ok(())
        }
    }

    /// Returns the action.
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// Returns the address the command is sent to.
    #[must_use]
    pub fn target(&self) -> &Address {
        &self.target
    }

    /// Returns the address of the entity being changed.
    #[must_use]
    pub fn changed(&self) -> &Address {
        &self.changed
    }

    /// Returns the precondition.
    #[must_use]
    pub fn precondition(&self) -> Precondition {
        self.precondition
    }

    /// Returns the value carried by an add or change value command.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Returns the granularity of the command: the kind of its target.
    #[must_use]
    pub fn kind(&self) -> AddressKind {
        self.target.kind()
    }

    /// Returns true if this command sets or clears a field value.
    #[must_use]
    pub fn is_value_command(&self) -> bool {
        self.target == self.changed
    }

    /// Returns the same command with a different precondition.
    #[must_use]
    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.precondition = precondition;
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = if self.is_value_command() { " value" } else { "" };
        write!(f, "{}{} {} ({:?})", self.action, what, self.changed, self.precondition)?;
        if let Some(value) = &self.value {
            write!(f, " = {value:?}")?;
        }
        Ok(())
    }
}
