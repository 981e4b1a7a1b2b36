//! Transaction builder.

use super::{check_in_scope, check_scope_kind, Transaction};
use crate::address::{Address, Identifier};
use crate::command::{Command, Precondition};
use crate::error::{CoreError, CoreResult};
use crate::value::Value;

/// Accumulates commands under one scope and freezes them into a
/// [`Transaction`].
///
/// A builder is single use: after [`build`](Self::build) every further call
/// fails with [`CoreError::InvalidOperation`].
///
/// ```rust,ignore
/// let mut builder = TransactionBuilder::new(john.clone())?;
/// builder
///     .add_field(&john, Identifier::new("alias")?, Precondition::New)?
///     .add_value(alias, Precondition::New, Value::from("Cookie Monster"))?;
/// let txn = builder.build()?;
/// ```
#[derive(Debug)]
pub struct TransactionBuilder {
    scope: Address,
    commands: Vec<Command>,
    built: bool,
}

impl TransactionBuilder {
    /// Creates a builder for commands within `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] unless `scope` addresses a
    /// model or an object.
    pub fn new(scope: Address) -> CoreResult<Self> {
        check_scope_kind(&scope)?;
        Ok(Self {
            scope,
            commands: Vec::new(),
            built: false,
        })
    }

    /// Returns the scope.
    #[must_use]
    pub fn scope(&self) -> &Address {
        &self.scope
    }

    /// Returns the number of commands added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if no command was added yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Appends a command.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ScopeViolation`] if the command's target is not
    /// the scope or one of its descendants.
    pub fn add_command(&mut self, command: Command) -> CoreResult<&mut Self> {
        self.ensure_open()?;
        check_in_scope(&self.scope, &command)?;
        self.commands.push(command);
        Ok(self)
    }

    /// Appends an add-object command.
    pub fn add_object(
        &mut self,
        model: &Address,
        id: Identifier,
        precondition: Precondition,
    ) -> CoreResult<&mut Self> {
        self.add_command(Command::add_object(model, id, precondition)?)
    }

    /// Appends a remove-object command.
    pub fn remove_object(
        &mut self,
        model: &Address,
        id: Identifier,
        precondition: Precondition,
    ) -> CoreResult<&mut Self> {
        self.add_command(Command::remove_object(model, id, precondition)?)
    }

    /// Appends an add-field command.
    pub fn add_field(
        &mut self,
        object: &Address,
        id: Identifier,
        precondition: Precondition,
    ) -> CoreResult<&mut Self> {
        self.add_command(Command::add_field(object, id, precondition)?)
    }

    /// Appends a remove-field command.
    pub fn remove_field(
        &mut self,
        object: &Address,
        id: Identifier,
        precondition: Precondition,
    ) -> CoreResult<&mut Self> {
        self.add_command(Command::remove_field(object, id, precondition)?)
    }

    /// Appends an add-value command.
    pub fn add_value(
        &mut self,
        field: Address,
        precondition: Precondition,
        value: Value,
    ) -> CoreResult<&mut Self> {
        self.add_command(Command::add_value(field, precondition, value)?)
    }

    /// Appends a change-value command.
    pub fn change_value(
        &mut self,
        field: Address,
        precondition: Precondition,
        value: Value,
    ) -> CoreResult<&mut Self> {
        self.add_command(Command::change_value(field, precondition, value)?)
    }

    /// Appends a remove-value command.
    pub fn remove_value(
        &mut self,
        field: Address,
        precondition: Precondition,
    ) -> CoreResult<&mut Self> {
        self.add_command(Command::remove_value(field, precondition)?)
    }

    /// Freezes the accumulated commands.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the builder was already
    /// used or holds no commands.
    pub fn build(&mut self) -> CoreResult<Transaction> {
        self.ensure_open()?;
        if self.commands.is_empty() {
            return Err(CoreError::invalid_operation(
                "a transaction needs at least one command",
            ));
        }
        self.built = true;
        Ok(Transaction {
            target: self.scope.clone(),
            commands: std::mem::take(&mut self.commands),
        })
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.built {
            Err(CoreError::invalid_operation("transaction builder already built"))
        } else {
            Ok(())
        }
    }
}
