//! Transactions: atomically applied command sequences.

mod builder;

pub use builder::TransactionBuilder;

use crate::address::{Address, AddressKind};
use crate::command::Command;
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// An immutable, ordered sequence of commands scoped to one model or object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransactionRepr")]
pub struct Transaction {
    target: Address,
    commands: Vec<Command>,
}

#[derive(Deserialize)]
struct TransactionRepr {
    target: Address,
    commands: Vec<Command>,
}

impl TryFrom<TransactionRepr> for Transaction {
    type Error = CoreError;

    fn try_from(repr: TransactionRepr) -> CoreResult<Self> {
        Self::new(repr.target, repr.commands)
    }
}

impl Transaction {
    /// Creates a transaction from already built commands.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for an empty command list or a
    /// target that is not a model or object, and
    /// [`CoreError::ScopeViolation`] for a command outside `target`.
    pub fn new(target: Address, commands: Vec<Command>) -> CoreResult<Self> {
        check_scope_kind(&target)?;
        if commands.is_empty() {
            return Err(CoreError::invalid_operation(
                "a transaction needs at least one command",
            ));
        }
        for command in &commands {
            check_in_scope(&target, command)?;
        }
        Ok(Self { target, commands })
    }

    /// Returns the scope of this transaction.
    #[must_use]
    pub fn target(&self) -> &Address {
        &self.target
    }

    /// Returns the commands in execution order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns the number of commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Always false: transactions hold at least one command.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Anything the execution engine accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Executable {
    /// A single command.
    Command(Command),
    /// A transaction.
    Transaction(Transaction),
}

impl Executable {
    /// Returns the address the change is sent to.
    #[must_use]
    pub fn target(&self) -> &Address {
        match self {
            Executable::Command(c) => c.target(),
            Executable::Transaction(t) => t.target(),
        }
    }

    /// Returns the commands in execution order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        match self {
            Executable::Command(c) => std::slice::from_ref(c),
            Executable::Transaction(t) => t.commands(),
        }
    }

    /// Returns the address of the model the change applies to.
    #[must_use]
    pub fn model_address(&self) -> Option<Address> {
        match self {
            Executable::Command(c) => c.changed().truncate(AddressKind::Model),
            Executable::Transaction(t) => t.target().truncate(AddressKind::Model),
        }
    }

    /// Returns a copy with every command mapped through `f`.
    ///
    /// # Errors
    ///
    /// Propagates the first error of `f`, or a scope error if a mapped
    /// command leaves the transaction's scope.
    pub fn try_map_commands<F>(&self, mut f: F) -> CoreResult<Self>
    where
        F: FnMut(&Command) -> CoreResult<Command>,
    {
        match self {
            Executable::Command(c) => Ok(Executable::Command(f(c)?)),
            Executable::Transaction(t) => {
                let commands = t.commands.iter().map(&mut f).collect::<CoreResult<Vec<_>>>()?;
                Ok(Executable::Transaction(Transaction::new(
                    t.target.clone(),
                    commands,
                )?))
            }
        }
    }
}

impl From<Command> for Executable {
    fn from(command: Command) -> Self {
        Executable::Command(command)
    }
}

impl From<Transaction> for Executable {
    fn from(transaction: Transaction) -> Self {
        Executable::Transaction(transaction)
    }
}

fn check_scope_kind(scope: &Address) -> CoreResult<()> {
    match scope.kind() {
        AddressKind::Model | AddressKind::Object => Ok(()),
        _ => Err(CoreError::invalid_operation(format!(
            "transactions are scoped to a model or object, not {scope}"
        ))),
    }
}

fn check_in_scope(scope: &Address, command: &Command) -> CoreResult<()> {
    if scope.equals_or_contains(command.target()) {
        Ok(())
    } else {
        Err(CoreError::ScopeViolation {
            scope: scope.clone(),
            address: command.target().clone(),
        })
    }
}
