//! Error types for revtree core.

use crate::address::Address;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in revtree core operations.
///
/// Optimistic-concurrency failures are not errors: a command whose
/// precondition does not hold yields [`ExecutionResult::Failed`].
///
/// [`ExecutionResult::Failed`]: crate::ExecutionResult::Failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// An identifier does not match the identifier grammar.
    #[error("malformed identifier {id:?}: {reason}")]
    MalformedIdentifier {
        /// The rejected input.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An address is syntactically or structurally invalid.
    #[error("malformed address {address:?}: {reason}")]
    MalformedAddress {
        /// The rejected input.
        address: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A command was added to a transaction builder outside its scope.
    #[error("command on {address} is outside transaction scope {scope}")]
    ScopeViolation {
        /// The builder's declared scope.
        scope: Address,
        /// The offending command's target.
        address: Address,
    },

    /// A command is not well formed (wrong action for its granularity,
    /// missing or superfluous value).
    #[error("invalid command: {message}")]
    InvalidCommand {
        /// Description of the problem.
        message: String,
    },

    /// A change log query named a revision outside the logged range.
    #[error("revision {revision} out of range [{base}, {current})")]
    OutOfRange {
        /// Requested revision.
        revision: u64,
        /// First revision held by the log.
        base: u64,
        /// Revision the next logged event will carry.
        current: u64,
    },

    /// A command or event was routed to an entity it does not address.
    #[error("address mismatch: expected an address within {expected}, got {actual}")]
    AddressMismatch {
        /// Address of the entity that received the change.
        expected: Address,
        /// Address named by the change.
        actual: Address,
    },

    /// An event does not follow on from the state it is replayed onto.
    #[error("revision mismatch: expected {expected}, got {actual}")]
    RevisionMismatch {
        /// Revision the receiving state expected.
        expected: u64,
        /// Revision carried by the event.
        actual: u64,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The persistence collaborator reported a failure.
    #[error("persistence error: {message}")]
    Persistence {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a malformed identifier error.
    pub fn malformed_identifier(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedIdentifier {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a malformed address error.
    pub fn malformed_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid command error.
    pub fn invalid_command(message: impl Into<String>) -> Self {
        Self::InvalidCommand {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Creates an address mismatch error.
    pub fn address_mismatch(expected: &Address, actual: &Address) -> Self {
        Self::AddressMismatch {
            expected: expected.clone(),
            actual: actual.clone(),
        }
    }
}
