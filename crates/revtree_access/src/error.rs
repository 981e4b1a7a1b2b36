//! Error types for access control.

use crate::definitions::AccessKind;
use revtree_core::{Address, CoreError, Identifier};
use thiserror::Error;

/// Result type for access operations.
pub type AccessResult<T> = Result<T, AccessError>;

/// Errors raised by access checks and group edits.
#[derive(Error, Debug)]
pub enum AccessError {
    /// The actor may not perform the operation.
    #[error("{actor} has no {access} access to {resource}")]
    AccessDenied {
        /// Acting identity.
        actor: Identifier,
        /// Resource that was checked.
        resource: Address,
        /// Kind of access that was needed.
        access: AccessKind,
    },

    /// A membership would make a group contain itself.
    #[error("adding {member} to {group} would create a membership cycle")]
    Cycle {
        /// Member being added.
        member: Identifier,
        /// Group it was added to.
        group: Identifier,
    },

    /// The guarded operation failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl AccessError {
    /// Creates an access denied error.
    pub fn denied(actor: &Identifier, resource: &Address, access: &AccessKind) -> Self {
        Self::AccessDenied {
            actor: actor.clone(),
            resource: resource.clone(),
            access: access.clone(),
        }
    }

    /// Returns true if this is an authorization failure.
    pub fn is_denied(&self) -> bool {
        matches!(self, AccessError::AccessDenied { .. })
    }
}
