//! Repository access guarded by the access rights manager.

use crate::definitions::AccessKind;
use crate::error::{AccessError, AccessResult};
use crate::manager::AccessManager;
use revtree_core::{Address, Executable, ExecutionResult, Identifier, Model, Repository, Value};
use std::sync::Arc;
use tracing::debug;

/// A repository whose entry points check access first.
///
/// A denied request never reaches the execution engine, so it surfaces as
/// [`AccessError::AccessDenied`] and not as [`ExecutionResult::Failed`].
#[derive(Debug, Clone)]
pub struct GuardedRepository {
    repository: Arc<Repository>,
    access: Arc<AccessManager>,
}

impl GuardedRepository {
    /// Guards `repository` with `access`.
    pub fn new(repository: Arc<Repository>, access: Arc<AccessManager>) -> Self {
        Self { repository, access }
    }

    /// Returns the guarded repository.
    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    /// Returns the access manager.
    pub fn access(&self) -> &Arc<AccessManager> {
        &self.access
    }

    /// Executes `change` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::AccessDenied`] if the actor may not write
    /// every entity the change touches, or [`AccessError::Core`] if the
    /// repository rejects the change.
    pub fn execute(&self, actor: &Identifier, change: impl Into<Executable>) -> AccessResult<ExecutionResult> {
        let change = change.into();
        if let Err(e) = self.access.check(actor, &change) {
            debug!(actor = %actor, target = %change.target(), "execution denied");
            return Err(e);
        }
        Ok(self.repository.execute(Some(actor), change)?)
    }

    /// Reads the value at `address` on behalf of `actor`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::AccessDenied`] unless the actor may read the
    /// field.
    pub fn value_at(&self, actor: &Identifier, address: &Address) -> AccessResult<Option<Value>> {
        self.access.check_read(actor, address)?;
        Ok(self.repository.value_at(address))
    }

    /// Returns a snapshot of a model on behalf of `actor`.
    ///
    /// Reading a whole model needs read access to every part of it.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::AccessDenied`] if any part of the model is
    /// unreadable.
    pub fn model(&self, actor: &Identifier, id: &Identifier) -> AccessResult<Option<Arc<Model>>> {
        let address = self.repository.address().child(id.clone())?;
        if !self.access.has_access_to_subtree(actor, &address, &AccessKind::Read) {
            return Err(AccessError::denied(actor, &address, &AccessKind::Read));
        }
        Ok(self.repository.model(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::ALL_GROUP;
    use revtree_core::{Command, Precondition, Readable};
    use revtree_testkit::prelude::*;

    fn guarded() -> GuardedRepository {
        let access = AccessManager::new();
        access.add_to_group(id("alice"), id("editors")).unwrap();
        access.set_access(id("editors"), addr(PHONEBOOK), AccessKind::Write, true);
        access.set_access(id(ALL_GROUP), addr("/repo"), AccessKind::Read, true);
        access.set_access(id("mallory"), addr("/repo/phonebook/john"), AccessKind::Read, false);
        GuardedRepository::new(Arc::new(phonebook_repository()), Arc::new(access))
    }

    #[test]
    fn allowed_changes_reach_the_engine() {
        let guarded = guarded();
        let change = Command::change_value(
            addr("/repo/phonebook/john/phone"),
            Precondition::Forced,
            Value::from("555-9999"),
        )
        .unwrap();
        let result = guarded.execute(&id("alice"), change).unwrap();
        assert!(result.is_applied());
        assert_eq!(
            guarded.repository().value_at(&addr("/repo/phonebook/john/phone")),
            Some(Value::from("555-9999"))
        );
    }

    #[test]
    fn denied_changes_never_execute() {
        let guarded = guarded();
        let before = guarded.repository().model(&id("phonebook")).unwrap().revision();
        let change = Command::remove_object(&addr(PHONEBOOK), id("john"), Precondition::Forced).unwrap();

        let err = guarded.execute(&id("mallory"), change).unwrap_err();
        assert!(err.is_denied());
        assert_eq!(guarded.repository().model(&id("phonebook")).unwrap().revision(), before);
    }

    #[test]
    fn reads_are_checked() {
        let guarded = guarded();
        let phone = addr("/repo/phonebook/john/phone");
        assert_eq!(guarded.value_at(&id("alice"), &phone).unwrap(), Some(Value::from("555-1234")));
        assert!(guarded.value_at(&id("mallory"), &phone).unwrap_err().is_denied());

        assert!(guarded.model(&id("alice"), &id("phonebook")).unwrap().is_some());
        assert!(guarded.model(&id("mallory"), &id("phonebook")).unwrap_err().is_denied());
    }
}
