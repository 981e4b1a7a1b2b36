//! The access rights manager.

use crate::definitions::{AccessDefinition, AccessKind, AccessValue, DefinitionTable};
use crate::error::{AccessError, AccessResult};
use crate::groups::{GroupDatabase, ALL_GROUP};
use parking_lot::RwLock;
use revtree_core::{Action, Address, Executable, Identifier};
use std::collections::BTreeSet;
use tracing::debug;

/// Resolves the effective access of actors to resources.
///
/// Groups and definitions sit behind separate locks, so checks from many
/// threads run concurrently with each other and only block on edits.
#[derive(Debug, Default)]
pub struct AccessManager {
    groups: RwLock<GroupDatabase>,
    definitions: RwLock<DefinitionTable>,
}

impl AccessManager {
    /// Creates a manager with no groups and no definitions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manager from existing groups and definitions.
    #[must_use]
    pub fn with_state(groups: GroupDatabase, definitions: DefinitionTable) -> Self {
        Self {
            groups: RwLock::new(groups),
            definitions: RwLock::new(definitions),
        }
    }

    /// Returns a copy of the group database.
    #[must_use]
    pub fn groups(&self) -> GroupDatabase {
        self.groups.read().clone()
    }

    /// Returns a copy of the definition table.
    #[must_use]
    pub fn definitions(&self) -> DefinitionTable {
        self.definitions.read().clone()
    }

    /// Makes `member` a direct member of `group`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Cycle`] if the membership would make a group
    /// contain itself.
    pub fn add_to_group(&self, member: Identifier, group: Identifier) -> AccessResult<()> {
        debug!(member = %member, group = %group, "add to group");
        self.groups.write().add_to_group(member, group)
    }

    /// Removes a direct membership. Returns false if there was none.
    pub fn remove_from_group(&self, member: &Identifier, group: &Identifier) -> bool {
        self.groups.write().remove_from_group(member, group)
    }

    /// Allows or denies `access` to `resource` for an actor or group.
    pub fn set_access(&self, subject: Identifier, resource: Address, access: AccessKind, allowed: bool) {
        debug!(subject = %subject, resource = %resource, access = %access, allowed, "set access");
        self.definitions.write().set(AccessDefinition {
            subject,
            resource,
            access,
            allowed,
        });
    }

    /// Removes a definition. Returns the value it had.
    pub fn reset_access(&self, subject: &Identifier, resource: &Address, access: &AccessKind) -> Option<bool> {
        self.definitions.write().reset(subject, resource, access)
    }

    /// Resolves the access of `actor` to `resource`.
    ///
    /// Starting at `resource` and walking up to the repository, the first
    /// address that settles the question decides:
    ///
    /// 1. a definition for the actor itself;
    /// 2. an allowing definition for any group of the actor, including
    ///    [`ALL_GROUP`];
    /// 3. a denying definition for [`ALL_GROUP`].
    ///
    /// Denying definitions for other groups never settle anything.
    #[must_use]
    pub fn has_access(&self, actor: &Identifier, resource: &Address, access: &AccessKind) -> AccessValue {
        let actor_groups = self.groups_with_all(actor);
        let definitions = self.definitions.read();
        resolve(&definitions, actor, &actor_groups, resource, access)
    }

    /// Returns true if access resolves to [`AccessValue::Allowed`].
    #[must_use]
    pub fn is_allowed(&self, actor: &Identifier, resource: &Address, access: &AccessKind) -> bool {
        self.has_access(actor, resource, access).is_allowed()
    }

    /// Returns true if `actor` is allowed `access` to `resource` and to
    /// every address below it.
    #[must_use]
    pub fn has_access_to_subtree(&self, actor: &Identifier, resource: &Address, access: &AccessKind) -> bool {
        let actor_groups = self.groups_with_all(actor);
        let definitions = self.definitions.read();
        // An address without definitions resolves like its nearest ancestor
        // that has some, so only defined addresses need checking.
        let result = std::iter::once(resource)
            .chain(definitions.defined_below(resource))
            .all(|address| resolve(&definitions, actor, &actor_groups, address, access).is_allowed());
        result
    }

    /// Returns true if `actor` is allowed `access` to `resource` or to at
    /// least one address below it.
    #[must_use]
    pub fn has_access_to_subresource(
        &self,
        actor: &Identifier,
        resource: &Address,
        access: &AccessKind,
    ) -> bool {
        let actor_groups = self.groups_with_all(actor);
        let definitions = self.definitions.read();
        let result = std::iter::once(resource)
            .chain(definitions.defined_below(resource))
            .any(|address| resolve(&definitions, actor, &actor_groups, address, access).is_allowed());
        result
    }

    /// Returns true if `actor` may execute `change`.
    ///
    /// Every command needs write access to the entity it changes. Removing
    /// an entity also removes everything below it, so removals need write
    /// access to the whole subtree. Undefined access is not enough.
    #[must_use]
    pub fn can_execute(&self, actor: &Identifier, change: &Executable) -> bool {
        self.denied_resource(actor, change).is_none()
    }

    /// Checks that `actor` may execute `change`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::AccessDenied`] naming the first resource the
    /// actor may not write.
    pub fn check(&self, actor: &Identifier, change: &Executable) -> AccessResult<()> {
        match self.denied_resource(actor, change) {
            Some(resource) => Err(AccessError::denied(actor, resource, &AccessKind::Write)),
            None => Ok(()),
        }
    }

    /// Checks that `actor` may read `resource`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::AccessDenied`] unless read access resolves to
    /// allowed.
    pub fn check_read(&self, actor: &Identifier, resource: &Address) -> AccessResult<()> {
        if self.is_allowed(actor, resource, &AccessKind::Read) {
            Ok(())
        } else {
            Err(AccessError::denied(actor, resource, &AccessKind::Read))
        }
    }

    fn denied_resource<'c>(&self, actor: &Identifier, change: &'c Executable) -> Option<&'c Address> {
        change.commands().iter().find_map(|command| {
            let changed = command.changed();
            let allowed = match command.action() {
                Action::Remove => self.has_access_to_subtree(actor, changed, &AccessKind::Write),
                _ => self.is_allowed(actor, changed, &AccessKind::Write),
            };
            (!allowed).then_some(changed)
        })
    }

    fn groups_with_all(&self, actor: &Identifier) -> BTreeSet<Identifier> {
        let mut groups = self.groups.read().groups_of(actor);
        if let Ok(all) = Identifier::new(ALL_GROUP) {
            groups.insert(all);
        }
        groups
    }
}

fn resolve(
    definitions: &DefinitionTable,
    actor: &Identifier,
    actor_groups: &BTreeSet<Identifier>,
    resource: &Address,
    access: &AccessKind,
) -> AccessValue {
    for level in resource.self_and_ancestors() {
        if let Some(allowed) = definitions.get(actor, &level, access) {
            return allowed.into();
        }
        let mut all_denied = false;
        for (subject, allowed) in definitions.subjects_at(&level, access) {
            if !actor_groups.contains(subject) {
                continue;
            }
            if allowed {
                return AccessValue::Allowed;
            }
            all_denied |= GroupDatabase::is_all_group(subject);
        }
        if all_denied {
            return AccessValue::Denied;
        }
    }
    AccessValue::Undefined
}

#[cfg(test)]
mod tests {
    use super::*;
    use revtree_core::{Command, Precondition, Value};

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn staff_manager() -> AccessManager {
        let arm = AccessManager::new();
        arm.add_to_group(id("alice"), id("editors")).unwrap();
        arm.add_to_group(id("editors"), id("staff")).unwrap();
        arm.add_to_group(id("bob"), id("staff")).unwrap();
        arm
    }

    #[test]
    fn nothing_defined_is_undefined() {
        let arm = AccessManager::new();
        let value = arm.has_access(&id("alice"), &addr("/repo/phonebook"), &AccessKind::Read);
        assert_eq!(value, AccessValue::Undefined);
    }

    #[test]
    fn explicit_definition_beats_group() {
        let arm = staff_manager();
        let phonebook = addr("/repo/phonebook");
        arm.set_access(id("alice"), phonebook.clone(), AccessKind::Write, false);
        arm.set_access(id("editors"), phonebook.clone(), AccessKind::Write, true);

        assert_eq!(arm.has_access(&id("alice"), &phonebook, &AccessKind::Write), AccessValue::Denied);
        arm.add_to_group(id("carol"), id("editors")).unwrap();
        assert_eq!(arm.has_access(&id("carol"), &phonebook, &AccessKind::Write), AccessValue::Allowed);
    }

    #[test]
    fn group_denial_is_ignored_but_all_denial_is_not() {
        let arm = staff_manager();
        let phonebook = addr("/repo/phonebook");
        arm.set_access(id("staff"), phonebook.clone(), AccessKind::Read, false);
        assert_eq!(arm.has_access(&id("bob"), &phonebook, &AccessKind::Read), AccessValue::Undefined);

        arm.set_access(id(ALL_GROUP), phonebook.clone(), AccessKind::Read, false);
        assert_eq!(arm.has_access(&id("bob"), &phonebook, &AccessKind::Read), AccessValue::Denied);

        arm.set_access(id("editors"), phonebook.clone(), AccessKind::Read, true);
        assert_eq!(arm.has_access(&id("alice"), &phonebook, &AccessKind::Read), AccessValue::Allowed);
        assert_eq!(arm.has_access(&id("bob"), &phonebook, &AccessKind::Read), AccessValue::Denied);
    }

    #[test]
    fn nearest_level_decides() {
        let arm = staff_manager();
        arm.set_access(id(ALL_GROUP), addr("/repo"), AccessKind::Read, true);
        arm.set_access(id("bob"), addr("/repo/phonebook/john"), AccessKind::Read, false);

        let phone = addr("/repo/phonebook/john/phone");
        assert_eq!(arm.has_access(&id("bob"), &phone, &AccessKind::Read), AccessValue::Denied);
        assert_eq!(arm.has_access(&id("alice"), &phone, &AccessKind::Read), AccessValue::Allowed);
        assert_eq!(
            arm.has_access(&id("bob"), &addr("/repo/phonebook/jane"), &AccessKind::Read),
            AccessValue::Allowed
        );
    }

    #[test]
    fn access_kinds_are_independent() {
        let arm = AccessManager::new();
        let phonebook = addr("/repo/phonebook");
        let publish: AccessKind = "publish".parse().unwrap();
        arm.set_access(id("alice"), phonebook.clone(), publish.clone(), true);
        assert!(arm.is_allowed(&id("alice"), &phonebook, &publish));
        assert!(!arm.is_allowed(&id("alice"), &phonebook, &AccessKind::Write));

        assert_eq!(arm.reset_access(&id("alice"), &phonebook, &publish), Some(true));
        assert!(!arm.is_allowed(&id("alice"), &phonebook, &publish));
    }

    #[test]
    fn subtree_and_subresource() {
        let arm = AccessManager::new();
        let phonebook = addr("/repo/phonebook");
        arm.set_access(id("alice"), phonebook.clone(), AccessKind::Write, true);
        assert!(arm.has_access_to_subtree(&id("alice"), &phonebook, &AccessKind::Write));

        arm.set_access(id("alice"), addr("/repo/phonebook/john/phone"), AccessKind::Write, false);
        assert!(!arm.has_access_to_subtree(&id("alice"), &phonebook, &AccessKind::Write));
        assert!(arm.has_access_to_subtree(&id("alice"), &addr("/repo/phonebook/jane"), &AccessKind::Write));
        assert!(arm.has_access_to_subresource(&id("alice"), &phonebook, &AccessKind::Write));

        arm.set_access(id("bob"), addr("/repo/phonebook/jane/email"), AccessKind::Write, true);
        assert!(!arm.is_allowed(&id("bob"), &phonebook, &AccessKind::Write));
        assert!(arm.has_access_to_subresource(&id("bob"), &phonebook, &AccessKind::Write));
        assert!(!arm.has_access_to_subresource(&id("bob"), &addr("/repo/phonebook/john"), &AccessKind::Write));
    }

    #[test]
    fn removals_need_the_whole_subtree() {
        let arm = AccessManager::new();
        let phonebook = addr("/repo/phonebook");
        let john = addr("/repo/phonebook/john");
        arm.set_access(id("alice"), phonebook.clone(), AccessKind::Write, true);
        arm.set_access(id("alice"), addr("/repo/phonebook/john/phone"), AccessKind::Write, false);

        let add_field: Executable = Command::add_field(&john, id("email"), Precondition::Forced)
            .unwrap()
            .into();
        assert!(arm.can_execute(&id("alice"), &add_field));

        let remove_john: Executable = Command::remove_object(&phonebook, id("john"), Precondition::Forced)
            .unwrap()
            .into();
        assert!(!arm.can_execute(&id("alice"), &remove_john));
        let err = arm.check(&id("alice"), &remove_john).unwrap_err();
        assert_eq!(err.to_string(), "alice has no write access to /repo/phonebook/john/-");

        let set_phone: Executable = Command::add_value(
            addr("/repo/phonebook/john/phone"),
            Precondition::Forced,
            Value::from("555"),
        )
        .unwrap()
        .into();
        assert!(arm.check(&id("alice"), &set_phone).is_err());
        assert!(arm.check(&id("stranger"), &add_field).is_err());
    }

    #[test]
    fn read_checks() {
        let arm = AccessManager::new();
        arm.set_access(id(ALL_GROUP), addr("/repo"), AccessKind::Read, true);
        arm.set_access(id("mallory"), addr("/repo/phonebook"), AccessKind::Read, false);
        assert!(arm.check_read(&id("alice"), &addr("/repo/phonebook/john")).is_ok());
        assert!(arm.check_read(&id("mallory"), &addr("/repo/phonebook/john")).unwrap_err().is_denied());
    }
}
