//! Nested groups of actors.

use crate::error::{AccessError, AccessResult};
use revtree_core::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the group every actor belongs to.
pub const ALL_GROUP: &str = "all";

/// Group memberships.
///
/// A member is an actor or another group. Membership is transitive: an actor
/// in `editors` that is itself in `staff` belongs to both. Every actor also
/// belongs to [`ALL_GROUP`] without being listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDatabase {
    /// Direct members of each group.
    groups: BTreeMap<Identifier, BTreeSet<Identifier>>,
}

impl GroupDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `id` names the implicit group of all actors.
    #[must_use]
    pub fn is_all_group(id: &Identifier) -> bool {
        id.as_str() == ALL_GROUP
    }

    /// Makes `member` a direct member of `group`.
    ///
    /// Adding an existing membership is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::Cycle`] if `group` already belongs to `member`,
    /// directly or not, if both are the same, or if either side is
    /// [`ALL_GROUP`]. The database is unchanged on error.
    pub fn add_to_group(&mut self, member: Identifier, group: Identifier) -> AccessResult<()> {
        let involves_all = Self::is_all_group(&member) || Self::is_all_group(&group);
        if involves_all || member == group || self.is_member(&group, &member) {
            return Err(AccessError::Cycle { member, group });
        }
        self.groups.entry(group).or_default().insert(member);
        Ok(())
    }

    /// Removes a direct membership. Returns false if there was none.
    pub fn remove_from_group(&mut self, member: &Identifier, group: &Identifier) -> bool {
        let Some(members) = self.groups.get_mut(group) else {
            return false;
        };
        let removed = members.remove(member);
        if members.is_empty() {
            self.groups.remove(group);
        }
        removed
    }

    /// Returns true if `actor` belongs to `group`, directly or through
    /// nested groups.
    #[must_use]
    pub fn is_member(&self, actor: &Identifier, group: &Identifier) -> bool {
        Self::is_all_group(group) || self.groups_of(actor).contains(group)
    }

    /// Returns every group `actor` belongs to, [`ALL_GROUP`] excluded.
    #[must_use]
    pub fn groups_of(&self, actor: &Identifier) -> BTreeSet<Identifier> {
        let mut found = BTreeSet::new();
        let mut frontier = vec![actor];
        while let Some(current) = frontier.pop() {
            for (group, members) in &self.groups {
                if members.contains(current) && found.insert(group.clone()) {
                    frontier.push(group);
                }
            }
        }
        found
    }

    /// Returns the direct members of `group`.
    pub fn members_of(&self, group: &Identifier) -> impl Iterator<Item = &Identifier> + '_ {
        self.groups.get(group).into_iter().flatten()
    }

    /// Returns the groups that have members.
    pub fn groups(&self) -> impl Iterator<Item = &Identifier> + '_ {
        self.groups.keys()
    }
}
