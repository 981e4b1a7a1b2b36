//! Serializable access policies.

use crate::definitions::{AccessDefinition, DefinitionTable};
use crate::error::AccessResult;
use crate::groups::GroupDatabase;
use crate::manager::AccessManager;
use revtree_core::Identifier;
use serde::{Deserialize, Serialize};

/// A direct group membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Actor or group that joins.
    pub member: Identifier,
    /// Group that is joined.
    pub group: Identifier,
}

/// Groups and definitions in a form that can be stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Group memberships, applied in order.
    #[serde(default)]
    pub groups: Vec<Membership>,
    /// Access definitions. Later definitions replace earlier ones for the
    /// same subject, resource and kind.
    #[serde(default)]
    pub definitions: Vec<AccessDefinition>,
}

impl AccessManager {
    /// Builds a manager from a policy.
    ///
    /// # Errors
    ///
    /// Returns [`crate::AccessError::Cycle`] if the memberships contain a
    /// cycle.
    pub fn from_policy(policy: AccessPolicy) -> AccessResult<Self> {
        let mut groups = GroupDatabase::new();
        for Membership { member, group } in policy.groups {
            groups.add_to_group(member, group)?;
        }
        let mut definitions = DefinitionTable::new();
        for definition in policy.definitions {
            definitions.set(definition);
        }
        Ok(Self::with_state(groups, definitions))
    }

    /// Exports the current groups and definitions.
    #[must_use]
    pub fn to_policy(&self) -> AccessPolicy {
        let groups = self.groups();
        let memberships = groups
            .groups()
            .flat_map(|group| {
                groups.members_of(group).map(move |member| Membership {
                    member: member.clone(),
                    group: group.clone(),
                })
            })
            .collect();
        AccessPolicy {
            groups: memberships,
            definitions: self.definitions().iter().collect(),
        }
    }
}
