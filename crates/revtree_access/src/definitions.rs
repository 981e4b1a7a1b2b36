//! Access definitions attached to addresses.

use revtree_core::{Address, CoreError, Identifier};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A kind of access.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    /// Reading entities and values.
    Read,
    /// Executing changes.
    Write,
    /// An application-defined kind.
    Custom(Identifier),
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => f.write_str("read"),
            AccessKind::Write => f.write_str("write"),
            AccessKind::Custom(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for AccessKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(AccessKind::Read),
            "write" => Ok(AccessKind::Write),
            other => Identifier::new(other).map(AccessKind::Custom),
        }
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessValue {
    /// Access is granted.
    Allowed,
    /// Access is refused.
    Denied,
    /// Nothing applies to the actor.
    Undefined,
}

impl AccessValue {
    /// Returns true only for [`AccessValue::Allowed`].
    #[must_use]
    pub fn is_allowed(self) -> bool {
        self == AccessValue::Allowed
    }
}

impl From<bool> for AccessValue {
    fn from(allowed: bool) -> Self {
        if allowed {
            AccessValue::Allowed
        } else {
            AccessValue::Denied
        }
    }
}

impl fmt::Display for AccessValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            AccessValue::Allowed => "allowed",
            AccessValue::Denied => "denied",
            AccessValue::Undefined => "undefined",
        };
        f.write_str(text)
    }
}

/// One allow or deny rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDefinition {
    /// Actor or group the rule is about.
    pub subject: Identifier,
    /// Resource the rule is attached to.
    pub resource: Address,
    /// Kind of access ruled on.
    pub access: AccessKind,
    /// Whether access is allowed.
    pub allowed: bool,
}

type Rules = BTreeMap<(AccessKind, Identifier), bool>;

/// Access definitions indexed by resource.
///
/// Only addresses with at least one definition are stored, which keeps
/// subtree checks proportional to the number of definitions rather than to
/// the size of the tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionTable {
    rules: BTreeMap<Address, Rules>,
}

impl DefinitionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a definition, replacing any previous one for the same subject,
    /// resource and kind.
    pub fn set(&mut self, definition: AccessDefinition) {
        self.rules
            .entry(definition.resource)
            .or_default()
            .insert((definition.access, definition.subject), definition.allowed);
    }

    /// Removes a definition. Returns the value it had.
    pub fn reset(&mut self, subject: &Identifier, resource: &Address, access: &AccessKind) -> Option<bool> {
        let rules = self.rules.get_mut(resource)?;
        let removed = rules.remove(&(access.clone(), subject.clone()));
        if rules.is_empty() {
            self.rules.remove(resource);
        }
        removed
    }

    /// Returns the definition for exactly this subject, resource and kind.
    #[must_use]
    pub fn get(&self, subject: &Identifier, resource: &Address, access: &AccessKind) -> Option<bool> {
        self.rules
            .get(resource)?
            .get(&(access.clone(), subject.clone()))
            .copied()
    }

    /// Returns the subjects with a definition of `access` on `resource`.
    pub fn subjects_at<'a>(
        &'a self,
        resource: &Address,
        access: &'a AccessKind,
    ) -> impl Iterator<Item = (&'a Identifier, bool)> + 'a {
        self.rules
            .get(resource)
            .into_iter()
            .flatten()
            .filter(move |((kind, _), _)| kind == access)
            .map(|((_, subject), allowed)| (subject, *allowed))
    }

    /// Returns the resources strictly below `resource` that carry
    /// definitions.
    pub fn defined_below<'a>(&'a self, resource: &'a Address) -> impl Iterator<Item = &'a Address> + 'a {
        self.rules.keys().filter(move |defined| resource.contains(defined))
    }

    /// Returns every definition.
    pub fn iter(&self) -> impl Iterator<Item = AccessDefinition> + '_ {
        self.rules.iter().flat_map(|(resource, rules)| {
            rules.iter().map(move |((access, subject), allowed)| AccessDefinition {
                subject: subject.clone(),
                resource: resource.clone(),
                access: access.clone(),
                allowed: *allowed,
            })
        })
    }

    /// Returns the number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.values().map(BTreeMap::len).sum()
    }

    /// Returns true if there are no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(subject: &str, resource: &str, access: AccessKind, allowed: bool) -> AccessDefinition {
        AccessDefinition {
            subject: Identifier::new(subject).unwrap(),
            resource: resource.parse().unwrap(),
            access,
            allowed,
        }
    }

    #[test]
    fn access_kind_parsing() {
        assert_eq!("READ".parse::<AccessKind>().unwrap(), AccessKind::Read);
        assert_eq!("write".parse::<AccessKind>().unwrap(), AccessKind::Write);
        assert_eq!(
            "publish".parse::<AccessKind>().unwrap(),
            AccessKind::Custom(Identifier::new("publish").unwrap())
        );
        assert!("-bad".parse::<AccessKind>().is_err());
        assert_eq!(AccessKind::Write.to_string(), "write");
    }

    #[test]
    fn set_replaces_and_reset_removes() {
        let mut table = DefinitionTable::new();
        table.set(definition("alice", "/repo/phonebook", AccessKind::Write, true));
        table.set(definition("alice", "/repo/phonebook", AccessKind::Write, false));
        table.set(definition("alice", "/repo/phonebook", AccessKind::Read, true));
        assert_eq!(table.len(), 2);

        let alice = Identifier::new("alice").unwrap();
        let phonebook: Address = "/repo/phonebook".parse().unwrap();
        assert_eq!(table.get(&alice, &phonebook, &AccessKind::Write), Some(false));
        assert_eq!(table.reset(&alice, &phonebook, &AccessKind::Write), Some(false));
        assert_eq!(table.reset(&alice, &phonebook, &AccessKind::Read), Some(true));
        assert!(table.is_empty());
    }

    #[test]
    fn defined_below_is_strict() {
        let mut table = DefinitionTable::new();
        table.set(definition("alice", "/repo/phonebook", AccessKind::Read, true));
        table.set(definition("alice", "/repo/phonebook/john", AccessKind::Read, false));
        table.set(definition("alice", "/repo/other", AccessKind::Read, false));

        let phonebook: Address = "/repo/phonebook".parse().unwrap();
        let below: Vec<String> = table.defined_below(&phonebook).map(ToString::to_string).collect();
        assert_eq!(below, vec!["/repo/phonebook/john/-".to_string()]);
        assert_eq!(table.subjects_at(&phonebook, &AccessKind::Read).count(), 1);
        assert_eq!(table.subjects_at(&phonebook, &AccessKind::Write).count(), 0);
    }

    #[test]
    fn definitions_serialize_as_json() {
        let def = definition("editors", "/repo/phonebook", AccessKind::Write, true);
        let json = serde_json::to_string(&def).unwrap();
        assert_eq!(
            json,
            r#"{"subject":"editors","resource":"/repo/phonebook/-/-","access":"write","allowed":true}"#
        );
        let back: AccessDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, def);
    }
}
