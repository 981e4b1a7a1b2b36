//! Addresses of entities in the repository tree.

mod identifier;

pub use identifier::{Identifier, MAX_IDENTIFIER_LEN};

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Granularity of an addressed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    /// A repository (root of the tree).
    Repository,
    /// A model inside a repository.
    Model,
    /// An object inside a model.
    Object,
    /// A field inside an object.
    Field,
}

impl AddressKind {
    fn from_depth(depth: usize) -> Self {
        match depth {
            0 => AddressKind::Repository,
            1 => AddressKind::Model,
            2 => AddressKind::Object,
            _ => AddressKind::Field,
        }
    }
}

/// Immutable path `(repository?, model?, object?, field?)` to an entity.
///
/// Shorter prefixes address coarser entities. Leading components may be
/// absent (a model that is not attached to a repository), but there are no
/// gaps: once a component is present, every component up to the addressed
/// entity is present too.
///
/// The text form is `/repo/model/object/field` with `-` for an absent
/// component, e.g. `/phonebook/contacts/john/-`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address {
    components: [Option<Identifier>; 4],
}

impl Address {
    /// Creates an address from its components.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedAddress`] if all components are absent
    /// or the present components have a gap.
    pub fn new(
        repository: Option<Identifier>,
        model: Option<Identifier>,
        object: Option<Identifier>,
        field: Option<Identifier>,
    ) -> CoreResult<Self> {
        let components = [repository, model, object, field];
        let first = components.iter().position(Option::is_some);
        let last = components.iter().rposition(Option::is_some);
        let (Some(first), Some(last)) = (first, last) else {
            return Err(CoreError::malformed_address("/-/-/-/-", "address is empty"));
        };
        if components[first..=last].iter().any(Option::is_none) {
            let address = Self { components };
            return Err(CoreError::malformed_address(
                address.to_string(),
                "address components must not have gaps",
            ));
        }
        Ok(Self { components })
    }

    /// Address of a repository.
    #[must_use]
    pub fn for_repository(repository: Identifier) -> Self {
        Self {
            components: [Some(repository), None, None, None],
        }
    }

    /// Address of a model inside a repository.
    #[must_use]
    pub fn for_model(repository: Identifier, model: Identifier) -> Self {
        Self {
            components: [Some(repository), Some(model), None, None],
        }
    }

    /// Address of an object inside a model.
    #[must_use]
    pub fn for_object(repository: Identifier, model: Identifier, object: Identifier) -> Self {
        Self {
            components: [Some(repository), Some(model), Some(object), None],
        }
    }

    /// Address of a field inside an object.
    #[must_use]
    pub fn for_field(
        repository: Identifier,
        model: Identifier,
        object: Identifier,
        field: Identifier,
    ) -> Self {
        Self {
            components: [Some(repository), Some(model), Some(object), Some(field)],
        }
    }

    fn last_index(&self) -> usize {
        // Construction guarantees at least one present component.
        self.components
            .iter()
            .rposition(Option::is_some)
            .unwrap_or(0)
    }

    /// Returns the granularity of the addressed entity.
    #[must_use]
    pub fn kind(&self) -> AddressKind {
        AddressKind::from_depth(self.last_index())
    }

    /// Returns the identifier of the addressed entity.
    #[must_use]
    pub fn id(&self) -> &Identifier {
        match &self.components[self.last_index()] {
            Some(id) => id,
            None => unreachable!("an address always has a present last component"),
        }
    }

    /// Returns the repository component.
    #[must_use]
    pub fn repository_id(&self) -> Option<&Identifier> {
        self.components[0].as_ref()
    }

    /// Returns the model component.
    #[must_use]
    pub fn model_id(&self) -> Option<&Identifier> {
        self.components[1].as_ref()
    }

    /// Returns the object component.
    #[must_use]
    pub fn object_id(&self) -> Option<&Identifier> {
        self.components[2].as_ref()
    }

    /// Returns the field component.
    #[must_use]
    pub fn field_id(&self) -> Option<&Identifier> {
        self.components[3].as_ref()
    }

    /// Returns the address of a child of this entity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedAddress`] for a field address, which has
    /// no children.
    pub fn child(&self, id: Identifier) -> CoreResult<Self> {
        let next = self.last_index() + 1;
        if next >= self.components.len() {
            return Err(CoreError::malformed_address(
                self.to_string(),
                "fields have no children",
            ));
        }
        let mut components = self.components.clone();
        components[next] = Some(id);
        Ok(Self { components })
    }

    /// Returns the address of the parent entity, if it is addressable.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let last = self.last_index();
        let mut components = self.components.clone();
        components[last] = None;
        if components.iter().all(Option::is_none) {
            None
        } else {
            Some(Self { components })
        }
    }

    /// Truncates this address to the given granularity.
    ///
    /// Returns `None` if this address is coarser than `kind` or the
    /// truncated address would be empty.
    #[must_use]
    pub fn truncate(&self, kind: AddressKind) -> Option<Self> {
        let depth = kind as usize;
        if depth > self.last_index() {
            return None;
        }
        let mut components = self.components.clone();
        for slot in components.iter_mut().skip(depth + 1) {
            *slot = None;
        }
        if components.iter().all(Option::is_none) {
            None
        } else {
            Some(Self { components })
        }
    }

    /// Returns true if `other` is a strict descendant of this address.
    #[must_use]
    pub fn contains(&self, other: &Address) -> bool {
        let last = self.last_index();
        other.last_index() > last && self.components[..=last] == other.components[..=last]
    }

    /// Returns true if `other` equals this address or is a descendant of it.
    #[must_use]
    pub fn equals_or_contains(&self, other: &Address) -> bool {
        self == other || self.contains(other)
    }

    /// Returns true if either address equals or contains the other.
    #[must_use]
    pub fn overlaps(&self, other: &Address) -> bool {
        self.equals_or_contains(other) || other.contains(self)
    }

    /// Iterates over this address and its ancestors, nearest first.
    pub fn self_and_ancestors(&self) -> impl Iterator<Item = Address> {
        std::iter::successors(Some(self.clone()), Address::parent)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in &self.components {
            match component {
                Some(id) => write!(f, "/{id}")?,
                None => f.write_str("/-")?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| CoreError::malformed_address(s, "must start with '/'"))?;
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() > 4 {
            return Err(CoreError::malformed_address(s, "too many components"));
        }
        let mut components: [Option<Identifier>; 4] = [None, None, None, None];
        for (slot, part) in components.iter_mut().zip(parts) {
            if part != "-" {
                *slot = Some(Identifier::new(part).map_err(|e| {
                    CoreError::malformed_address(s, e.to_string())
                })?);
            }
        }
        let [repository, model, object, field] = components;
        Self::new(repository, model, object, field)
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;

    fn try_from(value: String) -> CoreResult<Self> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> Identifier {
        Identifier::new(raw).unwrap()
    }

    fn field_address() -> Address {
        Address::for_field(id("repo"), id("phonebook"), id("john"), id("phone"))
    }

    #[test]
    fn kind_follows_last_component() {
        assert_eq!(Address::for_repository(id("repo")).kind(), AddressKind::Repository);
        assert_eq!(
            Address::for_model(id("repo"), id("phonebook")).kind(),
            AddressKind::Model
        );
        assert_eq!(field_address().kind(), AddressKind::Field);
        assert_eq!(field_address().id().as_str(), "phone");
    }

    #[test]
    fn rejects_gaps_and_empty() {
        assert!(Address::new(None, None, None, None).is_err());
        assert!(Address::new(Some(id("repo")), None, Some(id("john")), None).is_err());
        assert!(Address::new(None, Some(id("phonebook")), Some(id("john")), None).is_ok());
    }

    #[test]
    fn parent_chain() {
        let chain: Vec<String> = field_address()
            .self_and_ancestors()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(
            chain,
            vec![
                "/repo/phonebook/john/phone",
                "/repo/phonebook/john/-",
                "/repo/phonebook/-/-",
                "/repo/-/-/-",
            ]
        );
    }

    #[test]
    fn containment() {
        let model = Address::for_model(id("repo"), id("phonebook"));
        let field = field_address();
        assert!(model.contains(&field));
        assert!(!field.contains(&model));
        assert!(!model.contains(&model));
        assert!(model.equals_or_contains(&model));
        assert!(field.overlaps(&model));

        let other = Address::for_model(id("repo"), id("calendar"));
        assert!(!other.overlaps(&field));

        let detached = Address::new(None, Some(id("phonebook")), None, None).unwrap();
        assert!(!detached.contains(&field));
    }

    #[test]
    fn child_and_truncate() {
        let object = Address::for_object(id("repo"), id("phonebook"), id("john"));
        assert_eq!(object.child(id("phone")).unwrap(), field_address());
        assert!(field_address().child(id("more")).is_err());
        assert_eq!(field_address().truncate(AddressKind::Object), Some(object));
        let model = Address::for_model(id("repo"), id("phonebook"));
        assert_eq!(model.truncate(AddressKind::Field), None);
    }

    #[test]
    fn text_form_roundtrip() {
        let address = field_address();
        let parsed: Address = address.to_string().parse().unwrap();
        assert_eq!(parsed, address);

        let short: Address = "/repo/phonebook".parse().unwrap();
        assert_eq!(short.kind(), AddressKind::Model);

        assert!("repo/phonebook".parse::<Address>().is_err());
        assert!("/repo/-/john".parse::<Address>().is_err());
        assert!("/a/b/c/d/e".parse::<Address>().is_err());
    }
}
