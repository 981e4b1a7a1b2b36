//! Model, object and field entities.
//!
//! Entities are immutable once shared. Children are held behind `Arc` so a
//! working copy of a model shares every subtree it does not touch, and
//! mutation goes through `Arc::make_mut`.

use super::traits::{Container, Readable};
use crate::address::{Address, AddressKind, Identifier};
use crate::error::{CoreError, CoreResult};
use crate::value::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A field: the leaf entity holding at most one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    address: Address,
    revision: u64,
    value: Option<Value>,
}

impl Field {
    pub(crate) fn new(address: Address, revision: u64) -> Self {
        Self {
            address,
            revision,
            value: None,
        }
    }

    /// Returns the current value, if any.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Returns true if the field holds no value.
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    pub(crate) fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    /// Replaces the value, returning the previous one.
    pub(crate) fn set_value(&mut self, value: Option<Value>) -> Option<Value> {
        std::mem::replace(&mut self.value, value)
    }
}

impl Readable for Field {
    fn id(&self) -> &Identifier {
        self.address.id()
    }

    fn address(&self) -> &Address {
        &self.address
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

/// An object: a named collection of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    address: Address,
    revision: u64,
    fields: BTreeMap<Identifier, Arc<Field>>,
}

impl Object {
    pub(crate) fn new(address: Address, revision: u64) -> Self {
        Self {
            address,
            revision,
            fields: BTreeMap::new(),
        }
    }

    /// Returns the field with the given id.
    pub fn field(&self, id: &Identifier) -> Option<&Field> {
        self.fields.get(id).map(Arc::as_ref)
    }

    /// Iterates over the fields in id order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.fields.values().map(Arc::as_ref)
    }

    pub(crate) fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    pub(crate) fn field_mut(&mut self, id: &Identifier) -> Option<&mut Field> {
        self.fields.get_mut(id).map(Arc::make_mut)
    }

    pub(crate) fn create_field(&mut self, id: Identifier, revision: u64) -> CoreResult<&mut Field> {
        if self.fields.contains_key(&id) {
            return Err(CoreError::invalid_operation(format!(
                "field {id} already exists in {}",
                self.address
            )));
        }
        let address = self.address.child(id.clone())?;
        let field = self
            .fields
            .entry(id)
            .or_insert_with(|| Arc::new(Field::new(address, revision)));
        Ok(Arc::make_mut(field))
    }

    pub(crate) fn remove_field(&mut self, id: &Identifier) -> Option<Arc<Field>> {
        self.fields.remove(id)
    }
}

impl Readable for Object {
    fn id(&self) -> &Identifier {
        self.address.id()
    }

    fn address(&self) -> &Address {
        &self.address
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

impl Container for Object {
    type Child = Field;

    fn child(&self, id: &Identifier) -> Option<&Field> {
        self.field(id)
    }

    fn child_ids(&self) -> impl Iterator<Item = &Identifier> + '_ {
        self.fields.keys()
    }

    fn child_count(&self) -> usize {
        self.fields.len()
    }
}

/// A borrowed entity of any granularity below the repository.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntityRef<'a> {
    /// A model.
    Model(&'a Model),
    /// An object.
    Object(&'a Object),
    /// A field.
    Field(&'a Field),
}

impl EntityRef<'_> {
    /// Returns the revision of the referenced entity.
    pub fn revision(&self) -> u64 {
        match self {
            EntityRef::Model(m) => m.revision(),
            EntityRef::Object(o) => o.revision(),
            EntityRef::Field(f) => f.revision(),
        }
    }

    /// Returns the address of the referenced entity.
    pub fn address(&self) -> &Address {
        match self {
            EntityRef::Model(m) => m.address(),
            EntityRef::Object(o) => o.address(),
            EntityRef::Field(f) => f.address(),
        }
    }
}

/// A model: the unit of versioning and synchronization.
///
/// A model that was never added, or that has been removed, does not
/// `exist` but keeps its last revision so that re-adding it continues
/// the same revision sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    address: Address,
    revision: u64,
    exists: bool,
    objects: BTreeMap<Identifier, Arc<Object>>,
}

impl Model {
    /// Creates a model that does not exist yet, at revision 0.
    pub fn new(address: Address) -> CoreResult<Self> {
        if address.kind() != AddressKind::Model {
            return Err(CoreError::malformed_address(
                address.to_string(),
                "not a model address",
            ));
        }
        Ok(Self {
            address,
            revision: 0,
            exists: false,
            objects: BTreeMap::new(),
        })
    }

    /// Returns true if the model currently exists.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Returns the object with the given id.
    pub fn object(&self, id: &Identifier) -> Option<&Object> {
        self.objects.get(id).map(Arc::as_ref)
    }

    /// Iterates over the objects in id order.
    pub fn objects(&self) -> impl Iterator<Item = &Object> + '_ {
        self.objects.values().map(Arc::as_ref)
    }

    /// Looks up the entity at `address` within this model.
    ///
    /// Returns `None` for addresses outside the model, for entities that do
    /// not exist, and for every address when the model itself does not
    /// exist.
    pub fn entity(&self, address: &Address) -> Option<EntityRef<'_>> {
        if !self.exists || !self.address.equals_or_contains(address) {
            return None;
        }
        match address.kind() {
            AddressKind::Model => Some(EntityRef::Model(self)),
            AddressKind::Object => self.object(address.id()).map(EntityRef::Object),
            AddressKind::Field => {
                let object = self.object(address.object_id()?)?;
                object.field(address.id()).map(EntityRef::Field)
            }
            AddressKind::Repository => None,
        }
    }

    /// Returns the value of the field at `address`, if it exists and holds
    /// one.
    pub fn value_at(&self, address: &Address) -> Option<&Value> {
        match self.entity(address)? {
            EntityRef::Field(field) => field.value(),
            _ => None,
        }
    }

    pub(crate) fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    pub(crate) fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    pub(crate) fn object_mut(&mut self, id: &Identifier) -> Option<&mut Object> {
        self.objects.get_mut(id).map(Arc::make_mut)
    }

    pub(crate) fn create_object(
        &mut self,
        id: Identifier,
        revision: u64,
    ) -> CoreResult<&mut Object> {
        if self.objects.contains_key(&id) {
            return Err(CoreError::invalid_operation(format!(
                "object {id} already exists in {}",
                self.address
            )));
        }
        let address = self.address.child(id.clone())?;
        let object = self
            .objects
            .entry(id)
            .or_insert_with(|| Arc::new(Object::new(address, revision)));
        Ok(Arc::make_mut(object))
    }

    pub(crate) fn remove_object(&mut self, id: &Identifier) -> Option<Arc<Object>> {
        self.objects.remove(id)
    }
}

impl Readable for Model {
    fn id(&self) -> &Identifier {
        self.address.id()
    }

    fn address(&self) -> &Address {
        &self.address
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

impl Container for Model {
    type Child = Object;

    fn child(&self, id: &Identifier) -> Option<&Object> {
        self.object(id)
    }

    fn child_ids(&self) -> impl Iterator<Item = &Identifier> + '_ {
        self.objects.keys()
    }

    fn child_count(&self) -> usize {
        self.objects.len()
    }
}
