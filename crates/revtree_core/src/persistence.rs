//! Persistence collaborator boundary.

use crate::address::{Address, AddressKind, Identifier};
use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::tree::{apply_event, EntityRef, Field, Model, Object, Readable};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// An owned copy of one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntitySnapshot {
    /// A model with everything below it.
    Model(Arc<Model>),
    /// An object with its fields.
    Object(Arc<Object>),
    /// A field with its value.
    Field(Arc<Field>),
}

impl EntitySnapshot {
    /// Returns the revision of the entity.
    #[must_use]
    pub fn revision(&self) -> u64 {
        match self {
            EntitySnapshot::Model(m) => m.revision(),
            EntitySnapshot::Object(o) => o.revision(),
            EntitySnapshot::Field(f) => f.revision(),
        }
    }
}

impl From<EntityRef<'_>> for EntitySnapshot {
    fn from(entity: EntityRef<'_>) -> Self {
        match entity {
            EntityRef::Model(m) => EntitySnapshot::Model(Arc::new(m.clone())),
            EntityRef::Object(o) => EntitySnapshot::Object(Arc::new(o.clone())),
            EntityRef::Field(f) => EntitySnapshot::Field(Arc::new(f.clone())),
        }
    }
}

/// Durable storage for committed changes.
///
/// The core makes no assumption about the storage format. Implementations
/// receive every committed event of every model in revision order.
pub trait Persistence: Send + Sync {
    /// Returns a copy of the entity at `address`, if it exists.
    fn entity_snapshot(&self, address: &Address) -> CoreResult<Option<EntitySnapshot>>;

    /// Returns the revision of the entity at `address`, if it exists.
    fn revision(&self, address: &Address) -> CoreResult<Option<u64>> {
        Ok(self.entity_snapshot(address)?.map(|e| e.revision()))
    }

    /// Stores a committed event of the model at `model`.
    fn persist(&self, model: &Address, event: &Event) -> CoreResult<()>;
}

/// Persistence that keeps its own replica of every model in memory.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    models: RwLock<BTreeMap<Identifier, Model>>,
}

impl InMemoryPersistence {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the ids of the stored models, including removed ones.
    #[must_use]
    pub fn model_ids(&self) -> Vec<Identifier> {
        self.models.read().keys().cloned().collect()
    }
}

impl Persistence for InMemoryPersistence {
    fn entity_snapshot(&self, address: &Address) -> CoreResult<Option<EntitySnapshot>> {
        let Some(model_id) = address.model_id() else {
            return Ok(None);
        };
        let models = self.models.read();
        Ok(models
            .get(model_id)
            .and_then(|model| model.entity(address))
            .map(EntitySnapshot::from))
    }

    fn persist(&self, model: &Address, event: &Event) -> CoreResult<()> {
        if model.kind() != AddressKind::Model {
            return Err(CoreError::malformed_address(model.to_string(), "not a model address"));
        }
        let mut models = self.models.write();
        let mut replica = match models.get(model.id()) {
            Some(existing) => existing.clone(),
            None => Model::new(model.clone())?,
        };
        apply_event(&mut replica, event).map_err(|e| CoreError::persistence(e.to_string()))?;
        models.insert(model.id().clone(), replica);
        debug!(model = %model, revision = event.revision(), "persisted event");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, Precondition};
    use crate::model_handle::ModelHandle;
    use crate::value::Value;

    #[test]
    fn replica_follows_persisted_events() {
        let model: Address = "/repo/phonebook".parse().unwrap();
        let handle = ModelHandle::new(model.clone()).unwrap();
        let store = InMemoryPersistence::new();

        let commands = vec![
            Command::add_model(&"/repo".parse().unwrap(), Identifier::new("phonebook").unwrap(), Precondition::New).unwrap(),
            Command::add_object(&model, Identifier::new("john").unwrap(), Precondition::New).unwrap(),
            Command::add_field(&"/repo/phonebook/john".parse().unwrap(), Identifier::new("phone").unwrap(), Precondition::New).unwrap(),
            Command::add_value("/repo/phonebook/john/phone".parse().unwrap(), Precondition::Forced, Value::from(42)).unwrap(),
        ];
        for command in commands {
            let result = handle.execute(None, command).unwrap();
            store.persist(&model, result.event().unwrap()).unwrap();
        }

        let phone: Address = "/repo/phonebook/john/phone".parse().unwrap();
        let Some(EntitySnapshot::Field(field)) = store.entity_snapshot(&phone).unwrap() else {
            panic!("expected a field snapshot");
        };
        assert_eq!(field.value(), Some(&Value::from(42)));
        assert_eq!(store.revision(&phone).unwrap(), Some(3));
        assert_eq!(store.revision(&model).unwrap(), Some(handle.revision()));
        assert_eq!(store.revision(&"/repo/nothing".parse().unwrap()).unwrap(), None);
    }

    #[test]
    fn out_of_order_events_are_refused() {
        let model: Address = "/repo/phonebook".parse().unwrap();
        let handle = ModelHandle::new(model.clone()).unwrap();
        let store = InMemoryPersistence::new();

        handle
            .execute(None, Command::add_model(&"/repo".parse().unwrap(), Identifier::new("phonebook").unwrap(), Precondition::New).unwrap())
            .unwrap();
        let result = handle
            .execute(None, Command::add_object(&model, Identifier::new("john").unwrap(), Precondition::New).unwrap())
            .unwrap();

        let err = store.persist(&model, result.event().unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::Persistence { .. }));
        assert!(store.model_ids().is_empty());
    }
}
