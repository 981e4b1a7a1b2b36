//! Repository: the root of the tree, routing changes to model handles.

use crate::address::{Address, AddressKind, Identifier};
use crate::command::Action;
use crate::config::RepositoryConfig;
use crate::engine::ExecutionResult;
use crate::error::{CoreError, CoreResult};
use crate::listener::{EventListener, ListenerId, ListenerRegistry};
use crate::model_handle::ModelHandle;
use crate::persistence::Persistence;
use crate::transaction::Executable;
use crate::tree::Model;
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A repository of models.
///
/// Each model is owned by its own [`ModelHandle`], so writers to different
/// models do not contend. Removed models stay registered as tombstones and
/// continue their revision sequence when added again.
pub struct Repository {
    address: Address,
    models: RwLock<BTreeMap<Identifier, Arc<ModelHandle>>>,
    listeners: Arc<ListenerRegistry>,
    persistence: Option<Arc<dyn Persistence>>,
    config: RepositoryConfig,
}

impl Repository {
    /// Creates an empty repository with default configuration.
    #[must_use]
    pub fn new(id: Identifier) -> Self {
        Self::with_config(id, RepositoryConfig::default())
    }

    /// Creates an empty repository.
    #[must_use]
    pub fn with_config(id: Identifier, config: RepositoryConfig) -> Self {
        Self {
            address: Address::for_repository(id),
            models: RwLock::new(BTreeMap::new()),
            listeners: Arc::new(ListenerRegistry::new(config.isolate_listener_panics)),
            persistence: None,
            config,
        }
    }

    /// Attaches a persistence collaborator.
    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Returns the repository id.
    #[must_use]
    pub fn id(&self) -> &Identifier {
        self.address.id()
    }

    /// Returns the repository address.
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Executes a command or transaction against the model it addresses.
    ///
    /// Adding a model that was never seen creates its handle. When no actor
    /// is given, the configured default actor is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AddressMismatch`] for changes outside this
    /// repository. Persistence failures are logged, not returned: the change
    /// is committed in memory regardless.
    pub fn execute(
        &self,
        actor: Option<&Identifier>,
        change: impl Into<Executable>,
    ) -> CoreResult<ExecutionResult> {
        let change = change.into();
        let actor = actor.or(self.config.default_actor.as_ref());
        let model_address = change
            .model_address()
            .filter(|model| self.address.contains(model))
            .ok_or_else(|| CoreError::address_mismatch(&self.address, change.target()))?;

        let handle = self.handle_for(&model_address, &change)?;
        let result = handle.execute(actor, change)?;

        if let ExecutionResult::Applied { event, revision } = &result {
            debug!(model = %model_address, revision, "repository commit");
            if let (true, Some(persistence)) = (self.config.persist_on_commit, &self.persistence) {
                if let Err(e) = persistence.persist(&model_address, event) {
                    warn!(model = %model_address, revision, error = %e, "failed to persist commit");
                }
            }
        }
        Ok(result)
    }

    fn handle_for(&self, model_address: &Address, change: &Executable) -> CoreResult<Arc<ModelHandle>> {
        let id = model_address.id();
        if let Some(handle) = self.models.read().get(id) {
            return Ok(Arc::clone(handle));
        }

        let creates_model = change
            .commands()
            .iter()
            .any(|c| c.action() == Action::Add && c.changed().kind() == AddressKind::Model);
        let handle = Arc::new(
            ModelHandle::new(model_address.clone())?
                .with_listener_registry(Arc::clone(&self.listeners)),
        );
        if !creates_model {
            // Nothing can apply to a model that was never added, so the
            // change runs against a throwaway handle.
            return Ok(handle);
        }
        Ok(Arc::clone(
            self.models.write().entry(id.clone()).or_insert(handle),
        ))
    }

    /// Returns the handle of a model, including removed ones.
    #[must_use]
    pub fn handle(&self, id: &Identifier) -> Option<Arc<ModelHandle>> {
        self.models.read().get(id).cloned()
    }

    /// Returns a snapshot of an existing model.
    #[must_use]
    pub fn model(&self, id: &Identifier) -> Option<Arc<Model>> {
        self.handle(id)
            .map(|handle| handle.snapshot())
            .filter(|model| model.exists())
    }

    /// Returns true if the model exists.
    #[must_use]
    pub fn has_model(&self, id: &Identifier) -> bool {
        self.model(id).is_some()
    }

    /// Returns the ids of all existing models in order.
    #[must_use]
    pub fn model_ids(&self) -> Vec<Identifier> {
        self.models
            .read()
            .iter()
            .filter(|(_, handle)| handle.exists())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Returns the value of the field at `address`.
    #[must_use]
    pub fn value_at(&self, address: &Address) -> Option<Value> {
        let model = self.model(address.model_id()?)?;
        model.value_at(address).cloned()
    }

    /// Registers a listener for events at or below `address`.
    pub fn register_listener(
        &self,
        address: Address,
        listener: impl EventListener + 'static,
    ) -> ListenerId {
        self.listeners.register(address, listener)
    }

    /// Removes a listener.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("address", &self.address)
            .field("models", &self.model_ids())
            .field("config", &self.config)
            .finish()
    }
}
