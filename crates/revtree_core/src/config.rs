//! Repository configuration.

use crate::address::Identifier;

/// Configuration for a [`Repository`](crate::Repository) and the model
/// handles it creates.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Actor recorded on events when the caller names none.
    pub default_actor: Option<Identifier>,

    /// Whether a panicking listener is logged and skipped instead of
    /// unwinding into the committing call.
    pub isolate_listener_panics: bool,

    /// Whether committed events are handed to the persistence collaborator.
    pub persist_on_commit: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_actor: None,
            isolate_listener_panics: true,
            persist_on_commit: true,
        }
    }
}

impl RepositoryConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the actor recorded when the caller names none.
    #[must_use]
    pub fn default_actor(mut self, actor: Identifier) -> Self {
        self.default_actor = Some(actor);
        self
    }

    /// Sets whether listener panics are isolated.
    #[must_use]
    pub const fn isolate_listener_panics(mut self, value: bool) -> Self {
        self.isolate_listener_panics = value;
        self
    }

    /// Sets whether committed events are persisted.
    #[must_use]
    pub const fn persist_on_commit(mut self, value: bool) -> Self {
        self.persist_on_commit = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RepositoryConfig::default();
        assert!(config.default_actor.is_none());
        assert!(config.isolate_listener_panics);
        assert!(config.persist_on_commit);
    }

    #[test]
    fn builder_pattern() {
        let config = RepositoryConfig::new()
            .default_actor(Identifier::new("system").unwrap())
            .isolate_listener_panics(false)
            .persist_on_commit(false);

        assert_eq!(config.default_actor.as_ref().map(Identifier::as_str), Some("system"));
        assert!(!config.isolate_listener_panics);
        assert!(!config.persist_on_commit);
    }
}
