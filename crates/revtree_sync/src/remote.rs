//! Boundary to the authoritative history.

use crate::error::{SyncError, SyncResult};
use revtree_core::{Address, Event, Executable, ExecutionResult, Identifier, Repository};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

/// The authoritative side of synchronization.
///
/// Implementations wrap whatever carries requests to the remote. Fetching and
/// submitting may block; reconciliation itself never does.
pub trait RemoteHistory: Send + Sync {
    /// Returns the remote events of `model` at or after `revision`, in order.
    fn events_since(&self, model: &Address, revision: u64) -> SyncResult<Vec<Event>>;

    /// Executes `change` on the remote and returns the remote's result.
    fn submit(&self, actor: Option<&Identifier>, change: &Executable) -> SyncResult<ExecutionResult>;
}

/// A remote that is a [`Repository`] in the same process.
///
/// Used by tests and tools. It can be told to fail the next requests with a
/// retryable transport error.
#[derive(Debug)]
pub struct LoopbackRemote {
    repository: Arc<Repository>,
    failures: AtomicU32,
    requests: AtomicU64,
}

impl LoopbackRemote {
    /// Creates a remote serving `repository`.
    pub fn new(repository: Arc<Repository>) -> Self {
        Self {
            repository,
            failures: AtomicU32::new(0),
            requests: AtomicU64::new(0),
        }
    }

    /// Returns the served repository.
    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    /// Makes the next `count` requests fail.
    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Returns the number of requests answered, failed ones included.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    fn begin_request(&self) -> SyncResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::transport_retryable("loopback: injected failure"));
        }
        Ok(())
    }
}

impl RemoteHistory for LoopbackRemote {
    fn events_since(&self, model: &Address, revision: u64) -> SyncResult<Vec<Event>> {
        self.begin_request()?;
        if !self.repository.address().contains(model) {
            return Err(SyncError::transport_fatal(format!(
                "{model} is not served by {}",
                self.repository.address()
            )));
        }
        Ok(self
            .repository
            .handle(model.id())
            .map(|handle| handle.events_since(revision))
            .unwrap_or_default())
    }

    fn submit(&self, actor: Option<&Identifier>, change: &Executable) -> SyncResult<ExecutionResult> {
        self.begin_request()?;
        self.repository
            .execute(actor, change.clone())
            .map_err(|e| SyncError::transport_fatal(format!("remote refused change: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revtree_core::{Command, Precondition};

    fn remote() -> LoopbackRemote {
        LoopbackRemote::new(Arc::new(Repository::new(Identifier::new("repo").unwrap())))
    }

    #[test]
    fn submit_and_fetch() {
        let remote = remote();
        let model: Address = "/repo/phonebook".parse().unwrap();
        assert!(remote.events_since(&model, 0).unwrap().is_empty());

        let add = Command::add_model(
            remote.repository().address(),
            Identifier::new("phonebook").unwrap(),
            Precondition::New,
        )
        .unwrap();
        let result = remote.submit(None, &Executable::from(add)).unwrap();
        assert_eq!(result.revision(), Some(0));
        assert_eq!(remote.events_since(&model, 0).unwrap().len(), 1);
        assert!(remote.events_since(&model, 1).unwrap().is_empty());
    }

    #[test]
    fn injected_failures_are_retryable_and_counted() {
        let remote = remote();
        let model: Address = "/repo/phonebook".parse().unwrap();
        remote.fail_next(2);

        assert!(remote.events_since(&model, 0).unwrap_err().is_retryable());
        assert!(remote.events_since(&model, 0).unwrap_err().is_retryable());
        assert!(remote.events_since(&model, 0).is_ok());
        assert_eq!(remote.requests(), 3);
    }

    #[test]
    fn foreign_models_are_refused() {
        let remote = remote();
        let other: Address = "/elsewhere/phonebook".parse().unwrap();
        let err = remote.events_since(&other, 0).unwrap_err();
        assert!(!err.is_retryable());
    }
}
