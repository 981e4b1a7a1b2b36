//! Event listeners.
//!
//! Listeners are registered on an address and receive every event that
//! changes that address or anything below it. Delivery happens after the
//! commit, outside every lock, in this order:
//!
//! - the atomic events of a change in the order they were generated, and
//!   for each of them the most specific listener address first;
//! - then, for transactions, the transaction event itself.

use crate::address::Address;
use crate::event::Event;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Receives committed events.
pub trait EventListener: Send + Sync {
    /// Called once per delivered event.
    fn on_event(&self, event: &Event);
}

impl<F> EventListener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event);
    }
}

/// Handle returned by [`ListenerRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Returns the raw id.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

type Entry = (ListenerId, Arc<dyn EventListener>);

/// Listeners of one repository or standalone model, keyed by address.
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<Address, Vec<Entry>>>,
    isolate_panics: bool,
}

impl ListenerRegistry {
    /// Creates an empty registry.
    ///
    /// With `isolate_panics`, a panicking listener is logged and skipped
    /// instead of unwinding into the committing call.
    #[must_use]
    pub fn new(isolate_panics: bool) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(BTreeMap::new()),
            isolate_panics,
        }
    }

    /// Registers `listener` for events at or below `address`.
    pub fn register(&self, address: Address, listener: impl EventListener + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(address)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let mut found = false;
        listeners.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            found |= entries.len() != before;
            !entries.is_empty()
        });
        found
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().values().map(Vec::len).sum()
    }

    /// Returns true if no listener is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Delivers a committed event.
    pub fn notify(&self, event: &Event) {
        if self.is_empty() {
            return;
        }
        match event {
            Event::Atomic(atomic) => self.deliver(&atomic.changed, event),
            Event::Transaction(txn) => {
                for atomic in &txn.events {
                    self.deliver(&atomic.changed, &Event::Atomic(atomic.clone()));
                }
                self.deliver(&txn.target, event);
            }
        }
    }

    fn deliver(&self, address: &Address, event: &Event) {
        let targets: Vec<Arc<dyn EventListener>> = {
            let listeners = self.listeners.read();
            address
                .self_and_ancestors()
                .filter_map(|a| listeners.get(&a))
                .flat_map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)))
                .collect()
        };
        for listener in targets {
            if self.isolate_panics {
                let result = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
                if result.is_err() {
                    warn!(
                        address = %address,
                        revision = event.revision(),
                        "event listener panicked"
                    );
                }
            } else {
                listener.on_event(event);
            }
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .field("isolate_panics", &self.isolate_panics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Identifier;
    use crate::command::Action;
    use crate::event::{AtomicEvent, TransactionEvent};
    use parking_lot::Mutex;

    fn atomic(changed: &str) -> AtomicEvent {
        let changed: Address = changed.parse().unwrap();
        AtomicEvent {
            action: Action::Add,
            target: changed.parent().unwrap(),
            changed,
            actor: Some(Identifier::new("tester").unwrap()),
            old_model_revision: 0,
            old_object_revision: Some(0),
            old_field_revision: None,
            revision: 1,
            old_value: None,
            new_value: None,
            implied: false,
            in_transaction: true,
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl EventListener {
        let log = Arc::clone(log);
        move |event: &Event| {
            let what = match event {
                Event::Atomic(e) => e.changed.to_string(),
                Event::Transaction(t) => format!("txn {}", t.target),
            };
            log.lock().push(format!("{tag}: {what}"));
        }
    }

    #[test]
    fn bubbling_and_transaction_last() {
        let registry = ListenerRegistry::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        registry.register("/repo/model".parse().unwrap(), recorder(&seen, "model"));
        registry.register("/repo/model/obj".parse().unwrap(), recorder(&seen, "object"));
        registry.register("/repo/other".parse().unwrap(), recorder(&seen, "other"));

        let event = Event::Transaction(TransactionEvent {
            actor: None,
            target: "/repo/model".parse().unwrap(),
            old_model_revision: 0,
            old_object_revision: None,
            revision: 1,
            events: vec![atomic("/repo/model/obj"), atomic("/repo/model/obj/fld")],
        });
        registry.notify(&event);

        assert_eq!(
            *seen.lock(),
            vec![
                "object: /repo/model/obj/-",
                "model: /repo/model/obj/-",
                "object: /repo/model/obj/fld",
                "model: /repo/model/obj/fld",
                "model: txn /repo/model/-/-",
            ]
        );
    }

    #[test]
    fn unregister_stops_delivery() {
        let registry = ListenerRegistry::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = registry.register("/repo/model".parse().unwrap(), recorder(&seen, "model"));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());

        registry.notify(&Event::Atomic(atomic("/repo/model/obj")));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn panicking_listener_is_isolated() {
        let registry = ListenerRegistry::new(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        registry.register("/repo/model/obj".parse().unwrap(), |_: &Event| panic!("listener failure"));
        registry.register("/repo/model".parse().unwrap(), recorder(&seen, "model"));

        registry.notify(&Event::Atomic(atomic("/repo/model/obj")));
        assert_eq!(seen.lock().len(), 1);
    }
}
