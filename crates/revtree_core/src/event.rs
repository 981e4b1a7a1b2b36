//! Events: mutations that actually happened.

use crate::address::{Address, Identifier};
use crate::command::Action;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// A single committed change to one entity.
///
/// Besides the new state, an atomic event carries the revisions its model,
/// object and field had immediately before it, and the previous value, so
/// the change can be undone exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicEvent {
    /// What happened.
    pub action: Action,
    /// Entity the originating command was sent to.
    pub target: Address,
    /// Entity that was created, removed or given a new value.
    pub changed: Address,
    /// Actor that executed the originating command.
    pub actor: Option<Identifier>,
    /// Model revision before the change.
    pub old_model_revision: u64,
    /// Object revision before the change, for object and field changes.
    pub old_object_revision: Option<u64>,
    /// Field revision before the change, for field changes.
    pub old_field_revision: Option<u64>,
    /// Revision the change was committed at.
    pub revision: u64,
    /// Field value before the change.
    pub old_value: Option<Value>,
    /// Field value after the change.
    pub new_value: Option<Value>,
    /// True if the change was implied by removing an ancestor.
    pub implied: bool,
    /// True if the event is part of a [`TransactionEvent`].
    pub in_transaction: bool,
}

impl AtomicEvent {
    /// Returns true if this event changed a field value rather than the
    /// tree structure.
    #[must_use]
    pub fn is_value_event(&self) -> bool {
        self.target == self.changed
    }

    /// Compares the effect of two events, ignoring revisions, actor and
    /// transaction membership.
    #[must_use]
    pub fn same_change(&self, other: &AtomicEvent) -> bool {
        self.action == other.action
            && self.target == other.target
            && self.changed == other.changed
            && self.old_value == other.old_value
            && self.new_value == other.new_value
            && self.implied == other.implied
    }
}

/// An ordered group of atomic events committed at one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    /// Actor that executed the transaction.
    pub actor: Option<Identifier>,
    /// Target of the transaction or command.
    pub target: Address,
    /// Model revision before the transaction.
    pub old_model_revision: u64,
    /// Revision of the target object before an object-scoped transaction.
    pub old_object_revision: Option<u64>,
    /// Revision the transaction was committed at.
    pub revision: u64,
    /// Atomic events in the order they were generated.
    pub events: Vec<AtomicEvent>,
}

/// A committed change, as logged and delivered to listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// A change producing exactly one atomic event.
    Atomic(AtomicEvent),
    /// A change producing several atomic events.
    Transaction(TransactionEvent),
}

impl Event {
    /// Returns the revision the event was committed at.
    #[must_use]
    pub fn revision(&self) -> u64 {
        match self {
            Event::Atomic(e) => e.revision,
            Event::Transaction(t) => t.revision,
        }
    }

    /// Returns the actor that caused the event.
    #[must_use]
    pub fn actor(&self) -> Option<&Identifier> {
        match self {
            Event::Atomic(e) => e.actor.as_ref(),
            Event::Transaction(t) => t.actor.as_ref(),
        }
    }

    /// Returns the address the originating change was sent to.
    #[must_use]
    pub fn target(&self) -> &Address {
        match self {
            Event::Atomic(e) => &e.target,
            Event::Transaction(t) => &t.target,
        }
    }

    /// Returns the model revision before the event.
    #[must_use]
    pub fn old_model_revision(&self) -> u64 {
        match self {
            Event::Atomic(e) => e.old_model_revision,
            Event::Transaction(t) => t.old_model_revision,
        }
    }

    /// Returns the atomic events in generation order.
    #[must_use]
    pub fn atomic_events(&self) -> &[AtomicEvent] {
        match self {
            Event::Atomic(e) => std::slice::from_ref(e),
            Event::Transaction(t) => &t.events,
        }
    }

    /// Returns true if any atomic event changed an entity that overlaps
    /// `address`.
    #[must_use]
    pub fn touches(&self, address: &Address) -> bool {
        self.atomic_events()
            .iter()
            .any(|e| e.changed.overlaps(address))
    }

    /// Compares the effect of two events, ignoring revisions and actors.
    #[must_use]
    pub fn same_change(&self, other: &Event) -> bool {
        let (mine, theirs) = (self.atomic_events(), other.atomic_events());
        mine.len() == theirs.len() && mine.iter().zip(theirs).all(|(a, b)| a.same_change(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(revision: u64, new_value: &str) -> AtomicEvent {
        AtomicEvent {
            action: Action::Change,
            target: "/repo/model/obj/fld".parse().unwrap(),
            changed: "/repo/model/obj/fld".parse().unwrap(),
            actor: Some(Identifier::new("alice").unwrap()),
            old_model_revision: revision - 1,
            old_object_revision: Some(revision - 1),
            old_field_revision: Some(revision - 1),
            revision,
            old_value: Some(Value::from("old")),
            new_value: Some(Value::from(new_value)),
            implied: false,
            in_transaction: false,
        }
    }

    #[test]
    fn same_change_ignores_revision_and_actor() {
        let a = Event::Atomic(event(4, "A"));
        let mut other = event(9, "A");
        other.actor = None;
        assert!(a.same_change(&Event::Atomic(other)));
        assert!(!a.same_change(&Event::Atomic(event(4, "B"))));
    }

    #[test]
    fn atomic_events_of_transaction() {
        let txn = Event::Transaction(TransactionEvent {
            actor: None,
            target: "/repo/model".parse().unwrap(),
            old_model_revision: 3,
            old_object_revision: None,
            revision: 4,
            events: vec![event(4, "A"), event(4, "B")],
        });
        assert_eq!(txn.atomic_events().len(), 2);
        assert_eq!(txn.revision(), 4);
        assert!(txn.touches(&"/repo/model/obj".parse().unwrap()));
        assert!(!txn.touches(&"/repo/model/other".parse().unwrap()));
    }

    #[test]
    fn serde_roundtrip() {
        let event = Event::Atomic(event(2, "x"));
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
