//! Capability traits shared by the tree entities.

use crate::address::{Address, Identifier};

/// Read access common to every versioned entity.
pub trait Readable {
    /// Identifier of this entity within its parent.
    fn id(&self) -> &Identifier;

    /// Full address of this entity.
    fn address(&self) -> &Address;

    /// Revision at which this entity last changed.
    fn revision(&self) -> u64;
}

/// An entity that owns uniquely identified children.
///
/// Children are iterated in identifier order.
pub trait Container: Readable {
    /// Child entity type.
    type Child: Readable;

    /// Returns the child with the given id.
    fn child(&self, id: &Identifier) -> Option<&Self::Child>;

    /// Returns the ids of all children.
    fn child_ids(&self) -> impl Iterator<Item = &Identifier> + '_;

    /// Returns the number of children.
    fn child_count(&self) -> usize;

    /// Returns true if a child with the given id exists.
    fn has_child(&self, id: &Identifier) -> bool {
        self.child(id).is_some()
    }

    /// Returns true if there are no children.
    fn is_empty(&self) -> bool {
        self.child_count() == 0
    }
}
