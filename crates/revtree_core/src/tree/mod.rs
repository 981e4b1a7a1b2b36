//! The versioned entity tree.
//!
//! Mutation methods are crate-private and revision-unaware. Only the
//! execution engine and event replay change the tree, and they stamp
//! revisions themselves.

mod model;
mod replay;
mod traits;

pub use model::{EntityRef, Field, Model, Object};
pub use replay::{apply_event, undo_event};
pub use traits::{Container, Readable};
