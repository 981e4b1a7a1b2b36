//! # revtree access
//!
//! Access rights for revtree repositories.
//!
//! This crate provides:
//! - [`GroupDatabase`], nested groups of actors with cycle detection
//! - [`DefinitionTable`], sparse allow and deny definitions per address
//! - [`AccessManager`], which resolves the effective access of an actor
//! - [`GuardedRepository`], which checks access before executing changes
//!
//! ## Resolution
//!
//! Access to a resource is decided at the nearest address, starting at the
//! resource and walking up to the repository, that settles it:
//!
//! 1. a definition for the actor itself wins outright;
//! 2. otherwise any allowing definition for a group of the actor allows;
//! 3. otherwise a denying definition for [`ALL_GROUP`] denies.
//!
//! If no address settles it the access is [`AccessValue::Undefined`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod definitions;
mod error;
mod groups;
mod guard;
mod manager;
mod policy;

pub use definitions::{AccessDefinition, AccessKind, AccessValue, DefinitionTable};
pub use error::{AccessError, AccessResult};
pub use groups::{GroupDatabase, ALL_GROUP};
pub use guard::GuardedRepository;
pub use manager::AccessManager;
pub use policy::{AccessPolicy, Membership};
