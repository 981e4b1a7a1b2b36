//! # revtree core
//!
//! Versioned tree store for revtree.
//!
//! This crate provides:
//! - Addresses and identifiers for the repository, model, object, field
//!   hierarchy
//! - Commands, transactions and the events they produce
//! - The execution engine with safe and forced preconditions
//! - Per-model change logs with replay and undo
//! - Listener registration and the repository facade

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod address;
mod change_log;
mod command;
mod config;
mod engine;
mod error;
mod event;
mod listener;
mod model_handle;
mod persistence;
mod repository;
mod transaction;
mod tree;
mod value;

pub use address::{Address, AddressKind, Identifier, MAX_IDENTIFIER_LEN};
pub use change_log::{ChangeLog, EventLog};
pub use command::{Action, Command, Precondition};
pub use config::RepositoryConfig;
pub use engine::ExecutionResult;
pub use error::{CoreError, CoreResult};
pub use event::{AtomicEvent, Event, TransactionEvent};
pub use listener::{EventListener, ListenerId, ListenerRegistry};
pub use model_handle::{ModelHandle, WriteSession};
pub use persistence::{EntitySnapshot, InMemoryPersistence, Persistence};
pub use repository::Repository;
pub use transaction::{Executable, Transaction, TransactionBuilder};
pub use tree::{apply_event, undo_event, Container, EntityRef, Field, Model, Object, Readable};
pub use value::{Value, ValueType};
