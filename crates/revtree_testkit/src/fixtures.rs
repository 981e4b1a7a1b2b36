//! Test fixtures.
//!
//! The phone book is the model most tests start from:
//!
//! ```text
//! /repo/phonebook
//!     john/phone = "555-1234"
//!     jane/email = "jane@example.com"
//! ```

use parking_lot::Mutex;
use revtree_core::{
    Address, Command, Event, Executable, Identifier, ModelHandle, Precondition, Repository,
    TransactionBuilder, Value,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Address of the phone book model.
pub const PHONEBOOK: &str = "/repo/phonebook";

/// Parses an address, panicking on malformed input.
pub fn addr(text: &str) -> Address {
    text.parse()
        .unwrap_or_else(|e| panic!("bad address {text:?} in test: {e}"))
}

/// Creates an identifier, panicking on malformed input.
pub fn id(text: &str) -> Identifier {
    Identifier::new(text).unwrap_or_else(|e| panic!("bad identifier {text:?} in test: {e}"))
}

/// The changes that build the phone book, in order.
///
/// The model is added at revision 0, john at revision 1 and jane at
/// revision 2.
pub fn phonebook_changes() -> Vec<Executable> {
    let model = addr(PHONEBOOK);
    let person = |name: &str, field: &str, value: &str| -> Executable {
        let object = model.child(id(name)).expect("object address");
        let field_address = object.child(id(field)).expect("field address");
        let mut builder = TransactionBuilder::new(model.clone()).expect("model scope");
        builder
            .add_object(&model, id(name), Precondition::New)
            .and_then(|b| b.add_field(&object, id(field), Precondition::New))
            .and_then(|b| b.add_value(field_address, Precondition::New, Value::from(value)))
            .expect("phone book commands");
        builder.build().expect("phone book transaction").into()
    };

    vec![
        Command::add_model(&addr("/repo"), id("phonebook"), Precondition::New)
            .expect("add model")
            .into(),
        person("john", "phone", "555-1234"),
        person("jane", "email", "jane@example.com"),
    ]
}

/// A repository named `repo` holding the phone book.
pub fn phonebook_repository() -> Repository {
    let repository = Repository::new(id("repo"));
    for change in phonebook_changes() {
        let result = repository.execute(None, change).expect("phone book change");
        assert!(result.is_applied(), "phone book change was not applied");
    }
    repository
}

/// A standalone handle holding the phone book.
pub fn phonebook_handle() -> ModelHandle {
    let handle = ModelHandle::new(addr(PHONEBOOK)).expect("model address");
    for change in phonebook_changes() {
        let result = handle.execute(None, change).expect("phone book change");
        assert!(result.is_applied(), "phone book change was not applied");
    }
    handle
}

/// A listener that keeps every event it receives.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a closure to register as a listener.
    pub fn listener(&self) -> impl Fn(&Event) + Send + Sync + 'static {
        let events = Arc::clone(&self.events);
        move |event: &Event| events.lock().push(event.clone())
    }

    /// Returns the recorded events.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Returns the revisions of the recorded events.
    pub fn revisions(&self) -> Vec<u64> {
        self.events.lock().iter().map(Event::revision).collect()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// A JSON file in a temporary directory, removed on drop.
pub struct JsonFile {
    /// Location of the file.
    pub path: PathBuf,
    _dir: TempDir,
}

impl JsonFile {
    /// Writes `value` as pretty JSON to a fresh temporary file.
    pub fn write(name: &str, value: &impl Serialize) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join(name);
        let text = serde_json::to_string_pretty(value).expect("Failed to serialize fixture");
        std::fs::write(&path, text).expect("Failed to write fixture");
        Self { path, _dir: dir }
    }
}
