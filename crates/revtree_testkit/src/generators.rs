//! Property-based test generators using proptest.
//!
//! Command strategies work on a small fixed universe of names under the
//! phone book model, so random scripts hit existing entities often enough to
//! exercise every precondition outcome.

use crate::fixtures::{addr, id, PHONEBOOK};
use proptest::prelude::*;
use revtree_core::{Address, Command, Executable, Identifier, Precondition, Transaction, Value};

const OBJECTS: [&str; 3] = ["john", "jane", "mary"];
const FIELDS: [&str; 2] = ["phone", "email"];

/// Strategy for generating valid identifiers.
pub fn identifier_strategy() -> impl Strategy<Value = Identifier> {
    prop::string::string_regex("[a-z][a-z0-9_-]{1,15}")
        .expect("Invalid regex")
        .prop_map(|raw| id(&raw))
}

/// Strategy for generating values of several types.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        3 => "[a-z0-9 -]{0,12}".prop_map(Value::from),
        2 => any::<i32>().prop_map(Value::Integer),
        1 => any::<i64>().prop_map(Value::Long),
        1 => (-1.0e6..1.0e6f64).prop_map(Value::Double),
        1 => any::<bool>().prop_map(Value::Boolean),
        1 => prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Binary),
        1 => prop::collection::vec("[a-z]{0,6}", 0..4).prop_map(Value::StringList),
        1 => prop::collection::btree_set(any::<i32>(), 0..4).prop_map(Value::IntegerSet),
        1 => identifier_strategy().prop_map(Value::Id),
    ]
}

/// Strategy for generating preconditions referring to low revisions.
pub fn precondition_strategy() -> impl Strategy<Value = Precondition> {
    prop_oneof![
        2 => Just(Precondition::Forced),
        1 => Just(Precondition::New),
        2 => (0u64..8).prop_map(Precondition::Safe),
    ]
}

fn object_address() -> impl Strategy<Value = Address> {
    prop::sample::select(OBJECTS.to_vec()).prop_map(|name| addr(PHONEBOOK).child(id(name)).expect("object address"))
}

fn field_address() -> impl Strategy<Value = Address> {
    (object_address(), prop::sample::select(FIELDS.to_vec()))
        .prop_map(|(object, name)| object.child(id(name)).expect("field address"))
}

/// Strategy for generating a command against the phone book model.
pub fn phonebook_command_strategy() -> impl Strategy<Value = Command> {
    let add_temp = Command::add_object(&addr(PHONEBOOK), id("temp"), Precondition::Forced)
        .expect("add temp");
    let remove_model = Command::remove_model(&addr("/repo"), id("phonebook"), Precondition::Forced)
        .expect("remove model");
    prop_oneof![
        2 => (object_address(), precondition_strategy())
            .prop_map(|(object, p)| Command::add(object, p).expect("add object")),
        1 => (object_address(), precondition_strategy())
            .prop_map(|(object, p)| Command::remove(object, p).expect("remove object")),
        3 => (field_address(), precondition_strategy())
            .prop_map(|(field, p)| Command::add(field, p).expect("add field")),
        1 => (field_address(), precondition_strategy())
            .prop_map(|(field, p)| Command::remove(field, p).expect("remove field")),
        3 => (field_address(), precondition_strategy(), value_strategy())
            .prop_map(|(field, p, v)| Command::add_value(field, p, v).expect("add value")),
        3 => (field_address(), precondition_strategy(), value_strategy())
            .prop_map(|(field, p, v)| Command::change_value(field, p, v).expect("change value")),
        1 => (field_address(), precondition_strategy())
            .prop_map(|(field, p)| Command::remove_value(field, p).expect("remove value")),
        1 => Just(add_temp),
        1 => Just(remove_model),
    ]
}

/// Strategy for generating a command or a model-scoped transaction of up to
/// `max_commands` commands.
pub fn executable_strategy(max_commands: usize) -> impl Strategy<Value = Executable> {
    let max_commands = max_commands.max(1);
    prop_oneof![
        2 => phonebook_command_strategy().prop_map(Executable::from),
        1 => prop::collection::vec(phonebook_command_strategy(), 1..=max_commands)
            .prop_filter_map("commands outside the model", |commands| {
                Transaction::new(addr(PHONEBOOK), commands).ok().map(Executable::from)
            }),
    ]
}

/// Strategy for generating a script of changes.
pub fn script_strategy(
    min_changes: usize,
    max_changes: usize,
) -> impl Strategy<Value = Vec<Executable>> {
    prop::collection::vec(executable_strategy(4), min_changes..max_changes)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 512,
        }
    }
}

impl PropTestConfig {
    /// Few cases, for properties that run whole scripts.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 24,
            max_shrink_iters: 128,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
