//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use revtree_core::{Address, Command, EventLog, Identifier, ModelHandle, Precondition, Transaction, Value};

/// Address of the benchmark model.
pub const CONTACTS: &str = "/bench/contacts";

/// Returns the benchmark model address.
pub fn contacts() -> Address {
    CONTACTS.parse().expect("model address")
}

/// Returns the address of the phone field of contact `index`.
pub fn phone(index: usize) -> Address {
    let object = contacts()
        .child(Identifier::new(format!("c{index}")).expect("contact id"))
        .expect("object address");
    object
        .child(Identifier::new("phone").expect("field id"))
        .expect("field address")
}

/// Commands that create the model and `count` contacts with a phone each.
pub fn populate_commands(count: usize) -> Vec<Command> {
    let model = contacts();
    let repository = model.parent().expect("repository address");
    let mut commands = vec![Command::add_model(&repository, model.id().clone(), Precondition::New).expect("add model")];
    for index in 0..count {
        let field = phone(index);
        let object = field.parent().expect("object address");
        commands.push(Command::add_object(&model, object.id().clone(), Precondition::New).expect("add object"));
        commands.push(Command::add_field(&object, field.id().clone(), Precondition::New).expect("add field"));
        commands.push(Command::add_value(field, Precondition::Forced, Value::from(0i64)).expect("add value"));
    }
    commands
}

/// Executes the populate commands against `handle`.
///
/// # Panics
///
/// Panics if a command does not apply.
pub fn populate<L: EventLog>(handle: &ModelHandle<L>, count: usize) {
    for command in populate_commands(count) {
        let result = handle.execute(None, command).expect("populate");
        assert!(result.is_applied(), "populate command did not apply: {result:?}");
    }
}

/// A handle holding `count` contacts.
pub fn contacts_handle(count: usize) -> ModelHandle {
    let handle = ModelHandle::new(contacts()).expect("model address");
    populate(&handle, count);
    handle
}

/// A forced phone update that always applies when `value` is fresh.
pub fn set_phone(index: usize, value: i64) -> Command {
    Command::change_value(phone(index), Precondition::Forced, Value::from(value)).expect("change value")
}

/// A transaction updating the phones of the first `size` contacts.
pub fn phone_transaction(size: usize, value: i64) -> Transaction {
    let commands = (0..size).map(|index| set_phone(index, value)).collect();
    Transaction::new(contacts(), commands).expect("transaction")
}
