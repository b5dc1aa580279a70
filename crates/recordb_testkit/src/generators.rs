//! Property-based test generators using proptest.

use crate::fixtures::{Contact, Employee};
use proptest::prelude::*;
use recordb_core::Key;

/// Strategy for scalar keys of every kind.
pub fn scalar_key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        any::<i64>().prop_map(Key::Integer),
        "[a-z]{0,6}".prop_map(Key::Text),
        prop::collection::vec(any::<u8>(), 0..6).prop_map(Key::Bytes),
    ]
}

/// Strategy for keys, including nested arrays.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    scalar_key_strategy().prop_recursive(2, 12, 3, |inner| {
        prop::collection::vec(inner, 0..3).prop_map(Key::Array)
    })
}

/// Strategy for employees without keys.
pub fn employee_strategy() -> impl Strategy<Value = Employee> {
    ("[A-Z][a-z]{1,8}", 18i64..70, prop::sample::select(vec!["math", "navy", "ops"]))
        .prop_map(|(name, age, department)| Employee::new(&name, age, department))
}

/// Strategy for contacts with distinct emails.
pub fn contacts_strategy(max: usize) -> impl Strategy<Value = Vec<Contact>> {
    prop::collection::btree_map(
        "[a-z]{1,6}",
        (prop::sample::select(vec!["a", "b", "c", "d"]), 0i64..100),
        0..max,
    )
    .prop_map(|contacts| {
        contacts
            .into_iter()
            .map(|(user, (city, age))| Contact::new(&format!("{user}@example.com"), city, age))
            .collect()
    })
}
