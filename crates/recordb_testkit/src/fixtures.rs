//! Fixture entities and database helpers.
//!
//! The entities cover the key and index shapes the test suites need:
//!
//! | Entity | Primary key | Indexes |
//! |--------|-------------|---------|
//! | [`Employee`] | `id`, auto-increment | `age`, `department` |
//! | [`Person`] | compound `(id, name)` | `name` |
//! | [`Contact`] | `email` | compound `location` over `(city, age)`, unique `phone` |
//! | [`Note`] | `id`, auto-increment | multi-entry `tags` |

use recordb_core::{
    Database, Entity, EntityBuilder, IndexOptions, InMemoryEngine, Key, KeyOptions,
    StorageEngine, TransactionMode, Value,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An employee with a generated integer key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    /// Primary key, assigned on `add`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Name.
    pub name: String,
    /// Age in years.
    pub age: i64,
    /// Department.
    pub department: String,
}

impl Employee {
    /// An employee without a key.
    pub fn new(name: &str, age: i64, department: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            age,
            department: department.to_string(),
        }
    }

    /// The same employee with `id` set.
    #[must_use]
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

impl Entity for Employee {
    const NAME: &'static str = "Employee";

    fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
        entity
            .key("id", KeyOptions::auto_increment())
            .index("age")
            .index("department")
    }
}

/// A person keyed by `(id, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// First key component.
    pub id: i64,
    /// Second key component.
    pub name: String,
}

impl Person {
    /// Builds a person.
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

impl Entity for Person {
    const NAME: &'static str = "Person";

    fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
        entity
            .key("id", KeyOptions::default())
            .key("name", KeyOptions::default())
            .index("name")
    }
}

/// A contact keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Primary key.
    pub email: String,
    /// City.
    pub city: String,
    /// Age in years.
    pub age: i64,
    /// Phone number, unique when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Contact {
    /// A contact without a phone number.
    pub fn new(email: &str, city: &str, age: i64) -> Self {
        Self {
            email: email.to_string(),
            city: city.to_string(),
            age,
            phone: None,
        }
    }

    /// The same contact with a phone number.
    #[must_use]
    pub fn with_phone(mut self, phone: &str) -> Self {
        self.phone = Some(phone.to_string());
        self
    }
}

impl Entity for Contact {
    const NAME: &'static str = "Contact";

    fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
        entity
            .key("email", KeyOptions::default())
            .compound_index("location", &["city", "age"])
            .index_with("phone", IndexOptions::unique())
    }
}

/// A note with tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Primary key, assigned on `add`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Body.
    pub text: String,
    /// Tags, each indexed on its own.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Note {
    /// A note without a key.
    pub fn new(text: &str, tags: &[&str]) -> Self {
        Self {
            id: None,
            text: text.to_string(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

impl Entity for Note {
    const NAME: &'static str = "Note";

    fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
        entity
            .key("id", KeyOptions::auto_increment())
            .index_with("tags", IndexOptions::multi_entry())
    }
}

/// Every fixture entity name, in registration order.
pub const ALL_ENTITIES: [&str; 4] = [Employee::NAME, Person::NAME, Contact::NAME, Note::NAME];

/// Registers every fixture entity.
///
/// # Panics
///
/// Panics if the database is already open.
pub fn register_all(db: &mut Database) {
    db.register::<Employee>()
        .and_then(|db| db.register::<Person>())
        .and_then(|db| db.register::<Contact>())
        .and_then(|db| db.register::<Note>())
        .expect("Failed to register fixture entities");
}

/// A version 1 database on its own in-memory engine with every fixture
/// entity registered. Nothing is opened yet.
pub fn fresh_database(name: &str) -> Database {
    let mut db = Database::in_memory(name, 1);
    register_all(&mut db);
    db
}

/// Like [`fresh_database`], on a shared engine and at a given version.
pub fn fresh_database_on(engine: &Arc<dyn StorageEngine>, name: &str, version: u64) -> Database {
    let mut db = Database::new(Arc::clone(engine), name, version);
    register_all(&mut db);
    db
}

/// A new shared in-memory engine.
pub fn memory_engine() -> Arc<dyn StorageEngine> {
    Arc::new(InMemoryEngine::new())
}

/// Builds a record from JSON.
///
/// # Panics
///
/// Panics if the JSON holds an integer outside the i64 range.
pub fn record(json: serde_json::Value) -> Value {
    recordb_codec::to_value(&json).expect("Fixture records must fit the record model")
}

/// The staff used by the index and cursor suites: ages 20, 25 and 30.
pub fn staff() -> Vec<Employee> {
    vec![
        Employee::new("Ada", 20, "math"),
        Employee::new("Grace", 25, "navy"),
        Employee::new("Edsger", 30, "math"),
    ]
}

/// Adds `employees` in one read-write transaction and returns their keys.
///
/// # Panics
///
/// Panics if the transaction fails.
pub fn seed_employees(db: &Database, employees: &[Employee]) -> Vec<Key> {
    db.transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
        let store = tx.store::<Employee>()?;
        employees.iter().map(|e| store.add(e)).collect()
    })
    .expect("Failed to seed employees")
}
