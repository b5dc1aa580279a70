//! # recordb Core
//!
//! Typed entities, schema upgrades and scoped transactions over a
//! versioned key-value storage engine.
//!
//! ## Overview
//!
//! - [`Entity`] ties a `serde` record type to a store, its primary key and
//!   its indexes, collected in a [`Schema`]
//! - [`Database`] registers entities, opens the engine on first use and
//!   upgrades the schema when its version goes up, running [`Migration`]s
//!   for stores that already exist
//! - [`Transaction`] limits access to the entities it was started with
//! - [`Store`] and [`Index`] issue one engine request per call
//! - [`CursorResult`] turns a cursor into a caller-driven [`CursorStream`]
//!   or collects it into a list
//!
//! ## Example
//!
//! ```rust
//! use recordb_core::{
//!     Database, Entity, EntityBuilder, KeyOptions, KeyRange, TransactionMode,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Employee {
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     id: Option<i64>,
//!     name: String,
//!     age: u32,
//! }
//!
//! impl Entity for Employee {
//!     const NAME: &'static str = "Employee";
//!
//!     fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
//!         entity.key("id", KeyOptions::auto_increment()).index("age")
//!     }
//! }
//!
//! let mut db = Database::in_memory("company", 1);
//! db.register::<Employee>()?;
//!
//! db.transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
//!     let employees = tx.store::<Employee>()?;
//!     for (name, age) in [("Ada", 36), ("Grace", 45), ("Alan", 41)] {
//!         employees.add(&Employee { id: None, name: name.into(), age })?;
//!     }
//!     Ok(())
//! })?;
//!
//! let over_forty = db.transaction(&[Employee::NAME], TransactionMode::ReadOnly, |tx| {
//!     tx.store::<Employee>()?
//!         .index("age")?
//!         .count(Some(&KeyRange::lower_bound(40, false)))
//! })?;
//! assert_eq!(over_forty, 2);
//! # Ok::<(), recordb_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod cursor;
mod database;
mod entity;
mod error;
mod index;
mod migration;
mod store;
mod transaction;

pub use config::Config;
pub use cursor::{Cursor, CursorResult, CursorStream, StreamEvent};
pub use database::Database;
pub use entity::{
    Entity, EntityBuilder, EntityMetadata, IndexDescriptor, IndexOptions, KeyOptions, Schema,
};
pub use error::{CoreError, CoreResult};
pub use index::Index;
pub use migration::{Migration, UpgradeReport};
pub use store::Store;
pub use transaction::Transaction;

// Re-export engine and codec types used in this crate's API.
pub use recordb_codec::Value;
pub use recordb_engine::{
    CursorDirection, EngineError, InMemoryEngine, Key, KeyPath, KeyRange, StorageEngine,
    TransactionMode,
};
