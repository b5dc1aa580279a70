//! # recordb Engine
//!
//! The storage engine boundary for recordb, plus an in-memory engine.
//!
//! An engine stores named, versioned databases made of object stores. Each
//! store keeps records under a primary key and may carry secondary indexes.
//! Schema changes happen only while a database is upgraded to a higher
//! version; everything else goes through scoped transactions.
//!
//! ## Design Principles
//!
//! - One call, one request: no batching, no retries
//! - Transactions read and write copy-on-write snapshots
//! - Records are held as canonical CBOR bytes
//! - Engines are `Send + Sync` and shared behind `Arc`
//!
//! ## Available Engines
//!
//! - [`InMemoryEngine`] - For tests and ephemeral databases
//!
//! ## Example
//!
//! ```rust
//! use recordb_engine::{
//!     InMemoryEngine, KeyPath, KeyRange, OpenOutcome, StorageEngine, StoreParameters,
//!     TransactionMode,
//! };
//! use recordb_codec::Value;
//!
//! let engine = InMemoryEngine::new();
//! let OpenOutcome::UpgradeNeeded(change) = engine.open("app", 1).unwrap() else {
//!     unreachable!();
//! };
//! let params = StoreParameters::new(Some(KeyPath::from("id"))).with_auto_increment(true);
//! change.transaction().create_store("notes", &params).unwrap();
//! let connection = change.commit().unwrap();
//!
//! let txn = connection
//!     .transaction(&["notes".to_string()], TransactionMode::ReadWrite)
//!     .unwrap();
//! let key = txn.add("notes", Value::empty_map(), None).unwrap();
//! txn.commit().unwrap();
//!
//! let txn = connection
//!     .transaction(&["notes".to_string()], TransactionMode::ReadOnly)
//!     .unwrap();
//! let note = txn.get("notes", &KeyRange::only(key.clone())).unwrap().unwrap();
//! assert_eq!(note.get("id"), Some(&key.to_value()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod key;
mod memory;

pub use engine::{
    Connection, CursorDirection, CursorRecord, CursorSource, EngineCursor, EngineTransaction,
    IndexParameters, OpenOutcome, StorageEngine, StoreParameters, TransactionMode,
    TransactionOutcome, VersionChange,
};
pub use error::{EngineError, EngineResult};
pub use key::{Key, KeyPath, KeyRange};
pub use memory::InMemoryEngine;
