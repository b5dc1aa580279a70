//! # recordb Testkit
//!
//! Test utilities for recordb.
//!
//! This crate provides:
//! - Fixture entities and database helpers
//! - Property-based test generators using proptest
//! - Tracing setup for tests
//!
//! The cross-crate test suites live in this crate's `tests/` directory.
//!
//! ## Usage
//!
//! ```
//! use recordb_testkit::prelude::*;
//!
//! let db = fresh_database("usage");
//! let key = db
//!     .transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
//!         tx.store::<Employee>()?.add(&Employee::new("Ada", 36, "math"))
//!     })
//!     .unwrap();
//! assert_eq!(key, Key::Integer(1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::init_tracing;
    pub use recordb_core::{
        CoreError, CursorDirection, Database, Entity, EngineError, Key, KeyRange,
        StreamEvent, Transaction, TransactionMode, Value,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use logging::init_tracing;
