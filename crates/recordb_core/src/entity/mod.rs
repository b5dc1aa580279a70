//! Entity declarations.
//!
//! An entity is a record type stored in its own object store. Its schema
//! (primary key and secondary indexes) is described by [`EntityMetadata`]
//! and collected in a [`Schema`].

mod metadata;
mod schema;

pub use metadata::{EntityMetadata, IndexDescriptor, IndexOptions, KeyOptions};
pub use schema::{EntityBuilder, Schema};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record type stored as an entity.
///
/// Records travel through `serde`, so field names in the schema are the
/// serialized field names.
///
/// # Example
///
/// ```rust
/// use recordb_core::{Entity, EntityBuilder, KeyOptions, Schema};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Employee {
///     #[serde(skip_serializing_if = "Option::is_none")]
///     id: Option<i64>,
///     name: String,
///     age: u32,
/// }
///
/// impl Entity for Employee {
///     const NAME: &'static str = "Employee";
///
///     fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
///         entity.key("id", KeyOptions::auto_increment()).index("age")
///     }
/// }
///
/// let mut schema = Schema::new();
/// let metadata = schema.register::<Employee>();
/// assert!(metadata.auto_increment());
/// ```
pub trait Entity: Serialize + DeserializeOwned {
    /// Store name. Unique within a database.
    const NAME: &'static str;

    /// Declares keys and indexes. Runs once per schema.
    fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
        entity
    }
}
