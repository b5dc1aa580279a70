//! Entity descriptors.

use crate::error::{CoreError, CoreResult};
use recordb_engine::{IndexParameters, KeyPath, StoreParameters};

/// Options of a secondary index.
pub type IndexOptions = IndexParameters;

/// Options of a primary key declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyOptions {
    /// Whether the engine generates key values.
    pub auto_increment: bool,
}

impl KeyOptions {
    /// Options for a generated key.
    #[must_use]
    pub const fn auto_increment() -> Self {
        Self {
            auto_increment: true,
        }
    }
}

/// A named secondary index of an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    name: String,
    key_path: Vec<String>,
    options: IndexOptions,
}

impl IndexDescriptor {
    /// Creates a descriptor over `key_path`, in the given field order.
    pub fn new(name: impl Into<String>, key_path: Vec<String>, options: IndexOptions) -> Self {
        Self {
            name: name.into(),
            key_path,
            options,
        }
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indexed fields, in declaration order.
    #[must_use]
    pub fn key_path(&self) -> &[String] {
        &self.key_path
    }

    /// Engine options.
    #[must_use]
    pub fn options(&self) -> IndexOptions {
        self.options
    }

    /// Whether the index covers more than one field.
    #[must_use]
    pub fn is_compound(&self) -> bool {
        self.key_path.len() > 1
    }

    /// The engine key path: the field itself for one field, the ordered
    /// list for several.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for an index without fields.
    pub fn resolved_key_path(&self) -> CoreResult<KeyPath> {
        KeyPath::from_fields(&self.key_path).ok_or_else(|| {
            CoreError::invalid_operation(format!("index {} has no fields", self.name))
        })
    }

    pub(crate) fn push_field(&mut self, field: &str) {
        self.key_path.push(field.to_string());
    }

    pub(crate) fn set_options(&mut self, options: IndexOptions) {
        self.options = options;
    }
}

/// Schema descriptor of one entity: its store name, primary key and
/// indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    name: String,
    key_path: Vec<String>,
    auto_increment: bool,
    indices: Vec<IndexDescriptor>,
}

impl EntityMetadata {
    /// Creates metadata with no key and no indexes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: Vec::new(),
            auto_increment: false,
            indices: Vec::new(),
        }
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary key fields. Empty means out-of-line keys.
    #[must_use]
    pub fn key_path(&self) -> &[String] {
        &self.key_path
    }

    /// Whether the engine generates primary keys.
    #[must_use]
    pub fn auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Declared indexes, in declaration order.
    #[must_use]
    pub fn indices(&self) -> &[IndexDescriptor] {
        &self.indices
    }

    /// Looks up an index by exact name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indices.iter().find(|index| index.name == name)
    }

    /// The engine key path: `None` without key fields, the field itself for
    /// one field, the ordered list for several.
    #[must_use]
    pub fn resolved_key_path(&self) -> Option<KeyPath> {
        KeyPath::from_fields(&self.key_path)
    }

    /// Parameters used to create the entity's store.
    #[must_use]
    pub fn store_parameters(&self) -> StoreParameters {
        StoreParameters::new(self.resolved_key_path()).with_auto_increment(self.auto_increment)
    }

    pub(crate) fn push_key(&mut self, field: &str, options: KeyOptions) {
        self.key_path.push(field.to_string());
        self.auto_increment = options.auto_increment;
    }

    pub(crate) fn index_mut(&mut self, name: &str) -> Option<&mut IndexDescriptor> {
        self.indices.iter_mut().find(|index| index.name == name)
    }

    pub(crate) fn push_index(&mut self, index: IndexDescriptor) {
        self.indices.push(index);
    }
}
