//! The schema registry.

use super::metadata::{EntityMetadata, IndexDescriptor, IndexOptions, KeyOptions};
use super::Entity;

/// Registry of entity metadata, in declaration order.
///
/// Declarations accumulate: keys append to the primary key path and
/// indexes sharing a name grow into compound indexes. Nothing is
/// validated at declaration time.
///
/// ```rust
/// use recordb_core::{IndexOptions, KeyOptions, Schema};
///
/// let mut schema = Schema::new();
/// schema
///     .entity("Employee")
///     .key("id", KeyOptions::auto_increment())
///     .index("age")
///     .named_index_with("badge", "badge", IndexOptions::unique());
///
/// let employee = schema.get("Employee").unwrap();
/// assert_eq!(employee.key_path(), ["id"]);
/// assert_eq!(employee.indices().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    entities: Vec<EntityMetadata>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, name: &str) -> &mut EntityMetadata {
        let position = match self.entities.iter().position(|e| e.name() == name) {
            Some(position) => position,
            None => {
                self.entities.push(EntityMetadata::new(name));
                self.entities.len() - 1
            }
        };
        &mut self.entities[position]
    }

    /// Declares an entity. Accumulated keys and indexes are kept.
    pub fn declare_entity(&mut self, name: &str) -> &mut Self {
        self.entry(name);
        self
    }

    /// Appends `field` to the entity's primary key. The auto-increment flag
    /// of the last call wins.
    pub fn declare_key(&mut self, entity: &str, field: &str, options: KeyOptions) -> &mut Self {
        self.entry(entity).push_key(field, options);
        self
    }

    /// Declares an index on `field`, named `name` or after the field.
    ///
    /// If the entity already has an index with that name the field is
    /// appended to it, making it compound. Given options replace the
    /// stored ones; omitted options leave them as they are.
    pub fn declare_index(
        &mut self,
        entity: &str,
        field: &str,
        name: Option<&str>,
        options: Option<IndexOptions>,
    ) -> &mut Self {
        let name = name.unwrap_or(field);
        let metadata = self.entry(entity);
        match metadata.index_mut(name) {
            Some(index) => {
                index.push_field(field);
                if let Some(options) = options {
                    index.set_options(options);
                }
            }
            None => metadata.push_index(IndexDescriptor::new(
                name,
                vec![field.to_string()],
                options.unwrap_or_default(),
            )),
        }
        self
    }

    /// Starts a builder for the named entity.
    pub fn entity(&mut self, name: &str) -> EntityBuilder<'_> {
        self.declare_entity(name);
        EntityBuilder {
            schema: self,
            name: name.to_string(),
        }
    }

    /// Declares `T` unless an entity with its name is already present.
    pub fn register<T: Entity>(&mut self) -> &EntityMetadata {
        if !self.contains(T::NAME) {
            T::declare(self.entity(T::NAME));
        }
        self.entry(T::NAME)
    }

    /// Inserts fully built metadata, replacing any entity with the same
    /// name in place.
    pub fn insert(&mut self, metadata: EntityMetadata) {
        let slot = self.entry(metadata.name());
        *slot = metadata;
    }

    /// Metadata of the named entity.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EntityMetadata> {
        self.entities.iter().find(|e| e.name() == name)
    }

    /// Whether the named entity is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Every entity, in declaration order.
    #[must_use]
    pub fn entities(&self) -> &[EntityMetadata] {
        &self.entities
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no entity is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Builder over one entity of a [`Schema`].
#[derive(Debug)]
pub struct EntityBuilder<'a> {
    schema: &'a mut Schema,
    name: String,
}

impl EntityBuilder<'_> {
    /// Entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a primary key field.
    #[must_use]
    pub fn key(self, field: &str, options: KeyOptions) -> Self {
        self.schema.declare_key(&self.name, field, options);
        self
    }

    /// Indexes `field` under its own name.
    #[must_use]
    pub fn index(self, field: &str) -> Self {
        self.schema.declare_index(&self.name, field, None, None);
        self
    }

    /// Indexes `field` under its own name with options.
    #[must_use]
    pub fn index_with(self, field: &str, options: IndexOptions) -> Self {
        self.schema
            .declare_index(&self.name, field, None, Some(options));
        self
    }

    /// Adds `field` to the index called `name`.
    #[must_use]
    pub fn named_index(self, name: &str, field: &str) -> Self {
        self.schema
            .declare_index(&self.name, field, Some(name), None);
        self
    }

    /// Adds `field` to the index called `name`, replacing its options.
    #[must_use]
    pub fn named_index_with(self, name: &str, field: &str, options: IndexOptions) -> Self {
        self.schema
            .declare_index(&self.name, field, Some(name), Some(options));
        self
    }

    /// Declares a compound index over `fields`, in order.
    #[must_use]
    pub fn compound_index(mut self, name: &str, fields: &[&str]) -> Self {
        for field in fields {
            self = self.named_index(name, field);
        }
        self
    }
}
