//! Typed store handles.

use crate::cursor::CursorResult;
use crate::entity::EntityMetadata;
use crate::error::{CoreError, CoreResult};
use crate::index::Index;
use recordb_codec::{from_value, to_value};
use recordb_engine::{CursorDirection, CursorSource, EngineTransaction, Key, KeyRange};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// State shared by every handle to one store within a transaction.
pub(crate) struct StoreInner {
    pub(crate) metadata: EntityMetadata,
    pub(crate) txn: Arc<dyn EngineTransaction>,
    pub(crate) upgrade: bool,
}

impl StoreInner {
    pub(crate) fn new(
        metadata: EntityMetadata,
        txn: Arc<dyn EngineTransaction>,
        upgrade: bool,
    ) -> Self {
        Self {
            metadata,
            txn,
            upgrade,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.metadata.name()
    }
}

/// Typed access to an entity's store.
///
/// Each operation issues exactly one engine request.
pub struct Store<T> {
    inner: Arc<StoreInner>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.inner))
    }
}

impl<T> Store<T> {
    pub(crate) fn new(inner: Arc<StoreInner>) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    /// Store name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Metadata of the entity.
    #[must_use]
    pub fn metadata(&self) -> &EntityMetadata {
        &self.inner.metadata
    }

    /// Whether both handles come from the same `store` call cache entry.
    #[must_use]
    pub fn same_handle<U>(&self, other: &Store<U>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Serialize + DeserializeOwned> Store<T> {
    /// Record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails or the record does not
    /// decode as `T`.
    pub fn get(&self, key: impl Into<Key>) -> CoreResult<Option<T>> {
        self.get_range(&KeyRange::only(key))
    }

    /// First record whose key is in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails or the record does not
    /// decode as `T`.
    pub fn get_range(&self, range: &KeyRange) -> CoreResult<Option<T>> {
        self.inner
            .txn
            .get(self.name(), range)?
            .map(|value| from_value(&value).map_err(CoreError::from))
            .transpose()
    }

    /// First primary key in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails.
    pub fn get_key(&self, range: &KeyRange) -> CoreResult<Option<Key>> {
        Ok(self.inner.txn.get_key(self.name(), range)?)
    }

    /// Inserts a new record and returns its key.
    ///
    /// # Errors
    ///
    /// Fails with an engine `Constraint` error if the key exists.
    pub fn add(&self, value: &T) -> CoreResult<Key> {
        Ok(self.inner.txn.add(self.name(), to_value(value)?, None)?)
    }

    /// Inserts a new record under an out-of-line key.
    ///
    /// # Errors
    ///
    /// Fails with an engine `Constraint` error if the key exists and with a
    /// `Data` error if the store uses inline keys.
    pub fn add_with_key(&self, value: &T, key: impl Into<Key>) -> CoreResult<Key> {
        Ok(self
            .inner
            .txn
            .add(self.name(), to_value(value)?, Some(key.into()))?)
    }

    /// Inserts or replaces a record and returns its key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails.
    pub fn put(&self, value: &T) -> CoreResult<Key> {
        Ok(self.inner.txn.put(self.name(), to_value(value)?, None)?)
    }

    /// Inserts or replaces a record under an out-of-line key.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails.
    pub fn put_with_key(&self, value: &T, key: impl Into<Key>) -> CoreResult<Key> {
        Ok(self
            .inner
            .txn
            .put(self.name(), to_value(value)?, Some(key.into()))?)
    }

    /// Deletes the record under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails.
    pub fn delete(&self, key: impl Into<Key>) -> CoreResult<()> {
        self.delete_range(&KeyRange::only(key))
    }

    /// Deletes every record whose key is in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails.
    pub fn delete_range(&self, range: &KeyRange) -> CoreResult<()> {
        Ok(self.inner.txn.delete(self.name(), range)?)
    }

    /// Deletes every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails.
    pub fn clear(&self) -> CoreResult<()> {
        Ok(self.inner.txn.clear(self.name())?)
    }

    /// Number of records whose key is in `range`, or all records.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails.
    pub fn count(&self, range: Option<&KeyRange>) -> CoreResult<u64> {
        Ok(self.inner.txn.count(self.name(), range)?)
    }

    /// Opens a cursor over primary keys.
    pub fn open_cursor(
        &self,
        range: Option<&KeyRange>,
        direction: CursorDirection,
    ) -> CursorResult<T> {
        let source = CursorSource::Store(self.name().to_string());
        let request = self
            .inner
            .txn
            .open_cursor(&source, range, direction)
            .map_err(CoreError::from);
        CursorResult::new(request, direction)
    }

    /// Handle to a declared index.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexNotFound`] if the entity declares no index
    /// with that name.
    pub fn index(&self, name: &str) -> CoreResult<Index<T>> {
        let descriptor = self
            .metadata()
            .index(name)
            .cloned()
            .ok_or_else(|| CoreError::index_not_found(self.name(), name))?;
        Ok(Index::new(Arc::clone(&self.inner), descriptor))
    }

    /// Index names the engine currently holds for this store.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails.
    pub fn index_names(&self) -> CoreResult<Vec<String>> {
        Ok(self.inner.txn.index_names(self.name())?)
    }

    /// Creates the declared index `name` in the engine. Migrations only.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] outside a migration,
    /// [`CoreError::IndexNotFound`] for undeclared names, and an engine
    /// `Constraint` error if existing records break a unique index.
    pub fn create_index(&self, name: &str) -> CoreResult<Index<T>> {
        self.ensure_upgrade("create_index")?;
        let index = self.index(name)?;
        let descriptor = index.descriptor();
        self.inner.txn.create_index(
            self.name(),
            descriptor.name(),
            &descriptor.resolved_key_path()?,
            &descriptor.options(),
        )?;
        debug!(store = self.name(), index = name, "index created by migration");
        Ok(index)
    }

    /// Drops the engine index `name`, declared or not. Migrations only.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] outside a migration and an
    /// engine `NotFound` error for unknown indexes.
    pub fn delete_index(&self, name: &str) -> CoreResult<()> {
        self.ensure_upgrade("delete_index")?;
        self.inner.txn.delete_index(self.name(), name)?;
        debug!(store = self.name(), index = name, "index deleted by migration");
        Ok(())
    }

    fn ensure_upgrade(&self, what: &str) -> CoreResult<()> {
        if self.inner.upgrade {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(format!(
                "{what} is only available inside a migration"
            )))
        }
    }
}

impl<T> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name())
            .field("upgrade", &self.inner.upgrade)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::entity::EntityBuilder;
    use crate::{
        CoreError, CursorDirection, Database, Entity, IndexOptions, Key, KeyOptions, KeyRange,
        TransactionMode,
    };
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sensor {
        name: String,
        room: String,
    }

    impl Entity for Sensor {
        const NAME: &'static str = "Sensor";

        fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
            entity.index_with("room", IndexOptions::default())
        }
    }

    fn sensor(name: &str, room: &str) -> Sensor {
        Sensor {
            name: name.into(),
            room: room.into(),
        }
    }

    fn create_db() -> Database {
        let mut db = Database::in_memory("sensors", 1);
        db.register::<Sensor>().unwrap();
        db
    }

    #[test]
    fn out_of_line_keys() {
        let db = create_db();
        db.transaction(&[Sensor::NAME], TransactionMode::ReadWrite, |tx| {
            let sensors = tx.store::<Sensor>()?;
            assert_eq!(sensors.add_with_key(&sensor("t1", "hall"), "a")?, Key::from("a"));
            sensors.put_with_key(&sensor("t2", "hall"), "a")?;
            assert!(matches!(
                sensors.add(&sensor("t3", "attic")),
                Err(CoreError::Engine(recordb_engine::EngineError::Data { .. }))
            ));
            assert_eq!(sensors.get("a")?, Some(sensor("t2", "hall")));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn key_and_count_over_ranges() {
        let db = create_db();
        db.transaction(&[Sensor::NAME], TransactionMode::ReadWrite, |tx| {
            let sensors = tx.store::<Sensor>()?;
            for (key, room) in [(1, "hall"), (2, "attic"), (3, "hall")] {
                sensors.add_with_key(&sensor(&format!("t{key}"), room), key)?;
            }
            let upper = KeyRange::upper_bound(2, false);
            assert_eq!(sensors.count(Some(&upper))?, 2);
            assert_eq!(sensors.get_key(&KeyRange::lower_bound(2, true))?, Some(Key::Integer(3)));
            assert_eq!(sensors.get_range(&upper)?.map(|s| s.name), Some("t1".into()));

            let rooms: Vec<_> = sensors
                .index("room")?
                .open_cursor(None, CursorDirection::NextUnique)
                .as_list()?
                .into_iter()
                .map(|s| s.room)
                .collect();
            assert_eq!(rooms, ["attic", "hall"]);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn clones_share_the_handle() {
        let db = create_db();
        db.transaction_default(&[Sensor::NAME], |tx| {
            let sensors = tx.store::<Sensor>()?;
            let copy = sensors.clone();
            assert!(sensors.same_handle(&copy));
            assert_eq!(copy.name(), "Sensor");
            assert!(copy.metadata().key_path().is_empty());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn structural_changes_need_a_migration() {
        let db = create_db();
        let err = db
            .transaction(&[Sensor::NAME], TransactionMode::ReadWrite, |tx| {
                tx.store::<Sensor>()?.create_index("room").map(|_| ())
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }
}
