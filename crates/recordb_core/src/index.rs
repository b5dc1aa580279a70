//! Typed index handles.

use crate::cursor::CursorResult;
use crate::entity::{IndexDescriptor, IndexOptions};
use crate::error::{CoreError, CoreResult};
use crate::store::StoreInner;
use recordb_codec::from_value;
use recordb_engine::{CursorDirection, CursorSource, Key, KeyRange};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Read access to one secondary index of a store.
pub struct Index<T> {
    store: Arc<StoreInner>,
    descriptor: IndexDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Index<T> {
    pub(crate) fn new(store: Arc<StoreInner>, descriptor: IndexDescriptor) -> Self {
        Self {
            store,
            descriptor,
            _marker: PhantomData,
        }
    }

    /// Index name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Indexed fields.
    #[must_use]
    pub fn key_path(&self) -> &[String] {
        self.descriptor.key_path()
    }

    /// Engine options.
    #[must_use]
    pub fn options(&self) -> IndexOptions {
        self.descriptor.options()
    }

    pub(crate) fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }
}

impl<T: DeserializeOwned> Index<T> {
    /// Number of entries whose index key is in `range`, or all entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails.
    pub fn count(&self, range: Option<&KeyRange>) -> CoreResult<u64> {
        Ok(self
            .store
            .txn
            .index_count(self.store.name(), self.name(), range)?)
    }

    /// First record with index key `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails or the record does not
    /// decode as `T`.
    pub fn get(&self, key: impl Into<Key>) -> CoreResult<Option<T>> {
        self.get_range(&KeyRange::only(key))
    }

    /// First record whose index key is in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails or the record does not
    /// decode as `T`.
    pub fn get_range(&self, range: &KeyRange) -> CoreResult<Option<T>> {
        self.store
            .txn
            .index_get(self.store.name(), self.name(), range)?
            .map(|value| from_value(&value).map_err(CoreError::from))
            .transpose()
    }

    /// Primary key of the first record with index key `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails.
    pub fn get_key(&self, key: impl Into<Key>) -> CoreResult<Option<Key>> {
        self.get_key_range(&KeyRange::only(key))
    }

    /// Primary key of the first record whose index key is in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine request fails.
    pub fn get_key_range(&self, range: &KeyRange) -> CoreResult<Option<Key>> {
        Ok(self
            .store
            .txn
            .index_get_key(self.store.name(), self.name(), range)?)
    }

    /// Opens a cursor ordered by index key.
    pub fn open_cursor(
        &self,
        range: Option<&KeyRange>,
        direction: CursorDirection,
    ) -> CursorResult<T> {
        let source = CursorSource::Index {
            store: self.store.name().to_string(),
            index: self.name().to_string(),
        };
        let request = self
            .store
            .txn
            .open_cursor(&source, range, direction)
            .map_err(CoreError::from);
        CursorResult::new(request, direction)
    }
}

impl<T> fmt::Debug for Index<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("store", &self.store.name())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}
