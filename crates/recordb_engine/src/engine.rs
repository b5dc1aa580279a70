//! The engine boundary.
//!
//! A storage engine hands out versioned [`Connection`]s to named databases.
//! Opening at a higher version than the stored one yields a [`VersionChange`]
//! whose transaction is the only place stores and indexes can be created or
//! dropped. All data access goes through an [`EngineTransaction`], one
//! request per call.

use crate::error::{EngineError, EngineResult};
use crate::key::{Key, KeyPath, KeyRange};
use recordb_codec::Value;
use std::fmt;
use std::sync::Arc;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionMode {
    /// Reads only.
    #[default]
    ReadOnly,
    /// Reads and writes.
    ReadWrite,
    /// Schema changes during an upgrade. Never requested directly.
    VersionChange,
}

impl TransactionMode {
    /// Whether the mode permits writes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite | Self::VersionChange)
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "readonly",
            Self::ReadWrite => "readwrite",
            Self::VersionChange => "versionchange",
        })
    }
}

/// Traversal order of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CursorDirection {
    /// Ascending.
    #[default]
    Next,
    /// Ascending, one entry per distinct key.
    NextUnique,
    /// Descending.
    Prev,
    /// Descending, one entry per distinct key.
    PrevUnique,
}

impl CursorDirection {
    /// Whether keys are visited in descending order.
    #[must_use]
    pub const fn is_reverse(self) -> bool {
        matches!(self, Self::Prev | Self::PrevUnique)
    }

    /// Whether duplicate keys are skipped.
    #[must_use]
    pub const fn is_unique(self) -> bool {
        matches!(self, Self::NextUnique | Self::PrevUnique)
    }
}

/// State of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Still accepting requests.
    Active,
    /// Changes were applied.
    Committed,
    /// Rolled back by an explicit abort.
    Aborted,
    /// Rolled back because a request failed.
    Failed(EngineError),
}

impl TransactionOutcome {
    /// Whether the transaction still accepts requests.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Parameters of an object store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreParameters {
    /// Inline key path, or `None` for out-of-line keys.
    pub key_path: Option<KeyPath>,
    /// Whether the store generates integer keys.
    pub auto_increment: bool,
}

impl StoreParameters {
    /// Parameters with the given key path and no generator.
    #[must_use]
    pub fn new(key_path: Option<KeyPath>) -> Self {
        Self {
            key_path,
            auto_increment: false,
        }
    }

    /// Enables or disables the key generator.
    #[must_use]
    pub fn with_auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }
}

/// Options of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IndexParameters {
    /// Reject two records with the same index key.
    pub unique: bool,
    /// Index each element of an array value separately.
    pub multi_entry: bool,
}

impl IndexParameters {
    /// Options for a unique index.
    #[must_use]
    pub const fn unique() -> Self {
        Self {
            unique: true,
            multi_entry: false,
        }
    }

    /// Options for a multi-entry index.
    #[must_use]
    pub const fn multi_entry() -> Self {
        Self {
            unique: false,
            multi_entry: true,
        }
    }

    /// Sets uniqueness.
    #[must_use]
    pub const fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Sets multi-entry.
    #[must_use]
    pub const fn with_multi_entry(mut self, multi_entry: bool) -> Self {
        self.multi_entry = multi_entry;
        self
    }
}

/// What a cursor traverses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorSource {
    /// Records of a store, by primary key.
    Store(String),
    /// Records of a store, by the key of one of its indexes.
    Index {
        /// Store name.
        store: String,
        /// Index name.
        index: String,
    },
}

impl CursorSource {
    /// Name of the store behind the source.
    #[must_use]
    pub fn store(&self) -> &str {
        match self {
            Self::Store(store) | Self::Index { store, .. } => store,
        }
    }
}

/// The entry a cursor is positioned on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorRecord {
    /// Key in traversal order (the index key for index cursors).
    pub key: Key,
    /// Primary key of the record.
    pub primary_key: Key,
    /// The record.
    pub value: Value,
}

/// Result of [`StorageEngine::open`].
pub enum OpenOutcome {
    /// The stored version matched; the connection is ready.
    Opened(Arc<dyn Connection>),
    /// The requested version is higher than the stored one.
    UpgradeNeeded(Box<dyn VersionChange>),
}

impl fmt::Debug for OpenOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opened(connection) => f
                .debug_struct("Opened")
                .field("name", &connection.name())
                .field("version", &connection.version())
                .finish(),
            Self::UpgradeNeeded(change) => f
                .debug_struct("UpgradeNeeded")
                .field("old_version", &change.old_version())
                .field("new_version", &change.new_version())
                .finish(),
        }
    }
}

/// A key-value storage engine holding named, versioned databases.
pub trait StorageEngine: Send + Sync {
    /// Opens `name` at `version`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Version`] when `version` is lower than the
    /// stored version and [`EngineError::Data`] when `version` is 0.
    fn open(&self, name: &str, version: u64) -> EngineResult<OpenOutcome>;

    /// Deletes a database. Deleting a missing database succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot delete the database.
    fn delete_database(&self, name: &str) -> EngineResult<()>;

    /// Names of the existing databases, sorted.
    fn database_names(&self) -> Vec<String>;
}

/// An open connection to one database version.
pub trait Connection: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Version the connection was opened at.
    fn version(&self) -> u64;

    /// Store names, sorted.
    fn store_names(&self) -> Vec<String>;

    /// Begins a transaction over `stores`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown stores,
    /// [`EngineError::InvalidState`] if the connection is closed or stale or
    /// `mode` is [`TransactionMode::VersionChange`].
    fn transaction(
        &self,
        stores: &[String],
        mode: TransactionMode,
    ) -> EngineResult<Arc<dyn EngineTransaction>>;

    /// Closes the connection. Idempotent.
    fn close(&self);

    /// Whether [`close`](Connection::close) was called.
    fn is_closed(&self) -> bool;

    /// Whether another connection deleted the database or moved it to a
    /// different version. A stale connection starts no more transactions.
    fn is_stale(&self) -> bool;
}

/// A pending version upgrade.
pub trait VersionChange: Send {
    /// Version stored before the upgrade (0 for a new database).
    fn old_version(&self) -> u64;

    /// Version being upgraded to.
    fn new_version(&self) -> u64;

    /// The upgrade's transaction.
    fn transaction(&self) -> Arc<dyn EngineTransaction>;

    /// Applies the upgrade and returns a connection at the new version.
    ///
    /// # Errors
    ///
    /// Fails if the upgrade transaction is no longer active, reporting why.
    fn commit(self: Box<Self>) -> EngineResult<Arc<dyn Connection>>;

    /// Discards the upgrade.
    fn abort(self: Box<Self>);
}

/// A transaction over a fixed set of stores.
///
/// Every method is a single request. Requests on a transaction that is no
/// longer active fail with [`EngineError::TransactionInactive`].
pub trait EngineTransaction: Send + Sync {
    /// Access mode.
    fn mode(&self) -> TransactionMode;

    /// Store names in scope, sorted.
    fn store_names(&self) -> Vec<String>;

    /// Index names of `store`, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if the store is not in scope.
    fn index_names(&self, store: &str) -> EngineResult<Vec<String>>;

    /// First record whose primary key is in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not in scope or the record cannot be
    /// decoded.
    fn get(&self, store: &str, range: &KeyRange) -> EngineResult<Option<Value>>;

    /// First primary key in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not in scope.
    fn get_key(&self, store: &str, range: &KeyRange) -> EngineResult<Option<Key>>;

    /// Inserts a new record and returns its key.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Constraint`] if the key or a unique index key
    /// already exists, [`EngineError::Data`] if no valid key can be found.
    fn add(&self, store: &str, value: Value, key: Option<Key>) -> EngineResult<Key>;

    /// Inserts or replaces a record and returns its key.
    ///
    /// # Errors
    ///
    /// Same as [`add`](EngineTransaction::add), except an existing primary key
    /// is replaced.
    fn put(&self, store: &str, value: Value, key: Option<Key>) -> EngineResult<Key>;

    /// Deletes every record whose key is in `range`.
    ///
    /// # Errors
    ///
    /// Returns an error for read-only transactions or stores not in scope.
    fn delete(&self, store: &str, range: &KeyRange) -> EngineResult<()>;

    /// Deletes every record of `store`.
    ///
    /// # Errors
    ///
    /// Returns an error for read-only transactions or stores not in scope.
    fn clear(&self, store: &str) -> EngineResult<()>;

    /// Number of records whose key is in `range` (all when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the store is not in scope.
    fn count(&self, store: &str, range: Option<&KeyRange>) -> EngineResult<u64>;

    /// Number of index entries whose key is in `range`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown stores or indexes.
    fn index_count(&self, store: &str, index: &str, range: Option<&KeyRange>)
        -> EngineResult<u64>;

    /// Record of the first index entry in `range`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown stores or indexes.
    fn index_get(&self, store: &str, index: &str, range: &KeyRange)
        -> EngineResult<Option<Value>>;

    /// Primary key of the first index entry in `range`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown stores or indexes.
    fn index_get_key(&self, store: &str, index: &str, range: &KeyRange)
        -> EngineResult<Option<Key>>;

    /// Opens a cursor positioned on the first entry of the traversal.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown stores or indexes.
    fn open_cursor(
        &self,
        source: &CursorSource,
        range: Option<&KeyRange>,
        direction: CursorDirection,
    ) -> EngineResult<Box<dyn EngineCursor>>;

    /// Creates a store. Version change only.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Constraint`] if it exists and
    /// [`EngineError::InvalidState`] outside a version change.
    fn create_store(&self, name: &str, parameters: &StoreParameters) -> EngineResult<()>;

    /// Drops a store. Version change only.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if it does not exist.
    fn delete_store(&self, name: &str) -> EngineResult<()>;

    /// Creates an index and fills it from the existing records. Version
    /// change only.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Constraint`] if the index exists or existing
    /// records break its uniqueness.
    fn create_index(
        &self,
        store: &str,
        index: &str,
        key_path: &KeyPath,
        parameters: &IndexParameters,
    ) -> EngineResult<()>;

    /// Drops an index. Version change only.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if it does not exist.
    fn delete_index(&self, store: &str, index: &str) -> EngineResult<()>;

    /// Applies the changes.
    ///
    /// # Errors
    ///
    /// Reports the failing request's error for failed transactions,
    /// [`EngineError::Conflict`] when a store changed underneath, and
    /// [`EngineError::TransactionInactive`] when already finished.
    fn commit(&self) -> EngineResult<()>;

    /// Discards the changes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidState`] if the transaction already
    /// committed or aborted.
    fn abort(&self) -> EngineResult<()>;

    /// Current state.
    fn outcome(&self) -> TransactionOutcome;
}

/// A positioned cursor.
pub trait EngineCursor: Send {
    /// Current entry, or `None` once the traversal is exhausted.
    fn record(&self) -> Option<&CursorRecord>;

    /// Moves to the next entry, or to the first entry at or past `key` in
    /// traversal order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Data`] if `key` does not lie strictly ahead of
    /// the current position, [`EngineError::InvalidState`] if the cursor is
    /// exhausted.
    fn continue_key(&mut self, key: Option<&Key>) -> EngineResult<()>;

    /// Skips `count` entries.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Data`] when `count` is 0.
    fn advance(&mut self, count: u32) -> EngineResult<()>;
}

pub(crate) fn version_change_only(mode: TransactionMode, what: &str) -> EngineResult<()> {
    if mode == TransactionMode::VersionChange {
        Ok(())
    } else {
        Err(EngineError::invalid_state(format!(
            "{what} is only allowed during a version change"
        )))
    }
}
