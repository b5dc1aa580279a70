//! Database facade.

use crate::config::Config;
use crate::entity::{Entity, EntityMetadata, Schema};
use crate::error::{CoreError, CoreResult};
use crate::migration::{run_upgrade, Migration, UpgradeReport};
use crate::transaction::Transaction;
use parking_lot::Mutex;
use recordb_engine::{
    Connection, InMemoryEngine, OpenOutcome, StorageEngine, TransactionMode,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

enum ConnectionState {
    Unopened,
    Open(Arc<dyn Connection>),
    Closed,
}

/// The main database handle.
///
/// `Database` owns the registered entities and the connection to the
/// engine. The connection is opened by the first transaction, upgrading the
/// stored schema when the configured version is higher.
///
/// # Example
///
/// ```rust
/// use recordb_core::{Database, Entity, EntityBuilder, KeyOptions, TransactionMode};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Note {
///     #[serde(skip_serializing_if = "Option::is_none")]
///     id: Option<i64>,
///     text: String,
/// }
///
/// impl Entity for Note {
///     const NAME: &'static str = "Note";
///
///     fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
///         entity.key("id", KeyOptions::auto_increment())
///     }
/// }
///
/// let mut db = Database::in_memory("notes", 1);
/// db.register::<Note>()?;
///
/// let key = db.transaction(&[Note::NAME], TransactionMode::ReadWrite, |tx| {
///     tx.store::<Note>()?.add(&Note { id: None, text: "hello".into() })
/// })?;
///
/// let note = db.transaction(&[Note::NAME], TransactionMode::ReadOnly, |tx| {
///     tx.store::<Note>()?.get(key.clone())
/// })?;
/// assert_eq!(note.unwrap().id, key.as_integer());
/// # Ok::<(), recordb_core::CoreError>(())
/// ```
pub struct Database {
    config: Config,
    engine: Arc<dyn StorageEngine>,
    schema: Arc<Schema>,
    migrations: HashMap<String, Arc<dyn Migration>>,
    connection: Mutex<ConnectionState>,
    last_upgrade: Mutex<Option<UpgradeReport>>,
}

impl Database {
    /// Creates a database handle for `name` at `version` on `engine`.
    ///
    /// Nothing is opened until the first transaction.
    pub fn new(engine: Arc<dyn StorageEngine>, name: impl Into<String>, version: u64) -> Self {
        Self::with_config(engine, Config::new().name(name).version(version))
    }

    /// Creates a database handle from a configuration.
    #[must_use]
    pub fn with_config(engine: Arc<dyn StorageEngine>, config: Config) -> Self {
        Self {
            config,
            engine,
            schema: Arc::new(Schema::new()),
            migrations: HashMap::new(),
            connection: Mutex::new(ConnectionState::Unopened),
            last_upgrade: Mutex::new(None),
        }
    }

    /// Creates a database handle on a fresh [`InMemoryEngine`].
    pub fn in_memory(name: impl Into<String>, version: u64) -> Self {
        Self::new(Arc::new(InMemoryEngine::new()), name, version)
    }

    /// Database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Schema version this handle opens at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.config.version
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registered entities.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The engine behind this database.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// Registers entity `T`.
    ///
    /// Registering a name twice keeps its first position.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] while the database is open.
    pub fn register<T: Entity>(&mut self) -> CoreResult<&mut Self> {
        self.ensure_registrable(T::NAME)?;
        Arc::make_mut(&mut self.schema).register::<T>();
        debug!(database = %self.config.name, entity = T::NAME, "entity registered");
        Ok(self)
    }

    /// Registers entity `T` with the migration that runs when its store
    /// already exists during an upgrade. A later migration for the same
    /// entity replaces an earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] while the database is open.
    pub fn register_with_migration<T: Entity, M: Migration + 'static>(
        &mut self,
        migration: M,
    ) -> CoreResult<&mut Self> {
        self.register::<T>()?;
        self.migrations
            .insert(T::NAME.to_string(), Arc::new(migration));
        Ok(self)
    }

    /// Registers prebuilt metadata, replacing an entity with the same name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] while the database is open.
    pub fn register_metadata(
        &mut self,
        metadata: EntityMetadata,
        migration: Option<Arc<dyn Migration>>,
    ) -> CoreResult<&mut Self> {
        let name = metadata.name().to_string();
        self.ensure_registrable(&name)?;
        Arc::make_mut(&mut self.schema).insert(metadata);
        if let Some(migration) = migration {
            self.migrations.insert(name, migration);
        }
        Ok(self)
    }

    fn ensure_registrable(&self, name: &str) -> CoreResult<()> {
        if self.is_open() {
            return Err(CoreError::invalid_operation(format!(
                "cannot register {name}: database {} is already open",
                self.config.name
            )));
        }
        Ok(())
    }

    /// Opens the database now instead of at the first transaction.
    ///
    /// # Errors
    ///
    /// Returns the engine's error, or the upgrade's error if one runs.
    pub fn open(&self) -> CoreResult<()> {
        self.connection().map(|_| ())
    }

    /// Runs `body` in a transaction over `entities`.
    ///
    /// The transaction commits when `body` returns `Ok` and the commit's
    /// outcome decides the result. When `body` returns `Err` the
    /// transaction is aborted and that error is returned.
    ///
    /// If another handle deleted the database or moved it to a new version,
    /// the cached connection is dropped and the database is opened again.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotRegistered`] before anything is opened when an
    ///   entity is unknown
    /// - the open's or upgrade's error
    /// - [`CoreError::Aborted`] if the body aborted the transaction
    /// - the engine's error if the transaction failed or did not commit
    pub fn transaction<R, F>(&self, entities: &[&str], mode: TransactionMode, body: F) -> CoreResult<R>
    where
        F: FnOnce(&Transaction) -> CoreResult<R>,
    {
        if let Some(unknown) = entities.iter().find(|name| !self.schema.contains(name)) {
            return Err(CoreError::not_registered(*unknown));
        }
        if mode == TransactionMode::VersionChange {
            return Err(CoreError::invalid_operation(
                "version change transactions only run during upgrades",
            ));
        }

        let connection = self.connection()?;
        let mut scope: Vec<String> = Vec::with_capacity(entities.len());
        for name in entities {
            if !scope.iter().any(|s| s.as_str() == *name) {
                scope.push((*name).to_string());
            }
        }
        let txn = connection.transaction(&scope, mode)?;
        let tx = Transaction::new(txn, mode, scope, Arc::clone(&self.schema));

        match body(&tx) {
            Ok(result) => match tx.completion() {
                Ok(()) => Ok(result),
                Err(error) => {
                    if !error.is_abort() {
                        warn!(database = %self.config.name, %error, "transaction failed");
                    }
                    Err(error)
                }
            },
            Err(error) => {
                if tx.is_active() {
                    if let Err(abort_error) = tx.abort() {
                        warn!(
                            database = %self.config.name,
                            error = %abort_error,
                            "abort after failed body did not settle the transaction"
                        );
                    }
                }
                debug!(database = %self.config.name, %error, "transaction body failed");
                Err(error)
            }
        }
    }

    /// Runs `body` in a transaction using the configured default mode.
    ///
    /// # Errors
    ///
    /// Same as [`transaction`](Self::transaction).
    pub fn transaction_default<R, F>(&self, entities: &[&str], body: F) -> CoreResult<R>
    where
        F: FnOnce(&Transaction) -> CoreResult<R>,
    {
        self.transaction(entities, self.config.default_mode, body)
    }

    /// Closes the connection. Idempotent.
    ///
    /// The next transaction opens a fresh connection unless
    /// [`Config::reopen_after_close`] is off.
    pub fn close(&self) {
        let mut state = self.connection.lock();
        if let ConnectionState::Open(connection) = &*state {
            connection.close();
            info!(database = %self.config.name, "database closed");
            *state = ConnectionState::Closed;
        }
    }

    /// Whether a connection is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(&*self.connection.lock(), ConnectionState::Open(c) if !c.is_closed())
    }

    /// Report of the last upgrade this handle ran.
    #[must_use]
    pub fn last_upgrade(&self) -> Option<UpgradeReport> {
        self.last_upgrade.lock().clone()
    }

    /// Irreversibly deletes the named database from `engine`.
    ///
    /// # Errors
    ///
    /// Returns the engine's error.
    pub fn delete_database(engine: &dyn StorageEngine, name: &str) -> CoreResult<()> {
        engine.delete_database(name)?;
        info!(database = name, "database deleted");
        Ok(())
    }

    fn connection(&self) -> CoreResult<Arc<dyn Connection>> {
        let mut state = self.connection.lock();
        if let ConnectionState::Open(connection) = &*state {
            if connection.is_stale() {
                warn!(
                    database = %self.config.name,
                    version = connection.version(),
                    "database changed under the open connection; reopening"
                );
                connection.close();
                *state = ConnectionState::Unopened;
            }
        }
        match &*state {
            ConnectionState::Open(connection) if !connection.is_closed() => {
                return Ok(Arc::clone(connection))
            }
            ConnectionState::Closed if !self.config.reopen_after_close => {
                return Err(CoreError::invalid_operation(format!(
                    "database {} was closed",
                    self.config.name
                )))
            }
            _ => {}
        }
        let connection = self.open_connection()?;
        *state = ConnectionState::Open(Arc::clone(&connection));
        Ok(connection)
    }

    fn open_connection(&self) -> CoreResult<Arc<dyn Connection>> {
        let name = &self.config.name;
        match self.engine.open(name, self.config.version)? {
            OpenOutcome::Opened(connection) => {
                info!(database = %name, version = connection.version(), "database opened");
                Ok(connection)
            }
            OpenOutcome::UpgradeNeeded(change) => {
                match run_upgrade(change.as_ref(), &self.schema, &self.migrations) {
                    Ok(report) => {
                        let connection = change.commit()?;
                        info!(
                            database = %name,
                            from = report.old_version,
                            to = report.new_version,
                            created = report.created.len(),
                            migrated = report.migrated.len(),
                            "database upgraded"
                        );
                        *self.last_upgrade.lock() = Some(report);
                        Ok(connection)
                    }
                    Err(error) => {
                        warn!(database = %name, %error, "upgrade failed");
                        change.abort();
                        Err(error)
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.config.name)
            .field("version", &self.config.version)
            .field("entities", &self.schema.len())
            .field("is_open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityBuilder;
    use crate::KeyOptions;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        text: String,
    }

    impl Entity for Note {
        const NAME: &'static str = "Note";

        fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
            entity.key("id", KeyOptions::auto_increment())
        }
    }

    fn note(text: &str) -> Note {
        Note {
            id: None,
            text: text.into(),
        }
    }

    fn create_db() -> Database {
        let mut db = Database::in_memory("notes", 1);
        db.register::<Note>().unwrap();
        db
    }

    #[test]
    fn first_transaction_opens_and_creates_stores() {
        let db = create_db();
        assert!(!db.is_open());

        db.transaction(&[Note::NAME], TransactionMode::ReadOnly, |_| Ok(()))
            .unwrap();

        assert!(db.is_open());
        let report = db.last_upgrade().unwrap();
        assert_eq!((report.old_version, report.new_version), (0, 1));
        assert_eq!(report.created, vec!["Note".to_string()]);
    }

    #[test]
    fn body_result_is_returned_after_commit() {
        let db = create_db();
        let key = db
            .transaction(&[Note::NAME], TransactionMode::ReadWrite, |tx| {
                tx.store::<Note>()?.add(&note("a"))
            })
            .unwrap();

        let stored = db
            .transaction_default(&[Note::NAME], |tx| tx.store::<Note>()?.get(key))
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, Some(1));
    }

    #[test]
    fn body_error_aborts() {
        let db = create_db();
        let err = db
            .transaction(&[Note::NAME], TransactionMode::ReadWrite, |tx| {
                tx.store::<Note>()?.add(&note("lost"))?;
                Err::<(), _>(CoreError::invalid_operation("changed my mind"))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        let count = db
            .transaction_default(&[Note::NAME], |tx| tx.store::<Note>()?.count(None))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn unregistered_entity_is_rejected_before_opening() {
        let db = create_db();
        let err = db
            .transaction(&["Ghost"], TransactionMode::ReadOnly, |_| Ok(()))
            .unwrap_err();
        assert_eq!(err, CoreError::not_registered("Ghost"));
        assert!(!db.is_open());
        assert!(db.engine().database_names().is_empty());
    }

    #[test]
    fn register_while_open_is_rejected() {
        let mut db = create_db();
        db.open().unwrap();
        assert!(matches!(
            db.register::<Note>(),
            Err(CoreError::InvalidOperation { .. })
        ));
        db.close();
        db.register::<Note>().unwrap();
    }

    #[test]
    fn version_change_mode_is_not_requestable() {
        let db = create_db();
        let err = db
            .transaction(&[Note::NAME], TransactionMode::VersionChange, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn close_then_transaction_reopens() {
        let db = create_db();
        db.open().unwrap();
        db.close();
        db.close();
        assert!(!db.is_open());

        db.transaction_default(&[Note::NAME], |_| Ok(())).unwrap();
        assert!(db.is_open());
    }

    #[test]
    fn close_without_reopen_rejects_transactions() {
        let engine: Arc<dyn StorageEngine> = Arc::new(InMemoryEngine::new());
        let mut db = Database::with_config(
            engine,
            Config::new().name("strict").reopen_after_close(false),
        );
        db.register::<Note>().unwrap();
        db.open().unwrap();
        db.close();

        let err = db.transaction_default(&[Note::NAME], |_| Ok(())).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));
    }

    #[test]
    fn delete_database_removes_data() {
        let engine: Arc<dyn StorageEngine> = Arc::new(InMemoryEngine::new());
        let mut db = Database::new(Arc::clone(&engine), "gone", 1);
        db.register::<Note>().unwrap();
        db.transaction(&[Note::NAME], TransactionMode::ReadWrite, |tx| {
            tx.store::<Note>()?.add(&note("x")).map(|_| ())
        })
        .unwrap();
        db.close();

        Database::delete_database(engine.as_ref(), "gone").unwrap();
        assert!(engine.database_names().is_empty());

        let count = db
            .transaction_default(&[Note::NAME], |tx| tx.store::<Note>()?.count(None))
            .unwrap();
        assert_eq!(count, 0);
    }
}
