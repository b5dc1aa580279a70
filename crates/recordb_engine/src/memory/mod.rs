//! In-memory storage engine.

mod cursor;
mod store;
mod transaction;

use crate::engine::{
    Connection, EngineTransaction, OpenOutcome, StorageEngine, TransactionMode, VersionChange,
};
use crate::error::{EngineError, EngineResult};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use store::StoreData;
use tracing::{debug, info, warn};
use transaction::MemoryTransaction;

/// An engine that keeps every database in memory.
///
/// Suitable for:
/// - Unit and integration tests
/// - Ephemeral databases that don't need persistence
///
/// The engine is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use recordb_engine::{InMemoryEngine, OpenOutcome, StorageEngine, StoreParameters};
///
/// let engine = InMemoryEngine::new();
/// let OpenOutcome::UpgradeNeeded(change) = engine.open("app", 1).unwrap() else {
///     unreachable!("a new database always needs an upgrade");
/// };
/// change
///     .transaction()
///     .create_store("notes", &StoreParameters::default().with_auto_increment(true))
///     .unwrap();
/// let connection = change.commit().unwrap();
/// assert_eq!(connection.store_names(), vec!["notes".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    databases: RwLock<HashMap<String, Arc<SharedDatabase>>>,
}

impl InMemoryEngine {
    /// Creates an engine with no databases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for InMemoryEngine {
    fn open(&self, name: &str, version: u64) -> EngineResult<OpenOutcome> {
        if version == 0 {
            return Err(EngineError::data("database version must be at least 1"));
        }
        let database = Arc::clone(
            self.databases
                .write()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(SharedDatabase::new(name))),
        );

        let (stored, stores) = {
            let state = database.state.read();
            (state.version, state.stores.clone())
        };
        if version < stored {
            return Err(EngineError::Version {
                requested: version,
                stored,
            });
        }
        if version == stored {
            info!(database = name, version, "database opened");
            return Ok(OpenOutcome::Opened(Arc::new(MemoryConnection::new(
                database, version,
            ))));
        }

        info!(database = name, from = stored, to = version, "upgrade needed");
        let txn = database.begin(TransactionMode::VersionChange, stores);
        Ok(OpenOutcome::UpgradeNeeded(Box::new(MemoryVersionChange {
            database,
            old_version: stored,
            new_version: version,
            txn: Arc::new(txn),
        })))
    }

    fn delete_database(&self, name: &str) -> EngineResult<()> {
        if let Some(database) = self.databases.write().remove(name) {
            database.state.write().deleted = true;
            info!(database = name, "database deleted");
        }
        Ok(())
    }

    fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .databases
            .read()
            .values()
            .filter(|db| db.state.read().version > 0)
            .map(|db| db.name.clone())
            .collect();
        names.sort();
        names
    }
}

#[derive(Debug)]
struct DatabaseState {
    version: u64,
    stores: BTreeMap<String, Arc<StoreData>>,
    deleted: bool,
}

/// One named database, shared by every connection to it.
#[derive(Debug)]
pub(crate) struct SharedDatabase {
    name: String,
    state: RwLock<DatabaseState>,
    next_txn: AtomicU64,
}

impl SharedDatabase {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: RwLock::new(DatabaseState {
                version: 0,
                stores: BTreeMap::new(),
                deleted: false,
            }),
            next_txn: AtomicU64::new(1),
        }
    }

    fn begin(
        self: &Arc<Self>,
        mode: TransactionMode,
        stores: BTreeMap<String, Arc<StoreData>>,
    ) -> MemoryTransaction {
        let id = self.next_txn.fetch_add(1, Ordering::Relaxed);
        MemoryTransaction::new(id, Arc::clone(self), mode, stores)
    }

    /// Installs the stores a read-write transaction changed.
    ///
    /// A changed store must still be the version the transaction started
    /// from, otherwise nothing is applied.
    pub(crate) fn apply(
        &self,
        base: &BTreeMap<String, Arc<StoreData>>,
        working: &BTreeMap<String, Arc<StoreData>>,
    ) -> EngineResult<()> {
        let mut state = self.state.write();
        if state.deleted {
            return Err(EngineError::invalid_state(format!(
                "database {} was deleted",
                self.name
            )));
        }
        let changed: Vec<(&String, &Arc<StoreData>)> = working
            .iter()
            .filter(|(name, data)| base.get(*name).is_none_or(|b| !Arc::ptr_eq(b, data)))
            .collect();
        for (name, _) in &changed {
            let unchanged = match (state.stores.get(*name), base.get(*name)) {
                (Some(current), Some(start)) => Arc::ptr_eq(current, start),
                _ => false,
            };
            if !unchanged {
                return Err(EngineError::Conflict {
                    store: (*name).clone(),
                });
            }
        }
        for (name, data) in changed {
            state.stores.insert(name.clone(), Arc::clone(data));
        }
        Ok(())
    }
}

/// A connection of [`InMemoryEngine`].
struct MemoryConnection {
    database: Arc<SharedDatabase>,
    version: u64,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn new(database: Arc<SharedDatabase>, version: u64) -> Self {
        Self {
            database,
            version,
            closed: AtomicBool::new(false),
        }
    }
}

impl Connection for MemoryConnection {
    fn name(&self) -> &str {
        &self.database.name
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn store_names(&self) -> Vec<String> {
        self.database.state.read().stores.keys().cloned().collect()
    }

    fn transaction(
        &self,
        stores: &[String],
        mode: TransactionMode,
    ) -> EngineResult<Arc<dyn EngineTransaction>> {
        if self.is_closed() {
            return Err(EngineError::invalid_state("connection is closed"));
        }
        if mode == TransactionMode::VersionChange {
            return Err(EngineError::invalid_state(
                "version change transactions are only started by an upgrade",
            ));
        }
        if stores.is_empty() {
            return Err(EngineError::invalid_state(
                "a transaction needs at least one store",
            ));
        }

        let state = self.database.state.read();
        if state.deleted {
            return Err(EngineError::invalid_state("database was deleted"));
        }
        if state.version != self.version {
            return Err(EngineError::invalid_state(format!(
                "database was upgraded to version {}; reopen the connection",
                state.version
            )));
        }
        let mut snapshot = BTreeMap::new();
        for name in stores {
            let data = state
                .stores
                .get(name)
                .ok_or_else(|| EngineError::not_found(format!("store {name}")))?;
            snapshot.insert(name.clone(), Arc::clone(data));
        }
        drop(state);

        Ok(Arc::new(self.database.begin(mode, snapshot)))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(database = %self.database.name, "connection closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_stale(&self) -> bool {
        let state = self.database.state.read();
        state.deleted || state.version != self.version
    }
}

struct MemoryVersionChange {
    database: Arc<SharedDatabase>,
    old_version: u64,
    new_version: u64,
    txn: Arc<MemoryTransaction>,
}

impl VersionChange for MemoryVersionChange {
    fn old_version(&self) -> u64 {
        self.old_version
    }

    fn new_version(&self) -> u64 {
        self.new_version
    }

    fn transaction(&self) -> Arc<dyn EngineTransaction> {
        Arc::clone(&self.txn) as Arc<dyn EngineTransaction>
    }

    fn commit(self: Box<Self>) -> EngineResult<Arc<dyn Connection>> {
        let mut state = self.database.state.write();
        if state.deleted || state.version != self.old_version {
            drop(state);
            if let Err(error) = self.txn.abort() {
                warn!(
                    database = %self.database.name,
                    %error,
                    "abort of an outdated upgrade did not settle its transaction"
                );
            }
            return Err(EngineError::invalid_state(format!(
                "database {} changed during the upgrade",
                self.database.name
            )));
        }
        state.stores = self.txn.finish_version_change()?;
        state.version = self.new_version;
        drop(state);

        info!(
            database = %self.database.name,
            txn = self.txn.id(),
            version = self.new_version,
            "upgrade committed"
        );
        Ok(Arc::new(MemoryConnection::new(
            Arc::clone(&self.database),
            self.new_version,
        )))
    }

    fn abort(self: Box<Self>) {
        if self.txn.abort().is_ok() {
            info!(database = %self.database.name, "upgrade aborted");
        }
    }
}
