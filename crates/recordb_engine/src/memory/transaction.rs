//! Snapshot transactions over the in-memory engine.

use super::cursor::MemoryCursor;
use super::store::StoreData;
use super::SharedDatabase;
use crate::engine::{
    version_change_only, CursorDirection, CursorSource, EngineCursor, EngineTransaction,
    IndexParameters, StoreParameters, TransactionMode, TransactionOutcome,
};
use crate::error::{EngineError, EngineResult};
use crate::key::{Key, KeyPath, KeyRange};
use parking_lot::Mutex;
use recordb_codec::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Snapshot of the stores a transaction can see.
///
/// `base` holds the store versions the transaction started from and
/// `working` the versions it reads and writes. Writes clone a store on first
/// touch, so an untouched store is pointer-equal in both maps.
#[derive(Debug)]
pub(crate) struct TxnState {
    pub(crate) base: BTreeMap<String, Arc<StoreData>>,
    pub(crate) working: BTreeMap<String, Arc<StoreData>>,
    pub(crate) outcome: TransactionOutcome,
}

impl TxnState {
    pub(crate) fn new(stores: BTreeMap<String, Arc<StoreData>>) -> Self {
        Self {
            working: stores.clone(),
            base: stores,
            outcome: TransactionOutcome::Active,
        }
    }

    pub(crate) fn ensure_active(&self) -> EngineResult<()> {
        if self.outcome.is_active() {
            Ok(())
        } else {
            Err(EngineError::TransactionInactive)
        }
    }

    pub(crate) fn store(&self, name: &str) -> EngineResult<&StoreData> {
        self.working
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| not_in_scope(name))
    }

    fn fail(&mut self, error: EngineError) {
        self.working = self.base.clone();
        self.outcome = TransactionOutcome::Failed(error);
    }
}

fn not_in_scope(store: &str) -> EngineError {
    EngineError::not_found(format!("store {store} is not in this transaction's scope"))
}

/// A transaction of [`InMemoryEngine`](super::InMemoryEngine).
pub(crate) struct MemoryTransaction {
    id: u64,
    database: Arc<SharedDatabase>,
    mode: TransactionMode,
    state: Arc<Mutex<TxnState>>,
}

impl MemoryTransaction {
    pub(crate) fn new(
        id: u64,
        database: Arc<SharedDatabase>,
        mode: TransactionMode,
        stores: BTreeMap<String, Arc<StoreData>>,
    ) -> Self {
        debug!(txn = id, database = %database.name, %mode, "transaction begin");
        Self {
            id,
            database,
            mode,
            state: Arc::new(Mutex::new(TxnState::new(stores))),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Runs a read request against one store.
    fn read<R>(&self, store: &str, f: impl FnOnce(&StoreData) -> EngineResult<R>) -> EngineResult<R> {
        let state = self.state.lock();
        state.ensure_active()?;
        f(state.store(store)?)
    }

    /// Runs a write request against one store. Execution failures roll the
    /// whole transaction back.
    fn write<R>(
        &self,
        store: &str,
        f: impl FnOnce(&mut StoreData) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        if !self.mode.is_writable() {
            return Err(EngineError::ReadOnly);
        }
        let data = state.working.get_mut(store).ok_or_else(|| not_in_scope(store))?;
        let result = f(Arc::make_mut(data));
        if let Err(error) = &result {
            if error.fails_transaction() {
                debug!(txn = self.id, %error, "transaction failed");
                state.fail(error.clone());
            }
        }
        result
    }

    /// Runs a structural request. Failures here fail the upgrade.
    fn restructure<R>(
        &self,
        what: &str,
        f: impl FnOnce(&mut BTreeMap<String, Arc<StoreData>>) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let mut state = self.state.lock();
        state.ensure_active()?;
        version_change_only(self.mode, what)?;
        let result = f(&mut state.working);
        if let Err(error) = &result {
            if error.fails_transaction() {
                state.fail(error.clone());
            }
        }
        result
    }

    /// Takes the working stores for a version change commit.
    pub(crate) fn finish_version_change(&self) -> EngineResult<BTreeMap<String, Arc<StoreData>>> {
        let mut state = self.state.lock();
        match &state.outcome {
            TransactionOutcome::Active => {}
            TransactionOutcome::Failed(error) => return Err(error.clone()),
            TransactionOutcome::Aborted => return Err(EngineError::Aborted),
            TransactionOutcome::Committed => return Err(EngineError::TransactionInactive),
        }
        state.outcome = TransactionOutcome::Committed;
        Ok(state.working.clone())
    }

    fn insert(&self, store: &str, value: Value, key: Option<Key>, overwrite: bool) -> EngineResult<Key> {
        trace!(txn = self.id, store, overwrite, "insert");
        self.write(store, |data| data.insert(value, key, overwrite))
    }

    fn index_read<R>(
        &self,
        store: &str,
        index: &str,
        f: impl FnOnce(&StoreData, &super::store::IndexData) -> EngineResult<R>,
    ) -> EngineResult<R> {
        self.read(store, |data| f(data, data.index(index)?))
    }
}

impl EngineTransaction for MemoryTransaction {
    fn mode(&self) -> TransactionMode {
        self.mode
    }

    fn store_names(&self) -> Vec<String> {
        self.state.lock().working.keys().cloned().collect()
    }

    fn index_names(&self, store: &str) -> EngineResult<Vec<String>> {
        let state = self.state.lock();
        Ok(state.store(store)?.indexes.keys().cloned().collect())
    }

    fn get(&self, store: &str, range: &KeyRange) -> EngineResult<Option<Value>> {
        trace!(txn = self.id, store, "get");
        self.read(store, |data| match data.first_key(range) {
            Some(key) => data.decode(key),
            None => Ok(None),
        })
    }

    fn get_key(&self, store: &str, range: &KeyRange) -> EngineResult<Option<Key>> {
        trace!(txn = self.id, store, "get_key");
        self.read(store, |data| Ok(data.first_key(range).cloned()))
    }

    fn add(&self, store: &str, value: Value, key: Option<Key>) -> EngineResult<Key> {
        self.insert(store, value, key, false)
    }

    fn put(&self, store: &str, value: Value, key: Option<Key>) -> EngineResult<Key> {
        self.insert(store, value, key, true)
    }

    fn delete(&self, store: &str, range: &KeyRange) -> EngineResult<()> {
        trace!(txn = self.id, store, "delete");
        self.write(store, |data| data.delete(range).map(|_| ()))
    }

    fn clear(&self, store: &str) -> EngineResult<()> {
        trace!(txn = self.id, store, "clear");
        self.write(store, |data| {
            data.clear();
            Ok(())
        })
    }

    fn count(&self, store: &str, range: Option<&KeyRange>) -> EngineResult<u64> {
        trace!(txn = self.id, store, "count");
        self.read(store, |data| Ok(data.count(range)))
    }

    fn index_count(&self, store: &str, index: &str, range: Option<&KeyRange>) -> EngineResult<u64> {
        trace!(txn = self.id, store, index, "index count");
        self.index_read(store, index, |_, idx| Ok(idx.count(range)))
    }

    fn index_get(&self, store: &str, index: &str, range: &KeyRange) -> EngineResult<Option<Value>> {
        trace!(txn = self.id, store, index, "index get");
        self.index_read(store, index, |data, idx| match idx.first(range) {
            Some(primary) => data.decode(primary),
            None => Ok(None),
        })
    }

    fn index_get_key(&self, store: &str, index: &str, range: &KeyRange) -> EngineResult<Option<Key>> {
        trace!(txn = self.id, store, index, "index get key");
        self.index_read(store, index, |_, idx| Ok(idx.first(range).cloned()))
    }

    fn open_cursor(
        &self,
        source: &CursorSource,
        range: Option<&KeyRange>,
        direction: CursorDirection,
    ) -> EngineResult<Box<dyn EngineCursor>> {
        trace!(txn = self.id, store = source.store(), ?direction, "open cursor");
        let cursor = MemoryCursor::open(
            Arc::clone(&self.state),
            source.clone(),
            range.cloned().unwrap_or_default(),
            direction,
        )?;
        Ok(Box::new(cursor))
    }

    fn create_store(&self, name: &str, parameters: &StoreParameters) -> EngineResult<()> {
        self.restructure("create_store", |stores| {
            if stores.contains_key(name) {
                return Err(EngineError::constraint(format!("store {name} already exists")));
            }
            let data = StoreData::new(parameters.clone())?;
            stores.insert(name.to_string(), Arc::new(data));
            debug!(txn = self.id, store = name, "store created");
            Ok(())
        })
    }

    fn delete_store(&self, name: &str) -> EngineResult<()> {
        self.restructure("delete_store", |stores| {
            if stores.remove(name).is_none() {
                return Err(EngineError::not_found(format!("store {name}")));
            }
            debug!(txn = self.id, store = name, "store deleted");
            Ok(())
        })
    }

    fn create_index(
        &self,
        store: &str,
        index: &str,
        key_path: &KeyPath,
        parameters: &IndexParameters,
    ) -> EngineResult<()> {
        self.restructure("create_index", |stores| {
            let data = stores
                .get_mut(store)
                .ok_or_else(|| EngineError::not_found(format!("store {store}")))?;
            Arc::make_mut(data).create_index(index, key_path.clone(), *parameters)?;
            debug!(txn = self.id, store, index, %key_path, "index created");
            Ok(())
        })
    }

    fn delete_index(&self, store: &str, index: &str) -> EngineResult<()> {
        self.restructure("delete_index", |stores| {
            let data = stores
                .get_mut(store)
                .ok_or_else(|| EngineError::not_found(format!("store {store}")))?;
            Arc::make_mut(data).delete_index(index)
        })
    }

    fn commit(&self) -> EngineResult<()> {
        if self.mode == TransactionMode::VersionChange {
            return Err(EngineError::invalid_state(
                "a version change transaction commits with its upgrade",
            ));
        }
        let mut state = self.state.lock();
        match &state.outcome {
            TransactionOutcome::Active => {}
            TransactionOutcome::Failed(error) => return Err(error.clone()),
            _ => return Err(EngineError::TransactionInactive),
        }
        if self.mode.is_writable() {
            if let Err(error) = self.database.apply(&state.base, &state.working) {
                debug!(txn = self.id, %error, "commit rejected");
                state.fail(error.clone());
                return Err(error);
            }
        }
        state.outcome = TransactionOutcome::Committed;
        debug!(txn = self.id, "transaction committed");
        Ok(())
    }

    fn abort(&self) -> EngineResult<()> {
        let mut state = self.state.lock();
        match &state.outcome {
            TransactionOutcome::Active => {}
            TransactionOutcome::Failed(_) => return Ok(()),
            TransactionOutcome::Committed | TransactionOutcome::Aborted => {
                return Err(EngineError::invalid_state("transaction has already finished"))
            }
        }
        state.working = state.base.clone();
        state.outcome = TransactionOutcome::Aborted;
        debug!(txn = self.id, "transaction aborted");
        Ok(())
    }

    fn outcome(&self) -> TransactionOutcome {
        self.state.lock().outcome.clone()
    }
}
