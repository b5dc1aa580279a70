//! Scoped transactions.

use crate::entity::{Entity, Schema};
use crate::error::{CoreError, CoreResult};
use crate::store::{Store, StoreInner};
use parking_lot::Mutex;
use recordb_engine::{EngineTransaction, TransactionMode, TransactionOutcome};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A transaction limited to a fixed set of entities.
///
/// Store handles are created on first access and reused for the rest of the
/// transaction. Asking for an entity outside the scope fails before any
/// engine request is made.
pub struct Transaction {
    txn: Arc<dyn EngineTransaction>,
    mode: TransactionMode,
    scope: Vec<String>,
    schema: Arc<Schema>,
    stores: Mutex<HashMap<String, Arc<StoreInner>>>,
    upgrade: bool,
}

impl Transaction {
    pub(crate) fn new(
        txn: Arc<dyn EngineTransaction>,
        mode: TransactionMode,
        scope: Vec<String>,
        schema: Arc<Schema>,
    ) -> Self {
        Self {
            txn,
            mode,
            scope,
            schema,
            stores: Mutex::new(HashMap::new()),
            upgrade: false,
        }
    }

    /// A read-write view of an upgrade's transaction limited to one entity.
    pub(crate) fn for_upgrade(
        txn: Arc<dyn EngineTransaction>,
        entity: &str,
        schema: Arc<Schema>,
    ) -> Self {
        Self {
            upgrade: true,
            ..Self::new(
                txn,
                TransactionMode::ReadWrite,
                vec![entity.to_string()],
                schema,
            )
        }
    }

    /// Store of entity `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInScope`] if `T` is not part of this
    /// transaction.
    pub fn store<T: Entity>(&self) -> CoreResult<Store<T>> {
        self.store_named(T::NAME)
    }

    /// Store of the named entity, read and written as `T`.
    ///
    /// `Store<Value>` gives untyped access.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotInScope`] if the entity is not part of this
    /// transaction.
    pub fn store_named<T: Serialize + DeserializeOwned>(&self, name: &str) -> CoreResult<Store<T>> {
        if !self.scope.iter().any(|s| s == name) {
            return Err(CoreError::not_in_scope(name));
        }
        let mut stores = self.stores.lock();
        if let Some(inner) = stores.get(name) {
            return Ok(Store::new(Arc::clone(inner)));
        }
        let metadata = self
            .schema
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::not_registered(name))?;
        let inner = Arc::new(StoreInner::new(metadata, Arc::clone(&self.txn), self.upgrade));
        stores.insert(name.to_string(), Arc::clone(&inner));
        Ok(Store::new(inner))
    }

    /// Access mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Entity names in scope.
    #[must_use]
    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    /// Whether this transaction runs a migration.
    #[must_use]
    pub fn is_upgrade(&self) -> bool {
        self.upgrade
    }

    /// Whether requests are still accepted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.txn.outcome().is_active()
    }

    /// Aborts the transaction. Later requests fail and completion reports
    /// [`CoreError::Aborted`].
    ///
    /// # Errors
    ///
    /// Fails if the transaction already committed or aborted.
    pub fn abort(&self) -> CoreResult<()> {
        debug!(scope = ?self.scope, "abort requested");
        self.txn.abort()?;
        Ok(())
    }

    /// Settles the transaction: commits it if it is still active, and
    /// reports how it ended.
    ///
    /// [`Database::transaction`](crate::Database::transaction) calls this
    /// after the body returns. Inside a migration the shared upgrade
    /// transaction is left open and only its state is reported.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Aborted`] for aborted transactions and the
    /// engine's error for failed ones.
    pub fn completion(&self) -> CoreResult<()> {
        match self.txn.outcome() {
            TransactionOutcome::Active if self.upgrade => Ok(()),
            TransactionOutcome::Active => Ok(self.txn.commit()?),
            TransactionOutcome::Committed => Ok(()),
            TransactionOutcome::Aborted => Err(CoreError::Aborted),
            TransactionOutcome::Failed(error) => Err(error.into()),
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("mode", &self.mode)
            .field("scope", &self.scope)
            .field("upgrade", &self.upgrade)
            .field("outcome", &self.txn.outcome())
            .finish_non_exhaustive()
    }
}
