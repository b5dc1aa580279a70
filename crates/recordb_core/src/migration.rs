//! Schema upgrades and migrations.
//!
//! When a database is opened at a higher version than the stored one, every
//! registered entity is reconciled in registration order:
//!
//! - A missing store is created together with all declared indexes.
//! - An existing store is handed to the entity's [`Migration`], which runs
//!   inside the upgrade with read-write access and may create or drop
//!   indexes.
//!
//! An existing store without a migration stops the upgrade with
//! [`CoreError::MissingMigration`]; entities after it are never touched and
//! the whole upgrade is discarded.
//!
//! ```rust,ignore
//! db.register_with_migration::<Person, _>(|tx: &Transaction| -> CoreResult<()> {
//!     tx.store::<Person>()?.create_index("age")?;
//!     Ok(())
//! })?;
//! ```

use crate::entity::{EntityMetadata, Schema};
use crate::error::{CoreError, CoreResult};
use crate::transaction::Transaction;
use recordb_engine::{EngineTransaction, VersionChange};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Adapts an existing store when a database is upgraded.
pub trait Migration: Send + Sync {
    /// Runs the migration inside the upgrade.
    ///
    /// `tx` is scoped to the entity being migrated. Returning an error, or
    /// aborting `tx`, fails the whole upgrade.
    ///
    /// # Errors
    ///
    /// Any error aborts the upgrade and is reported by the open.
    fn migrate(&self, tx: &Transaction) -> CoreResult<()>;
}

impl<F> Migration for F
where
    F: Fn(&Transaction) -> CoreResult<()> + Send + Sync,
{
    fn migrate(&self, tx: &Transaction) -> CoreResult<()> {
        self(tx)
    }
}

/// What an upgrade did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeReport {
    /// Version before the upgrade (0 for a new database).
    pub old_version: u64,
    /// Version after the upgrade.
    pub new_version: u64,
    /// Stores created, in order.
    pub created: Vec<String>,
    /// Stores migrated, in order.
    pub migrated: Vec<String>,
}

/// Reconciles the registered entities against the upgrade's stores.
///
/// The caller commits the change on success and aborts it on failure.
pub(crate) fn run_upgrade(
    change: &dyn VersionChange,
    schema: &Arc<Schema>,
    migrations: &HashMap<String, Arc<dyn Migration>>,
) -> CoreResult<UpgradeReport> {
    let txn = change.transaction();
    let mut report = UpgradeReport {
        old_version: change.old_version(),
        new_version: change.new_version(),
        ..UpgradeReport::default()
    };
    info!(
        from = report.old_version,
        to = report.new_version,
        entities = schema.len(),
        "running upgrade"
    );

    for metadata in schema.entities() {
        let name = metadata.name();
        if txn.store_names().iter().any(|store| store == name) {
            let migration = migrations
                .get(name)
                .ok_or_else(|| CoreError::missing_migration(name))?;
            debug!(store = name, "running migration");
            let tx = Transaction::for_upgrade(Arc::clone(&txn), name, Arc::clone(schema));
            migration.migrate(&tx)?;
            tx.completion()?;
            report.migrated.push(name.to_string());
        } else {
            create_store(txn.as_ref(), metadata)?;
            report.created.push(name.to_string());
        }
    }
    Ok(report)
}

fn create_store(txn: &dyn EngineTransaction, metadata: &EntityMetadata) -> CoreResult<()> {
    let name = metadata.name();
    txn.create_store(name, &metadata.store_parameters())?;
    for index in metadata.indices() {
        txn.create_index(
            name,
            index.name(),
            &index.resolved_key_path()?,
            &index.options(),
        )?;
    }
    debug!(store = name, indexes = metadata.indices().len(), "store created");
    Ok(())
}
