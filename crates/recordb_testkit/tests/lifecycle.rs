//! Opening, upgrading, closing and transaction outcomes.

use recordb_core::{CoreResult, EntityBuilder, KeyOptions, StorageEngine};
use recordb_engine::OpenOutcome;
use recordb_testkit::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn stored_stores(engine: &Arc<dyn StorageEngine>, name: &str, version: u64) -> Vec<String> {
    match engine.open(name, version).unwrap() {
        OpenOutcome::Opened(connection) => {
            let mut names = connection.store_names();
            names.sort();
            connection.close();
            names
        }
        OpenOutcome::UpgradeNeeded(change) => {
            change.abort();
            panic!("{name} is not at version {version}");
        }
    }
}

#[test]
fn unregistered_entity_has_no_side_effects() {
    init_tracing();
    let engine = memory_engine();
    let db = fresh_database_on(&engine, "side-effects", 1);

    let mut ran = false;
    let err = db
        .transaction(&[Employee::NAME, "Invoice"], TransactionMode::ReadWrite, |_| {
            ran = true;
            Ok(())
        })
        .unwrap_err();

    assert!(!ran);
    assert_eq!(err, CoreError::not_registered("Invoice"));
    assert!(!db.is_open());
    assert!(engine.database_names().is_empty());
}

#[test]
fn out_of_scope_entity_is_rejected() {
    let db = fresh_database("scope");
    let err = db
        .transaction_default(&[Employee::NAME], |tx| tx.store::<Person>().map(|_| ()))
        .unwrap_err();
    assert_eq!(err, CoreError::not_in_scope(Person::NAME));
}

#[test]
fn abort_differs_from_engine_failure() {
    let db = fresh_database("outcomes");

    let aborted = db
        .transaction(&[Person::NAME], TransactionMode::ReadWrite, |tx| {
            tx.store::<Person>()?.add(&Person::new(1, "foo"))?;
            tx.abort()
        })
        .unwrap_err();
    assert!(aborted.is_abort());
    assert_eq!(aborted, CoreError::Aborted);

    // the body swallows the failed request; the commit still reports it
    let failed = db
        .transaction(&[Person::NAME], TransactionMode::ReadWrite, |tx| {
            let people = tx.store::<Person>()?;
            people.add(&Person::new(1, "foo"))?;
            let duplicate = people.add(&Person::new(1, "foo"));
            assert!(duplicate.is_err());
            Ok(())
        })
        .unwrap_err();
    assert!(!failed.is_abort());
    assert!(matches!(
        failed,
        CoreError::Engine(EngineError::Constraint { .. })
    ));

    let count = db
        .transaction_default(&[Person::NAME], |tx| tx.store::<Person>()?.count(None))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn argument_errors_keep_the_transaction_alive() {
    let db = fresh_database("outcomes");
    let key = db
        .transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
            let store = tx.store::<Employee>()?;
            let inline = store.add_with_key(&Employee::new("Ada", 36, "math"), 9);
            assert!(matches!(
                inline,
                Err(CoreError::Engine(EngineError::Data { .. }))
            ));
            assert!(store.index("missing").is_err());
            assert!(tx.is_active());
            store.add(&Employee::new("Ada", 36, "math"))
        })
        .unwrap();
    assert_eq!(key, Key::Integer(1));
}

#[test]
fn missing_migration_stops_the_upgrade() {
    let engine = memory_engine();
    {
        let mut v1 = Database::new(Arc::clone(&engine), "upgrade", 1);
        v1.register::<Person>().unwrap().register::<Employee>().unwrap();
        v1.open().unwrap();
    }

    let migrated = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&migrated);
    let mut v2 = Database::new(Arc::clone(&engine), "upgrade", 2);
    v2.register::<Person>()
        .unwrap()
        .register_with_migration::<Employee, _>(move |_: &Transaction| -> CoreResult<()> {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .unwrap()
        .register::<Note>()
        .unwrap();

    let err = v2
        .transaction_default(&[Note::NAME], |_| Ok(()))
        .unwrap_err();

    assert_eq!(err, CoreError::missing_migration(Person::NAME));
    assert!(!migrated.load(Ordering::SeqCst));
    assert!(!v2.is_open());
    assert_eq!(stored_stores(&engine, "upgrade", 1), ["Employee", "Person"]);
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StaffV1 {
    id: i64,
    team: String,
}

impl Entity for StaffV1 {
    const NAME: &'static str = "Staff";

    fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
        entity.key("id", KeyOptions::default())
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct Staff {
    id: i64,
    team: String,
}

impl Entity for Staff {
    const NAME: &'static str = "Staff";

    fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
        entity.key("id", KeyOptions::default()).index("team")
    }
}

#[test]
fn migration_adds_a_declared_index() {
    let engine = memory_engine();
    {
        let mut v1 = Database::new(Arc::clone(&engine), "staff", 1);
        v1.register::<StaffV1>().unwrap();
        v1.transaction(&[StaffV1::NAME], TransactionMode::ReadWrite, |tx| {
            let store = tx.store::<StaffV1>()?;
            for (id, team) in [(1, "core"), (2, "web"), (3, "core")] {
                store.add(&StaffV1 {
                    id,
                    team: team.to_string(),
                })?;
            }
            Ok(())
        })
        .unwrap();
    }

    let mut v2 = Database::new(Arc::clone(&engine), "staff", 2);
    v2.register_with_migration::<Staff, _>(|tx: &Transaction| -> CoreResult<()> {
        let store = tx.store::<Staff>()?;
        assert!(store.index_names()?.is_empty());
        assert_eq!(store.count(None)?, 3);
        store.create_index("team")?;
        Ok(())
    })
    .unwrap();

    let core = v2
        .transaction_default(&[Staff::NAME], |tx| {
            tx.store::<Staff>()?
                .index("team")?
                .count(Some(&KeyRange::only("core")))
        })
        .unwrap();
    assert_eq!(core, 2);

    let report = v2.last_upgrade().unwrap();
    assert_eq!((report.old_version, report.new_version), (1, 2));
    assert_eq!(report.migrated, ["Staff"]);
    assert!(report.created.is_empty());
}

#[test]
fn failing_migration_leaves_the_old_version() {
    let engine = memory_engine();
    {
        let mut v1 = Database::new(Arc::clone(&engine), "staff", 1);
        v1.register::<StaffV1>().unwrap();
        v1.open().unwrap();
    }

    let mut v2 = Database::new(Arc::clone(&engine), "staff", 2);
    v2.register_with_migration::<Staff, _>(|tx: &Transaction| -> CoreResult<()> {
        tx.store::<Staff>()?.create_index("team")?;
        tx.abort()
    })
    .unwrap();

    let err = v2.open().unwrap_err();
    assert!(err.is_abort());
    assert!(stored_stores(&engine, "staff", 1).contains(&"Staff".to_string()));
}

#[test]
fn index_structure_changes_outside_migrations_are_rejected() {
    let db = fresh_database("structure");
    let err = db
        .transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
            tx.store::<Employee>()?.delete_index("age")
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidOperation { .. }));
}

#[test]
fn close_and_reopen_keeps_data() {
    let engine = memory_engine();
    let db = fresh_database_on(&engine, "reopen", 1);
    seed_employees(&db, &staff());

    db.close();
    assert!(!db.is_open());
    assert_eq!(engine.database_names(), ["reopen"]);

    let count = db
        .transaction_default(&[Employee::NAME], |tx| tx.store::<Employee>()?.count(None))
        .unwrap();
    assert_eq!(count, 3);
    assert!(db.is_open());

    // a second handle at the same version opens without an upgrade
    let other = fresh_database_on(&engine, "reopen", 1);
    other.open().unwrap();
    assert!(other.last_upgrade().is_none());
}

#[test]
fn opening_below_the_stored_version_fails() {
    let engine = memory_engine();
    fresh_database_on(&engine, "versions", 3).open().unwrap();

    let err = fresh_database_on(&engine, "versions", 2).open().unwrap_err();
    assert!(matches!(
        err,
        CoreError::Engine(EngineError::Version { requested: 2, stored: 3 })
    ));
}

#[test]
fn concurrent_writers_conflict() {
    let engine = memory_engine();
    let db = fresh_database_on(&engine, "conflict", 1);
    let other = fresh_database_on(&engine, "conflict", 1);

    let err = db
        .transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
            tx.store::<Employee>()?.add(&Employee::new("Ada", 36, "math"))?;
            seed_employees(&other, &[Employee::new("Grace", 45, "navy")]);
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::Engine(EngineError::Conflict { .. })));

    let names: Vec<_> = db
        .transaction_default(&[Employee::NAME], |tx| {
            tx.store::<Employee>()?
                .open_cursor(None, CursorDirection::Next)
                .as_list()
        })
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["Grace"]);
}

#[test]
fn delete_database_starts_over() {
    let engine = memory_engine();
    let db = fresh_database_on(&engine, "doomed", 1);
    seed_employees(&db, &staff());
    db.close();

    Database::delete_database(engine.as_ref(), "doomed").unwrap();
    assert!(engine.database_names().is_empty());

    let keys = seed_employees(&db, &staff()[..1]);
    assert_eq!(keys, [Key::Integer(1)]);
    assert_eq!(db.last_upgrade().map(|r| r.old_version), Some(0));
}

#[test]
fn failed_body_commits_nothing() {
    let db = fresh_database("failed-body");
    seed_employees(&db, &staff()[..1]);

    let err = db
        .transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
            let store = tx.store::<Employee>()?;
            store.add(&Employee::new("Grace", 45, "navy"))?;
            store.delete(1)?;
            Err::<(), _>(CoreError::invalid_operation("payroll is closed"))
        })
        .unwrap_err();
    assert_eq!(err, CoreError::invalid_operation("payroll is closed"));

    let names: Vec<_> = db
        .transaction_default(&[Employee::NAME], |tx| {
            tx.store::<Employee>()?
                .open_cursor(None, CursorDirection::Next)
                .as_list()
        })
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, ["Ada"]);
}

#[test]
fn database_deleted_elsewhere_is_reopened() {
    let engine = memory_engine();
    let db = fresh_database_on(&engine, "pulled", 1);
    seed_employees(&db, &staff());
    assert!(db.is_open());

    Database::delete_database(engine.as_ref(), "pulled").unwrap();

    let count = db
        .transaction_default(&[Employee::NAME], |tx| tx.store::<Employee>()?.count(None))
        .unwrap();
    assert_eq!(count, 0);
    assert_eq!(engine.database_names(), ["pulled"]);
    assert_eq!(db.last_upgrade().map(|r| r.old_version), Some(0));
}

#[test]
fn upgrade_by_another_handle_reports_the_version() {
    let engine = memory_engine();
    let old = fresh_database_on(&engine, "moving", 1);
    seed_employees(&old, &staff());

    let new = fresh_database_on(&engine, "moving", 2);
    new.open().unwrap();

    for _ in 0..2 {
        let err = old
            .transaction_default(&[Employee::NAME], |tx| tx.store::<Employee>()?.count(None))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Engine(EngineError::Version { requested: 1, stored: 2 })
        ));
    }

    let count = new
        .transaction_default(&[Employee::NAME], |tx| tx.store::<Employee>()?.count(None))
        .unwrap();
    assert_eq!(count, 3);
}
