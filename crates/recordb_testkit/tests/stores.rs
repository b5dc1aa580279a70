//! Record CRUD through typed stores.

use proptest::prelude::*;
use recordb_core::{EntityBuilder, KeyOptions};
use recordb_testkit::prelude::*;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
struct Item {
    id: i64,
    price: f64,
}

impl Entity for Item {
    const NAME: &'static str = "Item";

    fn declare(entity: EntityBuilder<'_>) -> EntityBuilder<'_> {
        entity.key("id", KeyOptions::default()).index("price")
    }
}

fn item_database(name: &str) -> Database {
    let mut db = Database::in_memory(name, 1);
    db.register::<Item>().unwrap();
    db
}

#[test]
fn sequential_adds_get_increasing_keys() {
    init_tracing();
    let db = fresh_database("crud");

    let first = db
        .transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
            let store = tx.store::<Employee>()?;
            Ok(vec![
                store.add(&Employee::new("Ada", 36, "math"))?,
                store.add(&Employee::new("Grace", 45, "navy"))?,
            ])
        })
        .unwrap();
    let third = seed_employees(&db, &[Employee::new("Edsger", 72, "math")]);

    assert_eq!(first, vec![Key::Integer(1), Key::Integer(2)]);
    assert_eq!(third, vec![Key::Integer(3)]);
}

#[test]
fn count_tracks_adds_minus_deletes() {
    let db = fresh_database("crud");
    seed_employees(&db, &staff());

    let count = db
        .transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
            let store = tx.store::<Employee>()?;
            store.delete(2)?;
            store.delete(99)?;
            store.count(None)
        })
        .unwrap();
    assert_eq!(count, 2);
}

#[test]
fn get_returns_value_with_assigned_key() {
    let db = fresh_database("crud");
    let ada = Employee::new("Ada", 36, "math");
    let keys = seed_employees(&db, std::slice::from_ref(&ada));

    let stored = db
        .transaction_default(&[Employee::NAME], |tx| {
            tx.store::<Employee>()?.get(keys[0].clone())
        })
        .unwrap();
    assert_eq!(stored, Some(ada.with_id(1)));
}

#[test]
fn missing_key_reads_as_none() {
    let db = fresh_database("crud");
    let stored = db
        .transaction_default(&[Employee::NAME], |tx| tx.store::<Employee>()?.get(7))
        .unwrap();
    assert_eq!(stored, None);
}

#[test]
fn put_replaces_in_place() {
    let db = fresh_database("crud");
    seed_employees(&db, &staff());

    let (updated, count) = db
        .transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
            let store = tx.store::<Employee>()?;
            let mut grace = store.get(2)?.expect("seeded");
            grace.department = "research".into();
            store.put(&grace)?;
            Ok((store.get(2)?, store.count(None)?))
        })
        .unwrap();

    assert_eq!(
        updated,
        Some(Employee::new("Grace", 25, "research").with_id(2))
    );
    assert_eq!(count, 3);
}

#[test]
fn add_on_existing_key_fails_the_transaction() {
    let db = fresh_database("crud");
    let err = db
        .transaction(&[Person::NAME], TransactionMode::ReadWrite, |tx| {
            let people = tx.store::<Person>()?;
            people.add(&Person::new(1, "foo"))?;
            people.add(&Person::new(1, "foo"))
        })
        .unwrap_err();

    assert!(matches!(
        err,
        CoreError::Engine(EngineError::Constraint { .. })
    ));
    assert!(!err.is_abort());

    let count = db
        .transaction_default(&[Person::NAME], |tx| tx.store::<Person>()?.count(None))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn writes_in_read_only_transactions_are_rejected() {
    let db = fresh_database("crud");
    let err = db
        .transaction(&[Employee::NAME], TransactionMode::ReadOnly, |tx| {
            tx.store::<Employee>()?.add(&Employee::new("Ada", 36, "math"))
        })
        .unwrap_err();
    assert_eq!(err, CoreError::Engine(EngineError::ReadOnly));
}

#[test]
fn compound_primary_key_lookup() {
    let db = fresh_database("people");
    db.transaction(&[Person::NAME], TransactionMode::ReadWrite, |tx| {
        let people = tx.store::<Person>()?;
        for person in [
            Person::new(1, "foo"),
            Person::new(2, "bar"),
            Person::new(3, "foo"),
        ] {
            people.add(&person)?;
        }
        Ok(())
    })
    .unwrap();

    db.transaction_default(&[Person::NAME], |tx| {
        let people = tx.store::<Person>()?;
        assert_eq!(people.get((1, "foo"))?, Some(Person::new(1, "foo")));
        assert_eq!(people.get((3, "foo"))?, Some(Person::new(3, "foo")));
        assert_eq!(people.get((1, "bar"))?, None);
        Ok(())
    })
    .unwrap();
}

#[test]
fn float_fields_round_trip() {
    let db = item_database("floats");
    let item = Item { id: 1, price: 9.99 };

    let read = db
        .transaction(&[Item::NAME], TransactionMode::ReadWrite, |tx| {
            let store = tx.store::<Item>()?;
            store.add(&item)?;
            store.get(1)
        })
        .unwrap();
    assert_eq!(read, Some(item.clone()));

    let later = db
        .transaction_default(&[Item::NAME], |tx| tx.store::<Item>()?.get(1))
        .unwrap();
    assert_eq!(later, Some(item));
}

#[test]
fn float_index_keys_order_with_integers() {
    let db = item_database("float-index");
    db.transaction(&[Item::NAME], TransactionMode::ReadWrite, |tx| {
        let store = tx.store::<Item>()?;
        for (id, price) in [(1, 0.5), (2, 2.25), (3, 10.0), (4, -1.5)] {
            store.add(&Item { id, price })?;
        }
        Ok(())
    })
    .unwrap();

    let (cheap, first_above_two) = db
        .transaction_default(&[Item::NAME], |tx| {
            let prices = tx.store::<Item>()?.index("price")?;
            let cheap = prices.count(Some(&KeyRange::bound(0, 3, false, false)?))?;
            let first = prices.get_range(&KeyRange::lower_bound(2, true))?;
            Ok((cheap, first))
        })
        .unwrap();
    assert_eq!(cheap, 2);
    assert_eq!(first_above_two, Some(Item { id: 2, price: 2.25 }));
}

#[test]
fn untyped_store_reads_json_records() {
    let db = fresh_database("untyped");
    db.transaction(&[Contact::NAME], TransactionMode::ReadWrite, |tx| {
        tx.store_named::<Value>(Contact::NAME)?.put(&record(json!({
            "email": "ada@example.com",
            "city": "london",
            "age": 36,
        })))
    })
    .unwrap();

    let contact = db
        .transaction_default(&[Contact::NAME], |tx| {
            tx.store::<Contact>()?.get("ada@example.com")
        })
        .unwrap();
    assert_eq!(contact, Some(Contact::new("ada@example.com", "london", 36)));
}

#[test]
fn delete_range_and_clear() {
    let db = fresh_database("crud");
    seed_employees(&db, &staff());
    seed_employees(&db, &staff());

    db.transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
        let store = tx.store::<Employee>()?;
        store.delete_range(&KeyRange::bound(2, 4, false, true)?)?;
        assert_eq!(store.get_key(&KeyRange::lower_bound(2, false))?, Some(Key::Integer(4)));
        assert_eq!(store.count(None)?, 4);
        store.clear()?;
        assert_eq!(store.count(None)?, 0);
        Ok(())
    })
    .unwrap();

    // the generator survives a clear
    let keys = seed_employees(&db, &staff()[..1]);
    assert_eq!(keys, vec![Key::Integer(7)]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn auto_increment_keys_strictly_increase(
        batches in prop::collection::vec(prop::collection::vec(employee_strategy(), 1..4), 1..4),
        deletes in 0usize..3,
    ) {
        let db = fresh_database("monotonic");
        let mut keys = Vec::new();
        for batch in &batches {
            keys.extend(seed_employees(&db, batch));
        }
        let added = keys.len();
        prop_assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));

        let deletes = deletes.min(added);
        let count = db
            .transaction(&[Employee::NAME], TransactionMode::ReadWrite, |tx| {
                let store = tx.store::<Employee>()?;
                for key in &keys[..deletes] {
                    store.delete(key.clone())?;
                }
                store.count(None)
            })
            .unwrap();
        prop_assert_eq!(count, (added - deletes) as u64);

        let next = seed_employees(&db, &[Employee::new("Last", 30, "ops")]);
        prop_assert!(next[0] > keys[added - 1]);
    }
}
