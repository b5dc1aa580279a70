//! Secondary index lookups and range counting.

use proptest::prelude::*;
use recordb_testkit::prelude::*;

fn seeded() -> Database {
    let db = fresh_database("indexes");
    seed_employees(&db, &staff());
    db
}

fn seed_contacts(db: &Database, contacts: &[Contact]) {
    db.transaction(&[Contact::NAME], TransactionMode::ReadWrite, |tx| {
        let store = tx.store::<Contact>()?;
        for contact in contacts {
            store.add(contact)?;
        }
        Ok(())
    })
    .unwrap();
}

#[test]
fn bounded_index_counts_are_exact() {
    let db = seeded();
    db.transaction_default(&[Employee::NAME], |tx| {
        let ages = tx.store::<Employee>()?.index("age")?;
        assert_eq!(ages.count(Some(&KeyRange::lower_bound(25, false)))?, 2);
        assert_eq!(ages.count(Some(&KeyRange::lower_bound(20, false)))?, 3);
        assert_eq!(ages.count(Some(&KeyRange::bound(22, 27, false, false)?))?, 1);
        assert_eq!(ages.count(Some(&KeyRange::lower_bound(25, true)))?, 1);
        assert_eq!(ages.count(None)?, 3);
        Ok(())
    })
    .unwrap();
}

#[test]
fn index_get_returns_first_match() {
    let db = seeded();
    db.transaction_default(&[Employee::NAME], |tx| {
        let departments = tx.store::<Employee>()?.index("department")?;
        let first = departments.get("math")?.expect("math staff");
        assert_eq!(first.name, "Ada");
        assert_eq!(departments.get_key("math")?, Some(Key::Integer(1)));
        assert_eq!(departments.get("sales")?, None);

        let older = tx.store::<Employee>()?.index("age")?;
        let above = older.get_range(&KeyRange::lower_bound(21, false))?;
        assert_eq!(above.map(|e| e.name), Some("Grace".to_string()));
        assert_eq!(
            older.get_key_range(&KeyRange::lower_bound(26, false))?,
            Some(Key::Integer(3))
        );
        Ok(())
    })
    .unwrap();
}

#[test]
fn undeclared_index_is_reported() {
    let db = seeded();
    let err = db
        .transaction_default(&[Employee::NAME], |tx| {
            tx.store::<Employee>()?.index("salary").map(|_| ())
        })
        .unwrap_err();
    assert_eq!(err, CoreError::index_not_found("Employee", "salary"));
}

#[test]
fn index_metadata_matches_declaration() {
    let db = fresh_database("indexes");
    db.transaction_default(&[Contact::NAME], |tx| {
        let store = tx.store::<Contact>()?;
        let location = store.index("location")?;
        assert_eq!(location.key_path(), ["city", "age"]);
        assert!(store.index("phone")?.options().unique);

        let mut names = store.index_names()?;
        names.sort();
        assert_eq!(names, ["location", "phone"]);
        Ok(())
    })
    .unwrap();
}

#[test]
fn compound_index_ranges_use_array_order() {
    let db = fresh_database("contacts");
    let contacts = [
        Contact::new("a50@example.com", "a", 50),
        Contact::new("b10@example.com", "b", 10),
        Contact::new("b30@example.com", "b", 30),
        Contact::new("c5@example.com", "c", 5),
    ];
    seed_contacts(&db, &contacts);

    let (low, high) = (("a", 40), ("b", 20));
    let range = KeyRange::bound(low, high, false, false).unwrap();

    // Filtering each field on its own finds nothing: no age lies in 40..=20.
    let naive = contacts
        .iter()
        .filter(|c| {
            let city = c.city.as_str();
            city >= low.0 && city <= high.0 && c.age >= low.1 && c.age <= high.1
        })
        .count();
    assert_eq!(naive, 0);

    let counted = db
        .transaction_default(&[Contact::NAME], |tx| {
            tx.store::<Contact>()?.index("location")?.count(Some(&range))
        })
        .unwrap();
    assert_eq!(counted, 2);

    let emails: Vec<_> = db
        .transaction_default(&[Contact::NAME], |tx| {
            tx.store::<Contact>()?
                .index("location")?
                .open_cursor(Some(&range), CursorDirection::Next)
                .as_list()
        })
        .unwrap()
        .into_iter()
        .map(|c| c.email)
        .collect();
    assert_eq!(emails, ["a50@example.com", "b10@example.com"]);
}

#[test]
fn unique_index_rejects_duplicates() {
    let db = fresh_database("contacts");
    let err = db
        .transaction(&[Contact::NAME], TransactionMode::ReadWrite, |tx| {
            let store = tx.store::<Contact>()?;
            store.add(&Contact::new("ada@example.com", "london", 36).with_phone("555"))?;
            store.add(&Contact::new("eve@example.com", "paris", 29).with_phone("555"))?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::Engine(EngineError::Constraint { .. })));

    // contacts without a phone are not indexed, so they never collide
    seed_contacts(
        &db,
        &[
            Contact::new("ada@example.com", "london", 36),
            Contact::new("eve@example.com", "paris", 29),
        ],
    );
    let phones = db
        .transaction_default(&[Contact::NAME], |tx| {
            tx.store::<Contact>()?.index("phone")?.count(None)
        })
        .unwrap();
    assert_eq!(phones, 0);
}

#[test]
fn multi_entry_index_covers_each_tag() {
    let db = fresh_database("notes");
    db.transaction(&[Note::NAME], TransactionMode::ReadWrite, |tx| {
        let notes = tx.store::<Note>()?;
        notes.add(&Note::new("borrowck", &["rust", "compilers"]))?;
        notes.add(&Note::new("ownership", &["rust"]))?;
        notes.add(&Note::new("untagged", &[]))?;
        Ok(())
    })
    .unwrap();

    db.transaction_default(&[Note::NAME], |tx| {
        let tags = tx.store::<Note>()?.index("tags")?;
        assert_eq!(tags.count(Some(&KeyRange::only("rust")))?, 2);
        assert_eq!(tags.count(Some(&KeyRange::only("compilers")))?, 1);
        assert_eq!(tags.count(None)?, 3);
        Ok(())
    })
    .unwrap();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn compound_counts_match_lexicographic_model(
        contacts in contacts_strategy(12),
        low in (prop::sample::select(vec!["a", "b", "c", "d"]), 0i64..100),
        high in (prop::sample::select(vec!["a", "b", "c", "d"]), 0i64..100),
    ) {
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let db = fresh_database("model");
        seed_contacts(&db, &contacts);

        let expected = contacts
            .iter()
            .filter(|c| {
                let key = (c.city.as_str(), c.age);
                low <= key && key <= high
            })
            .count() as u64;

        let range = KeyRange::bound(low, high, false, false).unwrap();
        let counted = db
            .transaction_default(&[Contact::NAME], |tx| {
                tx.store::<Contact>()?.index("location")?.count(Some(&range))
            })
            .unwrap();
        prop_assert_eq!(counted, expected);
    }
}
