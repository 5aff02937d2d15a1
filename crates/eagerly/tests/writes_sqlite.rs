//! Write paths against a real SQLite database.

mod common;

use common::{SqliteStore, catalog, ids, run, seed_customers, unwrap_outcome};
use eagerly::prelude::*;
use eagerly::{CountingConnection, Upserted, ValidationErrorKind};

#[test]
fn update_syncs_pivot_rows_and_reload_sees_them() {
    let catalog = catalog();
    let conn = SqliteStore::open();
    seed_customers(&conn, 2);
    let store = Store::new(&catalog, &conn);
    let customers = store.repository("customers").unwrap();

    let mut changes = Record::new();
    changes.set_value("first", "Grace");
    changes.set_value("tags", vec![2_i64, 3]);

    let (affected, reloaded, untouched) = run(|cx| async move {
        let affected = unwrap_outcome(customers.update(&cx, 1_i64, &changes).await);
        let reloaded = unwrap_outcome(customers.find(&cx, 1_i64, &["first", "tags"]).await);
        let untouched = unwrap_outcome(customers.find(&cx, 2_i64, &["tags"]).await);
        (affected, reloaded, untouched)
    });
    assert_eq!(affected, 1);

    let reloaded = reloaded.expect("customer 1");
    assert_eq!(reloaded.value("first"), Some(&Value::from("Grace")));
    let mut tags = ids(reloaded.many("tags").unwrap());
    tags.sort_unstable();
    assert_eq!(tags, vec![2, 3]);

    let untouched = untouched.expect("customer 2");
    assert_eq!(ids(untouched.many("tags").unwrap()), vec![1, 2]);
}

#[test]
fn sync_reports_changes_and_skips_unchanged_links() {
    let catalog = catalog();
    let conn = CountingConnection::new(SqliteStore::open());
    seed_customers(conn.inner(), 1);
    let store = Store::new(&catalog, &conn);
    let customers = store.repository("customers").unwrap();

    let (first, second) = run(|cx| async move {
        let first = unwrap_outcome(
            customers
                .sync(&cx, 1_i64, "tags", vec![Value::BigInt(1), Value::BigInt(3)])
                .await,
        );
        let second = unwrap_outcome(
            customers
                .sync(&cx, 1_i64, "tags", vec![Value::BigInt(1), Value::BigInt(3)])
                .await,
        );
        (first, second)
    });
    assert_eq!(first.detached, 1);
    assert_eq!(first.attached, vec![Value::BigInt(3)]);
    assert_eq!(second.detached, 0);
    assert!(second.attached.is_empty());
    // delete and select each time, the insert only when something is new
    assert_eq!(conn.stats().executes, 3);
    assert_eq!(conn.stats().queries, 2);
}

#[test]
fn syncing_text_ids_twice_keeps_one_pivot_row_per_link() {
    let catalog = catalog();
    let conn = SqliteStore::open();
    seed_customers(&conn, 1);
    let store = Store::new(&catalog, &conn);
    let customers = store.repository("customers").unwrap();

    let (first, second) = run(|cx| async move {
        let first = unwrap_outcome(
            customers
                .sync(&cx, 1_i64, "tags", vec![Value::from("1"), Value::from("2")])
                .await,
        );
        let second = unwrap_outcome(
            customers
                .sync(&cx, "1", "tags", vec![Value::from("2"), Value::from("1")])
                .await,
        );
        (first, second)
    });
    assert_eq!(first.detached, 0);
    assert!(first.attached.is_empty());
    assert!(second.attached.is_empty());
    assert_eq!(conn.scalar("SELECT COUNT(*) FROM customer_tag WHERE customers_id = 1"), 2);
}

#[test]
fn syncing_a_has_many_relation_is_rejected() {
    let catalog = catalog();
    let conn = SqliteStore::open();
    let store = Store::new(&catalog, &conn);
    let customers = store.repository("customers").unwrap();

    let outcome = run(|cx| async move { customers.sync(&cx, 1_i64, "orders", Vec::new()).await });
    match outcome {
        Outcome::Err(Error::Validation(e)) => {
            assert_eq!(e.errors[0].kind, ValidationErrorKind::Relation);
        }
        _ => panic!("expected a relation validation error"),
    }
}

#[test]
fn update_or_create_updates_a_match_then_creates_a_new_one() {
    let catalog = catalog();
    let conn = SqliteStore::open();
    seed_customers(&conn, 2);
    let store = Store::new(&catalog, &conn);
    let customers = store.repository("customers").unwrap();

    let existing = Predicates::new().and(Predicate::eq("email", "c2@example.com").unwrap());
    let missing = Predicates::new().and(Predicate::eq("email", "new@example.com").unwrap());
    let mut values = Record::new();
    values.set_value("last", "Hopper");
    let mut fresh = Record::new();
    fresh.set_value("first", "Katherine");
    fresh.set_value("email", "new@example.com");

    let (updated, created, total) = run(|cx| async move {
        let updated = unwrap_outcome(customers.update_or_create(&cx, &existing, &values).await);
        let created = unwrap_outcome(customers.update_or_create(&cx, &missing, &fresh).await);
        let total = unwrap_outcome(customers.count(&cx).await);
        (updated, created, total)
    });
    assert_eq!(updated, Upserted::Updated {
        id: Value::BigInt(2),
        affected: 1,
    });
    assert_eq!(created, Upserted::Created(3));
    assert_eq!(total, 3);
}

#[test]
fn create_many_inserts_every_row() {
    let catalog = catalog();
    let conn = CountingConnection::new(SqliteStore::open());
    let store = Store::new(&catalog, &conn);
    let tags = store.repository("tags").unwrap();

    let rows: Vec<Record> = ["red", "green", "blue"]
        .into_iter()
        .map(|label| {
            let mut record = Record::new();
            record.set_value("label", label);
            record
        })
        .collect();

    let (inserted, labels) = run(|cx| async move {
        let inserted = unwrap_outcome(tags.create_many(&cx, &rows).await);
        let labels = unwrap_outcome(tags.order_by("label", OrderDirection::Asc).all(&cx, &["label"]).await);
        (inserted, labels)
    });
    assert_eq!(inserted, 3);
    let labels: Vec<_> = labels.iter().filter_map(|r| r.value("label").cloned()).collect();
    assert_eq!(labels, vec![
        Value::from("blue"),
        Value::from("green"),
        Value::from("red")
    ]);
    assert_eq!(conn.stats().executes, 1);
}

#[test]
fn delete_and_delete_many_remove_rows() {
    let catalog = catalog();
    let conn = SqliteStore::open();
    seed_customers(&conn, 5);
    let store = Store::new(&catalog, &conn);
    let customers = store.repository("customers").unwrap();

    let (one, many, none, left) = run(|cx| async move {
        let one = unwrap_outcome(customers.delete(&cx, 1_i64).await);
        let many = unwrap_outcome(
            customers
                .delete_many(&cx, vec![Value::BigInt(2), Value::BigInt(3), Value::BigInt(99)])
                .await,
        );
        let none = unwrap_outcome(customers.delete_many(&cx, Vec::new()).await);
        let left = unwrap_outcome(customers.all(&cx, &["first"]).await);
        (one, many, none, left)
    });
    assert_eq!(one, 1);
    assert_eq!(many, 2);
    assert_eq!(none, 0);
    assert_eq!(ids(&left), vec![4, 5]);
}

#[test]
fn malformed_date_is_rejected_before_any_statement() {
    let catalog = catalog();
    let conn = CountingConnection::new(SqliteStore::open());
    let store = Store::new(&catalog, &conn);
    let customers = store.repository("customers").unwrap();

    let mut input = Record::new();
    input.set_value("first", "Ada");
    input.set_value("born_on", "not a date");

    let outcome = run(|cx| async move { customers.create(&cx, &input).await });
    match outcome {
        Outcome::Err(Error::Validation(e)) => {
            assert_eq!(e.errors[0].field, "born_on");
            assert_eq!(e.errors[0].kind, ValidationErrorKind::Date);
        }
        _ => panic!("expected a date validation error"),
    }
    assert_eq!(conn.stats().total(), 0);
}
