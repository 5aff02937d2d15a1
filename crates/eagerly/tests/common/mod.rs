//! In-memory SQLite behind the `Connection` trait, plus the shared schema,
//! catalog and seed helpers of the integration tests.

#![allow(dead_code)]

use asupersync::runtime::RuntimeBuilder;
use eagerly::prelude::*;
use eagerly::{ColumnInfo, Dialect, QueryError, QueryErrorKind};
use rusqlite::types::{Value as SqlValue, ValueRef};
use std::future::Future;
use std::sync::{Arc, Mutex};

pub const SCHEMA: &str = "
    CREATE TABLE countries (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);
    CREATE TABLE customers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        first TEXT,
        last TEXT,
        email TEXT,
        countries_id INTEGER,
        born_on TEXT,
        created_at TEXT,
        updated_at TEXT
    );
    CREATE TABLE orders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        customers_id INTEGER NOT NULL,
        status TEXT NOT NULL
    );
    CREATE TABLE items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        orders_id INTEGER NOT NULL,
        sku TEXT NOT NULL
    );
    CREATE TABLE tags (id INTEGER PRIMARY KEY AUTOINCREMENT, label TEXT NOT NULL);
    CREATE TABLE customer_tag (customers_id INTEGER NOT NULL, tags_id INTEGER NOT NULL);
";

/// One SQLite connection shared behind a mutex. Statements run to
/// completion on the calling thread; the returned future only hands the
/// result over.
pub struct SqliteStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open() -> Self {
        let conn = rusqlite::Connection::open_in_memory().expect("open sqlite memory db");
        conn.execute_batch(SCHEMA).expect("create schema");
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Run raw SQL outside the `Connection` trait (fixtures).
    pub fn seed(&self, sql: &str) {
        self.conn
            .lock()
            .expect("sqlite lock")
            .execute_batch(sql)
            .expect("seed data");
    }

    /// First column of the first row of a fixture query.
    pub fn scalar(&self, sql: &str) -> i64 {
        self.conn
            .lock()
            .expect("sqlite lock")
            .query_row(sql, [], |row| row.get(0))
            .expect("scalar query")
    }

    fn rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let conn = self.conn.lock().expect("sqlite lock");
        let mut stmt = conn.prepare(sql).map_err(|e| query_error(sql, e))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let columns = Arc::new(ColumnInfo::new(names));
        let bound = bind(params);
        let mut rows = stmt
            .query(rusqlite::params_from_iter(bound.iter()))
            .map_err(|e| query_error(sql, e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| query_error(sql, e))? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value = row.get_ref(i).map_err(|e| query_error(sql, e))?;
                values.push(from_sql(value));
            }
            out.push(Row::with_columns(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    fn changes(&self, sql: &str, params: &[Value]) -> Result<(u64, i64)> {
        let conn = self.conn.lock().expect("sqlite lock");
        let bound = bind(params);
        let affected = conn
            .execute(sql, rusqlite::params_from_iter(bound.iter()))
            .map_err(|e| query_error(sql, e))?;
        Ok((affected as u64, conn.last_insert_rowid()))
    }
}

impl Connection for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.rows(sql, params);
        async move { into_outcome(result) }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let result = self.rows(sql, params).map(|rows| rows.into_iter().next());
        async move { into_outcome(result) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.changes(sql, params).map(|(affected, _)| affected);
        async move { into_outcome(result) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        let result = self.changes(sql, params).map(|(_, id)| id);
        async move { into_outcome(result) }
    }
}

fn into_outcome<T>(result: Result<T>) -> Outcome<T, Error> {
    match result {
        Ok(v) => Outcome::Ok(v),
        Err(e) => Outcome::Err(e),
    }
}

fn query_error(sql: &str, e: rusqlite::Error) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Database,
        sql: Some(sql.to_string()),
        message: e.to_string(),
        source: Some(Box::new(e)),
    })
}

fn bind(params: &[Value]) -> Vec<SqlValue> {
    params.iter().map(to_sql).collect()
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(i64::from(*i)),
        Value::BigInt(i) => SqlValue::Integer(*i),
        Value::Double(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Json(j) => SqlValue::Text(j.to_string()),
        Value::Array(_) => panic!("array values are expanded before binding"),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::BigInt(i),
        ValueRef::Real(f) => Value::Double(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

// ==================== Fixtures ====================

pub fn catalog() -> Catalog {
    let paid = Predicates::new().and(Predicate::eq("status", "paid").expect("predicate"));
    let peru = Predicates::new().and(Predicate::eq("name", "Peru").expect("predicate"));
    let vip = Predicates::new().and(Predicate::eq("label", "vip").expect("predicate"));
    Catalog::builder()
        .entity(
            Entity::builder("customers")
                .fillable(["first", "last", "email", "countries_id", "born_on", "full_name"])
                .dates(["born_on"])
                .timestamps(true)
                .computed("full_name", ["first", "last"], |r| {
                    let first = r.value("first").and_then(Value::to_text).unwrap_or_default();
                    let last = r.value("last").and_then(Value::to_text).unwrap_or_default();
                    Value::Text(format!("{first} {last}"))
                })
                .belongs_to("country", "countries")
                .has_many("orders", "orders")
                .relation("paid_orders", Relation::has_many("orders").filter(paid))
                .belongs_to_many("tags", "tags", "customer_tag")
                .relation("home", Relation::belongs_to("countries").filter(peru))
                .relation(
                    "vip_tags",
                    Relation::belongs_to_many("tags", "customer_tag").filter(vip),
                )
                .build(),
        )
        .entity(Entity::builder("countries").fillable(["name"]).build())
        .entity(
            Entity::builder("orders")
                .fillable(["customers_id", "status"])
                .belongs_to("customer", "customers")
                .has_many("items", "items")
                .build(),
        )
        .entity(Entity::builder("items").fillable(["orders_id", "sku"]).build())
        .entity(Entity::builder("tags").fillable(["label"]).build())
        .build()
        .expect("catalog")
}

/// Two countries, three tags, and `n` customers. Customer `i` lives in
/// country `i % 2 + 1`, has one paid and one open order (each with one
/// item), and is tagged 1 and 2.
pub fn seed_customers(store: &SqliteStore, n: usize) {
    let mut sql = String::from(
        "INSERT INTO countries (name) VALUES ('France'), ('Peru');
         INSERT INTO tags (label) VALUES ('new'), ('vip'), ('late');",
    );
    for i in 1..=n {
        sql.push_str(&format!(
            "INSERT INTO customers (first, last, email, countries_id) \
             VALUES ('first{i}', 'last{i:02}', 'c{i}@example.com', {country});
             INSERT INTO orders (customers_id, status) VALUES ({i}, 'paid'), ({i}, 'open');
             INSERT INTO items (orders_id, sku) VALUES ({paid}, 'sku-{i}-a'), ({open}, 'sku-{i}-b');
             INSERT INTO customer_tag (customers_id, tags_id) VALUES ({i}, 1), ({i}, 2);",
            country = i % 2 + 1,
            paid = 2 * i - 1,
            open = 2 * i,
        ));
    }
    store.seed(&sql);
}

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

/// Run `f` on a fresh current-thread runtime.
pub fn run<F, Fut, T>(f: F) -> T
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = T>,
{
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(f(Cx::for_testing()))
}

pub fn ids(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.value("id").and_then(Value::as_i64))
        .collect()
}
