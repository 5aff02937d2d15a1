//! Shared unit-test fixtures: a recording connection and a small catalog.

use asupersync::runtime::RuntimeBuilder;
use asupersync::{Cx, Outcome};
use eagerly_core::{Catalog, Connection, Entity, Error, Row, Value};
use std::future::Future;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MockState {
    responses: Vec<(String, Vec<Row>)>,
    insert_id: i64,
    executed: Vec<(String, Vec<Value>)>,
}

/// Records every statement; answers queries with the rows registered for
/// the first pattern contained in the SQL, or nothing. `execute` reports
/// one affected row.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(self, pattern: &str, rows: Vec<Row>) -> Self {
        self.state
            .lock()
            .expect("lock poisoned")
            .responses
            .push((pattern.to_string(), rows));
        self
    }

    pub(crate) fn with_insert_id(self, id: i64) -> Self {
        self.state.lock().expect("lock poisoned").insert_id = id;
        self
    }

    pub(crate) fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.state.lock().expect("lock poisoned").executed.clone()
    }

    fn run(&self, sql: &str, params: &[Value]) -> Vec<Row> {
        let mut guard = self.state.lock().expect("lock poisoned");
        guard.executed.push((sql.to_string(), params.to_vec()));
        guard
            .responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default()
    }
}

impl Connection for MockConnection {
    fn query(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let rows = self.run(sql, params);
        async move { Outcome::Ok(rows) }
    }

    fn query_one(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        let row = self.run(sql, params).into_iter().next();
        async move { Outcome::Ok(row) }
    }

    fn execute(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.run(sql, params);
        async move { Outcome::Ok(1) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        self.run(sql, params);
        let id = self.state.lock().expect("lock poisoned").insert_id;
        async move { Outcome::Ok(id) }
    }
}

/// Run `f` on a fresh runtime and unwrap its `Outcome::Ok`.
pub(crate) fn block_on<F, Fut, T>(f: F) -> T
where
    F: FnOnce(Cx) -> Fut,
    Fut: Future<Output = Outcome<T, Error>>,
{
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();
    match rt.block_on(f(cx)) {
        Outcome::Ok(value) => value,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(_) => panic!("unexpected cancellation"),
        Outcome::Panicked(_) => panic!("unexpected panic"),
    }
}

pub(crate) fn row(names: &[&str], values: Vec<Value>) -> Row {
    Row::new(names.iter().map(|n| (*n).to_string()).collect(), values)
}

/// customers (country, orders, tags), countries, orders, tags.
pub(crate) fn fixture_catalog() -> Catalog {
    Catalog::builder()
        .entity(
            Entity::builder("customers")
                .fillable(["name", "email"])
                .timestamps(true)
                .belongs_to("country", "countries")
                .has_many("orders", "orders")
                .belongs_to_many("tags", "tags", "customer_tag")
                .build(),
        )
        .entity(Entity::builder("countries").fillable(["name"]).build())
        .entity(
            Entity::builder("orders")
                .fillable(["status", "customers_id"])
                .belongs_to("customer", "customers")
                .build(),
        )
        .entity(Entity::builder("tags").fillable(["label"]).build())
        .build()
        .expect("fixture catalog")
}
