//! Statement accounting.
//!
//! [`CountingConnection`] wraps any [`Connection`] and records every
//! statement sent through it. It is how the batching bound is checked: a
//! page of N records with k activated relations must cost at most `1 + k`
//! queries (one more per BelongsToMany), whatever N is.
//!
//! # Example
//!
//! ```ignore
//! let conn = CountingConnection::new(conn);
//! let store = Store::new(&catalog, &conn);
//! store.repository("customers")?.all(&cx, &["name", "orders"]).await;
//! assert_eq!(conn.stats().queries, 2);
//! ```

use asupersync::{Cx, Outcome};
use eagerly_core::{Connection, Dialect, Error, Row, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Statement counts by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatementStats {
    /// `query` and `query_one` calls
    pub queries: usize,
    /// `execute` calls
    pub executes: usize,
    /// `insert` calls
    pub inserts: usize,
}

impl StatementStats {
    pub fn total(&self) -> usize {
        self.queries + self.executes + self.inserts
    }
}

/// A [`Connection`] that counts and logs what passes through it.
#[derive(Debug)]
pub struct CountingConnection<C> {
    inner: C,
    queries: AtomicUsize,
    executes: AtomicUsize,
    inserts: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl<C: Connection> CountingConnection<C> {
    #[must_use]
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            queries: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    #[must_use]
    pub fn stats(&self) -> StatementStats {
        StatementStats {
            queries: self.queries.load(Ordering::Relaxed),
            executes: self.executes.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
        }
    }

    /// SQL of every statement so far, oldest first.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Zero the counters and clear the log.
    pub fn reset(&self) {
        self.queries.store(0, Ordering::Relaxed);
        self.executes.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn record(&self, counter: &AtomicUsize, sql: &str) {
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(sql = %sql, n, "Statement recorded");
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sql.to_string());
    }
}

impl<C: Connection> Connection for CountingConnection<C> {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        self.record(&self.queries, sql);
        self.inner.query(cx, sql, params)
    }

    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
        self.record(&self.queries, sql);
        self.inner.query_one(cx, sql, params)
    }

    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        self.record(&self.executes, sql);
        self.inner.execute(cx, sql, params)
    }

    fn insert(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<i64, Error>> + Send {
        self.record(&self.inserts, sql);
        self.inner.insert(cx, sql, params)
    }
}
