//! Query builders for INSERT, UPDATE, DELETE operations.

use crate::clause::Where;
use crate::expr::Expr;
use asupersync::{Cx, Outcome};
use eagerly_core::{Connection, Dialect, Error, Record, Value};

/// INSERT query builder.
///
/// Rows are column/value pairs. The first row fixes the column list; later
/// rows are aligned to it by name, and a column a row does not mention is
/// bound as NULL. Columns that appear only in later rows are ignored.
#[derive(Debug, Clone, Default)]
pub struct InsertBuilder {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl InsertBuilder {
    /// Create a new INSERT builder for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Append one row of column/value pairs.
    pub fn row<I, S>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let pairs: Vec<(String, Value)> = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        if self.rows.is_empty() {
            self.columns = pairs.iter().map(|(k, _)| k.clone()).collect();
            self.rows.push(pairs.into_iter().map(|(_, v)| v).collect());
            return self;
        }
        let aligned = self
            .columns
            .iter()
            .map(|col| {
                pairs
                    .iter()
                    .find(|(k, _)| k == col)
                    .map_or(Value::Null, |(_, v)| v.clone())
            })
            .collect();
        self.rows.push(aligned);
        self
    }

    /// Append one row taken from the scalar attributes of a record.
    pub fn record(self, record: &Record) -> Self {
        let pairs: Vec<(String, Value)> = record
            .iter()
            .filter_map(|(name, attr)| attr.as_value().map(|v| (name.to_string(), v.clone())))
            .collect();
        self.row(pairs)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Build the INSERT SQL and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the INSERT SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let table = dialect.quote_identifier(&self.table);

        if self.columns.is_empty() {
            let sql = match dialect {
                Dialect::Mysql => format!("INSERT INTO {table} () VALUES ()"),
                Dialect::Postgres | Dialect::Sqlite => format!("INSERT INTO {table} DEFAULT VALUES"),
            };
            return (sql, Vec::new());
        }

        let columns: Vec<_> = self
            .columns
            .iter()
            .map(|c| dialect.quote_identifier(c))
            .collect();

        let mut params = Vec::with_capacity(self.columns.len() * self.rows.len());
        let mut tuples = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let placeholders: Vec<_> = row
                .iter()
                .map(|value| {
                    params.push(value.clone());
                    dialect.placeholder(params.len())
                })
                .collect();
            tuples.push(format!("({})", placeholders.join(", ")));
        }

        let sql = format!(
            "INSERT INTO {table} ({}) VALUES {}",
            columns.join(", "),
            tuples.join(", ")
        );
        (sql, params)
    }

    /// Execute a single-row INSERT and return the inserted ID.
    pub async fn execute<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<i64, Error> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing INSERT");
        conn.insert(cx, &sql, &params).await
    }

    /// Execute a multi-row INSERT and return rows affected.
    ///
    /// No statement is issued when there are no rows.
    pub async fn execute_many<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        if self.rows.is_empty() {
            return Outcome::Ok(0);
        }
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, rows = self.rows.len(), "Executing bulk INSERT");
        conn.execute(cx, &sql, &params).await
    }
}

/// UPDATE query builder.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    sets: Vec<(String, Value)>,
    where_clause: Option<Where>,
}

impl UpdateBuilder {
    /// Create a new UPDATE builder for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sets: Vec::new(),
            where_clause: None,
        }
    }

    /// Set a column. Setting the same column again replaces the value.
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = column.into();
        let value = value.into();
        match self.sets.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.sets.push((column, value)),
        }
        self
    }

    pub fn has_sets(&self) -> bool {
        !self.sets.is_empty()
    }

    /// Add a WHERE condition (AND).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(expr),
            None => Where::new(expr),
        });
        self
    }

    /// Build the UPDATE SQL and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the UPDATE SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let set_clauses: Vec<_> = self
            .sets
            .iter()
            .map(|(column, value)| {
                params.push(value.clone());
                format!(
                    "{} = {}",
                    dialect.quote_identifier(column),
                    dialect.placeholder(params.len())
                )
            })
            .collect();

        let mut sql = format!(
            "UPDATE {} SET {}",
            dialect.quote_identifier(&self.table),
            set_clauses.join(", ")
        );

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build_with_dialect(dialect, &mut params));
        }

        (sql, params)
    }

    /// Execute the UPDATE and return rows affected.
    ///
    /// An update with nothing to set affects no rows and issues no statement.
    pub async fn execute<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        if self.sets.is_empty() {
            return Outcome::Ok(0);
        }
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing UPDATE");
        conn.execute(cx, &sql, &params).await
    }
}

/// DELETE query builder.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    where_clause: Option<Where>,
}

impl DeleteBuilder {
    /// Create a new DELETE builder for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_clause: None,
        }
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(expr),
            None => Where::new(expr),
        });
        self
    }

    /// Build the DELETE SQL and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the DELETE SQL and parameters with specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut sql = format!("DELETE FROM {}", dialect.quote_identifier(&self.table));
        let mut params = Vec::new();

        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build_with_dialect(dialect, &mut params));
        }

        (sql, params)
    }

    /// Execute the DELETE and return rows affected.
    pub async fn execute<C: Connection>(self, cx: &Cx, conn: &C) -> Outcome<u64, Error> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing DELETE");
        conn.execute(cx, &sql, &params).await
    }
}
