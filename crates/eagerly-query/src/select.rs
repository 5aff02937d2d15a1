//! SELECT query builder.

use crate::clause::{Limit, Offset, OrderBy, Where};
use crate::expr::Expr;
use crate::join::Join;
use asupersync::{Cx, Outcome};
use eagerly_core::{Connection, Dialect, Error, Row, Value};

/// A SELECT query over one base table.
///
/// Joins are de-duplicated by reference name (alias, or table when
/// unaliased): adding a join whose reference name is already present is a
/// no-op, so relation paths can be walked from several places without
/// producing duplicate joins.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    /// Table name for FROM clause
    table: String,
    /// Columns to select (empty = `*`)
    columns: Vec<Expr>,
    /// WHERE clause conditions
    where_clause: Option<Where>,
    /// ORDER BY clauses
    order_by: Vec<OrderBy>,
    /// JOIN clauses
    joins: Vec<Join>,
    /// LIMIT clause
    limit: Option<Limit>,
    /// OFFSET clause
    offset: Option<Offset>,
    /// GROUP BY columns
    group_by: Vec<Expr>,
}

impl SelectQuery {
    /// Create a new SELECT query on `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            where_clause: None,
            order_by: Vec::new(),
            joins: Vec::new(),
            limit: None,
            offset: None,
            group_by: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Replace the projection with column paths.
    pub fn columns<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.columns = cols.into_iter().map(Expr::col).collect();
        self
    }

    /// Add a WHERE condition (AND).
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(expr),
            None => Where::new(expr),
        });
        self
    }

    /// AND an OR-group: `(a OR b OR c)`. An empty group is ignored.
    pub fn filter_any(self, exprs: impl IntoIterator<Item = Expr>) -> Self {
        match Expr::any(exprs) {
            Some(group) => self.filter(group),
            None => self,
        }
    }

    /// `column IN (values)`.
    pub fn where_in(self, column: impl AsRef<str>, values: Vec<Value>) -> Self {
        self.filter(Expr::col(column).in_list(values))
    }

    /// `column NOT IN (values)`.
    pub fn where_not_in(self, column: impl AsRef<str>, values: Vec<Value>) -> Self {
        self.filter(Expr::col(column).not_in_list(values))
    }

    /// Add ORDER BY clause.
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    /// Add a JOIN unless one with the same reference name exists.
    pub fn join(mut self, join: Join) -> Self {
        if self.has_join(join.reference_name()) {
            tracing::trace!(join = %join.reference_name(), "Join already present, skipping");
            return self;
        }
        self.joins.push(join);
        self
    }

    /// Whether a join with this alias (or unaliased table) exists.
    pub fn has_join(&self, reference: &str) -> bool {
        self.joins.iter().any(|j| j.reference_name() == reference)
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(Limit(n));
        self
    }

    /// Set OFFSET.
    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(Offset(n));
        self
    }

    /// Add GROUP BY column.
    pub fn group_by(mut self, column: impl AsRef<str>) -> Self {
        self.group_by.push(Expr::col(column));
        self
    }

    /// The same joins and filters, projected to `COUNT(DISTINCT key)` with
    /// grouping, ordering and window removed.
    pub fn count_distinct(&self, key: impl AsRef<str>) -> Self {
        let mut query = self.clone();
        query.columns = vec![Expr::count_distinct(Expr::col(key))];
        query.group_by.clear();
        query.order_by.clear();
        query.limit = None;
        query.offset = None;
        query
    }

    /// Build the SQL query and parameters with default dialect (Postgres).
    pub fn build(&self) -> (String, Vec<Value>) {
        self.build_with_dialect(Dialect::default())
    }

    /// Build the SQL query and parameters with a specific dialect.
    pub fn build_with_dialect(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();

        // SELECT
        sql.push_str("SELECT ");

        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let cols: Vec<_> = self
                .columns
                .iter()
                .map(|c| c.build_with_dialect(dialect, &mut params))
                .collect();
            sql.push_str(&cols.join(", "));
        }

        // FROM
        sql.push_str(" FROM ");
        sql.push_str(&dialect.quote_identifier(&self.table));

        // JOINs
        for join in &self.joins {
            sql.push_str(&join.build_with_dialect(dialect, &mut params));
        }

        // WHERE
        if let Some(where_clause) = &self.where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause.build_with_dialect(dialect, &mut params));
        }

        // GROUP BY
        if !self.group_by.is_empty() {
            let cols: Vec<_> = self
                .group_by
                .iter()
                .map(|c| c.build_with_dialect(dialect, &mut params))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            let order_strs: Vec<_> = self
                .order_by
                .iter()
                .map(|o| o.build_with_dialect(dialect, &mut params))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_strs.join(", "));
        }

        // LIMIT / OFFSET
        match (self.limit, self.offset) {
            (Some(Limit(n)), Some(Offset(o))) => sql.push_str(&format!(" LIMIT {n} OFFSET {o}")),
            (Some(Limit(n)), None) => sql.push_str(&format!(" LIMIT {n}")),
            // OFFSET without LIMIT is not portable; -1 means unbounded on SQLite/MySQL
            (None, Some(Offset(o))) if o > 0 => match dialect {
                Dialect::Postgres => sql.push_str(&format!(" OFFSET {o}")),
                Dialect::Sqlite => sql.push_str(&format!(" LIMIT -1 OFFSET {o}")),
                Dialect::Mysql => sql.push_str(&format!(" LIMIT 18446744073709551615 OFFSET {o}")),
            },
            _ => {}
        }

        (sql, params)
    }

    /// Execute the query and return all rows.
    #[tracing::instrument(level = "trace", skip(self, cx, conn), fields(table = %self.table))]
    pub async fn all<C: Connection>(&self, cx: &Cx, conn: &C) -> Outcome<Vec<Row>, Error> {
        let (sql, params) = self.build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, param_count = params.len(), "Executing SELECT");
        conn.query(cx, &sql, &params).await
    }

    /// Execute a `COUNT(DISTINCT key)` version of the query.
    pub async fn count<C: Connection>(
        &self,
        cx: &Cx,
        conn: &C,
        key: &str,
    ) -> Outcome<u64, Error> {
        let (sql, params) = self.count_distinct(key).build_with_dialect(conn.dialect());
        tracing::trace!(sql = %sql, "Executing COUNT");
        match conn.query_one(cx, &sql, &params).await {
            Outcome::Ok(row) => Outcome::Ok(
                row.and_then(|r| r.get(0).and_then(Value::as_i64))
                    .map_or(0, |n| u64::try_from(n).unwrap_or(0)),
            ),
            Outcome::Err(e) => Outcome::Err(e),
            Outcome::Cancelled(r) => Outcome::Cancelled(r),
            Outcome::Panicked(p) => Outcome::Panicked(p),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::OrderDirection;

    #[test]
    fn full_statement_in_clause_order() {
        let query = SelectQuery::new("customers")
            .columns(["customers.id"])
            .join(
                Join::left(
                    "orders",
                    Expr::col("orders.customer_id").eq(Expr::col("customers.id")),
                )
                .alias("orders"),
            )
            .filter(Expr::col("orders.status").eq("paid"))
            .group_by("customers.id")
            .order_by(OrderBy::new(
                Expr::max(Expr::col("orders.total")),
                OrderDirection::Desc,
            ))
            .limit(10)
            .offset(20);
        let (sql, params) = query.build_with_dialect(Dialect::Sqlite);
        assert_eq!(
            sql,
            "SELECT \"customers\".\"id\" FROM \"customers\" \
             LEFT JOIN \"orders\" AS \"orders\" ON \"orders\".\"customer_id\" = \"customers\".\"id\" \
             WHERE \"orders\".\"status\" = ?1 GROUP BY \"customers\".\"id\" \
             ORDER BY MAX(\"orders\".\"total\") DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params, vec![Value::Text("paid".into())]);
    }

    #[test]
    fn duplicate_join_is_skipped() {
        let join = Join::left("orders", Expr::raw("1 = 1")).alias("orders");
        let query = SelectQuery::new("customers").join(join.clone()).join(join);
        assert_eq!(query.joins().len(), 1);
        assert!(query.has_join("orders"));
        assert!(!query.has_join("tags"));
    }

    #[test]
    fn count_distinct_strips_window_and_order() {
        let query = SelectQuery::new("customers")
            .filter_any([Expr::col("name").like("%a%"), Expr::col("email").like("%a%")])
            .group_by("customers.id")
            .order_by(OrderBy::asc("name"))
            .limit(5);
        let (sql, params) = query.count_distinct("customers.id").build_with_dialect(Dialect::Postgres);
        assert_eq!(
            sql,
            "SELECT COUNT(DISTINCT \"customers\".\"id\") FROM \"customers\" \
             WHERE (\"name\" LIKE $1 OR \"email\" LIKE $2)"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn offset_only_per_dialect() {
        let query = SelectQuery::new("t").offset(5);
        assert!(query.build_with_dialect(Dialect::Sqlite).0.ends_with("LIMIT -1 OFFSET 5"));
        assert!(query.build_with_dialect(Dialect::Postgres).0.ends_with(" OFFSET 5"));
        assert_eq!(SelectQuery::new("t").offset(0).build().0, "SELECT * FROM \"t\"");
    }

    #[test]
    fn where_in_with_empty_list_matches_nothing() {
        let (sql, params) = SelectQuery::new("t").where_in("id", vec![]).build();
        assert_eq!(sql, "SELECT * FROM \"t\" WHERE 1 = 0");
        assert!(params.is_empty());
    }
}
