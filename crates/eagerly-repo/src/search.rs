//! Free-text search over own and relation columns.

use crate::join::set_join;
use crate::predicate::{apply_grouped_sort, apply_predicates, apply_window};
use crate::repository::{Repository, distinct_values, order_by_keys};
use asupersync::{Cx, Outcome};
use eagerly_core::{
    Connection, Entity, Error, Operator, Predicate, Predicates, Record, Value, try_outcome,
    try_result,
};
use eagerly_query::{Expr, SelectQuery};
use serde::Serialize;

/// Records found by [`Repository::search`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResult {
    pub records: Vec<Record>,
    /// Matching entities before paging. `None` when neither a term nor
    /// predicates narrowed the table, so the table total applies.
    pub filtered: Option<u64>,
}

impl<'a, C: Connection> Repository<'a, C> {
    /// Records where any of `fields` contains `term`, ANDed with `predicates`.
    ///
    /// Matching runs as a key query grouped by the primary key, so joins on
    /// multi-valued relations never duplicate entities; sort and window apply
    /// to that query. The records are then loaded by key, in key order.
    /// Without a term or predicates this is the plain listing.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, fields, columns, predicates),
        fields(entity = %self.entity().name(), term = %term)
    )]
    pub async fn search<F: AsRef<str>, S: AsRef<str>>(
        &self,
        cx: &Cx,
        term: &str,
        fields: &[F],
        columns: &[S],
        predicates: &Predicates,
    ) -> Outcome<SearchResult, Error> {
        let entity = self.entity();
        let catalog = self.store().catalog();
        let conn = self.store().connection();
        let term = term.trim();
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();

        if term.is_empty() && predicates.is_empty() {
            let records = try_outcome!(self.fetch(cx, predicates, &columns, false).await);
            return Outcome::Ok(SearchResult {
                records,
                filtered: None,
            });
        }

        let mut matching = SelectQuery::new(entity.table()).columns([entity.qualified_key()]);
        if !term.is_empty() {
            let pattern = format!("%{term}%");
            let mut likes = Vec::with_capacity(fields.len());
            for field in fields.iter().map(AsRef::as_ref) {
                if !is_searchable(entity, field) {
                    continue;
                }
                let (joined, column) = try_result!(set_join(catalog, entity, matching, field, None));
                matching = joined;
                likes.push(Expr::col(column).like(Expr::lit(pattern.clone())));
            }
            matching = matching.filter_any(likes);
        }
        matching = try_result!(apply_predicates(catalog, entity, matching, predicates));

        let filtered = try_outcome!(matching.count(cx, conn, &entity.qualified_key()).await);

        let keys = matching.group_by(entity.qualified_key());
        let keys = try_result!(apply_grouped_sort(catalog, entity, keys, self.sort()));
        let keys = apply_window(keys, self.window());
        let key_rows = try_outcome!(keys.all(cx, conn).await);
        let ids = distinct_values(key_rows.iter().filter_map(|row| row.get(0)));
        if ids.is_empty() {
            tracing::debug!(entity = %entity.name(), filtered, "Search matched nothing");
            return Outcome::Ok(SearchResult {
                records: Vec::new(),
                filtered: Some(filtered),
            });
        }

        let by_key = Predicates::new().and(try_result!(Predicate::new(
            entity.primary_key(),
            Operator::In,
            Value::Array(ids.clone()),
        )));
        let records = try_outcome!(self.unpaged().fetch(cx, &by_key, &columns, false).await);
        let records = order_by_keys(records, &ids, entity.primary_key());

        Outcome::Ok(SearchResult {
            records,
            filtered: Some(filtered),
        })
    }
}

/// Whether `field` names something a `LIKE` can run against: an own column
/// or a relation path ending in a column. Bare relation names and computed
/// attributes are skipped.
fn is_searchable(entity: &Entity, field: &str) -> bool {
    if field.is_empty() || field == "*" {
        return false;
    }
    if field.contains('.') {
        return true;
    }
    entity.relation(field).is_none() && entity.computed_attribute(field).is_none()
}

#[cfg(test)]
mod tests {
    use crate::repository::Store;
    use crate::testing::{MockConnection, block_on, fixture_catalog, row};
    use eagerly_core::{Predicate, Predicates, Value};
    use eagerly_query::OrderDirection;

    #[test]
    fn term_joins_relation_fields_and_counts_distinct() {
        let catalog = fixture_catalog();
        let conn = MockConnection::new()
            .respond("COUNT(DISTINCT", vec![row(&["count"], vec![Value::BigInt(2)])])
            .respond("GROUP BY", vec![
                row(&["id"], vec![Value::BigInt(4)]),
                row(&["id"], vec![Value::BigInt(2)]),
            ])
            .respond("FROM \"customers\"", vec![
                row(&["id", "name"], vec![Value::BigInt(2), Value::from("Bea")]),
                row(&["id", "name"], vec![Value::BigInt(4), Value::from("Dan")]),
            ]);
        let store = Store::new(&catalog, &conn);
        let customers = store.repository("customers").unwrap().limit(0, 10);

        let result = block_on(|cx| async move {
            customers
                .search(&cx, "ea", &["name", "orders.status", "tags"], &["name"], &Predicates::new())
                .await
        });
        assert_eq!(result.filtered, Some(2));
        let ids: Vec<_> = result.records.iter().filter_map(|r| r.value("id").and_then(Value::as_i64)).collect();
        assert_eq!(ids, vec![4, 2]);

        let log = conn.statements();
        assert_eq!(log.len(), 3);
        assert_eq!(
            log[0].0,
            "SELECT COUNT(DISTINCT \"customers\".\"id\") FROM \"customers\" \
             LEFT JOIN \"orders\" AS \"orders\" ON \"orders\".\"customers_id\" = \"customers\".\"id\" \
             WHERE (\"customers\".\"name\" LIKE $1 OR \"orders\".\"status\" LIKE $2)"
        );
        assert_eq!(log[0].1, vec![Value::from("%ea%"), Value::from("%ea%")]);
        assert!(log[1].0.ends_with("GROUP BY \"customers\".\"id\" LIMIT 10 OFFSET 0"));
    }

    #[test]
    fn empty_term_without_predicates_is_a_plain_fetch() {
        let catalog = fixture_catalog();
        let conn = MockConnection::new()
            .respond("GROUP BY", vec![row(&["id"], vec![Value::BigInt(1)])])
            .respond("FROM \"customers\"", vec![row(&["id", "name"], vec![Value::BigInt(1), Value::from("Ada")])]);
        let store = Store::new(&catalog, &conn);
        let customers = store.repository("customers").unwrap();

        let result = block_on(|cx| async move {
            customers
                .search(&cx, "  ", &["name", "orders.status"], &["name"], &Predicates::new())
                .await
        });
        assert_eq!(result.filtered, None);
        assert_eq!(result.records.len(), 1);
        let log = conn.statements();
        assert_eq!(log.len(), 1);
        assert!(!log[0].0.contains("GROUP BY"));
        assert!(!log[0].0.contains(" IN ("));
        assert!(log[0].1.is_empty());
    }

    #[test]
    fn predicates_alone_produce_a_filtered_count() {
        let catalog = fixture_catalog();
        let conn = MockConnection::new()
            .respond("COUNT(DISTINCT", vec![row(&["count"], vec![Value::BigInt(0)])]);
        let store = Store::new(&catalog, &conn);
        let customers = store
            .repository("customers")
            .unwrap()
            .order_by("country.name", OrderDirection::Asc);
        let predicates = Predicates::new().and(Predicate::eq("email", "x@y").unwrap());

        let result = block_on(|cx| async move {
            customers.search(&cx, "", &["name"], &["*"], &predicates).await
        });
        assert_eq!(result.filtered, Some(0));
        assert!(result.records.is_empty());

        let log = conn.statements();
        assert_eq!(log.len(), 2);
        assert!(log[1].0.contains("ORDER BY MIN(\"country\".\"name\") ASC"));
    }
}
