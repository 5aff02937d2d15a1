//! Batched relation loading.
//!
//! After the base query returns a page of records, every relation activated
//! for the call is loaded with one query over the whole page (two for
//! BelongsToMany: pivot rows, then targets) and stitched back into the
//! records. Sub-paths load recursively through the target's repository, so
//! each nesting level is bounded the same way.

use crate::context::LoadContext;
use crate::repository::{Repository, distinct_values};
use asupersync::{Cx, Outcome};
use eagerly_core::{
    Attribute, ConfigErrorKind, Connection, Entity, Error, Operator, Predicate, Predicates,
    Record, Relation, Result, ValueKey, try_outcome, try_result,
};
use eagerly_query::SelectQuery;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

type BoxedFetch<'f> = Pin<Box<dyn Future<Output = Outcome<Vec<Record>, Error>> + 'f>>;

impl<'a, C: Connection> Repository<'a, C> {
    /// Load every relation activated in `ctx` onto `records`.
    ///
    /// BelongsTo relations load first, then HasMany, then BelongsToMany,
    /// each group in activation order. Nothing is queried for an empty page.
    pub(crate) async fn load_relations(
        &self,
        cx: &Cx,
        records: &mut [Record],
        ctx: &LoadContext,
    ) -> Outcome<(), Error> {
        if records.is_empty() || ctx.activated().is_empty() {
            return Outcome::Ok(());
        }

        let entity = self.entity();
        let mut order: Vec<(&str, &Relation)> = ctx
            .activated()
            .iter()
            .filter_map(|name| entity.relation(name).map(|rel| (name.as_str(), rel)))
            .collect();
        order.sort_by_key(|(_, rel)| rel.kind().load_rank());

        for (name, relation) in order {
            let target = try_result!(self.store().catalog().entity(relation.target()));
            let paths = sub_paths(ctx, name);
            let loaded = match relation {
                Relation::BelongsTo { .. } => {
                    try_outcome!(self.load_belongs_to(cx, records, name, relation, target, paths).await)
                }
                Relation::HasMany { .. } => {
                    try_outcome!(self.load_has_many(cx, records, name, relation, target, paths).await)
                }
                Relation::BelongsToMany { .. } => {
                    try_outcome!(
                        self.load_belongs_to_many(cx, records, name, relation, target, paths)
                            .await
                    )
                }
            };
            tracing::info!(
                entity = %entity.name(),
                relation = %name,
                kind = ?relation.kind(),
                parents = records.len(),
                loaded,
                "Loaded relation"
            );
        }
        Outcome::Ok(())
    }

    async fn load_belongs_to(
        &self,
        cx: &Cx,
        records: &mut [Record],
        name: &str,
        relation: &Relation,
        target: &'a Entity,
        paths: Vec<String>,
    ) -> Outcome<usize, Error> {
        let foreign_key = try_result!(key_name(relation.foreign_key_name(), name));
        let keys = distinct_values(records.iter().filter_map(|r| r.value(foreign_key)));
        if keys.is_empty() {
            for record in records.iter_mut() {
                record.set(name, Attribute::One(None));
            }
            return Outcome::Ok(0);
        }

        let predicates = try_result!(keyed(target.primary_key(), keys, relation.extra()));
        let related = self.related(target);
        let loaded = try_outcome!(fetch_boxed(&related, cx, &predicates, &paths).await);
        let by_key = index_by(&loaded, target.primary_key());

        for record in records.iter_mut() {
            let found = record
                .value(foreign_key)
                .and_then(|v| v.key())
                .and_then(|key| by_key.get(&key))
                .and_then(|positions| positions.first())
                .map(|&i| Box::new(loaded[i].clone()));
            record.set(name, Attribute::One(found));
        }
        Outcome::Ok(loaded.len())
    }

    async fn load_has_many(
        &self,
        cx: &Cx,
        records: &mut [Record],
        name: &str,
        relation: &Relation,
        target: &'a Entity,
        mut paths: Vec<String>,
    ) -> Outcome<usize, Error> {
        let foreign_key = try_result!(key_name(relation.foreign_key_name(), name));
        let primary_key = self.entity().primary_key();
        let keys = distinct_values(records.iter().filter_map(|r| r.value(primary_key)));
        if keys.is_empty() {
            for record in records.iter_mut() {
                record.set(name, Attribute::Many(Vec::new()));
            }
            return Outcome::Ok(0);
        }

        if !paths.iter().any(|p| p == "*") && !paths.iter().any(|p| p == foreign_key) {
            paths.push(foreign_key.to_string());
        }
        let predicates = try_result!(keyed(foreign_key, keys, relation.extra()));
        let related = self.related(target);
        let loaded = try_outcome!(fetch_boxed(&related, cx, &predicates, &paths).await);
        let by_parent = index_by(&loaded, foreign_key);

        for record in records.iter_mut() {
            let children = record
                .value(primary_key)
                .and_then(|v| v.key())
                .and_then(|key| by_parent.get(&key))
                .map(|positions| positions.iter().map(|&i| loaded[i].clone()).collect())
                .unwrap_or_default();
            record.set(name, Attribute::Many(children));
        }
        Outcome::Ok(loaded.len())
    }

    async fn load_belongs_to_many(
        &self,
        cx: &Cx,
        records: &mut [Record],
        name: &str,
        relation: &Relation,
        target: &'a Entity,
        paths: Vec<String>,
    ) -> Outcome<usize, Error> {
        let foreign_key = try_result!(key_name(relation.foreign_key_name(), name));
        let other_key = try_result!(key_name(relation.other_foreign_key_name(), name));
        let pivot = try_result!(key_name(relation.pivot_table(), name));
        let primary_key = self.entity().primary_key();

        let keys = distinct_values(records.iter().filter_map(|r| r.value(primary_key)));
        if keys.is_empty() {
            for record in records.iter_mut() {
                record.set(name, Attribute::Many(Vec::new()));
            }
            return Outcome::Ok(0);
        }

        let conn = self.store().connection();
        let pivot_rows = try_outcome!(
            SelectQuery::new(pivot)
                .columns([format!("{pivot}.{foreign_key}"), format!("{pivot}.{other_key}")])
                .where_in(format!("{pivot}.{foreign_key}"), keys)
                .all(cx, conn)
                .await
        );
        let links: Vec<(ValueKey, ValueKey)> = pivot_rows
            .iter()
            .filter_map(|row| {
                let owner = row.get(0).and_then(|v| v.key())?;
                let other = row.get(1).and_then(|v| v.key())?;
                Some((owner, other))
            })
            .collect();
        let other_keys = distinct_values(pivot_rows.iter().filter_map(|row| row.get(1)));

        let loaded = if other_keys.is_empty() {
            Vec::new()
        } else {
            let predicates = try_result!(keyed(target.primary_key(), other_keys, relation.extra()));
            let related = self.related(target);
            try_outcome!(fetch_boxed(&related, cx, &predicates, &paths).await)
        };
        let by_key = index_by(&loaded, target.primary_key());

        let mut grouped: HashMap<ValueKey, Vec<usize>> = HashMap::new();
        for (owner, other) in &links {
            let Some(&position) = by_key.get(other).and_then(|positions| positions.first()) else {
                continue;
            };
            let slot = grouped.entry(owner.clone()).or_default();
            if !slot.contains(&position) {
                slot.push(position);
            }
        }

        for record in records.iter_mut() {
            let attached = record
                .value(primary_key)
                .and_then(|v| v.key())
                .and_then(|key| grouped.get(&key))
                .map(|positions| positions.iter().map(|&i| loaded[i].clone()).collect())
                .unwrap_or_default();
            record.set(name, Attribute::Many(attached));
        }
        Outcome::Ok(loaded.len())
    }
}

/// Boxed so the read pipeline can recurse into related repositories.
fn fetch_boxed<'f, C: Connection>(
    repository: &'f Repository<'_, C>,
    cx: &'f Cx,
    predicates: &'f Predicates,
    columns: &'f [String],
) -> BoxedFetch<'f> {
    Box::pin(repository.fetch(cx, predicates, columns, false))
}

fn sub_paths(ctx: &LoadContext, relation: &str) -> Vec<String> {
    ctx.eager_paths(relation)
        .map_or_else(|| vec!["*".to_string()], <[String]>::to_vec)
}

/// `field IN (keys)` followed by the relation's extra predicates.
fn keyed(field: &str, keys: Vec<eagerly_core::Value>, extra: &Predicates) -> Result<Predicates> {
    let mut predicates = Predicates::new().and(Predicate::new(
        field,
        Operator::In,
        eagerly_core::Value::Array(keys),
    )?);
    for predicate in extra {
        predicates.push(predicate.clone());
    }
    Ok(predicates)
}

fn key_name<'k>(key: Option<&'k str>, relation: &str) -> Result<&'k str> {
    key.ok_or_else(|| {
        Error::config(
            ConfigErrorKind::Invalid,
            format!("relation '{relation}' has no resolved keys; build entities through a Catalog"),
        )
    })
}

/// Positions of `records` grouped by the key value of `column`.
fn index_by(records: &[Record], column: &str) -> HashMap<ValueKey, Vec<usize>> {
    let mut index: HashMap<ValueKey, Vec<usize>> = HashMap::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        if let Some(key) = record.value(column).and_then(|v| v.key()) {
            index.entry(key).or_default().push(i);
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use crate::repository::Store;
    use crate::testing::{MockConnection, block_on, fixture_catalog, row};
    use eagerly_core::{Record, Value};

    fn customer_rows(n: i64) -> Vec<eagerly_core::Row> {
        (1..=n)
            .map(|id| {
                row(
                    &["id", "name", "countries_id"],
                    vec![Value::BigInt(id), Value::Text(format!("c{id}")), Value::BigInt(id % 2 + 1)],
                )
            })
            .collect()
    }

    #[test]
    fn belongs_to_loads_in_one_query() {
        let catalog = fixture_catalog();
        let conn = MockConnection::new()
            .respond("FROM \"countries\"", vec![
                row(&["id", "name"], vec![Value::BigInt(1), Value::from("France")]),
                row(&["id", "name"], vec![Value::BigInt(2), Value::from("Peru")]),
            ])
            .respond("FROM \"customers\"", customer_rows(50));
        let store = Store::new(&catalog, &conn);
        let customers = store.repository("customers").unwrap();

        let records = block_on(|cx| async move { customers.all(&cx, &["name", "country.name"]).await });
        assert_eq!(records.len(), 50);
        assert_eq!(conn.statements().len(), 2);
        let country = records[0].one("country").expect("country loaded");
        assert_eq!(country.value("name"), Some(&Value::from("Peru")));

        let (sql, params) = &conn.statements()[1];
        assert!(sql.contains("WHERE \"countries\".\"id\" IN ($1, $2)"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn has_many_groups_children_and_adds_foreign_key() {
        let catalog = fixture_catalog();
        let conn = MockConnection::new()
            .respond("FROM \"orders\"", vec![
                row(&["status", "id", "customers_id"], vec![Value::from("paid"), Value::BigInt(10), Value::BigInt(1)]),
                row(&["status", "id", "customers_id"], vec![Value::from("open"), Value::BigInt(11), Value::BigInt(1)]),
            ])
            .respond("FROM \"customers\"", customer_rows(2));
        let store = Store::new(&catalog, &conn);
        let customers = store.repository("customers").unwrap();

        let records = block_on(|cx| async move { customers.all(&cx, &["name", "orders.status"]).await });
        assert_eq!(records[0].many("orders").map(<[Record]>::len), Some(2));
        assert_eq!(records[1].many("orders").map(<[Record]>::len), Some(0));

        let log = conn.statements();
        assert_eq!(log.len(), 2);
        assert!(log[1].0.starts_with(
            "SELECT \"orders\".\"status\", \"orders\".\"customers_id\", \"orders\".\"id\" FROM \"orders\""
        ));
    }

    #[test]
    fn belongs_to_many_uses_pivot_then_targets() {
        let catalog = fixture_catalog();
        let conn = MockConnection::new()
            .respond("FROM \"customer_tag\"", vec![
                row(&["customers_id", "tags_id"], vec![Value::BigInt(1), Value::BigInt(7)]),
                row(&["customers_id", "tags_id"], vec![Value::BigInt(1), Value::BigInt(8)]),
                row(&["customers_id", "tags_id"], vec![Value::BigInt(2), Value::BigInt(7)]),
                row(&["customers_id", "tags_id"], vec![Value::BigInt(2), Value::BigInt(7)]),
            ])
            .respond("FROM \"tags\"", vec![
                row(&["id", "label"], vec![Value::BigInt(8), Value::from("vip")]),
                row(&["id", "label"], vec![Value::BigInt(7), Value::from("new")]),
            ])
            .respond("FROM \"customers\"", customer_rows(2));
        let store = Store::new(&catalog, &conn);
        let customers = store.repository("customers").unwrap();

        let records = block_on(|cx| async move { customers.all(&cx, &["*", "tags"]).await });
        let labels = |r: &Record| -> Vec<Value> {
            r.many("tags")
                .unwrap_or_default()
                .iter()
                .filter_map(|t| t.value("label").cloned())
                .collect()
        };
        assert_eq!(labels(&records[0]), vec![Value::from("new"), Value::from("vip")]);
        assert_eq!(labels(&records[1]), vec![Value::from("new")]);
        assert_eq!(conn.statements().len(), 3);
    }

    #[test]
    fn missing_keys_attach_empty_without_queries() {
        let catalog = fixture_catalog();
        let conn = MockConnection::new().respond("FROM \"customers\"", vec![row(
            &["id", "name", "countries_id"],
            vec![Value::BigInt(1), Value::from("Ada"), Value::Null],
        )]);
        let store = Store::new(&catalog, &conn);
        let customers = store.repository("customers").unwrap();

        let records = block_on(|cx| async move { customers.all(&cx, &["name", "country"]).await });
        assert!(records[0].contains("country"));
        assert!(records[0].one("country").is_none());
        assert_eq!(conn.statements().len(), 1);
    }

    #[test]
    fn empty_page_issues_no_relation_queries() {
        let catalog = fixture_catalog();
        let conn = MockConnection::new();
        let store = Store::new(&catalog, &conn);
        let customers = store.repository("customers").unwrap();
        let records =
            block_on(|cx| async move { customers.all(&cx, &["country", "orders", "tags"]).await });
        assert!(records.is_empty());
        assert_eq!(conn.statements().len(), 1);
    }
}
