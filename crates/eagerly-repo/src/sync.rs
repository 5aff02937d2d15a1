//! Pivot-table synchronisation for BelongsToMany relations.

use crate::repository::{Repository, distinct_values};
use asupersync::{Cx, Outcome};
use eagerly_core::{
    Attribute, Connection, Error, Record, Relation, Result, Value, ValidationErrorKind,
    try_outcome, try_result,
};
use eagerly_query::{DeleteBuilder, Expr, InsertBuilder, SelectQuery};
use std::collections::HashSet;

/// What [`Repository::sync`] changed in the pivot table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncChanges {
    /// Pivot rows deleted.
    pub detached: u64,
    /// Related ids newly linked, in the order given.
    pub attached: Vec<Value>,
}

impl<'a, C: Connection> Repository<'a, C> {
    /// Make the pivot rows of `relation` for record `id` exactly `ids`.
    ///
    /// Rows for ids no longer listed are deleted, rows for new ids are
    /// inserted and existing links are left alone. An empty `ids` detaches
    /// everything.
    #[tracing::instrument(level = "debug", skip(self, cx, id, ids), fields(entity = %self.entity().name()))]
    pub async fn sync(
        &self,
        cx: &Cx,
        id: impl Into<Value>,
        relation: &str,
        ids: Vec<Value>,
    ) -> Outcome<SyncChanges, Error> {
        let id = normalize_id(id.into());
        let (pivot, foreign_key, other_key) = try_result!(self.pivot_of(relation));
        let conn = self.store().connection();
        let ids: Vec<Value> = ids.into_iter().map(normalize_id).collect();
        let ids = distinct_values(ids.iter());

        let owner = Expr::col(foreign_key).eq(Expr::lit(id.clone()));
        if ids.is_empty() {
            let detached = try_outcome!(
                DeleteBuilder::new(pivot)
                    .filter(owner)
                    .execute(cx, conn)
                    .await
            );
            tracing::debug!(relation = %relation, detached, "Detached every link");
            return Outcome::Ok(SyncChanges {
                detached,
                attached: Vec::new(),
            });
        }

        let detached = try_outcome!(
            DeleteBuilder::new(pivot)
                .filter(owner.and(Expr::col(other_key).not_in_list(ids.clone())))
                .execute(cx, conn)
                .await
        );

        let existing_rows = try_outcome!(
            SelectQuery::new(pivot)
                .columns([format!("{pivot}.{other_key}")])
                .filter(Expr::col(format!("{pivot}.{foreign_key}")).eq(Expr::lit(id.clone())))
                .all(cx, conn)
                .await
        );
        let existing: HashSet<_> = existing_rows
            .iter()
            .filter_map(|row| row.get(0).and_then(Value::key))
            .collect();

        let attached: Vec<Value> = ids
            .into_iter()
            .filter(|value| value.key().is_some_and(|key| !existing.contains(&key)))
            .collect();
        let mut insert = InsertBuilder::new(pivot);
        for other in &attached {
            insert = insert.row([(foreign_key, id.clone()), (other_key, other.clone())]);
        }
        try_outcome!(insert.execute_many(cx, conn).await);

        tracing::debug!(
            relation = %relation,
            detached,
            attached = attached.len(),
            "Synced pivot rows"
        );
        Outcome::Ok(SyncChanges { detached, attached })
    }

    /// Sync every BelongsToMany relation named among `attributes`.
    ///
    /// Other relation names are ignored; writes only touch pivots.
    pub(crate) async fn sync_attributes(
        &self,
        cx: &Cx,
        id: Value,
        attributes: &Record,
    ) -> Outcome<(), Error> {
        for (name, attribute) in attributes.iter() {
            let Some(relation) = self.entity().relation(name) else {
                continue;
            };
            let Relation::BelongsToMany { target, .. } = relation else {
                tracing::debug!(relation = %name, "Ignoring non-pivot relation attribute on write");
                continue;
            };
            let target_key = try_result!(self.store().catalog().entity(target)).primary_key();
            let ids = related_ids(attribute, target_key);
            try_outcome!(self.sync(cx, id.clone(), name, ids).await);
        }
        Outcome::Ok(())
    }

    fn pivot_of(&self, relation: &str) -> Result<(&'a str, &'a str, &'a str)> {
        let entity = self.entity();
        let Some(found) = entity.relation(relation) else {
            return Err(Error::validation(
                relation,
                ValidationErrorKind::Relation,
                format!("entity '{}' has no relation named '{relation}'", entity.name()),
            ));
        };
        match (
            found.pivot_table(),
            found.foreign_key_name(),
            found.other_foreign_key_name(),
        ) {
            (Some(pivot), Some(fk), Some(other)) => Ok((pivot, fk, other)),
            _ => Err(Error::validation(
                relation,
                ValidationErrorKind::Relation,
                format!(
                    "relation '{relation}' on entity '{}' is {:?}; only BelongsToMany relations can be synced",
                    entity.name(),
                    found.kind()
                ),
            )),
        }
    }
}

/// Numeric text ids (`"2"` from a form or JSON body) become integers so they
/// match the stored keys; anything else is kept as given.
fn normalize_id(value: Value) -> Value {
    match value {
        Value::Int(i) => Value::BigInt(i64::from(i)),
        Value::Text(text) => match text.trim().parse::<i64>() {
            Ok(n) => Value::BigInt(n),
            Err(_) => Value::Text(text),
        },
        other => other,
    }
}

/// Ids carried by a relation attribute: a list of ids, a single id, or
/// related records (their primary keys).
fn related_ids(attribute: &Attribute, target_key: &str) -> Vec<Value> {
    match attribute {
        Attribute::Value(Value::Null) => Vec::new(),
        Attribute::Value(Value::Array(values)) => values.clone(),
        Attribute::Value(value) => vec![value.clone()],
        Attribute::Many(records) => records
            .iter()
            .filter_map(|r| r.value(target_key).cloned())
            .collect(),
        Attribute::One(record) => record
            .as_deref()
            .and_then(|r| r.value(target_key).cloned())
            .into_iter()
            .collect(),
    }
}
