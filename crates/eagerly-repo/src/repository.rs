//! Repositories: the entry points of the engine.
//!
//! A [`Store`] bundles what every repository call needs (catalog,
//! connection, configuration, clock). A [`Repository`] is a cheap per-call
//! view of one entity over a store, carrying the optional sort, page window
//! and view-derived column list of that call.
//!
//! Every read goes through the same pipeline:
//!
//! 1. resolve the requested columns into a projection and a `LoadContext`
//! 2. plan the filters (directly, or through a grouped key query)
//! 3. run the base query
//! 4. batch-load activated relations, one query per relation per level
//! 5. format date attributes and evaluate computed attributes

use crate::columns::resolve_columns;
use crate::context::LoadContext;
use crate::options::{Sort, Window};
use crate::predicate::{FilterPlan, compile};
use asupersync::{Cx, Outcome};
use eagerly_core::{
    Catalog, Clock, Connection, Entity, Error, Operator, Predicate, Predicates, Record,
    RepositoryConfig, Result, SystemClock, Value, ValueKey, ViewSource, columns_mentioned,
    try_outcome, try_result,
};
use eagerly_query::{DeleteBuilder, Expr, InsertBuilder, OrderDirection, SelectQuery, UpdateBuilder};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Shared collaborators of every repository over one catalog.
pub struct Store<'a, C: Connection> {
    catalog: &'a Catalog,
    conn: &'a C,
    config: Arc<RepositoryConfig>,
    clock: Arc<dyn Clock>,
}

impl<'a, C: Connection> Store<'a, C> {
    /// Create a store with the default configuration and the system clock.
    pub fn new(catalog: &'a Catalog, conn: &'a C) -> Self {
        Self {
            catalog,
            conn,
            config: Arc::new(RepositoryConfig::default()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_config(mut self, config: RepositoryConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn connection(&self) -> &'a C {
        self.conn
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Repository for the entity registered as `name`.
    pub fn repository(&self, name: &str) -> Result<Repository<'a, C>> {
        let entity = self.catalog.entity(name)?;
        Ok(Repository::new(self.clone(), entity))
    }
}

impl<C: Connection> Clone for Store<'_, C> {
    fn clone(&self) -> Self {
        Self {
            catalog: self.catalog,
            conn: self.conn,
            config: Arc::clone(&self.config),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Connection> fmt::Debug for Store<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("entities", &self.catalog.len())
            .field("dialect", &self.conn.dialect())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One page of records plus the numbers needed to render a pager.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub data: Vec<Record>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
    pub last_page: u64,
}

/// What [`Repository::update_or_create`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Upserted {
    /// A matching record existed; `affected` rows were updated.
    Updated { id: Value, affected: u64 },
    /// Nothing matched; a record was inserted with this id.
    Created(i64),
}

/// Relation-aware access to one entity.
pub struct Repository<'a, C: Connection> {
    store: Store<'a, C>,
    entity: &'a Entity,
    sort: Option<Sort>,
    window: Option<Window>,
    view: Option<Vec<String>>,
}

impl<C: Connection> Clone for Repository<'_, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            entity: self.entity,
            sort: self.sort.clone(),
            window: self.window,
            view: self.view.clone(),
        }
    }
}

impl<C: Connection> fmt::Debug for Repository<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &self.entity.name())
            .field("sort", &self.sort)
            .field("window", &self.window)
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl<'a, C: Connection> Repository<'a, C> {
    pub fn new(store: Store<'a, C>, entity: &'a Entity) -> Self {
        Self {
            store,
            entity,
            sort: None,
            window: None,
            view: None,
        }
    }

    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    pub fn store(&self) -> &Store<'a, C> {
        &self.store
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    pub fn window(&self) -> Option<Window> {
        self.window
    }

    /// Sort the next read by `field` (may be relation-qualified).
    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.sort = Some(Sort::new(field, direction));
        self
    }

    /// Page the next read.
    pub fn limit(mut self, offset: u64, length: u64) -> Self {
        self.window = Some(Window::new(offset, length));
        self
    }

    /// Narrow `*` to the fillable attributes and relations a view mentions.
    pub fn with_view(mut self, source: &dyn ViewSource, view: &str) -> Result<Self> {
        let contents = source.contents(view)?;
        let columns = columns_mentioned(self.entity, &contents);
        tracing::debug!(entity = %self.entity.name(), view = %view, columns = ?columns, "Columns taken from view");
        self.view = Some(columns);
        Ok(self)
    }

    /// Same entity and view, without sort or window.
    pub(crate) fn unpaged(&self) -> Self {
        Self {
            sort: None,
            window: None,
            ..self.clone()
        }
    }

    /// Repository for the target entity of a relation, over the same store.
    pub(crate) fn related(&self, target: &'a Entity) -> Self {
        Self::new(self.store.clone(), target)
    }

    // ==================== Reads ====================

    /// All records, honouring the sort and window.
    #[tracing::instrument(level = "debug", skip(self, cx, columns), fields(entity = %self.entity.name()))]
    pub async fn all<S: AsRef<str>>(&self, cx: &Cx, columns: &[S]) -> Outcome<Vec<Record>, Error> {
        self.fetch(cx, &Predicates::new(), &owned(columns), false)
            .await
    }

    /// The first record, if any.
    pub async fn first<S: AsRef<str>>(&self, cx: &Cx, columns: &[S]) -> Outcome<Option<Record>, Error> {
        let records = try_outcome!(
            self.fetch(cx, &Predicates::new(), &owned(columns), true)
                .await
        );
        Outcome::Ok(records.into_iter().next())
    }

    /// The record whose primary key is `id`.
    #[tracing::instrument(level = "debug", skip(self, cx, id, columns), fields(entity = %self.entity.name()))]
    pub async fn find<S: AsRef<str>>(
        &self,
        cx: &Cx,
        id: impl Into<Value>,
        columns: &[S],
    ) -> Outcome<Option<Record>, Error> {
        let predicates = Predicates::new().and(try_result!(Predicate::eq(
            self.entity.primary_key(),
            id
        )));
        let records = try_outcome!(self.fetch(cx, &predicates, &owned(columns), true).await);
        Outcome::Ok(records.into_iter().next())
    }

    /// Records whose `field` equals `value`. `field` may be relation-qualified.
    pub async fn find_by_field<S: AsRef<str>>(
        &self,
        cx: &Cx,
        field: &str,
        value: impl Into<Value>,
        columns: &[S],
    ) -> Outcome<Vec<Record>, Error> {
        let predicates = Predicates::new().and(try_result!(Predicate::eq(field, value)));
        self.fetch(cx, &predicates, &owned(columns), false).await
    }

    /// Records matching every predicate.
    #[tracing::instrument(level = "debug", skip(self, cx, predicates, columns), fields(entity = %self.entity.name(), predicates = predicates.len()))]
    pub async fn find_where<S: AsRef<str>>(
        &self,
        cx: &Cx,
        predicates: &Predicates,
        columns: &[S],
    ) -> Outcome<Vec<Record>, Error> {
        self.fetch(cx, predicates, &owned(columns), false).await
    }

    /// Records whose `field` is one of `values`, plus `extra` predicates.
    pub async fn find_where_in<S: AsRef<str>>(
        &self,
        cx: &Cx,
        field: &str,
        values: Vec<Value>,
        columns: &[S],
        extra: &Predicates,
    ) -> Outcome<Vec<Record>, Error> {
        let predicates = try_result!(list_predicates(field, Operator::In, values, extra));
        self.fetch(cx, &predicates, &owned(columns), false).await
    }

    /// Records whose `field` is none of `values`, plus `extra` predicates.
    pub async fn find_where_not_in<S: AsRef<str>>(
        &self,
        cx: &Cx,
        field: &str,
        values: Vec<Value>,
        columns: &[S],
        extra: &Predicates,
    ) -> Outcome<Vec<Record>, Error> {
        let predicates = try_result!(list_predicates(field, Operator::NotIn, values, extra));
        self.fetch(cx, &predicates, &owned(columns), false).await
    }

    /// Number of rows in the table, ignoring sort and window.
    pub async fn count(&self, cx: &Cx) -> Outcome<u64, Error> {
        SelectQuery::new(self.entity.table())
            .count(cx, self.store.conn, &self.entity.qualified_key())
            .await
    }

    /// Page `page` (1-based) of `per_page` records with the table total.
    pub async fn paginate<S: AsRef<str>>(
        &self,
        cx: &Cx,
        per_page: u64,
        page: u64,
        columns: &[S],
    ) -> Outcome<Page, Error> {
        let per_page = per_page.max(1);
        let current_page = page.max(1);
        let total = try_outcome!(self.count(cx).await);
        let window = Window::page(current_page, per_page);
        let data = try_outcome!(
            self.clone()
                .limit(window.offset, window.length)
                .all(cx, columns)
                .await
        );
        Outcome::Ok(Page {
            data,
            total,
            per_page,
            current_page,
            last_page: total.div_ceil(per_page).max(1),
        })
    }

    /// The read pipeline shared by every query method.
    pub(crate) async fn fetch(
        &self,
        cx: &Cx,
        predicates: &Predicates,
        columns: &[String],
        first_only: bool,
    ) -> Outcome<Vec<Record>, Error> {
        let ctx = resolve_columns(self.entity, columns, self.view.as_deref());
        let base = SelectQuery::new(self.entity.table()).columns(ctx.columns());
        let window = if first_only {
            Some(Window::new(self.window.map_or(0, |w| w.offset), 1))
        } else {
            self.window
        };
        let plan = try_result!(compile(
            self.store.catalog,
            self.entity,
            base,
            predicates,
            self.sort.as_ref(),
            window,
        ));

        let conn = self.store.conn;
        let mut records: Vec<Record> = match plan {
            FilterPlan::Direct(query) => {
                let rows = try_outcome!(query.all(cx, conn).await);
                rows.into_iter().map(Record::from_row).collect()
            }
            FilterPlan::KeyRestricted { keys, base } => {
                let key_rows = try_outcome!(keys.all(cx, conn).await);
                if ctx.is_key_only(self.entity) {
                    key_rows.into_iter().map(Record::from_row).collect()
                } else {
                    let ids = distinct_values(key_rows.iter().filter_map(|row| row.get(0)));
                    if ids.is_empty() {
                        return Outcome::Ok(Vec::new());
                    }
                    let rows = try_outcome!(
                        base.where_in(self.entity.qualified_key(), ids.clone())
                            .all(cx, conn)
                            .await
                    );
                    let records = rows.into_iter().map(Record::from_row).collect();
                    order_by_keys(records, &ids, self.entity.primary_key())
                }
            }
        };

        try_outcome!(self.load_relations(cx, &mut records, &ctx).await);
        self.decorate(&mut records, &ctx);
        Outcome::Ok(records)
    }

    /// Date formatting, then computed attributes.
    fn decorate(&self, records: &mut [Record], ctx: &LoadContext) {
        let formats = self.store.config.date_formats();
        for record in records.iter_mut() {
            self.entity.format_dates(record, &formats);
            for name in ctx.computed() {
                if let Some(attribute) = self.entity.computed_attribute(name) {
                    let value = attribute.compute(record);
                    record.set_value(name.as_str(), value);
                }
            }
        }
    }

    // ==================== Writes ====================

    /// Insert one record and return its id.
    ///
    /// Only fillable attributes are written; date attributes are converted
    /// to the store format. Attributes named after a BelongsToMany relation
    /// are synced to the pivot table after the insert.
    #[tracing::instrument(level = "debug", skip(self, cx, attributes), fields(entity = %self.entity.name()))]
    pub async fn create(&self, cx: &Cx, attributes: &Record) -> Outcome<i64, Error> {
        let mut fill = try_result!(self.entity.fill(attributes, &self.store.config.date_formats()));
        self.stamp(&mut fill, true);
        let id = try_outcome!(
            InsertBuilder::new(self.entity.table())
                .record(&fill)
                .execute(cx, self.store.conn)
                .await
        );
        try_outcome!(self.sync_attributes(cx, Value::BigInt(id), attributes).await);
        tracing::debug!(entity = %self.entity.name(), id, "Created record");
        Outcome::Ok(id)
    }

    /// Insert several records in one statement and return rows affected.
    /// Relations are not synced.
    pub async fn create_many(&self, cx: &Cx, rows: &[Record]) -> Outcome<u64, Error> {
        let formats = self.store.config.date_formats();
        let mut insert = InsertBuilder::new(self.entity.table());
        for row in rows {
            let mut fill = try_result!(self.entity.fill(row, &formats));
            self.stamp(&mut fill, true);
            insert = insert.record(&fill);
        }
        insert.execute_many(cx, self.store.conn).await
    }

    /// Update the record `id` and return rows affected. BelongsToMany
    /// attributes are synced as in [`create`](Self::create).
    #[tracing::instrument(level = "debug", skip(self, cx, id, attributes), fields(entity = %self.entity.name()))]
    pub async fn update(
        &self,
        cx: &Cx,
        id: impl Into<Value>,
        attributes: &Record,
    ) -> Outcome<u64, Error> {
        let id = id.into();
        let mut fill = try_result!(self.entity.fill(attributes, &self.store.config.date_formats()));
        self.stamp(&mut fill, false);

        let mut update = UpdateBuilder::new(self.entity.table())
            .filter(Expr::col(self.entity.primary_key()).eq(id.clone()));
        for (name, attr) in fill.iter() {
            if let Some(value) = attr.as_value() {
                update = update.set(name, value.clone());
            }
        }
        let affected = try_outcome!(update.execute(cx, self.store.conn).await);
        try_outcome!(self.sync_attributes(cx, id, attributes).await);
        Outcome::Ok(affected)
    }

    /// Update the first record matching `matching` with `values`, or create
    /// one from `values` when nothing matches.
    pub async fn update_or_create(
        &self,
        cx: &Cx,
        matching: &Predicates,
        values: &Record,
    ) -> Outcome<Upserted, Error> {
        let pk = self.entity.primary_key().to_string();
        let existing = try_outcome!(
            self.unpaged()
                .fetch(cx, matching, std::slice::from_ref(&pk), true)
                .await
        );
        let id = existing
            .first()
            .and_then(|record| record.value(&pk))
            .filter(|value| !value.is_null())
            .cloned();
        match id {
            Some(id) => {
                let affected = try_outcome!(self.update(cx, id.clone(), values).await);
                Outcome::Ok(Upserted::Updated { id, affected })
            }
            None => {
                let id = try_outcome!(self.create(cx, values).await);
                Outcome::Ok(Upserted::Created(id))
            }
        }
    }

    /// Delete the record `id` and return rows affected.
    pub async fn delete(&self, cx: &Cx, id: impl Into<Value>) -> Outcome<u64, Error> {
        DeleteBuilder::new(self.entity.table())
            .filter(Expr::col(self.entity.primary_key()).eq(Expr::lit(id)))
            .execute(cx, self.store.conn)
            .await
    }

    /// Delete every record whose id is in `ids`.
    pub async fn delete_many(&self, cx: &Cx, ids: Vec<Value>) -> Outcome<u64, Error> {
        if ids.is_empty() {
            return Outcome::Ok(0);
        }
        DeleteBuilder::new(self.entity.table())
            .filter(Expr::col(self.entity.primary_key()).in_list(ids))
            .execute(cx, self.store.conn)
            .await
    }

    fn stamp(&self, fill: &mut Record, creating: bool) {
        if !self.entity.timestamps() {
            return;
        }
        let now = self.store.clock.timestamp();
        let config = &self.store.config;
        if creating {
            fill.set_value(config.created_at.as_str(), now.clone());
        }
        fill.set_value(config.updated_at.as_str(), now);
    }
}

fn owned<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    columns.iter().map(|c| c.as_ref().to_string()).collect()
}

fn list_predicates(
    field: &str,
    op: Operator,
    values: Vec<Value>,
    extra: &Predicates,
) -> Result<Predicates> {
    let mut predicates = Predicates::new().and(Predicate::new(field, op, Value::Array(values))?);
    for predicate in extra {
        predicates.push(predicate.clone());
    }
    Ok(predicates)
}

/// Distinct non-null values in first-seen order.
pub(crate) fn distinct_values<'v>(values: impl IntoIterator<Item = &'v Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|value| value.key().is_some_and(|key| seen.insert(key)))
        .cloned()
        .collect()
}

/// Reorder `records` to follow `keys`; records whose key is not listed go last.
pub(crate) fn order_by_keys(mut records: Vec<Record>, keys: &[Value], pk: &str) -> Vec<Record> {
    let positions: HashMap<ValueKey, usize> = keys
        .iter()
        .enumerate()
        .filter_map(|(i, value)| value.key().map(|key| (key, i)))
        .collect();
    records.sort_by_key(|record| {
        record
            .value(pk)
            .and_then(Value::key)
            .and_then(|key| positions.get(&key).copied())
            .unwrap_or(usize::MAX)
    });
    records
}
