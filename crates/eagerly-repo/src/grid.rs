//! Grid and type-ahead adapters.
//!
//! [`GridRequest`] is the server-side protocol of jQuery DataTables: a list
//! of columns, an order, a window and a search term. A column's `name` may
//! hold several dotted paths separated by `,`; the response then carries,
//! under the column's `data` key, every leaf value joined with the configured
//! separator ("virtual" columns).
//!
//! [`LookupRequest`] is the select2 paging protocol.

use crate::repository::Repository;
use crate::search::SearchResult;
use asupersync::{Cx, Outcome};
use eagerly_core::{
    Attribute, Connection, Error, Predicates, Record, Result, Value, ValidationErrorKind,
    try_outcome, try_result,
};
use eagerly_query::OrderDirection;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;

/// One grid column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridColumn {
    #[serde(default, deserialize_with = "string_or_number")]
    pub data: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GridColumn {
    pub fn new(data: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }

    /// `name` when set, `data` otherwise.
    pub fn source(&self) -> &str {
        if self.name.trim().is_empty() {
            self.data.trim()
        } else {
            self.name.trim()
        }
    }

    /// The dotted paths this column reads.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.source().split(',').map(str::trim).filter(|p| !p.is_empty())
    }

    fn is_virtual(&self) -> bool {
        !self.name.trim().is_empty() && !self.data.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridOrder {
    pub column: usize,
    #[serde(default)]
    pub dir: OrderDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridSearch {
    #[serde(default)]
    pub value: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A DataTables server-side request. Fields the engine does not read
/// (`draw`, ...) are kept in `extra` and echoed back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridRequest {
    #[serde(default)]
    pub columns: Vec<GridColumn>,
    #[serde(default)]
    pub order: Vec<GridOrder>,
    #[serde(default)]
    pub start: u64,
    /// Page length; negative means "all".
    #[serde(default = "all_rows")]
    pub length: i64,
    #[serde(default)]
    pub search: GridSearch,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn all_rows() -> i64 {
    -1
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridResponse {
    pub records_total: u64,
    pub records_filtered: u64,
    pub data: Vec<Record>,
    #[serde(flatten)]
    pub request: GridRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    #[serde(default)]
    pub q: String,
    pub field: String,
    #[serde(default = "first_page")]
    pub page: u64,
}

fn first_page() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupItem {
    pub id: serde_json::Value,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResponse {
    pub items: Vec<LookupItem>,
    pub total_count: u64,
}

impl<'a, C: Connection> Repository<'a, C> {
    /// Answer a grid request.
    ///
    /// `recordsTotal` counts the whole table; `recordsFiltered` counts what
    /// the search term and `predicates` leave, or equals the total when there
    /// are neither.
    #[tracing::instrument(level = "debug", skip(self, cx, request, predicates), fields(entity = %self.entity().name()))]
    pub async fn datatable(
        &self,
        cx: &Cx,
        request: GridRequest,
        predicates: &Predicates,
    ) -> Outcome<GridResponse, Error> {
        let paths = try_result!(grid_paths(&request));

        let sort = request
            .order
            .first()
            .and_then(|order| {
                request
                    .columns
                    .get(order.column)
                    .and_then(|column| column.paths().next())
                    .map(|field| (order.column, field.to_string(), order.dir))
            });
        let mut repository = self.clone();
        if let Some((_, field, dir)) = &sort {
            repository = repository.order_by(field.clone(), *dir);
        }
        if let Ok(length) = u64::try_from(request.length) {
            repository = repository.limit(request.start, length);
        }

        let SearchResult { mut records, filtered } = try_outcome!(
            repository
                .search(cx, &request.search.value, &paths, &paths, predicates)
                .await
        );

        let separator = self.store().config().virtual_separator.clone();
        for record in &mut records {
            for column in request.columns.iter().filter(|c| c.is_virtual()) {
                let mut values = Vec::new();
                for path in column.paths() {
                    try_result!(leaves(record, path, &mut values));
                }
                record.set_value(column.data.trim(), values.join(&separator));
            }
        }

        if let Some((index, field, dir)) = &sort {
            if field.contains('.') {
                let key = request.columns[*index].data.trim();
                sort_by_attribute(&mut records, key, *dir);
            }
        }

        let total = try_outcome!(self.count(cx).await);
        Outcome::Ok(GridResponse {
            records_total: total,
            records_filtered: filtered.unwrap_or(total),
            data: records,
            request,
        })
    }

    /// Answer a type-ahead request: page `page` of records whose `field`
    /// contains `q`, ordered by `field`.
    #[tracing::instrument(level = "debug", skip(self, cx, request), fields(entity = %self.entity().name(), field = %request.field))]
    pub async fn lookup(&self, cx: &Cx, request: &LookupRequest) -> Outcome<LookupResponse, Error> {
        let per_page = self.store().config().lookup_page_size.max(1);
        let page = request.page.max(1);
        let primary_key = self.entity().primary_key();
        let field = request.field.trim();

        let SearchResult { records, filtered } = try_outcome!(
            self.clone()
                .limit((page - 1) * per_page, per_page)
                .order_by(field, OrderDirection::Asc)
                .search(cx, &request.q, &[field], &[primary_key, field], &Predicates::new())
                .await
        );
        let total_count = match filtered {
            Some(n) => n,
            None => try_outcome!(self.count(cx).await),
        };

        let separator = &self.store().config().virtual_separator;
        let mut items = Vec::with_capacity(records.len());
        for record in &records {
            let mut values = Vec::new();
            try_result!(leaves(record, field, &mut values));
            items.push(LookupItem {
                id: record.value(primary_key).map_or(serde_json::Value::Null, Value::to_json),
                text: values.join(separator),
            });
        }
        Outcome::Ok(LookupResponse { items, total_count })
    }
}

/// Every path the grid columns read, deduplicated in column order.
fn grid_paths(request: &GridRequest) -> Result<Vec<String>> {
    let mut paths: Vec<String> = Vec::new();
    for path in request.columns.iter().flat_map(GridColumn::paths) {
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
    }
    if paths.is_empty() {
        return Err(Error::validation(
            "columns",
            ValidationErrorKind::Shape,
            "grid request has no usable columns",
        ));
    }
    Ok(paths)
}

/// Collect the text of every scalar reached by `path` from `record`,
/// walking through single and multi-valued relations. Nulls and missing
/// attributes contribute nothing.
fn leaves(record: &Record, path: &str, out: &mut Vec<String>) -> Result<()> {
    match path.split_once('.') {
        Some((head, rest)) => match record.get(head) {
            Some(Attribute::One(Some(related))) => leaves(related, rest, out),
            Some(Attribute::Many(related)) => {
                for item in related {
                    leaves(item, rest, out)?;
                }
                Ok(())
            }
            _ => Ok(()),
        },
        None => match record.get(path) {
            Some(Attribute::Value(value)) => {
                if let Some(text) = value.to_text() {
                    out.push(text);
                }
                Ok(())
            }
            Some(_) => Err(Error::validation(
                path,
                ValidationErrorKind::Leaf,
                format!("'{path}' is a relation; name one of its columns"),
            )),
            None => Ok(()),
        },
    }
}

fn sort_by_attribute(records: &mut [Record], name: &str, direction: OrderDirection) {
    records.sort_by(|a, b| {
        let ordering = match (a.value(name), b.value(name)) {
            (Some(x), Some(y)) => x.sort_cmp(y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        match direction {
            OrderDirection::Asc => ordering,
            OrderDirection::Desc => ordering.reverse(),
        }
    });
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}
