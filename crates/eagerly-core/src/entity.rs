//! Entity descriptors.
//!
//! An [`Entity`] describes one table: its primary key, which attributes are
//! writable, which are dates, which computed attributes it can derive, and
//! which relations it declares. Descriptors are built once and shared
//! read-only through a [`Catalog`](crate::catalog::Catalog).

use crate::error::{Error, Result, ValidationErrorKind};
use crate::record::Record;
use crate::relation::{Relation, RelationMap};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fmt;
use std::sync::Arc;

/// Function computing a derived attribute from a loaded record.
pub type ComputeFn = Arc<dyn Fn(&Record) -> Value + Send + Sync>;

/// A computed attribute and the base columns it reads.
#[derive(Clone)]
pub struct ComputedAttribute {
    name: String,
    depends_on: Vec<String>,
    compute: ComputeFn,
}

impl ComputedAttribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extra base columns that must be selected for this attribute.
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    /// Evaluate against a record.
    pub fn compute(&self, record: &Record) -> Value {
        (self.compute)(record)
    }
}

impl fmt::Debug for ComputedAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedAttribute")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

/// chrono format strings for date attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormats {
    /// Format applied when reading a date attribute.
    pub get: String,
    /// Format applied when writing a date attribute.
    pub store: String,
}

impl Default for DateFormats {
    fn default() -> Self {
        Self {
            get: "%Y-%m-%d".to_string(),
            store: "%Y-%m-%d".to_string(),
        }
    }
}

/// Input layouts accepted for date attributes on write, after `/` has been
/// normalized to `-`.
const DATE_INPUT_LAYOUTS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%m-%d-%Y"];
const DATETIME_INPUT_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d-%m-%Y %H:%M:%S",
];

/// Descriptor of one table-backed entity.
#[derive(Debug, Clone)]
pub struct Entity {
    name: String,
    table: String,
    primary_key: String,
    fillable: Vec<String>,
    dates: Vec<String>,
    date_formats: Option<DateFormats>,
    timestamps: bool,
    computed: Vec<ComputedAttribute>,
    relations: RelationMap,
}

impl Entity {
    /// Start describing the entity stored in `table`. The entity is
    /// registered under the table name unless [`EntityBuilder::name`] is set.
    pub fn builder(table: impl Into<String>) -> EntityBuilder {
        let table = table.into();
        EntityBuilder {
            entity: Entity {
                name: table.clone(),
                table,
                primary_key: "id".to_string(),
                fillable: Vec::new(),
                dates: Vec::new(),
                date_formats: None,
                timestamps: false,
                computed: Vec::new(),
                relations: RelationMap::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// `table.pk`.
    pub fn qualified_key(&self) -> String {
        format!("{}.{}", self.table, self.primary_key)
    }

    pub fn fillable(&self) -> &[String] {
        &self.fillable
    }

    pub fn is_fillable(&self, name: &str) -> bool {
        self.fillable.iter().any(|f| f == name)
    }

    pub fn dates(&self) -> &[String] {
        &self.dates
    }

    pub fn is_date(&self, name: &str) -> bool {
        self.dates.iter().any(|d| d == name)
    }

    /// Per-entity date formats, if overridden.
    pub fn date_formats(&self) -> Option<&DateFormats> {
        self.date_formats.as_ref()
    }

    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    pub fn computed(&self) -> &[ComputedAttribute] {
        &self.computed
    }

    pub fn computed_attribute(&self, name: &str) -> Option<&ComputedAttribute> {
        self.computed.iter().find(|c| c.name == name)
    }

    pub fn relations(&self) -> &RelationMap {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub(crate) fn relations_mut(&mut self) -> &mut RelationMap {
        &mut self.relations
    }

    /// Keep only fillable attributes (all of them when nothing is declared
    /// fillable) and convert date attributes to the store format.
    pub fn fill(&self, attributes: &Record, formats: &DateFormats) -> Result<Record> {
        let formats = self.date_formats.as_ref().unwrap_or(formats);
        let mut out = Record::new();
        for (name, attr) in attributes.iter() {
            let Some(value) = attr.as_value() else {
                continue;
            };
            if !self.fillable.is_empty() && !self.is_fillable(name) {
                continue;
            }
            if self.is_date(name) {
                out.set_value(name, store_date(name, value, &formats.store)?);
            } else {
                out.set_value(name, value.clone());
            }
        }
        Ok(out)
    }

    /// Convert every date attribute present on `record` to the get format.
    /// Values that do not parse as dates are left untouched.
    pub fn format_dates(&self, record: &mut Record, formats: &DateFormats) {
        let formats = self.date_formats.as_ref().unwrap_or(formats);
        for name in &self.dates {
            let Some(Value::Text(raw)) = record.value(name).cloned() else {
                continue;
            };
            match parse_stored(&raw) {
                Some(dt) => {
                    let formatted = dt.format(&formats.get).to_string();
                    record.set_value(name.as_str(), formatted);
                }
                None => {
                    tracing::debug!(attribute = %name, value = %raw, "Date attribute did not parse, leaving as stored");
                }
            }
        }
    }
}

fn store_date(field: &str, value: &Value, store_format: &str) -> Result<Value> {
    let raw = match value {
        Value::Null => return Ok(Value::Null),
        Value::Text(s) if s.trim().is_empty() => return Ok(Value::Null),
        Value::Text(s) => s.replace('/', "-"),
        other => {
            return Err(Error::validation(
                field,
                ValidationErrorKind::Date,
                format!("expected a date string, got {}", other.type_name()),
            ));
        }
    };
    let raw = raw.trim();
    let parsed = DATETIME_INPUT_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .or_else(|| {
            DATE_INPUT_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDate::parse_from_str(raw, layout).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()));
    match parsed {
        Some(dt) => Ok(Value::Text(dt.format(store_format).to_string())),
        None => Err(Error::validation(
            field,
            ValidationErrorKind::Date,
            format!("'{raw}' is not a recognized date"),
        )),
    }
}

fn parse_stored(raw: &str) -> Option<NaiveDateTime> {
    DATETIME_INPUT_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
}

/// Builder for [`Entity`].
#[derive(Debug)]
pub struct EntityBuilder {
    entity: Entity,
}

impl EntityBuilder {
    /// Register the entity under a name other than its table.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.entity.name = name.into();
        self
    }

    pub fn primary_key(mut self, pk: impl Into<String>) -> Self {
        self.entity.primary_key = pk.into();
        self
    }

    pub fn fillable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity.fillable.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn dates<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity.dates.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn date_formats(mut self, get: impl Into<String>, store: impl Into<String>) -> Self {
        self.entity.date_formats = Some(DateFormats {
            get: get.into(),
            store: store.into(),
        });
        self
    }

    /// Maintain `created_at` / `updated_at` on writes.
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.entity.timestamps = enabled;
        self
    }

    /// Declare a computed attribute reading `depends_on` base columns.
    pub fn computed<I, S, F>(mut self, name: impl Into<String>, depends_on: I, compute: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Record) -> Value + Send + Sync + 'static,
    {
        let name = name.into();
        if self.entity.computed.iter().any(|c| c.name == name) {
            return self;
        }
        self.entity.computed.push(ComputedAttribute {
            name,
            depends_on: depends_on.into_iter().map(Into::into).collect(),
            compute: Arc::new(compute),
        });
        self
    }

    /// Declare a relation by name. A second declaration with the same name
    /// is ignored.
    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.entity.relations.declare(name, relation);
        self
    }

    pub fn belongs_to(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relation(name, Relation::belongs_to(target))
    }

    pub fn has_many(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relation(name, Relation::has_many(target))
    }

    pub fn belongs_to_many(
        self,
        name: impl Into<String>,
        target: impl Into<String>,
        pivot_table: impl Into<String>,
    ) -> Self {
        self.relation(name, Relation::belongs_to_many(target, pivot_table))
    }

    pub fn build(self) -> Entity {
        self.entity
    }
}
