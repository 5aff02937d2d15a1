//! Core types and traits for eagerly.
//!
//! This crate provides the foundations the repository engine is built on:
//!
//! - `Value`, `Row` and `Record` for data moving in and out of the store
//! - `Entity`, `Relation` and `Catalog` for declaring tables and relations
//! - `Predicate` for validated filter conditions
//! - `Connection` trait for the store
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod catalog;
pub mod clock;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod predicate;
pub mod record;
pub mod relation;
pub mod row;
pub mod value;
pub mod view;

pub use catalog::{Catalog, CatalogBuilder};
pub use clock::{Clock, FixedClock, SystemClock, TIMESTAMP_FORMAT};
pub use config::RepositoryConfig;
pub use connection::Connection;
pub use dialect::Dialect;
pub use entity::{ComputedAttribute, DateFormats, Entity, EntityBuilder};
pub use error::{
    ConfigError, ConfigErrorKind, ConnectionError, ConnectionErrorKind, Error,
    FieldValidationError, QueryError, QueryErrorKind, Result, TypeError, ValidationError,
    ValidationErrorKind,
};
pub use predicate::{Operator, Predicate, Predicates};
pub use record::{Attribute, Record};
pub use relation::{Relation, RelationKind, RelationMap, conventional_key};
pub use row::{ColumnInfo, Row};
pub use value::{Value, ValueKey};
pub use view::{FileViewSource, ViewSource, columns_mentioned};
