//! eagerly - relation-aware repositories with batched eager loading.
//!
//! Entities declare their relations once; callers then ask for columns and
//! relation paths together and get back plain [`Record`]s with related
//! records attached. Every statement is plain SQL sent through a
//! [`Connection`], and each requested relation costs one query per page of
//! results, not one per row.
//!
//! # Quick Start
//!
//! ```ignore
//! use eagerly::prelude::*;
//!
//! let catalog = Catalog::builder()
//!     .entity(
//!         Entity::builder("customers")
//!             .fillable(["name", "email"])
//!             .belongs_to("country", "countries")
//!             .has_many("orders", "orders")
//!             .belongs_to_many("tags", "tags", "customer_tag")
//!             .build(),
//!     )
//!     .entity(Entity::builder("countries").fillable(["name"]).build())
//!     .entity(Entity::builder("orders").fillable(["status", "customers_id"]).build())
//!     .entity(Entity::builder("tags").fillable(["label"]).build())
//!     .build()?;
//!
//! async fn example(cx: &Cx, conn: &impl Connection, catalog: &Catalog) {
//!     let store = Store::new(catalog, conn);
//!     let customers = store.repository("customers").unwrap();
//!
//!     // customers with a paid order, their country name and all their tags:
//!     // three statements plus one pivot query, whatever the page size
//!     let paid = Predicates::new().and(Predicate::eq("orders.status", "paid").unwrap());
//!     let page = customers
//!         .clone()
//!         .order_by("country.name", OrderDirection::Asc)
//!         .limit(0, 25)
//!         .find_where(cx, &paid, &["name", "country.name", "tags"])
//!         .await;
//! }
//! ```

pub use eagerly_core::{
    Attribute, Catalog, CatalogBuilder, Clock, ColumnInfo, ComputedAttribute, ConfigError, ConfigErrorKind,
    Connection, ConnectionError, ConnectionErrorKind, Cx, DateFormats, Dialect, Entity,
    EntityBuilder, Error, FieldValidationError, FileViewSource, FixedClock, Operator, Outcome,
    Predicate, Predicates, QueryError, QueryErrorKind, Record, Relation, RelationKind,
    RepositoryConfig, Result, Row, SystemClock, TypeError, ValidationError, ValidationErrorKind,
    Value, ViewSource, try_outcome, try_result,
};
pub use eagerly_query::{
    DeleteBuilder, Expr, InsertBuilder, Join, OrderBy, OrderDirection, SelectQuery,
    UpdateBuilder,
};
pub use eagerly_repo::{
    CountingConnection, GridColumn, GridOrder, GridRequest, GridResponse, GridSearch, LoadContext,
    LookupItem, LookupRequest, LookupResponse, Page, Repository, SearchResult, Sort,
    StatementStats, Store, SyncChanges, Upserted, Window,
};

/// Everything needed to declare entities and run repository calls.
pub mod prelude {
    pub use crate::{
        // asupersync
        Cx,
        Outcome,
        // Declarations
        Catalog,
        Entity,
        Relation,
        // Data
        Attribute,
        Record,
        Row,
        Value,
        // Store
        Connection,
        Error,
        Result,
        // Repository
        GridRequest,
        LookupRequest,
        OrderDirection,
        Predicate,
        Predicates,
        Repository,
        RepositoryConfig,
        Store,
    };
}
