//! The repository engine of eagerly.
//!
//! A [`Repository`] reads and writes one entity. Reads take a column list
//! that may name relations and relation paths (`"country.name"`,
//! `"orders.items"`); the engine resolves it into a minimal projection,
//! plans filters on relation paths through a grouped key query so joins
//! never duplicate rows, and then loads every requested relation for the
//! whole page in one query per relation (two for BelongsToMany).
//!
//! - [`resolve_columns`] / [`LoadContext`]: what to select and load
//! - [`compile`] / [`set_join`]: filters, sorts and relation joins
//! - [`Repository::search`], [`Repository::datatable`], [`Repository::lookup`]:
//!   search and grid adapters
//! - [`Repository::sync`]: pivot-table synchronisation
//! - [`CountingConnection`]: statement accounting

pub mod columns;
pub mod context;
pub mod grid;
pub mod instrument;
pub mod join;
mod loader;
pub mod options;
pub mod predicate;
pub mod repository;
pub mod search;
pub mod sync;

#[cfg(test)]
mod testing;

pub use columns::resolve_columns;
pub use context::LoadContext;
pub use grid::{
    GridColumn, GridOrder, GridRequest, GridResponse, GridSearch, LookupItem, LookupRequest,
    LookupResponse,
};
pub use instrument::{CountingConnection, StatementStats};
pub use join::set_join;
pub use options::{Sort, Window};
pub use predicate::{FilterPlan, compile, needs_key_query};
pub use repository::{Page, Repository, Store, Upserted};
pub use search::SearchResult;
pub use sync::SyncChanges;
