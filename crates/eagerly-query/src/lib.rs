//! SQL construction for eagerly.
//!
//! `eagerly-query` is the **query construction layer**. It turns column paths,
//! predicates and joins into SQL text plus positional parameters, rendered
//! for the [`Dialect`] reported by the connection.
//!
//! - `Expr` builds WHERE / ON / ORDER BY expressions; literals are always bound.
//! - `SelectQuery` composes joins (de-duplicated by alias), filters, grouping,
//!   ordering and a limit/offset window.
//! - `InsertBuilder`, `UpdateBuilder` and `DeleteBuilder` cover writes.
//!
//! Execution goes through the `Connection` trait from `eagerly-core`.

pub mod builder;
pub mod clause;
pub mod expr;
pub mod join;
pub mod select;

pub use builder::{DeleteBuilder, InsertBuilder, UpdateBuilder};
pub use clause::{Limit, Offset, OrderBy, OrderDirection, Where};
pub use eagerly_core::Dialect;
pub use expr::{BinaryOp, Expr};
pub use join::Join;
pub use select::SelectQuery;
