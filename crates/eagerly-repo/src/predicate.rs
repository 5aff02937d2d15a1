//! Filter planning.
//!
//! Predicates on the entity's own columns are applied to the base query as
//! they are. A predicate on a relation path cannot be, because joining a
//! HasMany or BelongsToMany relation multiplies base rows. In that case a
//! key query carries the joins and predicates, is grouped by the primary key
//! and paged; the base query is then restricted to the keys it returns.

use crate::join::set_join;
use crate::options::{Sort, Window};
use eagerly_core::{Catalog, Entity, Predicates, Result};
use eagerly_query::{Expr, OrderBy, OrderDirection, SelectQuery};

/// How a call's filters reach the store.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPlan {
    /// The base query carries predicates, sort and window.
    Direct(SelectQuery),
    /// `keys` selects the matching primary keys (grouped, sorted, paged);
    /// `base` must be restricted to them before it runs.
    KeyRestricted { keys: SelectQuery, base: SelectQuery },
}

/// Whether filtering or sorting needs joins, and therefore a key query.
pub fn needs_key_query(predicates: &Predicates, sort: Option<&Sort>) -> bool {
    predicates.any_qualified() || sort.is_some_and(Sort::is_qualified)
}

/// Plan `predicates`, `sort` and `window` over the `base` query of `entity`.
pub fn compile(
    catalog: &Catalog,
    entity: &Entity,
    base: SelectQuery,
    predicates: &Predicates,
    sort: Option<&Sort>,
    window: Option<Window>,
) -> Result<FilterPlan> {
    if !needs_key_query(predicates, sort) {
        let mut query = apply_predicates(catalog, entity, base, predicates)?;
        if let Some(sort) = sort {
            query = query.order_by(OrderBy::new(
                Expr::col(format!("{}.{}", entity.table(), sort.field)),
                sort.direction,
            ));
        }
        return Ok(FilterPlan::Direct(apply_window(query, window)));
    }

    let keys = SelectQuery::new(entity.table()).columns([entity.qualified_key()]);
    let keys = apply_predicates(catalog, entity, keys, predicates)?;
    let keys = keys.group_by(entity.qualified_key());
    let keys = apply_grouped_sort(catalog, entity, keys, sort)?;
    let keys = apply_window(keys, window);
    tracing::debug!(
        entity = %entity.name(),
        joins = keys.joins().len(),
        "Filtering through a key query"
    );
    Ok(FilterPlan::KeyRestricted { keys, base })
}

/// AND every predicate onto `query`. Own columns are qualified with the
/// table; relation paths are joined first.
pub fn apply_predicates(
    catalog: &Catalog,
    entity: &Entity,
    mut query: SelectQuery,
    predicates: &Predicates,
) -> Result<SelectQuery> {
    for predicate in predicates {
        let column = if predicate.is_qualified() {
            let (joined, column) = set_join(catalog, entity, query, predicate.field(), None)?;
            query = joined;
            column
        } else {
            format!("{}.{}", entity.table(), predicate.field())
        };
        query = query.filter(Expr::col(column).compare(predicate.op(), predicate.value().clone()));
    }
    Ok(query)
}

/// Order a query grouped by the primary key.
///
/// A relation column is not functionally dependent on the group key, so it
/// is aggregated: `MIN` for ascending, `MAX` for descending.
pub fn apply_grouped_sort(
    catalog: &Catalog,
    entity: &Entity,
    query: SelectQuery,
    sort: Option<&Sort>,
) -> Result<SelectQuery> {
    let Some(sort) = sort else {
        return Ok(query);
    };
    if !sort.is_qualified() {
        return Ok(query.order_by(OrderBy::new(
            Expr::col(format!("{}.{}", entity.table(), sort.field)),
            sort.direction,
        )));
    }
    let (query, column) = set_join(catalog, entity, query, &sort.field, None)?;
    let aggregate = match sort.direction {
        OrderDirection::Asc => Expr::min(Expr::col(column)),
        OrderDirection::Desc => Expr::max(Expr::col(column)),
    };
    Ok(query.order_by(OrderBy::new(aggregate, sort.direction)))
}

pub(crate) fn apply_window(query: SelectQuery, window: Option<Window>) -> SelectQuery {
    match window {
        Some(w) => query.limit(w.length).offset(w.offset),
        None => query,
    }
}
