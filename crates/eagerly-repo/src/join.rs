//! Join compilation for relation paths.
//!
//! Filters, searches and sorts on `relation.field` need the related table in
//! the query. [`set_join`] walks a dotted path one relation at a time,
//! adding one aliased LEFT JOIN per relation (two for BelongsToMany, through
//! the pivot table), and returns the `alias.column` reference to use.

use eagerly_core::{Catalog, ConfigErrorKind, Entity, Error, Relation, Result};
use eagerly_query::{Expr, Join, SelectQuery};

/// Join every relation segment of `path` onto `query`.
///
/// `alias` is the name `entity`'s table goes by in the query; the base
/// table when `None`. Each joined table is aliased with its relation name,
/// and a join whose alias already exists is not added again. The returned
/// column is `alias.column` of the last relation, or `path` unchanged when
/// its first segment is not a relation of `entity`.
pub fn set_join(
    catalog: &Catalog,
    entity: &Entity,
    query: SelectQuery,
    path: &str,
    alias: Option<&str>,
) -> Result<(SelectQuery, String)> {
    let source = alias.unwrap_or(entity.table());

    let Some((head, rest)) = path.split_once('.') else {
        return Ok((query, format!("{source}.{path}")));
    };

    let Some(relation) = entity.relation(head) else {
        tracing::warn!(
            entity = %entity.name(),
            path = %path,
            "Path does not start with a declared relation, using it as a column"
        );
        return Ok((query, path.to_string()));
    };
    let target = catalog.get(relation.target()).ok_or_else(|| {
        Error::config(
            ConfigErrorKind::UnknownTarget,
            format!(
                "relation '{head}' on entity '{}' targets unknown entity '{}'",
                entity.name(),
                relation.target()
            ),
        )
    })?;

    let query = if query.has_join(head) {
        query
    } else {
        join_relation(query, entity, source, head, relation, target)?
    };

    set_join(catalog, target, query, rest, Some(head))
}

fn join_relation(
    query: SelectQuery,
    entity: &Entity,
    source: &str,
    name: &str,
    relation: &Relation,
    target: &Entity,
) -> Result<SelectQuery> {
    let foreign_key = relation.foreign_key_name().ok_or_else(|| unresolved(entity, name))?;
    tracing::trace!(relation = %name, kind = ?relation.kind(), "Adding relation join");

    let query = match relation {
        Relation::BelongsTo { .. } => query.join(
            Join::left(
                target.table(),
                Expr::qualified(name, target.primary_key())
                    .eq(Expr::qualified(source, foreign_key)),
            )
            .alias(name),
        ),
        Relation::HasMany { .. } => query.join(
            Join::left(
                target.table(),
                Expr::qualified(name, foreign_key).eq(Expr::qualified(source, entity.primary_key())),
            )
            .alias(name),
        ),
        Relation::BelongsToMany { pivot_table, .. } => {
            let other_key = relation
                .other_foreign_key_name()
                .ok_or_else(|| unresolved(entity, name))?;
            query
                .join(Join::left(
                    pivot_table.as_str(),
                    Expr::qualified(pivot_table.as_str(), foreign_key)
                        .eq(Expr::qualified(source, entity.primary_key())),
                ))
                .join(
                    Join::left(
                        target.table(),
                        Expr::qualified(name, target.primary_key())
                            .eq(Expr::qualified(pivot_table.as_str(), other_key)),
                    )
                    .alias(name),
                )
        }
    };
    Ok(query)
}

fn unresolved(entity: &Entity, relation: &str) -> Error {
    Error::config(
        ConfigErrorKind::Invalid,
        format!(
            "relation '{relation}' on entity '{}' has no resolved keys; build entities through a Catalog",
            entity.name()
        ),
    )
}
