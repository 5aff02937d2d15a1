//! Column resolution.
//!
//! Turns the caller's column list into the projection sent to SQL plus the
//! per-call [`LoadContext`]: which relations to load, which sub-paths to
//! load on them and which computed attributes to evaluate.

use crate::context::LoadContext;
use eagerly_core::{Entity, RelationKind};

/// Resolve `requested` (and optional view-derived columns) against `entity`.
///
/// The input is not modified. Names are handled as follows:
///
/// - `"*"` keeps the whole row and requests every fillable computed attribute
/// - a computed attribute is requested and its base columns are pulled in; it
///   is dropped from the projection unless it is also fillable
/// - a relation name, or a dotted path whose first segment is a relation,
///   activates that relation and records the rest of the path as an eager
///   sub-path
/// - a dotted path whose first segment is not a relation is kept as a
///   literal column reference
///
/// Without `"*"`, the primary key and the foreign key of every activated
/// BelongsTo relation are always selected, since the loader needs them to
/// stitch related records back.
pub fn resolve_columns<S: AsRef<str>>(
    entity: &Entity,
    requested: &[S],
    view: Option<&[String]>,
) -> LoadContext {
    let mut ctx = LoadContext::new();

    let mut names: Vec<String> = requested
        .iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if let Some(view) = view.filter(|v| !v.is_empty()) {
        if names.iter().any(|n| n == "*") {
            names = view.to_vec();
        } else {
            names.extend(view.iter().cloned());
        }
    }

    if names.iter().any(|n| n == "*") {
        for attribute in entity.computed() {
            if entity.is_fillable(attribute.name()) {
                ctx.request_computed(attribute.name());
                names.extend(attribute.depends_on().iter().cloned());
            }
        }
    }

    let mut base: Vec<String> = Vec::with_capacity(names.len());
    let mut pulled: Vec<String> = Vec::new();
    for name in names {
        if let Some(attribute) = entity.computed_attribute(&name) {
            ctx.request_computed(attribute.name());
            pulled.extend(attribute.depends_on().iter().cloned());
            if entity.is_fillable(&name) {
                base.push(name);
            }
            continue;
        }

        let (head, rest) = match name.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (name.as_str(), None),
        };
        if entity.relation(head).is_some() {
            ctx.activate(head);
            if let Some(rest) = rest {
                ctx.add_eager(head, rest);
            }
            continue;
        }
        if rest.is_some() {
            tracing::warn!(
                entity = %entity.name(),
                column = %name,
                "Dotted column does not start with a declared relation, passing through"
            );
        }
        base.push(name);
    }
    base.extend(pulled);

    if base.is_empty() || base.iter().any(|c| c == "*") {
        ctx.set_columns(vec![format!("{}.*", entity.table())]);
        return ctx;
    }

    base.push(entity.primary_key().to_string());
    let foreign_keys: Vec<String> = ctx
        .activated()
        .iter()
        .filter_map(|name| entity.relation(name))
        .filter(|rel| rel.kind() == RelationKind::BelongsTo)
        .filter_map(|rel| rel.foreign_key_name().map(str::to_string))
        .collect();
    base.extend(foreign_keys);

    let mut columns: Vec<String> = Vec::with_capacity(base.len());
    for name in base {
        let qualified = if name.contains('.') {
            name
        } else {
            format!("{}.{}", entity.table(), name)
        };
        if !columns.contains(&qualified) {
            columns.push(qualified);
        }
    }
    ctx.set_columns(columns);
    ctx
}
