//! Relation declarations between entities.
//!
//! Relations are registered explicitly by name on an entity descriptor.
//! Keys left unset at declaration time are filled in by convention when the
//! [`Catalog`](crate::catalog::Catalog) is built:
//!
//! | kind | foreign key default | other key default |
//! |------|---------------------|-------------------|
//! | BelongsTo | `snake(target table) + "_id"` on the declaring table | n/a |
//! | HasMany | `snake(declaring table) + "_id"` on the target table | n/a |
//! | BelongsToMany | `snake(declaring table) + "_id"` on the pivot | `snake(target table) + "_id"` on the pivot |

use crate::predicate::Predicates;
use convert_case::{Case, Casing};

/// The kind of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationKind {
    /// Single parent: the foreign key lives on the declaring table.
    BelongsTo,
    /// One-to-many: the foreign key lives on the target table.
    HasMany,
    /// Many-to-many through a pivot table.
    BelongsToMany,
}

impl RelationKind {
    /// Loading order within one pass.
    pub const fn load_rank(self) -> u8 {
        match self {
            RelationKind::BelongsTo => 0,
            RelationKind::HasMany => 1,
            RelationKind::BelongsToMany => 2,
        }
    }
}

/// A relation as declared on an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    BelongsTo {
        target: String,
        foreign_key: Option<String>,
        extra: Predicates,
    },
    HasMany {
        target: String,
        foreign_key: Option<String>,
        extra: Predicates,
    },
    BelongsToMany {
        target: String,
        pivot_table: String,
        foreign_key: Option<String>,
        other_foreign_key: Option<String>,
        extra: Predicates,
    },
}

impl Relation {
    pub fn belongs_to(target: impl Into<String>) -> Self {
        Relation::BelongsTo {
            target: target.into(),
            foreign_key: None,
            extra: Predicates::new(),
        }
    }

    pub fn has_many(target: impl Into<String>) -> Self {
        Relation::HasMany {
            target: target.into(),
            foreign_key: None,
            extra: Predicates::new(),
        }
    }

    pub fn belongs_to_many(target: impl Into<String>, pivot_table: impl Into<String>) -> Self {
        Relation::BelongsToMany {
            target: target.into(),
            pivot_table: pivot_table.into(),
            foreign_key: None,
            other_foreign_key: None,
            extra: Predicates::new(),
        }
    }

    /// Override the foreign key.
    pub fn foreign_key(mut self, key: impl Into<String>) -> Self {
        match &mut self {
            Relation::BelongsTo { foreign_key, .. }
            | Relation::HasMany { foreign_key, .. }
            | Relation::BelongsToMany { foreign_key, .. } => *foreign_key = Some(key.into()),
        }
        self
    }

    /// Override the pivot's other-side key. Ignored for non-pivot relations.
    pub fn other_foreign_key(mut self, key: impl Into<String>) -> Self {
        if let Relation::BelongsToMany {
            other_foreign_key, ..
        } = &mut self
        {
            *other_foreign_key = Some(key.into());
        }
        self
    }

    /// Extra predicates applied whenever the relation is loaded.
    pub fn filter(mut self, predicates: Predicates) -> Self {
        match &mut self {
            Relation::BelongsTo { extra, .. }
            | Relation::HasMany { extra, .. }
            | Relation::BelongsToMany { extra, .. } => *extra = predicates,
        }
        self
    }

    pub fn kind(&self) -> RelationKind {
        match self {
            Relation::BelongsTo { .. } => RelationKind::BelongsTo,
            Relation::HasMany { .. } => RelationKind::HasMany,
            Relation::BelongsToMany { .. } => RelationKind::BelongsToMany,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            Relation::BelongsTo { target, .. }
            | Relation::HasMany { target, .. }
            | Relation::BelongsToMany { target, .. } => target,
        }
    }

    pub fn extra(&self) -> &Predicates {
        match self {
            Relation::BelongsTo { extra, .. }
            | Relation::HasMany { extra, .. }
            | Relation::BelongsToMany { extra, .. } => extra,
        }
    }

    /// The pivot table, for BelongsToMany.
    pub fn pivot_table(&self) -> Option<&str> {
        match self {
            Relation::BelongsToMany { pivot_table, .. } => Some(pivot_table),
            _ => None,
        }
    }

    /// The foreign key, resolved or explicit. `None` only before the catalog
    /// has filled in defaults.
    pub fn foreign_key_name(&self) -> Option<&str> {
        match self {
            Relation::BelongsTo { foreign_key, .. }
            | Relation::HasMany { foreign_key, .. }
            | Relation::BelongsToMany { foreign_key, .. } => foreign_key.as_deref(),
        }
    }

    pub fn other_foreign_key_name(&self) -> Option<&str> {
        match self {
            Relation::BelongsToMany {
                other_foreign_key, ..
            } => other_foreign_key.as_deref(),
            _ => None,
        }
    }

    /// Fill conventional keys given the declaring and target tables.
    pub(crate) fn resolve_keys(&mut self, own_table: &str, target_table: &str) {
        match self {
            Relation::BelongsTo { foreign_key, .. } => {
                foreign_key.get_or_insert_with(|| conventional_key(target_table));
            }
            Relation::HasMany { foreign_key, .. } => {
                foreign_key.get_or_insert_with(|| conventional_key(own_table));
            }
            Relation::BelongsToMany {
                foreign_key,
                other_foreign_key,
                ..
            } => {
                foreign_key.get_or_insert_with(|| conventional_key(own_table));
                other_foreign_key.get_or_insert_with(|| conventional_key(target_table));
            }
        }
    }
}

/// `snake_case(table) + "_id"`.
pub fn conventional_key(table: &str) -> String {
    format!("{}_id", table.to_case(Case::Snake))
}

/// Relations of one entity, in declaration order, unique by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationMap {
    entries: Vec<(String, Relation)>,
}

impl RelationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation. Registering an existing name is a no-op and
    /// returns `false`.
    pub fn declare(&mut self, name: impl Into<String>, relation: Relation) -> bool {
        let name = name.into();
        if self.contains(&name) {
            tracing::trace!(relation = %name, "Relation already declared, keeping first declaration");
            return false;
        }
        self.entries.push((name, relation));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Relation> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, relation)| relation)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Relation)> {
        self.entries.iter_mut().map(|(n, r)| (n.as_str(), r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conventional_keys_are_snake_case() {
        assert_eq!(conventional_key("customers"), "customers_id");
        assert_eq!(conventional_key("OrderItems"), "order_items_id");
    }

    #[test]
    fn resolve_fills_only_missing_keys() {
        let mut belongs = Relation::belongs_to("countries");
        belongs.resolve_keys("customers", "countries");
        assert_eq!(belongs.foreign_key_name(), Some("countries_id"));

        let mut has_many = Relation::has_many("orders").foreign_key("customer_id");
        has_many.resolve_keys("customers", "orders");
        assert_eq!(has_many.foreign_key_name(), Some("customer_id"));

        let mut pivot = Relation::belongs_to_many("tags", "customer_tag");
        pivot.resolve_keys("customers", "tags");
        assert_eq!(pivot.foreign_key_name(), Some("customers_id"));
        assert_eq!(pivot.other_foreign_key_name(), Some("tags_id"));
    }

    #[test]
    fn declare_is_idempotent() {
        let mut map = RelationMap::new();
        assert!(map.declare("orders", Relation::has_many("orders")));
        assert!(!map.declare("orders", Relation::has_many("invoices")));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("orders").map(Relation::target), Some("orders"));
    }

    #[test]
    fn other_key_ignored_outside_pivots() {
        let rel = Relation::has_many("orders").other_foreign_key("x");
        assert_eq!(rel.other_foreign_key_name(), None);
        assert_eq!(rel.kind(), RelationKind::HasMany);
    }
}
