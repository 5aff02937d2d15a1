//! Per-call relation state.
//!
//! A [`LoadContext`] is created by the column resolver for one repository
//! call and dropped when the call returns. Entities stay read-only; nothing
//! about which relations a call activated survives the call.

use eagerly_core::Entity;

/// Activated relations, eager sub-paths, requested computed attributes and
/// the base projection for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadContext {
    columns: Vec<String>,
    activated: Vec<String>,
    eager: Vec<(String, Vec<String>)>,
    computed: Vec<String>,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation for loading. Returns `false` if it was already
    /// registered; the second activation changes nothing.
    pub fn activate(&mut self, relation: impl Into<String>) -> bool {
        let relation = relation.into();
        if self.is_activated(&relation) {
            return false;
        }
        self.activated.push(relation);
        true
    }

    pub fn is_activated(&self, relation: &str) -> bool {
        self.activated.iter().any(|r| r == relation)
    }

    /// Activated relation names in activation order.
    pub fn activated(&self) -> &[String] {
        &self.activated
    }

    /// Record a sub-path to load on the related records of `relation`.
    pub fn add_eager(&mut self, relation: &str, path: impl Into<String>) {
        let path = path.into();
        match self.eager.iter_mut().find(|(name, _)| name == relation) {
            Some((_, paths)) => {
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
            None => self.eager.push((relation.to_string(), vec![path])),
        }
    }

    /// Sub-paths requested for `relation`, if any.
    pub fn eager_paths(&self, relation: &str) -> Option<&[String]> {
        self.eager
            .iter()
            .find(|(name, _)| name == relation)
            .map(|(_, paths)| paths.as_slice())
    }

    /// Mark a computed attribute as requested.
    pub fn request_computed(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.computed.contains(&name) {
            self.computed.push(name);
        }
    }

    pub fn computed(&self) -> &[String] {
        &self.computed
    }

    /// Qualified projection sent to SQL.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    /// Whether the call only wants the primary key of `entity` and no
    /// relation, so a key query can serve as the result query.
    pub fn is_key_only(&self, entity: &Entity) -> bool {
        self.activated.is_empty()
            && self.computed.is_empty()
            && self.columns.len() == 1
            && self.columns[0] == entity.qualified_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_is_idempotent() {
        let mut ctx = LoadContext::new();
        assert!(ctx.activate("orders"));
        assert!(!ctx.activate("orders"));
        assert!(ctx.activate("tags"));
        assert_eq!(ctx.activated(), ["orders", "tags"]);
    }

    #[test]
    fn eager_paths_are_grouped_per_relation() {
        let mut ctx = LoadContext::new();
        ctx.add_eager("orders", "status");
        ctx.add_eager("orders", "items.sku");
        ctx.add_eager("orders", "status");
        assert_eq!(ctx.eager_paths("orders"), Some(&["status".to_string(), "items.sku".to_string()][..]));
        assert_eq!(ctx.eager_paths("tags"), None);
    }

    #[test]
    fn key_only_requires_bare_primary_key() {
        let entity = Entity::builder("customers").build();
        let mut ctx = LoadContext::new();
        ctx.set_columns(vec!["customers.id".into()]);
        assert!(ctx.is_key_only(&entity));
        ctx.activate("orders");
        assert!(!ctx.is_key_only(&entity));
    }
}
