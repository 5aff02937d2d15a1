//! The entity catalog: every descriptor, with relations resolved.

use crate::entity::Entity;
use crate::error::{ConfigErrorKind, Error, Result};
use std::collections::HashMap;

/// Registry of entity descriptors.
///
/// Building a catalog checks every relation once: its target must be
/// registered and its name must not shadow a column or computed attribute.
/// Conventional keys are filled in at the same time, so every
/// [`Relation`](crate::relation::Relation) read from a built catalog has its keys set.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: HashMap<String, Entity>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Look up an entity by name.
    pub fn entity(&self, name: &str) -> Result<&Entity> {
        self.entities.get(name).ok_or_else(|| {
            Error::config(
                ConfigErrorKind::UnknownEntity,
                format!("entity '{name}' is not registered"),
            )
        })
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Collects entities, then validates and resolves them in [`build`](Self::build).
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    entities: Vec<Entity>,
}

impl CatalogBuilder {
    pub fn entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn build(self) -> Result<Catalog> {
        let mut tables: HashMap<String, String> = HashMap::with_capacity(self.entities.len());
        for entity in &self.entities {
            if tables
                .insert(entity.name().to_string(), entity.table().to_string())
                .is_some()
            {
                return Err(Error::config(
                    ConfigErrorKind::DuplicateEntity,
                    format!("entity '{}' registered twice", entity.name()),
                ));
            }
        }

        let mut entities = HashMap::with_capacity(self.entities.len());
        for mut entity in self.entities {
            let own_table = entity.table().to_string();
            let collisions: Vec<String> = entity
                .relations()
                .iter()
                .filter(|(name, _)| {
                    *name == entity.primary_key()
                        || entity.is_fillable(name)
                        || entity.computed_attribute(name).is_some()
                })
                .map(|(name, _)| name.to_string())
                .collect();
            if let Some(name) = collisions.first() {
                return Err(Error::config(
                    ConfigErrorKind::NameCollision,
                    format!(
                        "relation '{}' on entity '{}' collides with a column or computed attribute",
                        name,
                        entity.name()
                    ),
                ));
            }

            let entity_name = entity.name().to_string();
            for (name, relation) in entity.relations_mut().iter_mut() {
                let Some(target_table) = tables.get(relation.target()) else {
                    return Err(Error::config(
                        ConfigErrorKind::UnknownTarget,
                        format!(
                            "relation '{}' on entity '{}' targets unknown entity '{}'",
                            name,
                            entity_name,
                            relation.target()
                        ),
                    ));
                };
                relation.resolve_keys(&own_table, target_table);
            }

            tracing::debug!(
                entity = %entity_name,
                table = %own_table,
                relations = entity.relations().len(),
                "Registered entity"
            );
            entities.insert(entity_name, entity);
        }

        Ok(Catalog { entities })
    }
}
