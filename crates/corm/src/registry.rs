//! Model registry.
//!
//! Holds every registered [`Entity`], enforces the one-primary-key rule and
//! the capacity limit, and resolves relationship targets (by table name)
//! into registry indices.

use std::any::{Any, TypeId};

use corm_common::CormError;
use rustc_hash::FxHashMap;

use crate::model::Entity;

/// Default registry capacity.
pub const DEFAULT_MAX_MODELS: usize = 128;

#[derive(Debug)]
pub struct Registry {
    entities: Vec<Entity>,
    by_type: FxHashMap<TypeId, usize>,
    by_table: FxHashMap<String, usize>,
    max_models: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MODELS)
    }
}

impl Registry {
    pub fn new(max_models: usize) -> Self {
        Registry {
            entities: Vec::new(),
            by_type: FxHashMap::default(),
            by_table: FxHashMap::default(),
            max_models,
        }
    }

    /// Add an entity and resolve its primary key.
    ///
    /// Fails with a schema error unless exactly one field is flagged as
    /// primary key, and with a capacity error once `max_models` entities
    /// are registered. Registering a type again returns its existing index.
    pub fn register(&mut self, mut entity: Entity) -> Result<usize, CormError> {
        match entity.primary_key_count() {
            1 => {}
            0 => {
                return Err(CormError::schema(format!(
                    "Model '{}' must have exactly one PRIMARY_KEY field",
                    entity.table()
                )))
            }
            n => {
                return Err(CormError::schema(format!(
                    "Model '{}' has {} PRIMARY_KEY fields, expected 1",
                    entity.table(),
                    n
                )))
            }
        }

        if let Some(&idx) = self.by_type.get(&entity.type_id()) {
            return Ok(idx);
        }

        if self.entities.len() >= self.max_models {
            return Err(CormError::capacity(format!(
                "Maximum number of models ({}) reached",
                self.max_models
            )));
        }

        entity.primary_key = entity.fields().iter().position(|f| f.is_primary_key());

        let idx = self.entities.len();
        self.by_type.insert(entity.type_id(), idx);
        self.by_table.insert(entity.table().to_string(), idx);
        tracing::debug!(table = entity.table(), fields = entity.fields().len(), "registered model");
        self.entities.push(entity);
        Ok(idx)
    }

    /// Point every relationship field at its registered target.
    ///
    /// Idempotent. Fails with a schema error naming the first target that
    /// is not registered or is registered under a different Rust type.
    pub fn resolve_relationships(&mut self) -> Result<(), CormError> {
        let mut links = Vec::new();
        for (e_idx, entity) in self.entities.iter().enumerate() {
            for (f_idx, field) in entity.fields().iter().enumerate() {
                let Some(rel) = field.relation_info() else {
                    continue;
                };
                let Some(&target) = self.by_table.get(&rel.target) else {
                    return Err(CormError::schema(format!(
                        "Model '{}' field '{}': unresolved relationship target '{}'",
                        entity.table(),
                        field.name(),
                        rel.target
                    )));
                };
                if self.entities[target].type_id() != rel.target_type {
                    return Err(CormError::schema(format!(
                        "Model '{}' field '{}': target '{}' is registered as {}",
                        entity.table(),
                        field.name(),
                        rel.target,
                        self.entities[target].type_name()
                    )));
                }
                links.push((e_idx, f_idx, target));
            }
        }

        for (e_idx, f_idx, target) in links {
            if let Some(rel) = self.entities[e_idx].fields_mut()[f_idx].relation_mut() {
                rel.resolved = Some(target);
            }
        }
        Ok(())
    }

    pub fn get(&self, idx: usize) -> Option<&Entity> {
        self.entities.get(idx)
    }

    /// Index of the entity registered for `T`.
    pub fn index_of<T: Any>(&self) -> Result<usize, CormError> {
        self.by_type.get(&TypeId::of::<T>()).copied().ok_or_else(|| {
            CormError::schema(format!(
                "Model '{}' is not registered",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn by_table(&self, table: &str) -> Option<usize> {
        self.by_table.get(table).copied()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn max_models(&self) -> usize {
        self.max_models
    }
}
