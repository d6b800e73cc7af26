//! Registry of available embedding models.
//!
//! Built once at startup and read-only afterwards; share it behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{EmbeddingError, Result};
use crate::model::EmbeddingModel;

/// Models keyed by id, plus aliases resolving to those ids.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<dyn EmbeddingModel>>,
    aliases: HashMap<String, String>,
}

impl ModelRegistry {
    /// Start building a registry.
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    /// Look up a model by id or alias.
    pub fn get(&self, name: &str) -> Result<Arc<dyn EmbeddingModel>> {
        let id = self.aliases.get(name).map_or(name, String::as_str);
        self.models
            .get(id)
            .cloned()
            .ok_or_else(|| EmbeddingError::UnknownModel(name.to_string()))
    }

    /// Resolve an id or alias to the canonical model id.
    pub fn resolve_id(&self, name: &str) -> Result<&str> {
        let id = self.aliases.get(name).map_or(name, String::as_str);
        self.models
            .get_key_value(id)
            .map(|(id, _)| id.as_str())
            .ok_or_else(|| EmbeddingError::UnknownModel(name.to_string()))
    }

    /// All registered model ids, sorted.
    pub fn model_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.models.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Aliases pointing at `model_id`, sorted.
    pub fn aliases_for(&self, model_id: &str) -> Vec<&str> {
        let mut aliases: Vec<&str> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == model_id)
            .map(|(alias, _)| alias.as_str())
            .collect();
        aliases.sort_unstable();
        aliases
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Builder for [`ModelRegistry`].
#[derive(Default)]
pub struct ModelRegistryBuilder {
    registry: ModelRegistry,
}

impl ModelRegistryBuilder {
    /// Register a model under its own id. A later registration with the same
    /// id replaces the earlier one.
    pub fn register(mut self, model: Arc<dyn EmbeddingModel>) -> Self {
        let id = model.model_id().to_string();
        if self.registry.models.insert(id.clone(), model).is_some() {
            warn!("Replacing previously registered embedding model: {id}");
        } else {
            debug!("Registered embedding model: {id}");
        }
        self
    }

    /// Register an alias for a model id.
    pub fn alias(mut self, alias: impl Into<String>, model_id: impl Into<String>) -> Self {
        self.registry.aliases.insert(alias.into(), model_id.into());
        self
    }

    /// Finish building. Every alias must point at a registered model.
    pub fn build(self) -> Result<ModelRegistry> {
        for (alias, target) in &self.registry.aliases {
            if !self.registry.models.contains_key(target) {
                return Err(EmbeddingError::Validation(format!(
                    "alias {alias} points at unregistered model {target}"
                )));
            }
        }
        Ok(self.registry)
    }
}
