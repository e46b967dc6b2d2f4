use std::collections::HashMap;
use std::sync::Mutex;

use super::{AssetResolver, ModelAsset, ModelRef, TextureSet};
use crate::error::AssetLoadError;
use crate::scene::Aabb;

#[derive(Debug, Clone)]
enum Entry {
    Model {
        bounds: Aabb,
        nodes: Vec<String>,
        texture_sets: Vec<TextureSet>,
    },
    /// Present but unparsable
    Broken(String),
}

/// In-memory asset resolver for headless sessions and tests
#[derive(Debug, Default)]
pub struct CatalogAssets {
    entries: HashMap<ModelRef, Entry>,
    releases: Mutex<HashMap<ModelRef, usize>>,
}

impl CatalogAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model with its bounds and node names
    pub fn with_model(mut self, model: impl Into<ModelRef>, bounds: Aabb, nodes: &[&str]) -> Self {
        self.entries.insert(
            model.into(),
            Entry::Model {
                bounds,
                nodes: nodes.iter().map(|n| n.to_string()).collect(),
                texture_sets: Vec::new(),
            },
        );
        self
    }

    /// Attach a texture set to a registered model
    pub fn with_texture_set(mut self, model: impl Into<ModelRef>, set: TextureSet) -> Self {
        if let Some(Entry::Model { texture_sets, .. }) = self.entries.get_mut(&model.into()) {
            texture_sets.push(set);
            texture_sets.sort_by(|a, b| a.id.cmp(&b.id));
        }
        self
    }

    /// Register a model that fails to parse
    pub fn with_broken_model(mut self, model: impl Into<ModelRef>, message: &str) -> Self {
        self.entries
            .insert(model.into(), Entry::Broken(message.to_string()));
        self
    }

    /// Registered models, sorted
    pub fn models(&self) -> Vec<ModelRef> {
        let mut models: Vec<ModelRef> = self.entries.keys().cloned().collect();
        models.sort();
        models
    }

    /// How many times `release` was called for a model
    pub fn release_count(&self, model: &ModelRef) -> usize {
        self.releases
            .lock()
            .map(|r| r.get(model).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl AssetResolver for CatalogAssets {
    fn resolve(&self, model: &ModelRef) -> Result<ModelAsset, AssetLoadError> {
        match self.entries.get(model) {
            Some(Entry::Model { bounds, nodes, .. }) => Ok(ModelAsset {
                model: model.clone(),
                bounds: *bounds,
                nodes: nodes.clone(),
            }),
            Some(Entry::Broken(message)) => Err(AssetLoadError::Parse {
                model: model.to_string(),
                message: message.clone(),
            }),
            None => Err(AssetLoadError::NotFound(model.to_string())),
        }
    }

    fn texture_sets(&self, model: &ModelRef) -> Vec<TextureSet> {
        match self.entries.get(model) {
            Some(Entry::Model { texture_sets, .. }) => texture_sets.clone(),
            _ => Vec::new(),
        }
    }

    fn release(&self, model: &ModelRef) {
        if let Ok(mut releases) = self.releases.lock() {
            *releases.entry(model.clone()).or_insert(0) += 1;
        }
    }
}
