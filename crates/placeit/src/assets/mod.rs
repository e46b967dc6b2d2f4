//! Asset resolution: model geometry and pre-baked texture sets.
//!
//! The core never reads asset files directly. It goes through an
//! [`AssetResolver`], so the filesystem library used by the binary and the
//! in-memory catalog used by tests are interchangeable.

mod catalog;
mod fs;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shared::TextureSetId;

use crate::error::AssetLoadError;
use crate::scene::Aabb;

pub use catalog::CatalogAssets;
pub use fs::FsAssetLibrary;

/// Identifier of a model asset, a path relative to the asset library root
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelRef(String);

impl ModelRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name shown to the user: the file stem
    pub fn display_name(&self) -> &str {
        Path::new(&self.0)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Resolved geometry for a model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelAsset {
    pub model: ModelRef,
    /// Local bounding box of all geometry
    pub bounds: Aabb,
    /// Named geometry nodes; texture sets bind per node
    pub nodes: Vec<String>,
}

/// Texture maps for one geometry node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTexture {
    pub node_name: String,
    pub diffuse: Option<PathBuf>,
    pub metalness: Option<PathBuf>,
    pub normal: Option<PathBuf>,
    pub roughness: Option<PathBuf>,
}

impl NodeTexture {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            ..Default::default()
        }
    }

    /// Assign a texture file to the slot its name indicates. Returns false
    /// when the name matches no known slot.
    pub fn assign(&mut self, path: PathBuf) -> bool {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_lowercase();
        let slot = if name.contains("diffuse") {
            &mut self.diffuse
        } else if name.contains("metalness") {
            &mut self.metalness
        } else if name.contains("normal") {
            &mut self.normal
        } else if name.contains("roughness") {
            &mut self.roughness
        } else {
            return false;
        };
        *slot = Some(path);
        true
    }
}

/// A named set of per-node textures for one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSet {
    pub id: TextureSetId,
    pub nodes: BTreeMap<String, NodeTexture>,
}

impl TextureSet {
    pub fn new(id: impl Into<TextureSetId>) -> Self {
        Self {
            id: id.into(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn with_node(mut self, texture: NodeTexture) -> Self {
        self.nodes.insert(texture.node_name.clone(), texture);
        self
    }
}

/// Source of model geometry and texture sets
pub trait AssetResolver: Send + Sync {
    /// Load geometry for a model. Called on the blocking pool.
    fn resolve(&self, model: &ModelRef) -> Result<ModelAsset, AssetLoadError>;

    /// Texture sets available for a model, sorted by id
    fn texture_sets(&self, model: &ModelRef) -> Vec<TextureSet>;

    /// The last placed instance of `model` was removed; cached data may go
    fn release(&self, _model: &ModelRef) {}
}
