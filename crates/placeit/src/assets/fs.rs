use std::path::{Path, PathBuf};

use super::{AssetResolver, ModelAsset, ModelRef, NodeTexture, TextureSet};
use crate::error::AssetLoadError;
use crate::scene::Aabb;

/// Directory next to a model file holding its texture sets:
/// `Textures/<set>/<node>/<files>`
const TEXTURES_DIR: &str = "Textures";

/// Model library rooted at a directory of OBJ files
#[derive(Debug, Clone)]
pub struct FsAssetLibrary {
    root: PathBuf,
}

impl FsAssetLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, model: &ModelRef) -> PathBuf {
        self.root.join(model.as_str())
    }

    /// Every `.obj` file under the root, as model refs sorted by path
    pub fn list_models(&self) -> Vec<ModelRef> {
        let mut models = Vec::new();
        collect_models(&self.root, &self.root, &mut models);
        models.sort();
        models
    }
}

fn collect_models(root: &Path, dir: &Path, out: &mut Vec<ModelRef>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if path.file_name().and_then(|n| n.to_str()) != Some(TEXTURES_DIR) {
                collect_models(root, &path, out);
            }
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("obj"))
        {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(ModelRef::new(relative.to_string_lossy().replace('\\', "/")));
            }
        }
    }
}

fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect()
        })
        .unwrap_or_default();
    dirs.sort();
    dirs
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name().and_then(|n| n.to_str()).map(str::to_string)
}

impl AssetResolver for FsAssetLibrary {
    fn resolve(&self, model: &ModelRef) -> Result<ModelAsset, AssetLoadError> {
        let path = self.path_of(model);
        if !path.is_file() {
            return Err(AssetLoadError::NotFound(model.to_string()));
        }

        let (models, _materials) = tobj::load_obj(
            &path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )
        .map_err(|e| match e {
            tobj::LoadError::OpenFileFailed => AssetLoadError::Io {
                model: model.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            },
            other => AssetLoadError::Parse {
                model: model.to_string(),
                message: other.to_string(),
            },
        })?;

        let bounds = models
            .iter()
            .filter_map(|m| Aabb::from_positions(&m.mesh.positions))
            .reduce(|a, b| a.union(&b))
            .ok_or_else(|| AssetLoadError::Parse {
                model: model.to_string(),
                message: "model contains no geometry".to_string(),
            })?;

        let nodes = models.iter().map(|m| m.name.clone()).collect();
        tracing::debug!("Resolved {} ({} nodes)", model, models.len());

        Ok(ModelAsset {
            model: model.clone(),
            bounds,
            nodes,
        })
    }

    fn texture_sets(&self, model: &ModelRef) -> Vec<TextureSet> {
        let Some(model_dir) = self.path_of(model).parent().map(Path::to_path_buf) else {
            return Vec::new();
        };

        sorted_subdirs(&model_dir.join(TEXTURES_DIR))
            .into_iter()
            .filter_map(|set_dir| {
                let mut set = TextureSet::new(dir_name(&set_dir)?);
                for node_dir in sorted_subdirs(&set_dir) {
                    let Some(node_name) = dir_name(&node_dir) else {
                        continue;
                    };
                    let mut texture = NodeTexture::new(node_name);
                    let mut files: Vec<PathBuf> = std::fs::read_dir(&node_dir)
                        .map(|entries| entries.flatten().map(|e| e.path()).collect())
                        .unwrap_or_default();
                    files.sort();
                    for file in files.into_iter().filter(|f| f.is_file()) {
                        texture.assign(file);
                    }
                    set = set.with_node(texture);
                }
                Some(set)
            })
            .collect()
    }
}
