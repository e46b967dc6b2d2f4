//! Factory functions for test data.
//!
//! A small furniture catalog with known bounds and texture sets, and helpers
//! to build placed objects from it without going through a session.

use std::path::PathBuf;

use glam::{Mat4, Vec3};

use crate::assets::{AssetResolver, CatalogAssets, ModelRef, NodeTexture, TextureSet};
use crate::scene::Aabb;
use crate::state::registry::PlacedObject;

pub const CHAIR: &str = "Chair/Chair.obj";
pub const TABLE: &str = "Table/Table.obj";
pub const SOFA: &str = "Sofa/Sofa.obj";
/// Listed in the catalog but fails to load
pub const BROKEN: &str = "Broken/Broken.obj";

// ── Catalog ─────────────────────────────────────────────────────

fn wood_set(name: &str) -> TextureSet {
    let node = |node: &str| {
        let mut texture = NodeTexture::new(node);
        let dir = PathBuf::from("Chair/Textures").join(name).join(node);
        texture.assign(dir.join(format!("{}_diffuse.png", name)));
        texture.assign(dir.join(format!("{}_roughness.png", name)));
        texture
    };
    TextureSet::new(name).with_node(node("seat")).with_node(node("legs"))
}

/// Chair, table and sofa sitting on y = 0, plus one broken model
pub fn furniture_catalog() -> CatalogAssets {
    CatalogAssets::new()
        .with_model(
            CHAIR,
            Aabb::new(Vec3::new(-0.25, 0.0, -0.25), Vec3::new(0.25, 0.9, 0.25)),
            &["seat", "legs"],
        )
        .with_texture_set(CHAIR, wood_set("Oak"))
        .with_texture_set(CHAIR, wood_set("Walnut"))
        .with_model(
            TABLE,
            Aabb::new(Vec3::new(-0.6, 0.0, -0.4), Vec3::new(0.6, 0.75, 0.4)),
            &["top", "legs"],
        )
        .with_model(
            SOFA,
            Aabb::new(Vec3::new(-1.0, 0.0, -0.45), Vec3::new(1.0, 0.85, 0.45)),
            &["frame", "cushions"],
        )
        .with_broken_model(BROKEN, "unexpected end of file")
}

// ── Object factories ────────────────────────────────────────────

/// An unanchored, detached object of `model` standing at `position`
pub fn placed(model: &str, position: Vec3) -> PlacedObject {
    let asset = furniture_catalog()
        .resolve(&ModelRef::new(model))
        .unwrap_or_else(|e| panic!("fixture model {} failed: {}", model, e));
    PlacedObject::new(asset, Mat4::from_translation(position))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_models() {
        let catalog = furniture_catalog();
        assert_eq!(catalog.models().len(), 4);
        assert!(catalog.resolve(&ModelRef::new(BROKEN)).is_err());
        let sets = catalog.texture_sets(&ModelRef::new(CHAIR));
        let ids: Vec<&str> = sets.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["Oak", "Walnut"]);
        assert!(sets[0].nodes["seat"].diffuse.is_some());
        assert!(sets[0].nodes["seat"].roughness.is_some());
    }

    #[test]
    fn test_placed_factory() {
        let object = placed(TABLE, Vec3::new(1.0, 0.0, 2.0));
        assert_eq!(object.position(), Vec3::new(1.0, 0.0, 2.0));
        assert!(object.anchor.is_none());
        assert!(object.node.is_none());
        assert!((object.root_bounds().size().x - 1.2).abs() < 1e-5);
    }
}
