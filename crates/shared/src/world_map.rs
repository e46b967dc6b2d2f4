//! Archived snapshot of the tracking subsystem's spatial understanding

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::{check_version, AnchorId, Blob, CodecError};

/// Current world map archive version
pub const WORLD_MAP_VERSION: u32 = 1;

fn default_version() -> u32 {
    WORLD_MAP_VERSION
}

/// Classification of a detected plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlaneClassification {
    Floor,
    Wall,
    Ceiling,
    Table,
    Seat,
    #[default]
    None,
}

/// What a tracked anchor represents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnchorKind {
    /// A detected horizontal surface
    Plane {
        /// Plane center, relative to the anchor transform
        center: Vec3,
        /// Width (x) and depth (z) of the plane
        extent: Vec2,
        classification: PlaneClassification,
    },
    /// Pose of a placed virtual object
    Object,
    /// Save-time marker carrying a camera thumbnail; metadata, not a real anchor
    Snapshot { image: Blob },
}

/// A tracked anchor as stored in a world map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub id: AnchorId,
    /// World pose, column-major
    pub transform: Mat4,
    pub kind: AnchorKind,
}

impl AnchorRecord {
    /// Create an object anchor at the given world pose
    pub fn object(transform: Mat4) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            transform,
            kind: AnchorKind::Object,
        }
    }

    /// Create the snapshot marker anchor
    pub fn snapshot(transform: Mat4, image: Vec<u8>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            transform,
            kind: AnchorKind::Snapshot { image: Blob(image) },
        }
    }

    /// Translation part of the anchor pose
    pub fn position(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self.kind, AnchorKind::Snapshot { .. })
    }

    /// True for planes classified as floor
    pub fn is_floor_plane(&self) -> bool {
        matches!(
            self.kind,
            AnchorKind::Plane {
                classification: PlaneClassification::Floor,
                ..
            }
        )
    }
}

/// Feature points plus anchors, enough to relocalize a later session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMap {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub feature_points: Vec<Vec3>,
    pub anchors: Vec<AnchorRecord>,
}

impl Default for WorldMap {
    fn default() -> Self {
        Self {
            version: WORLD_MAP_VERSION,
            feature_points: Vec::new(),
            anchors: Vec::new(),
        }
    }
}

impl WorldMap {
    /// The snapshot marker anchor, if present
    pub fn snapshot_anchor(&self) -> Option<&AnchorRecord> {
        self.anchors.iter().find(|a| a.is_snapshot())
    }

    /// Remove every snapshot marker and return the image of the first one
    pub fn strip_snapshot(&mut self) -> Option<Blob> {
        let image = self.snapshot_anchor().and_then(|a| match &a.kind {
            AnchorKind::Snapshot { image } => Some(image.clone()),
            _ => None,
        });
        self.anchors.retain(|a| !a.is_snapshot());
        image
    }

    /// Look up an anchor by id
    pub fn anchor(&self, id: &AnchorId) -> Option<&AnchorRecord> {
        self.anchors.iter().find(|a| a.id == *id)
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let map: WorldMap = serde_json::from_slice(bytes)?;
        check_version("world map", map.version, WORLD_MAP_VERSION)?;
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_snapshot_returns_image() {
        let mut map = WorldMap::default();
        map.anchors.push(AnchorRecord::object(Mat4::IDENTITY));
        map.anchors
            .push(AnchorRecord::snapshot(Mat4::IDENTITY, vec![0xFF, 0xD8]));

        let image = map.strip_snapshot().unwrap();
        assert_eq!(image.as_bytes(), &[0xFF, 0xD8]);
        assert_eq!(map.anchors.len(), 1);
        assert!(map.snapshot_anchor().is_none());
    }

    #[test]
    fn test_strip_snapshot_without_marker() {
        let mut map = WorldMap::default();
        map.anchors.push(AnchorRecord::object(Mat4::IDENTITY));
        assert!(map.strip_snapshot().is_none());
        assert_eq!(map.anchors.len(), 1);
    }

    #[test]
    fn test_anchor_kind_tagged() {
        let anchor = AnchorRecord::object(Mat4::from_translation(Vec3::new(1.0, 0.0, 2.0)));
        let json = serde_json::to_string(&anchor).unwrap();
        assert!(json.contains(r#""type":"object""#));
        assert_eq!(anchor.position(), Vec3::new(1.0, 0.0, 2.0));
    }

    #[test]
    fn test_floor_plane_detection() {
        let floor = AnchorRecord {
            id: uuid::Uuid::new_v4(),
            transform: Mat4::IDENTITY,
            kind: AnchorKind::Plane {
                center: Vec3::ZERO,
                extent: Vec2::ONE,
                classification: PlaneClassification::Floor,
            },
        };
        let table = AnchorRecord {
            kind: AnchorKind::Plane {
                center: Vec3::ZERO,
                extent: Vec2::ONE,
                classification: PlaneClassification::Table,
            },
            ..floor.clone()
        };
        assert!(floor.is_floor_plane());
        assert!(!table.is_floor_plane());
        assert!(!AnchorRecord::object(Mat4::IDENTITY).is_floor_plane());
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let map = WorldMap {
            version: WORLD_MAP_VERSION + 1,
            ..Default::default()
        };
        let bytes = serde_json::to_vec(&map).unwrap();
        assert!(matches!(
            WorldMap::decode(&bytes),
            Err(CodecError::UnsupportedVersion { .. })
        ));
    }
}
