//! Archived list of placed objects

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::{check_version, AnchorId, CodecError, ObjectId, TextureSetId};

/// Current object archive version
pub const OBJECTS_ARCHIVE_VERSION: u32 = 1;

fn default_version() -> u32 {
    OBJECTS_ARCHIVE_VERSION
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

/// One placed object as persisted in a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedObjectRecord {
    pub id: ObjectId,
    /// Model identifier (asset path) the object was loaded from
    pub model: String,
    /// Anchor the object was bound to at save time
    pub anchor_id: AnchorId,
    /// Pose of that anchor, column-major
    pub anchor_transform: Mat4,
    /// Rotation around the local up axis, radians
    #[serde(default)]
    pub yaw: f32,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    /// Applied texture set, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<TextureSetId>,
}

/// Versioned list of placed objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectsArchive {
    #[serde(default = "default_version")]
    pub version: u32,
    pub objects: Vec<PlacedObjectRecord>,
}

impl Default for ObjectsArchive {
    fn default() -> Self {
        Self {
            version: OBJECTS_ARCHIVE_VERSION,
            objects: Vec::new(),
        }
    }
}

impl ObjectsArchive {
    pub fn new(objects: Vec<PlacedObjectRecord>) -> Self {
        Self {
            version: OBJECTS_ARCHIVE_VERSION,
            objects,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let archive: ObjectsArchive = serde_json::from_slice(bytes)?;
        check_version("objects archive", archive.version, OBJECTS_ARCHIVE_VERSION)?;
        Ok(archive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_defaults_for_optional_fields() {
        let json = format!(
            r#"{{"objects": [{{"id": "{}", "model": "Chair/Chair.obj", "anchor_id": "{}",
                "anchor_transform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 2,0,3,1]}}]}}"#,
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4()
        );
        let archive = ObjectsArchive::decode(json.as_bytes()).unwrap();
        assert_eq!(archive.version, OBJECTS_ARCHIVE_VERSION);
        let record = &archive.objects[0];
        assert_eq!(record.yaw, 0.0);
        assert_eq!(record.scale, Vec3::ONE);
        assert!(record.texture.is_none());
        assert_eq!(record.anchor_transform.w_axis.truncate(), Vec3::new(2.0, 0.0, 3.0));
    }

    #[test]
    fn test_record_requires_anchor() {
        let json = format!(
            r#"{{"objects": [{{"id": "{}", "model": "Chair/Chair.obj"}}]}}"#,
            uuid::Uuid::new_v4()
        );
        assert!(matches!(
            ObjectsArchive::decode(json.as_bytes()),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn test_texture_omitted_when_none() {
        let archive = ObjectsArchive::new(vec![PlacedObjectRecord {
            id: uuid::Uuid::new_v4(),
            model: "Sofa/Sofa.obj".to_string(),
            anchor_id: uuid::Uuid::new_v4(),
            anchor_transform: Mat4::IDENTITY,
            yaw: 0.5,
            scale: Vec3::ONE,
            texture: None,
        }]);
        let json = String::from_utf8(archive.encode().unwrap()).unwrap();
        assert!(!json.contains("texture"));
    }
}
