//! Persisted data model for rooms, world maps and placed objects.
//!
//! Everything in this crate is plain serde data. Rooms are stored as JSON
//! documents; the two archives a room owns (world map and object list) are
//! encoded separately and embedded as base64 blobs so a room can be listed and
//! displayed without decoding its spatial data.

mod objects;
mod world_map;

use std::fmt;

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use objects::{ObjectsArchive, PlacedObjectRecord, OBJECTS_ARCHIVE_VERSION};
pub use world_map::{AnchorKind, AnchorRecord, PlaneClassification, WorldMap, WORLD_MAP_VERSION};

/// Unique identifier of a placed object
pub type ObjectId = uuid::Uuid;

/// Unique identifier of a tracking anchor
pub type AnchorId = uuid::Uuid;

/// Unique identifier of a room
pub type RoomId = uuid::Uuid;

/// Identifier of a pre-baked texture set (the set's directory name)
pub type TextureSetId = String;

/// Current room file schema version
pub const ROOM_SCHEMA_VERSION: u32 = 1;

fn default_room_version() -> u32 {
    ROOM_SCHEMA_VERSION
}

// ============================================================================
// Errors
// ============================================================================

/// Errors produced while encoding or decoding persisted data
#[derive(Debug)]
pub enum CodecError {
    /// JSON (de)serialization failed
    Json(serde_json::Error),
    /// Blob was not valid base64
    Base64(base64::DecodeError),
    /// Archive was written by a newer schema
    UnsupportedVersion {
        kind: &'static str,
        found: u32,
        supported: u32,
    },
    /// Room has no archived blob of this kind
    MissingBlob(&'static str),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Json(e) => write!(f, "JSON error: {}", e),
            CodecError::Base64(e) => write!(f, "Base64 error: {}", e),
            CodecError::UnsupportedVersion {
                kind,
                found,
                supported,
            } => write!(
                f,
                "Unsupported {} version {} (supported up to {})",
                kind, found, supported
            ),
            CodecError::MissingBlob(kind) => write!(f, "Room has no {} archive", kind),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Json(e) => Some(e),
            CodecError::Base64(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Json(e)
    }
}

impl From<base64::DecodeError> for CodecError {
    fn from(e: base64::DecodeError) -> Self {
        CodecError::Base64(e)
    }
}

pub(crate) fn check_version(kind: &'static str, found: u32, supported: u32) -> Result<(), CodecError> {
    if found > supported {
        return Err(CodecError::UnsupportedVersion {
            kind,
            found,
            supported,
        });
    }
    Ok(())
}

// ============================================================================
// Blob
// ============================================================================

/// Opaque byte payload, serialized as a base64 string
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Blob(pub Vec<u8>);

impl Blob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Blob(bytes)
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map(Blob)
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Room
// ============================================================================

/// Room category, used for display only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomType {
    #[serde(rename = "Living Room")]
    LivingRoom,
    #[serde(rename = "Dining Room")]
    DiningRoom,
    #[serde(rename = "Guest Room")]
    GuestRoom,
    #[serde(rename = "Bedroom")]
    Bedroom,
    #[serde(rename = "Bathroom")]
    Bathroom,
    #[serde(rename = "Kitchen")]
    Kitchen,
    #[serde(rename = "Office")]
    Office,
}

impl RoomType {
    /// All room types, in menu order
    pub fn all() -> &'static [RoomType] {
        &[
            RoomType::LivingRoom,
            RoomType::DiningRoom,
            RoomType::GuestRoom,
            RoomType::Bedroom,
            RoomType::Bathroom,
            RoomType::Kitchen,
            RoomType::Office,
        ]
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            RoomType::LivingRoom => "Living Room",
            RoomType::DiningRoom => "Dining Room",
            RoomType::GuestRoom => "Guest Room",
            RoomType::Bedroom => "Bedroom",
            RoomType::Bathroom => "Bathroom",
            RoomType::Kitchen => "Kitchen",
            RoomType::Office => "Office",
        }
    }

    /// Parse a display name or a lowercase key such as `living-room`
    pub fn parse(value: &str) -> Option<RoomType> {
        let key: String = value
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        Self::all().iter().copied().find(|t| {
            t.display_name()
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
                == key
        })
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A named room session owning one archived world map and one archived
/// object list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Room file schema version
    #[serde(default = "default_room_version")]
    pub version: u32,
    pub id: RoomId,
    pub name: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    world_map: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    objects: Option<Blob>,
}

impl Room {
    /// Create a new, unarchived room
    pub fn new(name: impl Into<String>, room_type: RoomType) -> Self {
        Self {
            version: ROOM_SCHEMA_VERSION,
            id: uuid::Uuid::new_v4(),
            name: name.into(),
            room_type,
            world_map: None,
            objects: None,
        }
    }

    /// True iff both the world map and the object list are archived
    pub fn is_archived(&self) -> bool {
        self.world_map.is_some() && self.objects.is_some()
    }

    /// Encode and store both archives. Nothing is modified unless both
    /// encodings succeed.
    pub fn set_archive(
        &mut self,
        world_map: &WorldMap,
        objects: &ObjectsArchive,
    ) -> Result<(), CodecError> {
        let world_map = world_map.encode()?;
        let objects = objects.encode()?;
        self.world_map = Some(Blob(world_map));
        self.objects = Some(Blob(objects));
        Ok(())
    }

    /// Decode the archived world map
    pub fn world_map(&self) -> Result<WorldMap, CodecError> {
        let blob = self
            .world_map
            .as_ref()
            .ok_or(CodecError::MissingBlob("world map"))?;
        WorldMap::decode(blob.as_bytes())
    }

    /// Decode the archived object list
    pub fn objects(&self) -> Result<ObjectsArchive, CodecError> {
        let blob = self
            .objects
            .as_ref()
            .ok_or(CodecError::MissingBlob("objects"))?;
        ObjectsArchive::decode(blob.as_bytes())
    }

    /// Serialize the room document
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a room document, rejecting newer schema versions
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        let room: Room = serde_json::from_str(json)?;
        check_version("room", room.version, ROOM_SCHEMA_VERSION)?;
        Ok(room)
    }
}
