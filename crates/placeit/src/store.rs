//! Durable room storage: one JSON file per room, named by the room's UUID

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use shared::{Room, RoomId, RoomType};

use crate::error::StoreError;

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

#[derive(Debug, Clone)]
pub struct RoomStore {
    dir: PathBuf,
}

impl RoomStore {
    /// Open (creating if needed) a room directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: RoomId) -> PathBuf {
        self.dir.join(id.to_string())
    }

    /// Write a room atomically: a hidden temp file is written, synced and
    /// renamed over the room file
    pub fn save(&self, room: &Room) -> Result<(), StoreError> {
        let json = room.to_json().map_err(|source| StoreError::Encode {
            id: room.id.to_string(),
            source,
        })?;
        let path = self.path_for(room.id);
        let tmp = self.dir.join(format!(".{}.tmp", room.id));
        let mut file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(json.as_bytes()).map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(StoreError::Io { path, source: e });
        }
        tracing::info!("Saved room {} ({})", room.name, room.id);
        Ok(())
    }

    /// Read one room
    pub fn load(&self, id: RoomId) -> Result<Room, StoreError> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Self::read(&path)
    }

    fn read(path: &Path) -> Result<Room, StoreError> {
        let json = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Room::from_json(&json).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Every readable room, sorted by name. Entries that fail to decode are
    /// logged and skipped.
    pub fn list_all(&self) -> Result<Vec<Room>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut rooms: Vec<Room> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                !p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with('.'))
            })
            .filter_map(|p| match Self::read(&p) {
                Ok(room) => Some(room),
                Err(e) => {
                    tracing::warn!("Skipping room file: {}", e);
                    None
                }
            })
            .collect();

        rooms.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(rooms)
    }

    /// Create and persist a new, unarchived room
    pub fn create(&self, name: &str, room_type: RoomType) -> Result<Room, StoreError> {
        let room = Room::new(name, room_type);
        self.save(&room)?;
        Ok(room)
    }

    /// Remove a room file
    pub fn delete(&self, id: RoomId) -> Result<(), StoreError> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Deleted room {}", id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}
