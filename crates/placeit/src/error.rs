//! Error taxonomy for asset loading, room storage and session persistence

use std::path::PathBuf;

use shared::CodecError;
use thiserror::Error;

/// A model or texture asset could not be loaded. The load is abandoned and no
/// object is created.
#[derive(Debug, Error)]
pub enum AssetLoadError {
    #[error("model not found: {0}")]
    NotFound(String),
    #[error("failed to parse model {model}: {message}")]
    Parse { model: String, message: String },
    #[error("I/O error reading model {model}: {source}")]
    Io {
        model: String,
        #[source]
        source: std::io::Error,
    },
    #[error("load of model {0} was aborted")]
    Aborted(String),
}

/// Errors from the room file store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("room {0} not found")]
    NotFound(String),
    #[error("room file {path} could not be decoded: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("failed to encode room {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: CodecError,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Save/load experience failures. All of them are recoverable: the live
/// session and the placed objects stay intact.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("no room is active")]
    NoActiveRoom,
    #[error("the current world map is unavailable")]
    WorldMapUnavailable,
    #[error("failed to encode room archive: {0}")]
    Encode(#[source] CodecError),
    #[error("failed to decode room archive: {0}")]
    Decode(#[source] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
