//! # Scene Errors
//!
//! Error taxonomy for the scene server. Transient I/O errors never leave
//! the change watcher; everything else is reported to the caller that
//! triggered it.

use thiserror::Error;
use tabletop_shared::ObjectCategory;

#[derive(Debug, Error)]
pub enum SceneError {
    /// An object with this name exists in some category already
    #[error("object '{name}' already exists as {existing}")]
    DuplicateName { name: String, existing: ObjectCategory },

    /// No object with this name exists in any category
    #[error("object '{0}' not found")]
    NotFound(String),

    /// Malformed command payload or state file
    #[error("validation failed: {0}")]
    Validation(String),

    /// State file unreadable or half-written; worth retrying
    #[error("transient I/O error: {0}")]
    TransientIo(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SceneError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// The change watcher's retry classification for loading the state file.
    /// A validation failure there usually means a save is still in progress,
    /// so it is retried along with I/O errors. Command handlers never consult
    /// this; their validation errors go straight back to the sender.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo(_) | Self::Validation(_))
    }
}

impl From<std::io::Error> for SceneError {
    fn from(err: std::io::Error) -> Self {
        Self::TransientIo(err.to_string())
    }
}

pub type SceneResult<T> = Result<T, SceneError>;
