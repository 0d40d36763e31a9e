use bridge_traits::error::BridgeError;
use thiserror::Error;

use crate::models::ResourceKind;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Corrupt {kind} record {key}: {message}")]
    Codec {
        kind: ResourceKind,
        key: String,
        message: String,
    },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl LibraryError {
    /// Whether this failure came from the storage engine itself.
    pub fn is_storage(&self) -> bool {
        matches!(self, LibraryError::Database(_) | LibraryError::Bridge(_))
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
