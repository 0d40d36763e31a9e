use bridge_traits::remote::ClientError;
use core_library::LibraryError;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Could not edit {target} for the following reason: {reason}")]
    IllegalEdit { target: String, reason: String },

    #[error("Push stopped after {pushed} edit(s): {source}")]
    Communication {
        pushed: usize,
        #[source]
        source: ClientError,
    },

    #[error("Push interrupted after {pushed} edit(s)")]
    Interrupted { pushed: usize },

    #[error("Store error: {0}")]
    Store(#[from] LibraryError),
}

impl SyncError {
    pub fn illegal_edit(target: impl fmt::Display, reason: impl Into<String>) -> Self {
        SyncError::IllegalEdit {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Edits pushed before a push stopped, if this error ended a push.
    pub fn pushed(&self) -> Option<usize> {
        match self {
            SyncError::Communication { pushed, .. } | SyncError::Interrupted { pushed } => {
                Some(*pushed)
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
