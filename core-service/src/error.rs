use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Library error: {0}")]
    Library(#[from] core_library::LibraryError),
}

impl CoreError {
    /// Edits pushed before a push stopped, if this error ended a push.
    pub fn pushed(&self) -> Option<usize> {
        match self {
            CoreError::Sync(err) => err.pushed(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
