//! # Remote Catalog Client
//!
//! The edit log replays local collection edits against the remote service
//! through [`RemoteClient`]. Authentication, HTTP, paging of large requests,
//! and rate-limit headers are the implementation's business.
//!
//! ## Failure categories
//!
//! Callers only distinguish two kinds of failure:
//! - [`ClientError::Communication`] - the service was reached (or should have
//!   been) and the request did not succeed
//! - [`ClientError::Io`] - a local I/O failure unrelated to the service

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A remote collection an edit can be replayed against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteCollection {
    LikedSongs,
    SavedAlbums,
    Playlist {
        id: String,
        /// Last known version token; lets the service reject stale positions.
        snapshot_id: Option<String>,
    },
}

impl fmt::Display for RemoteCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCollection::LikedSongs => write!(f, "Liked Songs"),
            RemoteCollection::SavedAlbums => write!(f, "Saved Albums"),
            RemoteCollection::Playlist { id, .. } => write!(f, "playlist {}", id),
        }
    }
}

/// What the service reported after a successful call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReceipt {
    /// New version token for playlist mutations.
    pub snapshot_id: Option<String>,
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Communication with the remote service failed{}: {message}", status_suffix(.status))]
    Communication {
        status: Option<u16>,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn communication(message: impl Into<String>) -> Self {
        ClientError::Communication {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_communication(&self) -> bool {
        matches!(self, ClientError::Communication { .. })
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Progress receiver for long-running operations.
pub trait ProgressSink: Send + Sync {
    /// `done` out of `total` units are complete.
    fn report(&self, done: usize, total: usize);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _done: usize, _total: usize) {}
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn report(&self, done: usize, total: usize) {
        self(done, total)
    }
}

/// Remote collection mutations.
///
/// Resource ids are the remote catalog ids of tracks or albums, in the order
/// they should appear.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Insert `ids` into `collection`. `position` is `None` to append, and is
    /// ignored by collections that have no user-defined order.
    async fn insert_items(
        &self,
        collection: &RemoteCollection,
        ids: &[String],
        position: Option<usize>,
        progress: &dyn ProgressSink,
    ) -> ClientResult<PushReceipt>;

    /// Remove `ids` from `collection`. `positions` are their indices before the
    /// removal, ascending; `contiguous` is set when they form a single range.
    async fn remove_items(
        &self,
        collection: &RemoteCollection,
        ids: &[String],
        positions: &[usize],
        contiguous: bool,
        progress: &dyn ProgressSink,
    ) -> ClientResult<PushReceipt>;

    /// Move `range_length` items starting at `range_start` so they sit before
    /// the item currently at `insert_before`.
    async fn reorder_items(
        &self,
        collection: &RemoteCollection,
        insert_before: usize,
        range_start: usize,
        range_length: usize,
    ) -> ClientResult<PushReceipt>;
}
