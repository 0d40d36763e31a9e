//! # Edits
//!
//! An [`Edit`] is one reversible mutation of an ordered collection. It is
//! applied locally through the [`EditLog`](crate::log::EditLog) and later
//! replayed against the remote service.
//!
//! Replaying goes through a [`RemoteOp`], a self-contained description of the
//! remote call. The push loop takes the op while holding the workspace lock
//! and performs the network call after releasing it.

use async_trait::async_trait;
use bridge_traits::remote::{
    ClientResult, ProgressSink, PushReceipt, RemoteClient, RemoteCollection,
};
use core_library::models::{
    EntryCollection, Playlist, ResourceId, Savable, SavedResourceCollection,
};
use core_library::{Handle, ResourceStore};
use std::fmt;
use tracing::debug;

/// A remote call replaying one edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    Insert {
        collection: RemoteCollection,
        ids: Vec<String>,
        position: Option<usize>,
    },
    Remove {
        collection: RemoteCollection,
        ids: Vec<String>,
        positions: Vec<usize>,
        contiguous: bool,
    },
    Reorder {
        collection: RemoteCollection,
        insert_before: usize,
        range_start: usize,
        range_length: usize,
    },
}

impl RemoteOp {
    pub fn collection(&self) -> &RemoteCollection {
        match self {
            RemoteOp::Insert { collection, .. }
            | RemoteOp::Remove { collection, .. }
            | RemoteOp::Reorder { collection, .. } => collection,
        }
    }

    /// Perform the call.
    pub async fn send(
        &self,
        client: &dyn RemoteClient,
        progress: &dyn ProgressSink,
    ) -> ClientResult<PushReceipt> {
        debug!(op = ?self, "Sending remote op");
        match self {
            RemoteOp::Insert {
                collection,
                ids,
                position,
            } => client.insert_items(collection, ids, *position, progress).await,
            RemoteOp::Remove {
                collection,
                ids,
                positions,
                contiguous,
            } => {
                client
                    .remove_items(collection, ids, positions, *contiguous, progress)
                    .await
            }
            RemoteOp::Reorder {
                collection,
                insert_before,
                range_start,
                range_length,
            } => {
                client
                    .reorder_items(collection, *insert_before, *range_start, *range_length)
                    .await
            }
        }
    }
}

/// A reversible, replayable mutation of one collection.
#[async_trait]
pub trait Edit: Send + Sync + fmt::Display {
    /// The collection this edit mutates.
    fn target(&self) -> ResourceId;

    /// Apply forward.
    fn commit(&mut self);

    /// Apply backward. Exact inverse of [`commit`](Edit::commit).
    fn revert(&mut self);

    /// Flag the target as needing a flush.
    fn mark(&self, store: &mut ResourceStore);

    /// Withdraw the flag set by [`mark`](Edit::mark).
    fn unmark(&self, store: &mut ResourceStore);

    /// The remote call replaying this edit, as of now.
    fn remote_op(&self) -> RemoteOp;

    /// Replay against the remote service.
    async fn push(
        &self,
        client: &dyn RemoteClient,
        progress: &dyn ProgressSink,
    ) -> ClientResult<PushReceipt> {
        self.remote_op().send(client, progress).await
    }

    /// Record what the service reported after a successful push.
    fn on_pushed(&self, _receipt: &PushReceipt, _store: &mut ResourceStore) {}
}

/// Collections edits can target.
pub trait EditableCollection: EntryCollection {
    /// Human-readable name for edit descriptions.
    fn label(handle: &Handle<Self>) -> String;

    /// Whether the service keeps a user-defined order for this collection.
    /// Without one, entries can only be appended and never moved.
    const SUPPORTS_MOVE: bool;

    fn accept_receipt(_handle: &Handle<Self>, _receipt: &PushReceipt, _store: &mut ResourceStore) {}
}

impl EditableCollection for Playlist {
    const SUPPORTS_MOVE: bool = true;

    fn label(handle: &Handle<Self>) -> String {
        handle
            .read()
            .name
            .clone()
            .unwrap_or_else(|| format!("playlist {}", handle.key()))
    }

    /// The service versions playlists; keep the newest snapshot id.
    fn accept_receipt(handle: &Handle<Self>, receipt: &PushReceipt, store: &mut ResourceStore) {
        let Some(snapshot_id) = &receipt.snapshot_id else {
            return;
        };
        handle.write().snapshot_id = Some(snapshot_id.clone());
        store.mark_modified(handle);
    }
}

impl<T: Savable> EditableCollection for SavedResourceCollection<T> {
    const SUPPORTS_MOVE: bool = false;

    fn label(_handle: &Handle<Self>) -> String {
        T::remote_collection().to_string()
    }
}
