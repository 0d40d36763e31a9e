//! Concrete collection edits: insert, remove, and move.
//!
//! Each edit validates its operands against the collection when constructed,
//! so `commit` and `revert` cannot fail.

use bridge_traits::remote::{PushReceipt, RemoteCollection};
use chrono::{DateTime, Utc};
use core_library::models::{Resource, ResourceId, SavedResource};
use core_library::{Handle, ResourceStore};
use std::collections::HashSet;
use std::fmt;

use crate::edit::{Edit, EditableCollection, RemoteOp};
use crate::error::{Result, SyncError};

fn noun<C: EditableCollection>(count: usize) -> String {
    let kind = <C::Item as Resource>::KIND.as_str();
    if count == 1 {
        format!("1 {}", kind)
    } else {
        format!("{} {}s", count, kind)
    }
}

fn remote_of<C: EditableCollection>(collection: &Handle<C>) -> RemoteCollection {
    collection.read().remote(collection.key())
}

// ============================================================================
// Insert
// ============================================================================

/// Insert a block of resources at one index.
pub struct InsertEntries<C: EditableCollection> {
    collection: Handle<C>,
    entries: Vec<SavedResource<C::Item>>,
    index: usize,
}

impl<C: EditableCollection> InsertEntries<C> {
    /// # Errors
    ///
    /// Returns [`SyncError::IllegalEdit`] if a resource is already in the
    /// collection or listed twice, or if `index` is past the end.
    pub fn new(
        collection: Handle<C>,
        resources: Vec<Handle<C::Item>>,
        index: usize,
        added_at: DateTime<Utc>,
    ) -> Result<Self> {
        {
            let state = collection.read();
            let len = state.entries().len();
            if index > len {
                return Err(SyncError::illegal_edit(
                    collection.id(),
                    format!("index {} is out of range for {} entries", index, len),
                ));
            }

            let mut seen = HashSet::new();
            for resource in &resources {
                if state.contains(resource.key()) || !seen.insert(resource.key()) {
                    return Err(SyncError::illegal_edit(resource.id(), "already saved"));
                }
            }
        }

        let entries = resources
            .into_iter()
            .map(|resource| SavedResource::new(added_at, resource))
            .collect();
        Ok(Self {
            collection,
            entries,
            index,
        })
    }

    /// Insert at the end of the collection.
    pub fn append(
        collection: Handle<C>,
        resources: Vec<Handle<C::Item>>,
        added_at: DateTime<Utc>,
    ) -> Result<Self> {
        let index = collection.read().entries().len();
        Self::new(collection, resources, index, added_at)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: EditableCollection> Edit for InsertEntries<C> {
    fn target(&self) -> ResourceId {
        self.collection.id()
    }

    fn commit(&mut self) {
        let mut state = self.collection.write();
        let entries = state.entries_mut();
        let tail = entries.split_off(self.index);
        entries.extend(self.entries.iter().cloned());
        entries.extend(tail);
    }

    fn revert(&mut self) {
        let mut state = self.collection.write();
        state
            .entries_mut()
            .drain(self.index..self.index + self.entries.len());
    }

    fn mark(&self, store: &mut ResourceStore) {
        store.mark_contents_modified(&self.collection);
    }

    fn unmark(&self, store: &mut ResourceStore) {
        store.unmark_contents_modified(&self.collection);
    }

    fn remote_op(&self) -> RemoteOp {
        RemoteOp::Insert {
            collection: remote_of(&self.collection),
            ids: self.entries.iter().map(|e| e.key().to_string()).collect(),
            position: C::SUPPORTS_MOVE.then_some(self.index),
        }
    }

    fn on_pushed(&self, receipt: &PushReceipt, store: &mut ResourceStore) {
        C::accept_receipt(&self.collection, receipt, store);
    }
}

impl<C: EditableCollection> fmt::Display for InsertEntries<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Add {} to {}",
            noun::<C>(self.entries.len()),
            C::label(&self.collection)
        )
    }
}

// ============================================================================
// Remove
// ============================================================================

/// Remove the entries at a set of indices.
pub struct RemoveEntries<C: EditableCollection> {
    collection: Handle<C>,
    indices: Vec<usize>,
    removed: Vec<SavedResource<C::Item>>,
    sequential: bool,
}

impl<C: EditableCollection> RemoveEntries<C> {
    /// # Errors
    ///
    /// Returns [`SyncError::IllegalEdit`] if an index is out of range.
    pub fn new(collection: Handle<C>, mut indices: Vec<usize>) -> Result<Self> {
        indices.sort_unstable();
        indices.dedup();

        let removed = {
            let state = collection.read();
            let entries = state.entries();
            if let Some(&bad) = indices.iter().find(|&&i| i >= entries.len()) {
                return Err(SyncError::illegal_edit(
                    collection.id(),
                    format!("index {} is out of range for {} entries", bad, entries.len()),
                ));
            }
            indices.iter().map(|&i| entries[i].clone()).collect()
        };
        let sequential = indices.windows(2).all(|w| w[1] == w[0] + 1);

        Ok(Self {
            collection,
            indices,
            removed,
            sequential,
        })
    }

    /// Remove the given resources wherever they are.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::IllegalEdit`] if a resource is not in the
    /// collection.
    pub fn of(collection: Handle<C>, resources: &[Handle<C::Item>]) -> Result<Self> {
        let indices = {
            let state = collection.read();
            let entries = state.entries();
            let mut indices = Vec::with_capacity(resources.len());
            for resource in resources {
                match entries.iter().position(|e| e.key() == resource.key()) {
                    Some(i) => indices.push(i),
                    None => return Err(SyncError::illegal_edit(resource.id(), "not saved")),
                }
            }
            indices
        };
        Self::new(collection, indices)
    }

    /// Removed indices, ascending.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Whether the indices form one contiguous range.
    pub fn is_sequential(&self) -> bool {
        self.sequential
    }
}

impl<C: EditableCollection> Edit for RemoveEntries<C> {
    fn target(&self) -> ResourceId {
        self.collection.id()
    }

    fn commit(&mut self) {
        let mut state = self.collection.write();
        let entries = state.entries_mut();
        if self.sequential {
            if let (Some(&first), Some(&last)) = (self.indices.first(), self.indices.last()) {
                entries.drain(first..=last);
            }
        } else {
            for &i in self.indices.iter().rev() {
                entries.remove(i);
            }
        }
    }

    fn revert(&mut self) {
        let mut state = self.collection.write();
        let entries = state.entries_mut();
        for (&i, entry) in self.indices.iter().zip(&self.removed) {
            entries.insert(i, entry.clone());
        }
    }

    fn mark(&self, store: &mut ResourceStore) {
        store.mark_contents_modified(&self.collection);
    }

    fn unmark(&self, store: &mut ResourceStore) {
        store.unmark_contents_modified(&self.collection);
    }

    fn remote_op(&self) -> RemoteOp {
        RemoteOp::Remove {
            collection: remote_of(&self.collection),
            ids: self.removed.iter().map(|e| e.key().to_string()).collect(),
            positions: self.indices.clone(),
            contiguous: self.sequential,
        }
    }

    fn on_pushed(&self, receipt: &PushReceipt, store: &mut ResourceStore) {
        C::accept_receipt(&self.collection, receipt, store);
    }
}

impl<C: EditableCollection> fmt::Display for RemoveEntries<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Remove {} from {}",
            noun::<C>(self.removed.len()),
            C::label(&self.collection)
        )
    }
}

// ============================================================================
// Move
// ============================================================================

/// Move `range_length` entries starting at `range_start` so they sit before
/// the entry that was at `insert_before`.
pub struct MoveEntries<C: EditableCollection> {
    collection: Handle<C>,
    insert_before: usize,
    range_start: usize,
    range_length: usize,
}

impl<C: EditableCollection> MoveEntries<C> {
    /// # Errors
    ///
    /// Returns [`SyncError::IllegalEdit`] if the collection has no
    /// user-defined order, the range is out of bounds, or `insert_before`
    /// falls inside it.
    pub fn new(
        collection: Handle<C>,
        insert_before: usize,
        range_start: usize,
        range_length: usize,
    ) -> Result<Self> {
        if !C::SUPPORTS_MOVE {
            return Err(SyncError::illegal_edit(
                collection.id(),
                "entries of this collection cannot be reordered",
            ));
        }
        let len = collection.read().entries().len();
        let range_end = range_start + range_length;
        if range_length == 0 || range_end > len || insert_before > len {
            return Err(SyncError::illegal_edit(
                collection.id(),
                format!(
                    "cannot move {} entries from {} before {} in {} entries",
                    range_length, range_start, insert_before, len
                ),
            ));
        }
        if insert_before > range_start && insert_before < range_end {
            return Err(SyncError::illegal_edit(
                collection.id(),
                "cannot move a range into itself",
            ));
        }

        Ok(Self {
            collection,
            insert_before,
            range_start,
            range_length,
        })
    }

    fn rotate(&self, forward: bool) {
        let mut state = self.collection.write();
        let entries = state.entries_mut();
        let n = self.range_length;
        if self.insert_before > self.range_start {
            let span = &mut entries[self.range_start..self.insert_before];
            if forward {
                span.rotate_left(n);
            } else {
                span.rotate_right(n);
            }
        } else {
            let span = &mut entries[self.insert_before..self.range_start + n];
            if forward {
                span.rotate_right(n);
            } else {
                span.rotate_left(n);
            }
        }
    }
}

impl<C: EditableCollection> Edit for MoveEntries<C> {
    fn target(&self) -> ResourceId {
        self.collection.id()
    }

    fn commit(&mut self) {
        self.rotate(true);
    }

    fn revert(&mut self) {
        self.rotate(false);
    }

    fn mark(&self, store: &mut ResourceStore) {
        store.mark_contents_modified(&self.collection);
    }

    fn unmark(&self, store: &mut ResourceStore) {
        store.unmark_contents_modified(&self.collection);
    }

    fn remote_op(&self) -> RemoteOp {
        RemoteOp::Reorder {
            collection: remote_of(&self.collection),
            insert_before: self.insert_before,
            range_start: self.range_start,
            range_length: self.range_length,
        }
    }

    fn on_pushed(&self, receipt: &PushReceipt, store: &mut ResourceStore) {
        C::accept_receipt(&self.collection, receipt, store);
    }
}

impl<C: EditableCollection> fmt::Display for MoveEntries<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Move {} in {}",
            noun::<C>(self.range_length),
            C::label(&self.collection)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_library::models::{LikedSongs, Playlist, Track};

    async fn playlist_with(store: &mut ResourceStore, keys: &[&str]) -> Handle<Playlist> {
        let playlist = store.playlist("37i9dQZF1DXcF6B6QPhFDv").await.unwrap();
        let added_at = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        for key in keys {
            let track = store.get_or_create::<Track>(key).await.unwrap();
            playlist.write().entries.push(SavedResource::new(added_at, track));
        }
        playlist
    }

    fn keys(playlist: &Handle<Playlist>) -> Vec<String> {
        playlist.read().entries.iter().map(|e| e.key().to_string()).collect()
    }

    #[tokio::test]
    async fn test_insert_commit_and_revert() {
        let mut store = ResourceStore::in_memory().await.unwrap();
        let playlist = playlist_with(&mut store, &["a", "b"]).await;
        let x = store.get_or_create::<Track>("x").await.unwrap();
        let y = store.get_or_create::<Track>("y").await.unwrap();

        let mut edit = InsertEntries::new(playlist.clone(), vec![x, y], 1, Utc::now()).unwrap();
        edit.commit();
        assert_eq!(keys(&playlist), vec!["a", "x", "y", "b"]);
        assert_eq!(edit.to_string(), "Add 2 tracks to playlist 37i9dQZF1DXcF6B6QPhFDv");

        edit.revert();
        assert_eq!(keys(&playlist), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_insert_rejects_saved_resource() {
        let mut store = ResourceStore::in_memory().await.unwrap();
        let liked = store.liked_songs().await.unwrap();
        let track = store.get_or_create::<Track>("4cOdK2wGLETKBW3PvgPWqT").await.unwrap();
        InsertEntries::<LikedSongs>::append(liked.clone(), vec![track.clone()], Utc::now())
            .unwrap()
            .commit();

        let err = InsertEntries::<LikedSongs>::append(liked, vec![track], Utc::now())
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "Could not edit track 4cOdK2wGLETKBW3PvgPWqT for the following reason: already saved"
        );
    }

    #[tokio::test]
    async fn test_saved_collection_appends_and_never_moves() {
        let mut store = ResourceStore::in_memory().await.unwrap();
        let liked = store.liked_songs().await.unwrap();
        let tracks = vec![
            store.get_or_create::<Track>("a").await.unwrap(),
            store.get_or_create::<Track>("b").await.unwrap(),
        ];

        let mut edit = InsertEntries::<LikedSongs>::append(liked.clone(), tracks, Utc::now()).unwrap();
        edit.commit();
        assert!(matches!(edit.remote_op(), RemoteOp::Insert { position: None, .. }));

        assert!(matches!(
            MoveEntries::<LikedSongs>::new(liked, 0, 1, 1),
            Err(SyncError::IllegalEdit { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_restores_positions() {
        let mut store = ResourceStore::in_memory().await.unwrap();
        let playlist = playlist_with(&mut store, &["a", "b", "c", "d", "e"]).await;

        let mut edit = RemoveEntries::new(playlist.clone(), vec![3, 0, 1]).unwrap();
        assert_eq!(edit.indices(), &[0, 1, 3]);
        assert!(!edit.is_sequential());

        edit.commit();
        assert_eq!(keys(&playlist), vec!["c", "e"]);
        assert_eq!(
            edit.remote_op(),
            RemoteOp::Remove {
                collection: RemoteCollection::Playlist {
                    id: "37i9dQZF1DXcF6B6QPhFDv".to_string(),
                    snapshot_id: None,
                },
                ids: vec!["a".to_string(), "b".to_string(), "d".to_string()],
                positions: vec![0, 1, 3],
                contiguous: false,
            }
        );

        edit.revert();
        assert_eq!(keys(&playlist), vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_remove_sequential_range() {
        let mut store = ResourceStore::in_memory().await.unwrap();
        let playlist = playlist_with(&mut store, &["a", "b", "c", "d"]).await;

        let mut edit = RemoveEntries::new(playlist.clone(), vec![2, 1]).unwrap();
        assert!(edit.is_sequential());
        edit.commit();
        assert_eq!(keys(&playlist), vec!["a", "d"]);
    }

    #[tokio::test]
    async fn test_remove_of_unsaved_resource_fails() {
        let mut store = ResourceStore::in_memory().await.unwrap();
        let playlist = playlist_with(&mut store, &["a"]).await;
        let stranger = store.get_or_create::<Track>("z").await.unwrap();

        assert!(matches!(
            RemoveEntries::of(playlist, &[stranger]),
            Err(SyncError::IllegalEdit { .. })
        ));
    }

    #[tokio::test]
    async fn test_move_forward_and_back() {
        let mut store = ResourceStore::in_memory().await.unwrap();
        let playlist = playlist_with(&mut store, &["a", "b", "c", "d", "e"]).await;

        // "a b" before "e"
        let mut forward = MoveEntries::new(playlist.clone(), 4, 0, 2).unwrap();
        forward.commit();
        assert_eq!(keys(&playlist), vec!["c", "d", "a", "b", "e"]);
        forward.revert();
        assert_eq!(keys(&playlist), vec!["a", "b", "c", "d", "e"]);

        // "d e" before "b"
        let mut back = MoveEntries::new(playlist.clone(), 1, 3, 2).unwrap();
        back.commit();
        assert_eq!(keys(&playlist), vec!["a", "d", "e", "b", "c"]);
        back.revert();
        assert_eq!(keys(&playlist), vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn test_move_into_itself_rejected() {
        let mut store = ResourceStore::in_memory().await.unwrap();
        let playlist = playlist_with(&mut store, &["a", "b", "c", "d"]).await;
        assert!(MoveEntries::new(playlist.clone(), 2, 1, 2).is_err());
        assert!(MoveEntries::new(playlist, 0, 3, 2).is_err());
    }

    #[tokio::test]
    async fn test_receipt_updates_snapshot() {
        let mut store = ResourceStore::in_memory().await.unwrap();
        let playlist = playlist_with(&mut store, &["a", "b"]).await;
        let edit = MoveEntries::new(playlist.clone(), 0, 1, 1).unwrap();

        let receipt = PushReceipt {
            snapshot_id: Some("AAAAB3R".to_string()),
        };
        edit.on_pushed(&receipt, &mut store);

        assert_eq!(playlist.read().snapshot_id.as_deref(), Some("AAAAB3R"));
        assert!(store.has_modified());
        match edit.remote_op().collection() {
            RemoteCollection::Playlist { snapshot_id, .. } => {
                assert_eq!(snapshot_id.as_deref(), Some("AAAAB3R"))
            }
            other => panic!("unexpected collection {:?}", other),
        }
    }
}
