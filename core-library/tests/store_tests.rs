//! Integration tests for the resource store
//!
//! These tests verify the store against an in-memory SQLite engine:
//! - Identity of live instances and reloading after eviction
//! - Reference resolution and the track to album back-reference
//! - Flush ordering, partial failure, and map growth
//! - Playlist and saved collection persistence
//! - The reachability sweep

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::storage::{KeyValueStore, MapStats};
use chrono::{TimeZone, Utc};
use core_library::adapters::SqliteStore;
use core_library::db::DatabaseConfig;
use core_library::models::{
    Album, AlbumLink, AnyResource, Artist, Genre, Label, Playlist, Resource, ResourceId,
    ResourceKind, SavedResource, Track,
};
use core_library::{Cleanup, ResourceStore, StoreSettings};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

// ============================================================================
// Helpers
// ============================================================================

async fn open_store() -> ResourceStore {
    ResourceStore::in_memory().await.unwrap()
}

/// Engine wrapper whose writes to one table can be made to fail.
struct FlakyEngine {
    inner: SqliteStore,
    failing_table: Mutex<Option<String>>,
}

impl FlakyEngine {
    async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteStore::open(DatabaseConfig::in_memory()).await.unwrap(),
            failing_table: Mutex::new(None),
        })
    }

    fn fail_writes_to(&self, table: Option<&str>) {
        *self.failing_table.lock().unwrap() = table.map(str::to_string);
    }
}

#[async_trait]
impl KeyValueStore for FlakyEngine {
    async fn read(&self, table: &str, key: &str) -> BridgeResult<Option<Vec<u8>>> {
        self.inner.read(table, key).await
    }

    async fn write(&self, table: &str, key: &str, value: &[u8]) -> BridgeResult<()> {
        let failing = self.failing_table.lock().unwrap().clone();
        if failing.as_deref() == Some(table) {
            return Err(BridgeError::Storage("disk full".to_string()));
        }
        self.inner.write(table, key, value).await
    }

    async fn delete(&self, table: &str, key: &str) -> BridgeResult<bool> {
        self.inner.delete(table, key).await
    }

    async fn scan(&self, table: &str) -> BridgeResult<Vec<(String, Vec<u8>)>> {
        self.inner.scan(table).await
    }

    async fn map_stats(&self) -> BridgeResult<MapStats> {
        self.inner.map_stats().await
    }

    async fn set_map_size(&self, bytes: u64) -> BridgeResult<()> {
        self.inner.set_map_size(bytes).await
    }

    async fn close(&self) -> BridgeResult<()> {
        self.inner.close().await
    }
}

fn ids(resources: &[AnyResource]) -> BTreeSet<ResourceId> {
    resources.iter().map(AnyResource::id).collect()
}

fn id(kind: ResourceKind, key: &str) -> ResourceId {
    ResourceId::new(kind, key)
}

// ============================================================================
// Identity and loading
// ============================================================================

#[tokio::test]
async fn test_get_or_create_returns_same_instance() {
    let mut store = open_store().await;

    let first = store.get_or_create::<Album>("5Z9iiGl2FcIfa3BMiv6OIw").await.unwrap();
    let second = store.get_or_create::<Album>("5Z9iiGl2FcIfa3BMiv6OIw").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let other = store.get_or_create::<Album>("1bt6q2SruMsBtcerNVtpZB").await.unwrap();
    assert!(!Arc::ptr_eq(&first, &other));
}

#[tokio::test]
async fn test_evicted_instance_is_replaced() {
    let mut store = open_store().await;

    let artist = store.get_or_create::<Artist>("0k17h0D3J5VfsdmQ1iZtE9").await.unwrap();
    artist.write().name = Some("Pink Floyd".to_string());
    store.mark_modified(&artist);
    store.flush_all().await.unwrap();

    let weak = Arc::downgrade(&artist);
    drop(artist);
    assert!(weak.upgrade().is_none());

    let reloaded = store.get_or_create::<Artist>("0k17h0D3J5VfsdmQ1iZtE9").await.unwrap();
    assert_eq!(reloaded.read().name.as_deref(), Some("Pink Floyd"));
}

#[tokio::test]
async fn test_round_trip_resolves_references() {
    let mut store = open_store().await;
    {
        let genre = store.get_or_create::<Genre>("art rock").await.unwrap();
        let label = store.get_or_create::<Label>("Harvest").await.unwrap();
        let artist = store.get_or_create::<Artist>("0k17h0D3J5VfsdmQ1iZtE9").await.unwrap();
        let album = store.get_or_create::<Album>("4LH4d3cOWNNsVw41Gqt2kv").await.unwrap();
        let track = store.get_or_create::<Track>("6FBPOJLxUZEair6x4kLDhf").await.unwrap();

        artist.write().genres = vec![genre.clone()];
        {
            let mut state = track.write();
            state.name = Some("Time".to_string());
            state.duration_ms = 413_000;
            state.album = Some(AlbumLink::new(&album));
            state.artists = vec![artist.clone()];
        }
        {
            let mut state = album.write();
            state.name = Some("The Dark Side of the Moon".to_string());
            state.release_date = Some("1973-03-01".to_string());
            state.label = Some(label);
            state.artists = vec![artist.clone()];
            state.tracks = vec![track.clone()];
            state.genres = vec![genre];
        }

        store.mark_modified(&artist);
        store.mark_modified(&album);
        store.mark_modified(&track);
        store.flush_all().await.unwrap();
    }

    let album = store.get_or_create::<Album>("4LH4d3cOWNNsVw41Gqt2kv").await.unwrap();
    let state = album.read();
    assert_eq!(state.name.as_deref(), Some("The Dark Side of the Moon"));
    assert_eq!(state.release_date.as_deref(), Some("1973-03-01"));
    assert_eq!(state.label.as_ref().map(|l| l.key()), Some("Harvest"));
    assert_eq!(state.genres.len(), 1);
    assert_eq!(state.artists[0].read().genres[0].key(), "art rock");

    let track = &state.tracks[0];
    assert_eq!(track.read().name.as_deref(), Some("Time"));
    assert_eq!(track.read().duration_ms, 413_000);
    assert!(Arc::ptr_eq(&track.read().artists[0], &state.artists[0]));

    let link = track.read().album.clone().unwrap();
    assert!(Arc::ptr_eq(&link.upgrade().unwrap(), &album));
}

#[tokio::test]
async fn test_album_of_loads_on_demand() {
    let mut store = open_store().await;
    {
        let album = store.get_or_create::<Album>("2ix8vWvvSp2Yo7rKMiWpkg").await.unwrap();
        let track = store.get_or_create::<Track>("3n3Ppam7vgaVa1iaRUc9Lp").await.unwrap();
        track.write().album = Some(AlbumLink::new(&album));
        album.write().name = Some("Hot Fuss".to_string());
        store.mark_modified(&album);
        store.mark_modified(&track);
        store.flush_all().await.unwrap();
    }

    let track = store.get::<Track>("3n3Ppam7vgaVa1iaRUc9Lp").await.unwrap().unwrap();
    let link = track.read().album.clone().unwrap();
    assert_eq!(link.key(), "2ix8vWvvSp2Yo7rKMiWpkg");
    assert!(link.upgrade().is_none());

    let album = store.album_of(&track).await.unwrap().unwrap();
    assert_eq!(album.read().name.as_deref(), Some("Hot Fuss"));
    let again = store.album_of(&track).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&album, &again));
}

#[tokio::test]
async fn test_dangling_reference_is_dropped() {
    let mut store = open_store().await;
    {
        let artist = store.get_or_create::<Artist>("1dfeR4HaWDbWqFHLkxsg1d").await.unwrap();
        let track = store.get_or_create::<Track>("7tFiyTwD0nx5a1eklYtX2J").await.unwrap();
        track.write().artists = vec![artist];
        store.mark_modified(&track);
        store.flush_all().await.unwrap();
    }

    // The artist itself was never saved.
    let track = store.get::<Track>("7tFiyTwD0nx5a1eklYtX2J").await.unwrap().unwrap();
    assert!(track.read().artists.is_empty());
}

#[tokio::test]
async fn test_named_resources_persist_on_create() {
    let mut store = open_store().await;
    drop(store.get_or_create::<Genre>("krautrock").await.unwrap());
    drop(store.get_or_create::<Track>("0nrRP2bk19rLc0orkWPQk2").await.unwrap());

    assert!(store.get::<Genre>("krautrock").await.unwrap().is_some());
    assert!(store.get::<Track>("0nrRP2bk19rLc0orkWPQk2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_values_lists_cached_and_stored_once() {
    let mut store = open_store().await;
    for key in ["a", "b", "c"] {
        let artist = store.get_or_create::<Artist>(key).await.unwrap();
        store.save(&artist).await.unwrap();
    }
    let _live = store.get_or_create::<Artist>("b").await.unwrap();
    let _unsaved = store.get_or_create::<Artist>("d").await.unwrap();

    let keys: BTreeSet<String> = store
        .values::<Artist>()
        .await
        .unwrap()
        .iter()
        .map(|a| a.key().to_string())
        .collect();
    let expected: BTreeSet<String> = ["a", "b", "c", "d"].iter().map(|k| k.to_string()).collect();
    assert_eq!(keys, expected);
}

// ============================================================================
// Flushing
// ============================================================================

#[tokio::test]
async fn test_failed_flush_keeps_remaining_actions() {
    let engine = FlakyEngine::new().await;
    let mut store = ResourceStore::open(engine.clone(), StoreSettings::default())
        .await
        .unwrap();

    let album = store.get_or_create::<Album>("album").await.unwrap();
    let artist = store.get_or_create::<Artist>("artist").await.unwrap();
    let track = store.get_or_create::<Track>("track").await.unwrap();
    store.mark_modified(&album);
    store.mark_modified(&artist);
    store.mark_modified(&track);

    engine.fail_writes_to(Some("artist"));
    assert!(store.flush_all().await.unwrap_err().is_storage());
    assert!(store.has_modified());
    assert_eq!(store.flush_epoch(), 0);
    assert!(engine.read("album", "album").await.unwrap().is_some());
    assert!(engine.read("track", "track").await.unwrap().is_none());

    engine.fail_writes_to(None);
    store.flush_all().await.unwrap();
    assert!(!store.has_modified());
    assert_eq!(store.flush_epoch(), 1);
    assert!(engine.read("artist", "artist").await.unwrap().is_some());
    assert!(engine.read("track", "track").await.unwrap().is_some());
}

#[tokio::test]
async fn test_map_grows_with_writes() {
    let engine = Arc::new(SqliteStore::open(DatabaseConfig::in_memory()).await.unwrap());
    let settings = StoreSettings {
        size_check_interval: 2,
        growth_factor: 4,
        initial_map_size: 1,
    };
    let mut store = ResourceStore::open(engine.clone(), settings).await.unwrap();
    assert_eq!(engine.map_stats().await.unwrap().map_size, 1);

    for i in 0..4 {
        let track = store.get_or_create::<Track>(&format!("track-{}", i)).await.unwrap();
        store.save(&track).await.unwrap();
    }

    let stats = engine.map_stats().await.unwrap();
    assert!(stats.map_size >= stats.used_bytes() * 4);
}

#[tokio::test]
async fn test_grow_map_never_shrinks() {
    let mut store = open_store().await;
    let before = store.engine().map_stats().await.unwrap().map_size;

    assert!(!store.grow_map().await.unwrap());
    assert_eq!(store.engine().map_stats().await.unwrap().map_size, before);
}

// ============================================================================
// Collections
// ============================================================================

#[tokio::test]
async fn test_playlist_contents_round_trip() {
    let mut store = open_store().await;
    let first_added = Utc.with_ymd_and_hms(2021, 4, 2, 10, 0, 0).unwrap();
    {
        let playlist = store.playlist("37i9dQZF1DWXRqgorJj26U").await.unwrap();
        let a = store.get_or_create::<Track>("t-a").await.unwrap();
        let b = store.get_or_create::<Track>("t-b").await.unwrap();
        {
            let mut state = playlist.write();
            state.name = Some("Rock Classics".to_string());
            state.entries = vec![
                SavedResource::new(first_added, b),
                SavedResource::new(Utc::now(), a),
            ];
        }
        store.mark_modified(&playlist);
        store.mark_contents_modified(&playlist);
        store.flush_all().await.unwrap();
    }

    let listed = store.playlists().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].read().contents_loaded());
    drop(listed);

    let playlist = store.playlist("37i9dQZF1DWXRqgorJj26U").await.unwrap();
    let state = playlist.read();
    assert!(state.contents_loaded());
    assert_eq!(state.name.as_deref(), Some("Rock Classics"));
    let keys: Vec<&str> = state.entries.iter().map(|e| e.key()).collect();
    assert_eq!(keys, vec!["t-b", "t-a"]);
    assert_eq!(state.entries[0].added_at, first_added);
}

#[tokio::test]
async fn test_saved_albums_persist() {
    let mut store = open_store().await;
    {
        let saved = store.saved_albums().await.unwrap();
        let album = store.get_or_create::<Album>("0bCAjiUamIFqKJsekOYuRw").await.unwrap();
        saved.write().entries.push(SavedResource::new(Utc::now(), album));
        store.mark_contents_modified(&saved);
        store.flush_all().await.unwrap();
    }

    let saved = store.saved_albums().await.unwrap();
    assert_eq!(saved.read().entries.len(), 1);
    assert_eq!(saved.read().entries[0].key(), "0bCAjiUamIFqKJsekOYuRw");
}

#[tokio::test]
async fn test_delete_playlist_removes_contents() {
    let mut store = open_store().await;
    let playlist = store.playlist("37i9dQZF1DX1lVhptIYRda").await.unwrap();
    let track = store.get_or_create::<Track>("t").await.unwrap();
    playlist.write().entries.push(SavedResource::new(Utc::now(), track));
    store.mark_modified(&playlist);
    store.mark_contents_modified(&playlist);
    store.flush_all().await.unwrap();

    store.delete_playlist(&playlist).await.unwrap();
    drop(playlist);

    assert!(store.playlists().await.unwrap().is_empty());
    let fresh = store.playlist("37i9dQZF1DX1lVhptIYRda").await.unwrap();
    assert!(fresh.read().entries.is_empty());
}

// ============================================================================
// Reachability sweep
// ============================================================================

/// Builds a library with one saved album, one playlist, and one orphan
/// album, then drops every handle.
async fn seed_library(store: &mut ResourceStore) {
    let saved = store.saved_albums().await.unwrap();
    let playlist = store.playlist("p").await.unwrap();

    // Saved album A1: track T1, artist R1, label L1, genre G1.
    let a1 = store.get_or_create::<Album>("A1").await.unwrap();
    let t1 = store.get_or_create::<Track>("T1").await.unwrap();
    let r1 = store.get_or_create::<Artist>("R1").await.unwrap();
    let l1 = store.get_or_create::<Label>("L1").await.unwrap();
    let g1 = store.get_or_create::<Genre>("G1").await.unwrap();
    t1.write().album = Some(AlbumLink::new(&a1));
    {
        let mut state = a1.write();
        state.tracks = vec![t1.clone()];
        state.artists = vec![r1.clone()];
        state.label = Some(l1);
        state.genres = vec![g1];
    }
    saved.write().entries.push(SavedResource::new(Utc::now(), a1.clone()));

    // Playlist track T2 on album A2 by R2.
    let a2 = store.get_or_create::<Album>("A2").await.unwrap();
    let t2 = store.get_or_create::<Track>("T2").await.unwrap();
    let r2 = store.get_or_create::<Artist>("R2").await.unwrap();
    {
        let mut state = t2.write();
        state.album = Some(AlbumLink::new(&a2));
        state.artists = vec![r2.clone()];
    }
    a2.write().tracks = vec![t2.clone()];
    playlist.write().entries.push(SavedResource::new(Utc::now(), t2.clone()));

    // Orphan A3: track T3 by R3, who is tagged G3. G4 is referenced by nothing.
    let a3 = store.get_or_create::<Album>("A3").await.unwrap();
    let t3 = store.get_or_create::<Track>("T3").await.unwrap();
    let r3 = store.get_or_create::<Artist>("R3").await.unwrap();
    let g3 = store.get_or_create::<Genre>("G3").await.unwrap();
    drop(store.get_or_create::<Genre>("G4").await.unwrap());
    r3.write().genres = vec![g3];
    {
        let mut state = t3.write();
        state.album = Some(AlbumLink::new(&a3));
        state.artists = vec![r3.clone()];
    }
    a3.write().tracks = vec![t3.clone()];

    for album in [&a1, &a2, &a3] {
        store.mark_modified(album);
    }
    for track in [&t1, &t2, &t3] {
        store.mark_modified(track);
    }
    for artist in [&r1, &r2, &r3] {
        store.mark_modified(artist);
    }
    store.mark_modified(&playlist);
    store.mark_contents_modified(&playlist);
    store.mark_contents_modified(&saved);
    store.flush_all().await.unwrap();
}

#[tokio::test]
async fn test_cleanup_candidates_are_unreachable() {
    let mut store = open_store().await;
    seed_library(&mut store).await;

    let cleanup = Cleanup::new(&mut store).await.unwrap();
    let expected: BTreeSet<ResourceId> = [
        id(ResourceKind::Album, "A3"),
        id(ResourceKind::Track, "T3"),
        id(ResourceKind::Artist, "R3"),
        id(ResourceKind::Genre, "G3"),
        id(ResourceKind::Genre, "G4"),
    ]
    .into_iter()
    .collect();

    assert_eq!(ids(&cleanup.candidates()), expected);
    assert_eq!(cleanup.len(), 5);
}

#[tokio::test]
async fn test_keep_recovers_dependencies() {
    let mut store = open_store().await;
    seed_library(&mut store).await;

    let mut cleanup = Cleanup::new(&mut store).await.unwrap();
    let a3 = cleanup.albums().find(|a| a.key() == "A3").cloned().unwrap();

    let recovered = cleanup.keep(&Album::wrap(a3.clone()));
    let expected: BTreeSet<ResourceId> = [
        id(ResourceKind::Album, "A3"),
        id(ResourceKind::Track, "T3"),
        id(ResourceKind::Artist, "R3"),
        id(ResourceKind::Genre, "G3"),
    ]
    .into_iter()
    .collect();
    assert_eq!(ids(&recovered), expected);

    // Already kept: nothing more to recover.
    assert!(cleanup.keep(&Album::wrap(a3)).is_empty());

    assert_eq!(cleanup.clean(&mut store).await.unwrap(), 1);
    assert!(store.get::<Genre>("G4").await.unwrap().is_none());
    assert!(store.get::<Genre>("G3").await.unwrap().is_some());
    assert!(store.get::<Album>("A3").await.unwrap().is_some());
    assert!(store.get::<Track>("T3").await.unwrap().is_some());
}

#[tokio::test]
async fn test_keep_track_recovers_its_album() {
    let mut store = open_store().await;
    seed_library(&mut store).await;

    let mut cleanup = Cleanup::new(&mut store).await.unwrap();
    let t3 = cleanup.tracks().find(|t| t.key() == "T3").cloned().unwrap();

    let recovered = cleanup.keep(&Track::wrap(t3));
    assert!(ids(&recovered).contains(&id(ResourceKind::Album, "A3")));
    assert_eq!(cleanup.len(), 1);
}

#[tokio::test]
async fn test_empty_library_has_no_candidates() {
    let mut store = open_store().await;
    let cleanup = Cleanup::new(&mut store).await.unwrap();
    assert!(cleanup.is_empty());
    assert_eq!(cleanup.clean(&mut store).await.unwrap(), 0);
}

#[tokio::test]
async fn test_playlist_resource_is_not_a_candidate_kind() {
    let mut store = open_store().await;
    let playlist = store.playlist("p").await.unwrap();
    let mut cleanup = Cleanup::new(&mut store).await.unwrap();
    assert!(cleanup.keep(&Playlist::wrap(playlist)).is_empty());
}
