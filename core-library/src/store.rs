//! # Resource Store
//!
//! Identity-cached, lazily cross-referencing object store over a
//! [`KeyValueStore`].
//!
//! ## Loading
//!
//! Records hold their cross-references as keys. Loading is two-phase:
//!
//! 1. The record is decoded into a value with empty reference fields, wrapped
//!    in a handle and registered in the identity cache. The pending keys are
//!    queued as a [`Deferred`] job.
//! 2. `finalize` drains the queue breadth-first, resolving each key through
//!    the cache or the engine. Resolving may queue further jobs; it never
//!    recurses.
//!
//! A key that resolves to nothing leaves the reference empty.
//!
//! ## Dirty tracking
//!
//! Each resource carries two independent flags: own fields changed, and
//! ordered contents changed. Setting a flag queues one flush action; setting
//! it again before the flush is a no-op. [`ResourceStore::flush_all`] runs the
//! queue in order.

use bridge_traits::storage::KeyValueStore;
use core_runtime::config::{CoreConfig, StorageLocation};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, instrument, warn};

use crate::adapters::SqliteStore;
use crate::cache::{Cached, IdentityCaches};
use crate::codec::{decode_entries, encode_entries, Deferred, Record, LIST_TABLE};
use crate::db::DatabaseConfig;
use crate::entity::{Entity, EvictionSender, Handle};
use crate::error::Result;
use crate::models::{
    Album, AlbumLink, AnyResource, Artist, EntryCollection, Genre, Label, LikedSongs, Playlist,
    ResourceId, SavedAlbums, SavedResource, SavedResourceCollection, Savable, Track,
};

/// Resource kinds the store can load, cache and save.
pub trait Stored: Record + Cached {}

impl<T: Record + Cached> Stored for T {}

/// Map growth tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    /// Writes between two map size checks
    pub size_check_interval: u64,
    /// Multiplier applied to the used size when growing the map
    pub growth_factor: u64,
    /// Minimum map size applied on open
    pub initial_map_size: u64,
}

impl StoreSettings {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            size_check_interval: config.size_check_interval,
            growth_factor: config.map_growth_factor,
            initial_map_size: config.initial_map_size,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            size_check_interval: core_runtime::config::DEFAULT_SIZE_CHECK_INTERVAL,
            growth_factor: core_runtime::config::DEFAULT_MAP_GROWTH_FACTOR,
            initial_map_size: core_runtime::config::DEFAULT_INITIAL_MAP_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DirtyFlags {
    fields: bool,
    contents: bool,
}

impl DirtyFlags {
    fn is_clean(&self) -> bool {
        !self.fields && !self.contents
    }
}

#[derive(Debug, Clone)]
enum FlushAction {
    Save(AnyResource),
    SaveContents(AnyResource),
}

impl FlushAction {
    fn id(&self) -> ResourceId {
        match self {
            FlushAction::Save(resource) | FlushAction::SaveContents(resource) => resource.id(),
        }
    }
}

pub struct ResourceStore {
    engine: Arc<dyn KeyValueStore>,
    caches: IdentityCaches,
    evictions: EvictionSender,
    eviction_queue: UnboundedReceiver<ResourceId>,
    deferred: VecDeque<Deferred>,
    dirty: HashMap<ResourceId, DirtyFlags>,
    flush_queue: VecDeque<FlushAction>,
    liked_songs: Weak<Entity<LikedSongs>>,
    saved_albums: Weak<Entity<SavedAlbums>>,
    settings: StoreSettings,
    writes_since_check: u64,
    flush_epoch: u64,
}

impl ResourceStore {
    /// Open a store over `engine`, raising the map size to the configured
    /// minimum.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot report or change its map size.
    pub async fn open(engine: Arc<dyn KeyValueStore>, settings: StoreSettings) -> Result<Self> {
        let stats = engine.map_stats().await?;
        if stats.map_size < settings.initial_map_size {
            engine.set_map_size(settings.initial_map_size).await?;
        }

        let (evictions, eviction_queue) = mpsc::unbounded_channel();
        info!(
            map_size = stats.map_size.max(settings.initial_map_size),
            "Resource store opened"
        );

        Ok(Self {
            engine,
            caches: IdentityCaches::default(),
            evictions,
            eviction_queue,
            deferred: VecDeque::new(),
            dirty: HashMap::new(),
            flush_queue: VecDeque::new(),
            liked_songs: Weak::new(),
            saved_albums: Weak::new(),
            settings,
            writes_since_check: 0,
            flush_epoch: 0,
        })
    }

    /// Open the SQLite-backed store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn from_config(config: &CoreConfig) -> Result<Self> {
        let database = match &config.storage {
            StorageLocation::File(path) => DatabaseConfig::new(path.clone()),
            StorageLocation::InMemory => DatabaseConfig::in_memory(),
        }
        .map_size(config.initial_map_size);

        let engine = SqliteStore::open(database).await?;
        Self::open(Arc::new(engine), StoreSettings::from_config(config)).await
    }

    /// Open an empty in-memory store with default settings.
    pub async fn in_memory() -> Result<Self> {
        let engine = SqliteStore::open(DatabaseConfig::in_memory()).await?;
        Self::open(Arc::new(engine), StoreSettings::default()).await
    }

    pub fn engine(&self) -> &Arc<dyn KeyValueStore> {
        &self.engine
    }

    // ---- Lookup -------------------------------------------------------------

    /// The live instance for `key`, loading it from storage when not cached,
    /// or a blank one when storage has no record either.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt record.
    #[instrument(skip(self), fields(kind = %T::KIND))]
    pub async fn get_or_create<T: Stored>(&mut self, key: &str) -> Result<Handle<T>> {
        let handle = self.obtain::<T>(key).await?;
        self.finalize().await?;
        Ok(handle)
    }

    /// Like [`get_or_create`](Self::get_or_create), but `None` when the key is
    /// neither cached nor stored.
    pub async fn get<T: Stored>(&mut self, key: &str) -> Result<Option<Handle<T>>> {
        let handle = self.resolve::<T>(key).await?;
        self.finalize().await?;
        Ok(handle)
    }

    /// The cached instance for `key`, without touching storage.
    pub fn peek<T: Stored>(&mut self, key: &str) -> Option<Handle<T>> {
        self.drain_evictions();
        T::cache(&mut self.caches).get(key)
    }

    /// Every live instance of `T` plus every stored one, each once.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt record.
    #[instrument(skip(self), fields(kind = %T::KIND))]
    pub async fn values<T: Stored>(&mut self) -> Result<Vec<Handle<T>>> {
        self.drain_evictions();
        let mut values = T::cache(&mut self.caches).live();
        let mut seen: HashSet<String> = values.iter().map(|h| h.key().to_string()).collect();

        for (key, bytes) in self.engine.scan(T::TABLE).await? {
            if seen.insert(key.clone()) {
                values.push(self.materialize_record::<T>(&key, &bytes)?);
            }
        }
        self.finalize().await?;

        debug!(count = values.len(), "Listed values");
        Ok(values)
    }

    /// Remove `key` from the cache and from storage, dropping any queued
    /// flush for it. Returns whether storage held a record.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self), fields(kind = %T::KIND))]
    pub async fn delete<T: Stored>(&mut self, key: &str) -> Result<bool> {
        self.drain_evictions();
        T::cache(&mut self.caches).remove(key);
        self.forget(&ResourceId::new(T::KIND, key));
        let existed = self.engine.delete(T::TABLE, key).await?;
        Ok(existed)
    }

    // ---- Persistence --------------------------------------------------------

    /// Write the direct fields of `handle`, references as keys.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self, handle), fields(id = %handle.id()))]
    pub async fn save<T: Stored>(&mut self, handle: &Handle<T>) -> Result<()> {
        let bytes = handle.read().encode(handle.key())?;
        self.engine.write(T::TABLE, handle.key(), &bytes).await?;
        self.count_write().await
    }

    /// Write the ordered member list of a collection.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    #[instrument(skip(self, handle), fields(key = handle.key()))]
    pub async fn save_entries<C: EntryCollection>(&mut self, handle: &Handle<C>) -> Result<()> {
        let bytes = encode_entries(handle.key(), handle.read().entries())?;
        self.engine.write(LIST_TABLE, handle.key(), &bytes).await?;
        self.count_write().await
    }

    /// Queue a save of the own fields of `handle`. No-op while one is queued.
    pub fn mark_modified<T: Stored>(&mut self, handle: &Handle<T>) {
        let flags = self.dirty.entry(handle.id()).or_default();
        if !flags.fields {
            flags.fields = true;
            self.flush_queue
                .push_back(FlushAction::Save(T::wrap(Arc::clone(handle))));
        }
    }

    /// Queue a save of the member list of `handle`. No-op while one is queued.
    pub fn mark_contents_modified<C: EntryCollection>(&mut self, handle: &Handle<C>) {
        let flags = self.dirty.entry(handle.id()).or_default();
        if !flags.contents {
            flags.contents = true;
            self.flush_queue
                .push_back(FlushAction::SaveContents(C::wrap(Arc::clone(handle))));
        }
    }

    /// Withdraw a queued member list save.
    pub fn unmark_contents_modified<C: EntryCollection>(&mut self, handle: &Handle<C>) {
        let id = handle.id();
        let Some(flags) = self.dirty.get_mut(&id) else {
            return;
        };
        if !flags.contents {
            return;
        }

        flags.contents = false;
        if flags.is_clean() {
            self.dirty.remove(&id);
        }
        self.flush_queue
            .retain(|action| !matches!(action, FlushAction::SaveContents(r) if r.id() == id));
    }

    /// Whether any flush action is queued.
    pub fn has_modified(&self) -> bool {
        !self.flush_queue.is_empty()
    }

    /// Number of completed full flushes.
    pub fn flush_epoch(&self) -> u64 {
        self.flush_epoch
    }

    /// Run every queued flush action in the order it was queued.
    ///
    /// On failure the failed action and everything after it stay queued.
    ///
    /// # Errors
    ///
    /// Returns the first storage failure.
    #[instrument(skip(self), fields(queued = self.flush_queue.len()))]
    pub async fn flush_all(&mut self) -> Result<()> {
        let mut flushed = 0usize;
        while let Some(action) = self.flush_queue.pop_front() {
            if let Err(e) = self.run(&action).await {
                warn!(error = %e, id = %action.id(), flushed, "Flush failed");
                self.flush_queue.push_front(action);
                return Err(e);
            }
            self.clear_flag(&action);
            flushed += 1;
        }

        self.flush_epoch += 1;
        if flushed > 0 {
            self.grow_map().await?;
            info!(flushed, epoch = self.flush_epoch, "Flushed modified resources");
        }
        Ok(())
    }

    /// Grow the memory map to `used × growth_factor` when that exceeds the
    /// current size. Returns whether it grew.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn grow_map(&mut self) -> Result<bool> {
        self.writes_since_check = 0;
        let stats = self.engine.map_stats().await?;
        let target = stats.used_bytes().saturating_mul(self.settings.growth_factor);
        if target <= stats.map_size {
            return Ok(false);
        }

        self.engine.set_map_size(target).await?;
        info!(from = stats.map_size, to = target, "Grew memory map");
        Ok(true)
    }

    /// Flush pending work and close the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or the close fails.
    pub async fn close(&mut self) -> Result<()> {
        self.flush_all().await?;
        self.engine.close().await?;
        Ok(())
    }

    // ---- Collections --------------------------------------------------------

    /// The liked songs singleton, loaded on first use.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt record.
    pub async fn liked_songs(&mut self) -> Result<Handle<LikedSongs>> {
        if let Some(handle) = self.liked_songs.upgrade() {
            return Ok(handle);
        }
        let handle = self.load_collection::<Track>().await?;
        self.liked_songs = Arc::downgrade(&handle);
        Ok(handle)
    }

    /// The saved albums singleton, loaded on first use.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt record.
    pub async fn saved_albums(&mut self) -> Result<Handle<SavedAlbums>> {
        if let Some(handle) = self.saved_albums.upgrade() {
            return Ok(handle);
        }
        let handle = self.load_collection::<Album>().await?;
        self.saved_albums = Arc::downgrade(&handle);
        Ok(handle)
    }

    /// The playlist with remote id `id`, contents loaded.
    pub async fn playlist(&mut self, id: &str) -> Result<Handle<Playlist>> {
        let playlist = self.get_or_create::<Playlist>(id).await?;
        self.populate(&playlist).await?;
        Ok(playlist)
    }

    /// Every known playlist. Contents are not loaded.
    pub async fn playlists(&mut self) -> Result<Vec<Handle<Playlist>>> {
        self.values::<Playlist>().await
    }

    /// Load the member list of `playlist` unless already loaded.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt record.
    pub async fn populate(&mut self, playlist: &Handle<Playlist>) -> Result<()> {
        let loaded = playlist.read().contents_loaded;
        if loaded {
            return Ok(());
        }

        let entries = self.load_entries::<Track>(playlist.key()).await?;
        let mut state = playlist.write();
        state.entries = entries;
        state.contents_loaded = true;
        Ok(())
    }

    /// Remove a playlist record and its member list.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure.
    pub async fn delete_playlist(&mut self, playlist: &Handle<Playlist>) -> Result<()> {
        self.delete::<Playlist>(playlist.key()).await?;
        self.engine.delete(LIST_TABLE, playlist.key()).await?;
        info!(playlist = playlist.key(), "Deleted playlist");
        Ok(())
    }

    /// The album of `track`, loading it if nobody holds it.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt record.
    pub async fn album_of(&mut self, track: &Handle<Track>) -> Result<Option<Handle<Album>>> {
        let link = track.read().album.clone();
        let Some(link) = link else {
            return Ok(None);
        };
        if let Some(album) = link.upgrade() {
            return Ok(Some(album));
        }

        let album = self.get::<Album>(link.key()).await?;
        if let Some(album) = &album {
            track.write().album = Some(AlbumLink::new(album));
        }
        Ok(album)
    }

    // ---- Internals ----------------------------------------------------------

    fn drain_evictions(&mut self) {
        while let Ok(id) = self.eviction_queue.try_recv() {
            self.caches.prune(&id);
        }
    }

    fn materialize<T: Stored>(&mut self, key: &str, value: T) -> Handle<T> {
        let handle = Entity::new(key, value, Some(self.evictions.clone()));
        T::cache(&mut self.caches).insert(&handle);
        handle
    }

    fn materialize_record<T: Stored>(&mut self, key: &str, bytes: &[u8]) -> Result<Handle<T>> {
        let (value, refs) = T::decode(key, bytes)?;
        let handle = self.materialize(key, value);
        if let Some(job) = T::defer(&handle, refs) {
            self.deferred.push_back(job);
        }
        Ok(handle)
    }

    /// Cache hit, else storage. Queues reference resolution, never runs it.
    async fn resolve<T: Stored>(&mut self, key: &str) -> Result<Option<Handle<T>>> {
        if let Some(handle) = self.peek::<T>(key) {
            return Ok(Some(handle));
        }
        match self.engine.read(T::TABLE, key).await? {
            Some(bytes) => Ok(Some(self.materialize_record::<T>(key, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn obtain<T: Stored>(&mut self, key: &str) -> Result<Handle<T>> {
        if let Some(handle) = self.resolve::<T>(key).await? {
            return Ok(handle);
        }

        debug!(kind = %T::KIND, key, "Creating blank resource");
        let handle = self.materialize(key, T::blank());
        if T::PERSIST_ON_CREATE {
            self.save(&handle).await?;
        }
        Ok(handle)
    }

    async fn resolve_all<T: Stored>(&mut self, keys: &[String]) -> Result<Vec<Handle<T>>> {
        let mut handles = Vec::with_capacity(keys.len());
        for key in keys {
            match self.resolve::<T>(key).await? {
                Some(handle) => handles.push(handle),
                None => debug!(kind = %T::KIND, key = key.as_str(), "Dropped dangling reference"),
            }
        }
        Ok(handles)
    }

    async fn finalize(&mut self) -> Result<()> {
        while let Some(job) = self.deferred.pop_front() {
            if let Err(e) = self.apply(&job).await {
                self.deferred.push_front(job);
                return Err(e);
            }
        }
        Ok(())
    }

    async fn apply(&mut self, job: &Deferred) -> Result<()> {
        match job {
            Deferred::Album {
                handle,
                label,
                artists,
                tracks,
                genres,
            } => {
                let label = match label {
                    Some(key) => self.resolve::<Label>(key).await?,
                    None => None,
                };
                let artists = self.resolve_all::<Artist>(artists).await?;
                let tracks = self.resolve_all::<Track>(tracks).await?;
                let genres = self.resolve_all::<Genre>(genres).await?;

                let mut album = handle.write();
                album.label = label;
                album.artists = artists;
                album.tracks = tracks;
                album.genres = genres;
            }
            Deferred::Artist { handle, genres } => {
                let genres = self.resolve_all::<Genre>(genres).await?;
                handle.write().genres = genres;
            }
            Deferred::Track {
                handle,
                album,
                artists,
            } => {
                // The back-reference never loads the album by itself.
                let album = match album {
                    Some(key) => Some(match self.peek::<Album>(key) {
                        Some(album) => AlbumLink::new(&album),
                        None => AlbumLink::unresolved(key.as_str()),
                    }),
                    None => None,
                };
                let artists = self.resolve_all::<Artist>(artists).await?;

                let mut track = handle.write();
                track.album = album;
                track.artists = artists;
            }
        }
        Ok(())
    }

    async fn load_entries<T: Stored>(&mut self, collection_key: &str) -> Result<Vec<SavedResource<T>>> {
        let Some(bytes) = self.engine.read(LIST_TABLE, collection_key).await? else {
            return Ok(Vec::new());
        };

        let records = decode_entries(collection_key, &bytes)?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let resource = self.obtain::<T>(&record.key).await?;
            entries.push(SavedResource::new(record.added_at, resource));
        }
        self.finalize().await?;

        debug!(collection = collection_key, count = entries.len(), "Loaded entries");
        Ok(entries)
    }

    async fn load_collection<T: Savable + Stored>(
        &mut self,
    ) -> Result<Handle<SavedResourceCollection<T>>> {
        let entries = self.load_entries::<T>(T::COLLECTION_KEY).await?;
        Ok(Entity::new(
            T::COLLECTION_KEY,
            SavedResourceCollection { entries },
            None,
        ))
    }

    async fn run(&mut self, action: &FlushAction) -> Result<()> {
        match action {
            FlushAction::Save(resource) => match resource {
                AnyResource::Album(h) => self.save(h).await,
                AnyResource::Artist(h) => self.save(h).await,
                AnyResource::Track(h) => self.save(h).await,
                AnyResource::Genre(h) => self.save(h).await,
                AnyResource::Label(h) => self.save(h).await,
                AnyResource::Playlist(h) => self.save(h).await,
                // Saved collections have no fields besides their entries.
                AnyResource::LikedSongs(_) | AnyResource::SavedAlbums(_) => Ok(()),
            },
            FlushAction::SaveContents(resource) => match resource {
                AnyResource::Playlist(h) => self.save_entries(h).await,
                AnyResource::LikedSongs(h) => self.save_entries(h).await,
                AnyResource::SavedAlbums(h) => self.save_entries(h).await,
                other => {
                    warn!(id = %other.id(), "Ignoring contents flush for a non-collection");
                    Ok(())
                }
            },
        }
    }

    fn clear_flag(&mut self, action: &FlushAction) {
        let id = action.id();
        if let Some(flags) = self.dirty.get_mut(&id) {
            match action {
                FlushAction::Save(_) => flags.fields = false,
                FlushAction::SaveContents(_) => flags.contents = false,
            }
            if flags.is_clean() {
                self.dirty.remove(&id);
            }
        }
    }

    fn forget(&mut self, id: &ResourceId) {
        if self.dirty.remove(id).is_some() {
            self.flush_queue.retain(|action| action.id() != *id);
        }
    }

    async fn count_write(&mut self) -> Result<()> {
        self.writes_since_check += 1;
        if self.writes_since_check >= self.settings.size_check_interval {
            self.grow_map().await?;
        }
        Ok(())
    }
}
