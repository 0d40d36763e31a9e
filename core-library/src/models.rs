//! # Resource Model
//!
//! Value types for everything the library mirrors from the remote catalog.
//!
//! ## Overview
//!
//! - Albums, artists and tracks are keyed by their remote id.
//! - Genres and labels are keyed by their name.
//! - Playlists are keyed by their remote id and carry an ordered track list.
//! - Liked songs and saved albums are singleton ordered collections.
//!
//! Cross-references between resources are [`Handle`]s once loaded. On disk
//! they are bare keys (see [`codec`](crate::codec)). The one edge that points
//! "up" the graph, track to album, is an [`AlbumLink`] that does not keep the
//! album alive, so an album and its tracks never form an ownership cycle.

use bridge_traits::remote::RemoteCollection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::entity::{Entity, Handle};

/// Resource kinds, one storage table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Album,
    Artist,
    Track,
    Genre,
    Label,
    Playlist,
    SavedCollection,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Album => "album",
            ResourceKind::Artist => "artist",
            ResourceKind::Track => "track",
            ResourceKind::Genre => "genre",
            ResourceKind::Label => "label",
            ResourceKind::Playlist => "playlist",
            ResourceKind::SavedCollection => "saved collection",
        }
    }

    /// Registered type tag written in front of every record.
    pub fn tag(&self) -> u8 {
        match self {
            ResourceKind::Album => 1,
            ResourceKind::Artist => 2,
            ResourceKind::Track => 3,
            ResourceKind::Genre => 4,
            ResourceKind::Label => 5,
            ResourceKind::Playlist => 6,
            ResourceKind::SavedCollection => 7,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a resource: kind plus key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub key: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

/// A resource type the store knows how to hold.
pub trait Resource: Send + Sync + Sized + 'static {
    const KIND: ResourceKind;

    /// Persist a blank instance as soon as it is created, so other records can
    /// refer to it by key right away.
    const PERSIST_ON_CREATE: bool = false;

    /// Empty instance for a key the store has never seen.
    fn blank() -> Self;

    fn wrap(handle: Handle<Self>) -> AnyResource;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Album {
    pub name: Option<String>,
    pub url: Option<String>,
    /// Release date at whatever precision the catalog reports ("1997", "1997-05-21").
    pub release_date: Option<String>,
    pub popularity: u8,
    pub isrc: Option<String>,
    pub ean: Option<String>,
    pub upc: Option<String>,
    pub images: Vec<String>,
    pub label: Option<Handle<Label>>,
    pub artists: Vec<Handle<Artist>>,
    pub tracks: Vec<Handle<Track>>,
    pub genres: Vec<Handle<Genre>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Artist {
    pub name: Option<String>,
    pub url: Option<String>,
    pub popularity: u8,
    pub followers: u32,
    pub images: Vec<String>,
    pub genres: Vec<Handle<Genre>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: Option<String>,
    pub url: Option<String>,
    pub duration_ms: u32,
    pub explicit: bool,
    pub popularity: u8,
    pub preview_url: Option<String>,
    pub playable: bool,
    pub album: Option<AlbumLink>,
    pub artists: Vec<Handle<Artist>>,
}

impl Default for Track {
    fn default() -> Self {
        Self {
            name: None,
            url: None,
            duration_ms: 0,
            explicit: false,
            popularity: 0,
            preview_url: None,
            playable: true,
            album: None,
            artists: Vec::new(),
        }
    }
}

/// A genre. Its key is its name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Genre;

/// A record label. Its key is its name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Label;

/// Back-reference from a track to its album.
///
/// Holds the album key and a weak pointer. When the album is not otherwise
/// alive, [`ResourceStore::album_of`](crate::store::ResourceStore::album_of)
/// loads it again by key.
#[derive(Clone)]
pub struct AlbumLink {
    key: String,
    album: Weak<Entity<Album>>,
}

impl AlbumLink {
    pub fn new(album: &Handle<Album>) -> Self {
        Self {
            key: album.key().to_string(),
            album: Arc::downgrade(album),
        }
    }

    pub(crate) fn unresolved(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            album: Weak::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The album, if some other holder keeps it alive.
    pub fn upgrade(&self) -> Option<Handle<Album>> {
        self.album.upgrade()
    }
}

impl PartialEq for AlbumLink {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl fmt::Debug for AlbumLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AlbumLink({})", self.key)
    }
}

/// One entry of an ordered collection.
pub struct SavedResource<T: Resource> {
    pub added_at: DateTime<Utc>,
    pub resource: Handle<T>,
}

impl<T: Resource> SavedResource<T> {
    pub fn new(added_at: DateTime<Utc>, resource: Handle<T>) -> Self {
        Self { added_at, resource }
    }

    pub fn key(&self) -> &str {
        self.resource.key()
    }
}

impl<T: Resource> Clone for SavedResource<T> {
    fn clone(&self) -> Self {
        Self {
            added_at: self.added_at,
            resource: Arc::clone(&self.resource),
        }
    }
}

/// Entries are the same entry when they hold the same resource.
impl<T: Resource> PartialEq for SavedResource<T> {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource
    }
}

impl<T: Resource> Eq for SavedResource<T> {}

impl<T: Resource> Hash for SavedResource<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.resource.hash(state);
    }
}

impl<T: Resource> fmt::Debug for SavedResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{}", self.resource, self.added_at.to_rfc3339())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    pub name: Option<String>,
    pub description: Option<String>,
    pub owner: Option<String>,
    /// Opportunistic version token reported by the service.
    pub snapshot_id: Option<String>,
    pub entries: Vec<SavedResource<Track>>,
    pub(crate) contents_loaded: bool,
}

impl Playlist {
    /// Whether `entries` reflects the stored member list.
    pub fn contents_loaded(&self) -> bool {
        self.contents_loaded
    }
}

/// Resource kinds that have a singleton "saved" collection.
pub trait Savable: Resource {
    /// Storage key of the singleton collection.
    const COLLECTION_KEY: &'static str;

    fn remote_collection() -> RemoteCollection;

    fn wrap_collection(handle: Handle<SavedResourceCollection<Self>>) -> AnyResource;
}

/// Liked songs or saved albums.
pub struct SavedResourceCollection<T: Resource> {
    pub entries: Vec<SavedResource<T>>,
}

impl<T: Resource> Default for SavedResourceCollection<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Resource> fmt::Debug for SavedResourceCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedResourceCollection")
            .field("entries", &self.entries)
            .finish()
    }
}

/// The liked songs collection.
pub type LikedSongs = SavedResourceCollection<Track>;

/// The saved albums collection.
pub type SavedAlbums = SavedResourceCollection<Album>;

/// An ordered collection edits can be applied to.
pub trait EntryCollection: Resource {
    type Item: Resource;

    fn entries(&self) -> &[SavedResource<Self::Item>];

    fn entries_mut(&mut self) -> &mut Vec<SavedResource<Self::Item>>;

    /// The remote collection this one mirrors. `key` is the entity key.
    fn remote(&self, key: &str) -> RemoteCollection;

    fn contains(&self, key: &str) -> bool {
        self.entries().iter().any(|entry| entry.key() == key)
    }
}

impl EntryCollection for Playlist {
    type Item = Track;

    fn entries(&self) -> &[SavedResource<Track>] {
        &self.entries
    }

    fn entries_mut(&mut self) -> &mut Vec<SavedResource<Track>> {
        &mut self.entries
    }

    fn remote(&self, key: &str) -> RemoteCollection {
        RemoteCollection::Playlist {
            id: key.to_string(),
            snapshot_id: self.snapshot_id.clone(),
        }
    }
}

impl<T: Savable> EntryCollection for SavedResourceCollection<T> {
    type Item = T;

    fn entries(&self) -> &[SavedResource<T>] {
        &self.entries
    }

    fn entries_mut(&mut self) -> &mut Vec<SavedResource<T>> {
        &mut self.entries
    }

    fn remote(&self, _key: &str) -> RemoteCollection {
        T::remote_collection()
    }
}

impl Savable for Track {
    const COLLECTION_KEY: &'static str = "likedSongs";

    fn remote_collection() -> RemoteCollection {
        RemoteCollection::LikedSongs
    }

    fn wrap_collection(handle: Handle<LikedSongs>) -> AnyResource {
        AnyResource::LikedSongs(handle)
    }
}

impl Savable for Album {
    const COLLECTION_KEY: &'static str = "savedAlbums";

    fn remote_collection() -> RemoteCollection {
        RemoteCollection::SavedAlbums
    }

    fn wrap_collection(handle: Handle<SavedAlbums>) -> AnyResource {
        AnyResource::SavedAlbums(handle)
    }
}

/// Any live resource, for heterogeneous queues and listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnyResource {
    Album(Handle<Album>),
    Artist(Handle<Artist>),
    Track(Handle<Track>),
    Genre(Handle<Genre>),
    Label(Handle<Label>),
    Playlist(Handle<Playlist>),
    LikedSongs(Handle<LikedSongs>),
    SavedAlbums(Handle<SavedAlbums>),
}

impl AnyResource {
    pub fn id(&self) -> ResourceId {
        match self {
            AnyResource::Album(h) => h.id(),
            AnyResource::Artist(h) => h.id(),
            AnyResource::Track(h) => h.id(),
            AnyResource::Genre(h) => h.id(),
            AnyResource::Label(h) => h.id(),
            AnyResource::Playlist(h) => h.id(),
            AnyResource::LikedSongs(h) => h.id(),
            AnyResource::SavedAlbums(h) => h.id(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.id().kind
    }
}

impl fmt::Display for AnyResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

macro_rules! impl_resource {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl_resource!($ty, $kind, $variant, false);
    };
    ($ty:ty, $kind:ident, $variant:ident, $persist:expr) => {
        impl Resource for $ty {
            const KIND: ResourceKind = ResourceKind::$kind;
            const PERSIST_ON_CREATE: bool = $persist;

            fn blank() -> Self {
                <$ty>::default()
            }

            fn wrap(handle: Handle<Self>) -> AnyResource {
                AnyResource::$variant(handle)
            }
        }
    };
}

impl_resource!(Album, Album, Album);
impl_resource!(Artist, Artist, Artist);
impl_resource!(Track, Track, Track);
impl_resource!(Genre, Genre, Genre, true);
impl_resource!(Label, Label, Label, true);
impl_resource!(Playlist, Playlist, Playlist);

impl<T: Savable> Resource for SavedResourceCollection<T> {
    const KIND: ResourceKind = ResourceKind::SavedCollection;

    fn blank() -> Self {
        Self::default()
    }

    fn wrap(handle: Handle<Self>) -> AnyResource {
        T::wrap_collection(handle)
    }
}
