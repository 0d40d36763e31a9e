//! # Record Codec
//!
//! Binary encoding of resources for the key/value engine.
//!
//! ## Format
//!
//! Every record is one tag byte identifying the [`ResourceKind`] followed by a
//! `bincode` body. Cross-references are written as bare keys, never as nested
//! records, so each record loads on its own and the format has no cycles.
//!
//! ## Two-phase load
//!
//! [`Record::decode`] returns the scalar fields plus the pending reference
//! keys. The store registers the new instance first, then queues a
//! [`Deferred`] job that resolves the keys once the read has finished. This
//! keeps loading breadth-first no matter how deep the reference graph is.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::entity::Handle;
use crate::error::{LibraryError, Result};
use crate::models::{
    Album, Artist, Genre, Label, Playlist, Resource, ResourceKind, SavedResource, Track,
};

/// Table holding the ordered member lists of all collections.
pub const LIST_TABLE: &str = "saved_resource_lists";

/// Every table the store reads or writes.
pub const TABLES: &[&str] = &[
    Album::TABLE,
    Artist::TABLE,
    Track::TABLE,
    Genre::TABLE,
    Label::TABLE,
    Playlist::TABLE,
    LIST_TABLE,
];

/// A resource kind with a storage table and a record layout.
pub trait Record: Resource {
    const TABLE: &'static str;

    /// Reference keys read from a record, waiting to be resolved.
    type Refs;

    fn encode(&self, key: &str) -> Result<Vec<u8>>;

    fn decode(key: &str, bytes: &[u8]) -> Result<(Self, Self::Refs)>;

    /// Queue the resolution of `refs` into `handle`, if there is anything to resolve.
    fn defer(handle: &Handle<Self>, refs: Self::Refs) -> Option<Deferred>;
}

/// Reference resolution still owed to a freshly decoded instance.
pub enum Deferred {
    Album {
        handle: Handle<Album>,
        label: Option<String>,
        artists: Vec<String>,
        tracks: Vec<String>,
        genres: Vec<String>,
    },
    Artist {
        handle: Handle<Artist>,
        genres: Vec<String>,
    },
    Track {
        handle: Handle<Track>,
        album: Option<String>,
        artists: Vec<String>,
    },
}

fn seal<S: Serialize>(kind: ResourceKind, key: &str, body: &S) -> Result<Vec<u8>> {
    let mut bytes = vec![kind.tag()];
    bincode::serialize_into(&mut bytes, body).map_err(|e| LibraryError::Codec {
        kind,
        key: key.to_string(),
        message: e.to_string(),
    })?;
    Ok(bytes)
}

fn open<D: DeserializeOwned>(kind: ResourceKind, key: &str, bytes: &[u8]) -> Result<D> {
    let corrupt = |message: String| LibraryError::Codec {
        kind,
        key: key.to_string(),
        message,
    };

    match bytes.split_first() {
        Some((&tag, body)) if tag == kind.tag() => {
            bincode::deserialize(body).map_err(|e| corrupt(e.to_string()))
        }
        Some((&tag, _)) => Err(corrupt(format!(
            "type tag {} does not match expected tag {}",
            tag,
            kind.tag()
        ))),
        None => Err(corrupt("empty record".to_string())),
    }
}

fn keys_of<T: Resource>(handles: &[Handle<T>]) -> Vec<String> {
    handles.iter().map(|h| h.key().to_string()).collect()
}

#[derive(Serialize, Deserialize)]
struct AlbumRecord {
    name: Option<String>,
    url: Option<String>,
    release_date: Option<String>,
    popularity: u8,
    isrc: Option<String>,
    ean: Option<String>,
    upc: Option<String>,
    images: Vec<String>,
    label: Option<String>,
    artists: Vec<String>,
    tracks: Vec<String>,
    genres: Vec<String>,
}

pub struct AlbumRefs {
    label: Option<String>,
    artists: Vec<String>,
    tracks: Vec<String>,
    genres: Vec<String>,
}

impl Record for Album {
    const TABLE: &'static str = "album";
    type Refs = AlbumRefs;

    fn encode(&self, key: &str) -> Result<Vec<u8>> {
        let record = AlbumRecord {
            name: self.name.clone(),
            url: self.url.clone(),
            release_date: self.release_date.clone(),
            popularity: self.popularity,
            isrc: self.isrc.clone(),
            ean: self.ean.clone(),
            upc: self.upc.clone(),
            images: self.images.clone(),
            label: self.label.as_ref().map(|l| l.key().to_string()),
            artists: keys_of(&self.artists),
            tracks: keys_of(&self.tracks),
            genres: keys_of(&self.genres),
        };
        seal(Self::KIND, key, &record)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<(Self, AlbumRefs)> {
        let r: AlbumRecord = open(Self::KIND, key, bytes)?;
        let album = Album {
            name: r.name,
            url: r.url,
            release_date: r.release_date,
            popularity: r.popularity,
            isrc: r.isrc,
            ean: r.ean,
            upc: r.upc,
            images: r.images,
            ..Album::default()
        };
        let refs = AlbumRefs {
            label: r.label,
            artists: r.artists,
            tracks: r.tracks,
            genres: r.genres,
        };
        Ok((album, refs))
    }

    fn defer(handle: &Handle<Self>, refs: AlbumRefs) -> Option<Deferred> {
        Some(Deferred::Album {
            handle: handle.clone(),
            label: refs.label,
            artists: refs.artists,
            tracks: refs.tracks,
            genres: refs.genres,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct ArtistRecord {
    name: Option<String>,
    url: Option<String>,
    popularity: u8,
    followers: u32,
    images: Vec<String>,
    genres: Vec<String>,
}

impl Record for Artist {
    const TABLE: &'static str = "artist";
    type Refs = Vec<String>;

    fn encode(&self, key: &str) -> Result<Vec<u8>> {
        let record = ArtistRecord {
            name: self.name.clone(),
            url: self.url.clone(),
            popularity: self.popularity,
            followers: self.followers,
            images: self.images.clone(),
            genres: keys_of(&self.genres),
        };
        seal(Self::KIND, key, &record)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<(Self, Vec<String>)> {
        let r: ArtistRecord = open(Self::KIND, key, bytes)?;
        let artist = Artist {
            name: r.name,
            url: r.url,
            popularity: r.popularity,
            followers: r.followers,
            images: r.images,
            genres: Vec::new(),
        };
        Ok((artist, r.genres))
    }

    fn defer(handle: &Handle<Self>, genres: Vec<String>) -> Option<Deferred> {
        if genres.is_empty() {
            return None;
        }
        Some(Deferred::Artist {
            handle: handle.clone(),
            genres,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct TrackRecord {
    name: Option<String>,
    url: Option<String>,
    duration_ms: u32,
    explicit: bool,
    popularity: u8,
    preview_url: Option<String>,
    playable: bool,
    album: Option<String>,
    artists: Vec<String>,
}

pub struct TrackRefs {
    album: Option<String>,
    artists: Vec<String>,
}

impl Record for Track {
    const TABLE: &'static str = "track";
    type Refs = TrackRefs;

    fn encode(&self, key: &str) -> Result<Vec<u8>> {
        let record = TrackRecord {
            name: self.name.clone(),
            url: self.url.clone(),
            duration_ms: self.duration_ms,
            explicit: self.explicit,
            popularity: self.popularity,
            preview_url: self.preview_url.clone(),
            playable: self.playable,
            album: self.album.as_ref().map(|link| link.key().to_string()),
            artists: keys_of(&self.artists),
        };
        seal(Self::KIND, key, &record)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<(Self, TrackRefs)> {
        let r: TrackRecord = open(Self::KIND, key, bytes)?;
        let track = Track {
            name: r.name,
            url: r.url,
            duration_ms: r.duration_ms,
            explicit: r.explicit,
            popularity: r.popularity,
            preview_url: r.preview_url,
            playable: r.playable,
            album: None,
            artists: Vec::new(),
        };
        let refs = TrackRefs {
            album: r.album,
            artists: r.artists,
        };
        Ok((track, refs))
    }

    fn defer(handle: &Handle<Self>, refs: TrackRefs) -> Option<Deferred> {
        if refs.album.is_none() && refs.artists.is_empty() {
            return None;
        }
        Some(Deferred::Track {
            handle: handle.clone(),
            album: refs.album,
            artists: refs.artists,
        })
    }
}

/// Genres and labels have no fields beyond their name, which is the key.
#[derive(Serialize, Deserialize)]
struct NamedRecord;

impl Record for Genre {
    const TABLE: &'static str = "genre";
    type Refs = ();

    fn encode(&self, key: &str) -> Result<Vec<u8>> {
        seal(Self::KIND, key, &NamedRecord)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<(Self, ())> {
        open::<NamedRecord>(Self::KIND, key, bytes)?;
        Ok((Genre, ()))
    }

    fn defer(_handle: &Handle<Self>, _refs: ()) -> Option<Deferred> {
        None
    }
}

impl Record for Label {
    const TABLE: &'static str = "label";
    type Refs = ();

    fn encode(&self, key: &str) -> Result<Vec<u8>> {
        seal(Self::KIND, key, &NamedRecord)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<(Self, ())> {
        open::<NamedRecord>(Self::KIND, key, bytes)?;
        Ok((Label, ()))
    }

    fn defer(_handle: &Handle<Self>, _refs: ()) -> Option<Deferred> {
        None
    }
}

/// Playlist metadata. The member list lives in [`LIST_TABLE`].
#[derive(Serialize, Deserialize)]
struct PlaylistRecord {
    name: Option<String>,
    description: Option<String>,
    owner: Option<String>,
    snapshot_id: Option<String>,
}

impl Record for Playlist {
    const TABLE: &'static str = "playlist";
    type Refs = ();

    fn encode(&self, key: &str) -> Result<Vec<u8>> {
        let record = PlaylistRecord {
            name: self.name.clone(),
            description: self.description.clone(),
            owner: self.owner.clone(),
            snapshot_id: self.snapshot_id.clone(),
        };
        seal(Self::KIND, key, &record)
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<(Self, ())> {
        let r: PlaylistRecord = open(Self::KIND, key, bytes)?;
        let playlist = Playlist {
            name: r.name,
            description: r.description,
            owner: r.owner,
            snapshot_id: r.snapshot_id,
            ..Playlist::default()
        };
        Ok((playlist, ()))
    }

    fn defer(_handle: &Handle<Self>, _refs: ()) -> Option<Deferred> {
        None
    }
}

/// One stored collection entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub added_at: DateTime<Utc>,
    pub key: String,
}

pub fn encode_entries<T: Resource>(collection_key: &str, entries: &[SavedResource<T>]) -> Result<Vec<u8>> {
    let records: Vec<EntryRecord> = entries
        .iter()
        .map(|entry| EntryRecord {
            added_at: entry.added_at,
            key: entry.key().to_string(),
        })
        .collect();
    seal(ResourceKind::SavedCollection, collection_key, &records)
}

pub fn decode_entries(collection_key: &str, bytes: &[u8]) -> Result<Vec<EntryRecord>> {
    open(ResourceKind::SavedCollection, collection_key, bytes)
}
