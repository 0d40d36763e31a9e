//! # Reachability Sweep
//!
//! [`Cleanup`] snapshots every album, artist, genre, label and track, then
//! walks from the roots (saved albums, every playlist, liked songs) striking
//! whatever is reachable off the candidate lists. What remains can be deleted
//! with [`Cleanup::clean`], or rescued one at a time with [`Cleanup::keep`].
//!
//! Reachability rules:
//! - an album keeps its tracks, artists, label and genres
//! - an artist keeps its genres
//! - a track keeps its artists, and its album when reached from a root
//!
//! The snapshot is taken once. Later store mutations are not reflected.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::entity::Handle;
use crate::error::Result;
use crate::models::{Album, AnyResource, Artist, Genre, Label, Resource, Track};
use crate::store::{ResourceStore, Stored};

/// Deletion candidates of one kind, by key.
type Candidates<T> = HashMap<String, Handle<T>>;

pub struct Cleanup {
    albums: Candidates<Album>,
    artists: Candidates<Artist>,
    genres: Candidates<Genre>,
    labels: Candidates<Label>,
    tracks: Candidates<Track>,
    recovered: Option<Vec<AnyResource>>,
}

async fn snapshot<T: Stored>(store: &mut ResourceStore) -> Result<Candidates<T>> {
    Ok(store
        .values::<T>()
        .await?
        .into_iter()
        .map(|handle| (handle.key().to_string(), handle))
        .collect())
}

impl Cleanup {
    /// Build the candidate sets.
    ///
    /// # Errors
    ///
    /// Returns an error on storage failure or a corrupt record.
    #[instrument(skip(store))]
    pub async fn new(store: &mut ResourceStore) -> Result<Self> {
        // Albums first, so tracks loaded afterwards link to the cached album.
        let albums = snapshot::<Album>(store).await?;
        let mut cleanup = Self {
            albums,
            artists: snapshot::<Artist>(store).await?,
            genres: snapshot::<Genre>(store).await?,
            labels: snapshot::<Label>(store).await?,
            tracks: snapshot::<Track>(store).await?,
            recovered: None,
        };
        debug!(total = cleanup.len(), "Snapshot taken");

        let saved_albums = store.saved_albums().await?;
        let roots: Vec<Handle<Album>> = saved_albums
            .read()
            .entries
            .iter()
            .map(|entry| Arc::clone(&entry.resource))
            .collect();
        for album in &roots {
            cleanup.keep_album(album);
        }

        for playlist in store.playlists().await? {
            store.populate(&playlist).await?;
            let tracks: Vec<Handle<Track>> = playlist
                .read()
                .entries
                .iter()
                .map(|entry| Arc::clone(&entry.resource))
                .collect();
            for track in &tracks {
                cleanup.keep_track(track);
            }
        }

        let liked_songs = store.liked_songs().await?;
        let tracks: Vec<Handle<Track>> = liked_songs
            .read()
            .entries
            .iter()
            .map(|entry| Arc::clone(&entry.resource))
            .collect();
        for track in &tracks {
            cleanup.keep_track(track);
        }

        cleanup.recovered = Some(Vec::new());
        info!(candidates = cleanup.len(), "Cleanup prepared");
        Ok(cleanup)
    }

    /// Take `resource` off the candidate lists along with everything it
    /// keeps. Returns every resource recovered by this call.
    pub fn keep(&mut self, resource: &AnyResource) -> Vec<AnyResource> {
        let start = self.recovered.as_ref().map_or(0, Vec::len);

        match resource {
            AnyResource::Album(album) => self.keep_album(album),
            AnyResource::Artist(artist) => self.keep_artist(artist),
            AnyResource::Genre(genre) => self.keep_named(genre),
            AnyResource::Label(label) => self.keep_named(label),
            AnyResource::Track(track) => self.keep_track(track),
            AnyResource::Playlist(_) | AnyResource::LikedSongs(_) | AnyResource::SavedAlbums(_) => {}
        }

        match &self.recovered {
            Some(recovered) => recovered[start..].to_vec(),
            None => Vec::new(),
        }
    }

    /// Delete every remaining candidate. Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns the first storage failure. Candidates deleted before it stay
    /// deleted.
    #[instrument(skip(self, store), fields(candidates = self.len()))]
    pub async fn clean(self, store: &mut ResourceStore) -> Result<usize> {
        let mut deleted = 0;
        for key in self.albums.keys() {
            deleted += usize::from(store.delete::<Album>(key).await?);
        }
        for key in self.artists.keys() {
            deleted += usize::from(store.delete::<Artist>(key).await?);
        }
        for key in self.genres.keys() {
            deleted += usize::from(store.delete::<Genre>(key).await?);
        }
        for key in self.labels.keys() {
            deleted += usize::from(store.delete::<Label>(key).await?);
        }
        for key in self.tracks.keys() {
            deleted += usize::from(store.delete::<Track>(key).await?);
        }

        info!(deleted, "Library cleaned");
        Ok(deleted)
    }

    pub fn albums(&self) -> impl Iterator<Item = &Handle<Album>> {
        self.albums.values()
    }

    pub fn artists(&self) -> impl Iterator<Item = &Handle<Artist>> {
        self.artists.values()
    }

    pub fn genres(&self) -> impl Iterator<Item = &Handle<Genre>> {
        self.genres.values()
    }

    pub fn labels(&self) -> impl Iterator<Item = &Handle<Label>> {
        self.labels.values()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Handle<Track>> {
        self.tracks.values()
    }

    /// Every candidate: tracks, albums, artists, genres, then labels.
    pub fn candidates(&self) -> Vec<AnyResource> {
        let tracks = self.tracks().cloned().map(Track::wrap);
        let albums = self.albums().cloned().map(Album::wrap);
        let artists = self.artists().cloned().map(Artist::wrap);
        let genres = self.genres().cloned().map(Genre::wrap);
        let labels = self.labels().cloned().map(Label::wrap);
        tracks.chain(albums).chain(artists).chain(genres).chain(labels).collect()
    }

    pub fn len(&self) -> usize {
        self.albums.len() + self.artists.len() + self.genres.len() + self.labels.len() + self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn recover(&mut self, resource: AnyResource) {
        if let Some(recovered) = &mut self.recovered {
            recovered.push(resource);
        }
    }

    fn keep_album(&mut self, album: &Handle<Album>) {
        let Some(album) = self.albums.remove(album.key()) else {
            return;
        };
        self.recover(Album::wrap(Arc::clone(&album)));

        let (tracks, artists, label, genres) = {
            let state = album.read();
            (state.tracks.clone(), state.artists.clone(), state.label.clone(), state.genres.clone())
        };
        for track in &tracks {
            self.keep_track_only(track);
        }
        for artist in &artists {
            self.keep_artist(artist);
        }
        if let Some(label) = &label {
            self.keep_named(label);
        }
        for genre in &genres {
            self.keep_named(genre);
        }
    }

    fn keep_artist(&mut self, artist: &Handle<Artist>) {
        let Some(artist) = self.artists.remove(artist.key()) else {
            return;
        };
        self.recover(Artist::wrap(Arc::clone(&artist)));

        let genres = artist.read().genres.clone();
        for genre in &genres {
            self.keep_named(genre);
        }
    }

    /// Returns whether the track was still a candidate.
    fn keep_track_only(&mut self, track: &Handle<Track>) -> bool {
        let Some(track) = self.tracks.remove(track.key()) else {
            return false;
        };
        self.recover(Track::wrap(Arc::clone(&track)));

        let artists = track.read().artists.clone();
        for artist in &artists {
            self.keep_artist(artist);
        }
        true
    }

    fn keep_track(&mut self, track: &Handle<Track>) {
        if !self.keep_track_only(track) {
            return;
        }
        let album_key = track.read().album.as_ref().map(|link| link.key().to_string());
        let album = album_key.and_then(|key| self.albums.get(&key).cloned());
        if let Some(album) = album {
            self.keep_album(&album);
        }
    }

    fn keep_named<T: NamedCandidate>(&mut self, resource: &Handle<T>) {
        if let Some(resource) = T::candidates(self).remove(resource.key()) {
            self.recover(T::wrap(resource));
        }
    }
}

/// Genres and labels, which keep nothing else.
trait NamedCandidate: Resource {
    fn candidates(cleanup: &mut Cleanup) -> &mut Candidates<Self>;
}

impl NamedCandidate for Genre {
    fn candidates(cleanup: &mut Cleanup) -> &mut Candidates<Self> {
        &mut cleanup.genres
    }
}

impl NamedCandidate for Label {
    fn candidates(cleanup: &mut Cleanup) -> &mut Candidates<Self> {
        &mut cleanup.labels
    }
}
