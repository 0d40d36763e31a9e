//! Identity cache.
//!
//! One map per resource kind from key to a weak handle. A live entry means
//! every caller asking for that key gets the same `Arc`. Dead entries are
//! pruned when the eviction notice for them is drained, and skipped on lookup
//! if the notice has not arrived yet.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::entity::{Entity, Handle};
use crate::models::{Album, Artist, Genre, Label, Playlist, Resource, ResourceId, ResourceKind, Track};

pub struct IdentityCache<T: Resource> {
    entries: HashMap<String, Weak<Entity<T>>>,
}

impl<T: Resource> Default for IdentityCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T: Resource> IdentityCache<T> {
    /// The live instance for `key`, if any.
    pub fn get(&self, key: &str) -> Option<Handle<T>> {
        self.entries.get(key).and_then(Weak::upgrade)
    }

    pub fn insert(&mut self, handle: &Handle<T>) {
        self.entries
            .insert(handle.key().to_string(), Arc::downgrade(handle));
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop the slot for `key` only if nobody holds its instance any more. A
    /// fresh instance may have been registered under the same key after the
    /// old one died.
    pub fn prune(&mut self, key: &str) -> bool {
        match self.entries.get(key) {
            Some(weak) if weak.strong_count() == 0 => {
                self.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Every live instance.
    pub fn live(&self) -> Vec<Handle<T>> {
        self.entries.values().filter_map(Weak::upgrade).collect()
    }

    /// Number of slots, dead or alive.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The per-kind caches of one store.
#[derive(Default)]
pub struct IdentityCaches {
    albums: IdentityCache<Album>,
    artists: IdentityCache<Artist>,
    tracks: IdentityCache<Track>,
    genres: IdentityCache<Genre>,
    labels: IdentityCache<Label>,
    playlists: IdentityCache<Playlist>,
}

impl IdentityCaches {
    /// Handle an eviction notice.
    pub fn prune(&mut self, id: &ResourceId) -> bool {
        match id.kind {
            ResourceKind::Album => self.albums.prune(&id.key),
            ResourceKind::Artist => self.artists.prune(&id.key),
            ResourceKind::Track => self.tracks.prune(&id.key),
            ResourceKind::Genre => self.genres.prune(&id.key),
            ResourceKind::Label => self.labels.prune(&id.key),
            ResourceKind::Playlist => self.playlists.prune(&id.key),
            // Saved collections are singletons held outside the caches.
            ResourceKind::SavedCollection => false,
        }
    }
}

/// Resource kinds with an identity cache of their own.
pub trait Cached: Resource {
    fn cache(caches: &mut IdentityCaches) -> &mut IdentityCache<Self>;
}

macro_rules! impl_cached {
    ($ty:ty, $field:ident) => {
        impl Cached for $ty {
            fn cache(caches: &mut IdentityCaches) -> &mut IdentityCache<Self> {
                &mut caches.$field
            }
        }
    };
}

impl_cached!(Album, albums);
impl_cached!(Artist, artists);
impl_cached!(Track, tracks);
impl_cached!(Genre, genres);
impl_cached!(Label, labels);
impl_cached!(Playlist, playlists);
