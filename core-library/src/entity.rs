//! # Shared Entity Handles
//!
//! Every materialized resource lives in an [`Entity`] behind an `Arc`. The
//! store's identity cache keeps only `Weak` references, so an entity is
//! dropped as soon as the last caller lets go of it. Its `Drop` posts the
//! resource id on the eviction channel, and the store prunes the dead cache
//! slot on its next access.
//!
//! Equality and hashing go by kind and key only, never by field values.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::models::{Resource, ResourceId};

/// Shared handle to a live resource.
pub type Handle<T> = Arc<Entity<T>>;

pub(crate) type EvictionSender = UnboundedSender<ResourceId>;

pub struct Entity<T: Resource> {
    key: String,
    state: RwLock<T>,
    evictions: Option<EvictionSender>,
}

impl<T: Resource> Entity<T> {
    pub(crate) fn new(key: impl Into<String>, value: T, evictions: Option<EvictionSender>) -> Handle<T> {
        Arc::new(Self {
            key: key.into(),
            state: RwLock::new(value),
            evictions,
        })
    }

    /// Storage and identity key: the remote id, or the name for genres and labels.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(T::KIND, self.key.clone())
    }

    /// Shared access to the fields. Do not hold across an `.await`.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.state.read()
    }

    /// Exclusive access to the fields. Do not hold across an `.await`.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.state.write()
    }
}

impl<T: Resource> Drop for Entity<T> {
    fn drop(&mut self) {
        if let Some(evictions) = &self.evictions {
            // The store may already be gone; nothing left to prune then.
            let _ = evictions.send(ResourceId::new(T::KIND, std::mem::take(&mut self.key)));
        }
    }
}

impl<T: Resource> PartialEq for Entity<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T: Resource> Eq for Entity<T> {}

impl<T: Resource> Hash for Entity<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        T::KIND.hash(state);
        self.key.hash(state);
    }
}

impl<T: Resource> fmt::Debug for Entity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", T::KIND, self.key)
    }
}
