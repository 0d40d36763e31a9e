//! # Library Management Module
//!
//! Owns the local mirror of the music library and the store that persists it.
//!
//! ## Overview
//!
//! This module manages:
//! - Resource types and their identity rules ([`models`], [`entity`])
//! - The binary record format, references stored as keys ([`codec`])
//! - SQLite key/value storage and its migrations ([`db`], [`adapters`])
//! - The identity-cached [`ResourceStore`] with dirty tracking and flushing
//! - The reachability sweep ([`Cleanup`])
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::{ResourceStore, models::Album};
//!
//! let mut store = ResourceStore::from_config(&config).await?;
//! let album = store.get_or_create::<Album>("6dVIqQ8qmQ5GBnJ9shOYGE").await?;
//! album.write().name = Some("OK Computer".to_string());
//! store.mark_modified(&album);
//! store.flush_all().await?;
//! ```

pub mod adapters;
pub mod cache;
pub mod cleanup;
pub mod codec;
pub mod db;
pub mod entity;
pub mod error;
pub mod models;
pub mod store;

pub use cleanup::Cleanup;
pub use entity::{Entity, Handle};
pub use error::{LibraryError, Result};
pub use store::{ResourceStore, StoreSettings, Stored};
