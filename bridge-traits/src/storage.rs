//! Key/Value Storage Abstraction
//!
//! The resource store persists every entity as an opaque binary record in a
//! per-kind table, plus one table mapping collection keys to their serialized
//! member lists. This trait is the whole contract it needs from the engine.
//!
//! ## Semantics
//!
//! - Each `write` and `delete` is its own write transaction.
//! - `read` and `scan` observe only committed data.
//! - Table names are fixed identifiers chosen by the caller, never user input.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_traits::storage::KeyValueStore;
//!
//! async fn copy(store: &dyn KeyValueStore) -> bridge_traits::error::Result<()> {
//!     if let Some(bytes) = store.read("album", "4aawyAB9vmqN3uQ7FjRGTy").await? {
//!         store.write("album", "backup", &bytes).await?;
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;

/// Size figures used to decide whether the memory map should grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapStats {
    pub page_count: u64,
    pub page_size: u64,
    /// Currently configured map size in bytes
    pub map_size: u64,
}

impl MapStats {
    /// Bytes occupied by the database file.
    pub fn used_bytes(&self) -> u64 {
        self.page_count.saturating_mul(self.page_size)
    }
}

/// Embedded transactional key/value engine.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read one record, `None` when the key is absent.
    async fn read(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert or replace one record.
    async fn write(&self, table: &str, key: &str, value: &[u8]) -> Result<()>;

    /// Remove one record. Returns whether a record existed.
    async fn delete(&self, table: &str, key: &str) -> Result<bool>;

    /// Every record of a table, in key order.
    async fn scan(&self, table: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Current page usage and map size.
    async fn map_stats(&self) -> Result<MapStats>;

    /// Grow the memory map to `bytes`.
    async fn set_map_size(&self, bytes: u64) -> Result<()>;

    /// Close the engine. Further calls fail.
    async fn close(&self) -> Result<()>;
}
