//! Native SQLite Key/Value Adapter
//!
//! Implements the `KeyValueStore` trait using `sqlx` with the native SQLite
//! driver. Each resource kind maps to one `(key, value)` table created by the
//! migrations in `core-library/migrations`.
//!
//! ## Features
//!
//! - Connection pooling with configurable limits
//! - WAL mode for concurrent readers alongside the single writer
//! - Upserts, so `write` is idempotent
//! - Memory map growth through `PRAGMA mmap_size`

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::storage::{KeyValueStore, MapStats};
use futures::TryStreamExt;
use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument, warn};

use crate::codec::TABLES;
use crate::db::{create_pool, DatabaseConfig, MapSize};

/// Native SQLite implementation of `KeyValueStore`
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    map_size: MapSize,
}

impl SqliteStore {
    /// Open the database described by `config`, running migrations.
    ///
    /// # Errors
    ///
    /// Returns error if connection pool creation or migrations fail
    pub async fn open(config: DatabaseConfig) -> crate::Result<Self> {
        let map_size = config.map_size.clone();
        let pool = create_pool(config).await?;
        Ok(Self { pool, map_size })
    }

    /// Wrap an existing, already migrated pool.
    pub fn from_pool(pool: Pool<Sqlite>, map_size: MapSize) -> Self {
        Self { pool, map_size }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn table(name: &str) -> Result<&str> {
        if TABLES.contains(&name) {
            Ok(name)
        } else {
            Err(BridgeError::OperationFailed(format!(
                "Unknown table: {}",
                name
            )))
        }
    }

    async fn pragma(&self, name: &str) -> Result<u64> {
        let value: i64 = sqlx::query_scalar(&format!("PRAGMA {}", name))
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(value.max(0) as u64)
    }
}

fn storage_error(e: sqlx::Error) -> BridgeError {
    BridgeError::Storage(e.to_string())
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn read(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let sql = format!("SELECT value FROM {} WHERE key = ?", Self::table(table)?);
        sqlx::query_scalar(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)
    }

    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn write(&self, table: &str, key: &str, value: &[u8]) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            Self::table(table)?
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Write failed");
                storage_error(e)
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, table: &str, key: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE key = ?", Self::table(table)?);
        let result = sqlx::query(&sql)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn scan(&self, table: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let sql = format!("SELECT key, value FROM {} ORDER BY key", Self::table(table)?);
        let mut rows = sqlx::query_as::<_, (String, Vec<u8>)>(&sql).fetch(&self.pool);

        let mut records = Vec::new();
        while let Some(row) = rows.try_next().await.map_err(storage_error)? {
            records.push(row);
        }

        debug!(table, count = records.len(), "Scanned table");
        Ok(records)
    }

    async fn map_stats(&self) -> Result<MapStats> {
        Ok(MapStats {
            page_count: self.pragma("page_count").await?,
            page_size: self.pragma("page_size").await?,
            map_size: self.map_size.get(),
        })
    }

    async fn set_map_size(&self, bytes: u64) -> Result<()> {
        self.map_size.set(bytes);
        // Connections opened later pick the new size up in their connect hook.
        sqlx::query(&format!("PRAGMA mmap_size = {}", bytes))
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        info!(bytes, "Memory map resized");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        info!("Closing database connection pool");
        self.pool.close().await;
        Ok(())
    }
}
