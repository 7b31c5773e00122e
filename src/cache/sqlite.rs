//! Embedded SQLite tile store.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::debug;

use crate::error::StoreError;

use super::store::{CacheMetadata, CacheStats, TileKey, TileStore, DEFAULT_LAYER};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS layers (
        id INTEGER PRIMARY KEY,
        layer_name TEXT UNIQUE NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS metadata (name TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS tiles (
        layer_id INTEGER NOT NULL,
        zoom_level INTEGER NOT NULL,
        tile_column INTEGER NOT NULL,
        tile_row INTEGER NOT NULL,
        tile_data BLOB,
        PRIMARY KEY (layer_id, zoom_level, tile_column, tile_row)
    )",
];

/// Tile store backed by a single SQLite database file.
///
/// The pool is capped at one connection, which is owned by the cache worker.
pub struct SqliteTileStore {
    pool: Pool<Sqlite>,
}

impl SqliteTileStore {
    /// Open (creating if needed) the database at `path`, create the schema
    /// and seed the metadata table.
    ///
    /// `:memory:` opens a private in-memory database.
    pub async fn open(path: impl AsRef<Path>, metadata: &CacheMetadata) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let open_err = |e: sqlx::Error| StoreError::Open(format!("{}: {}", path.display(), e));

        let options = if path == Path::new(":memory:") {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(open_err)?
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(open_err)?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(open_err)?;
        }

        for (name, value) in metadata.entries() {
            sqlx::query(
                "INSERT INTO metadata (name, value) VALUES (?1, ?2)
                 ON CONFLICT (name) DO UPDATE SET value = excluded.value",
            )
            .bind(name)
            .bind(value)
            .execute(&pool)
            .await
            .map_err(open_err)?;
        }

        sqlx::query("INSERT OR IGNORE INTO layers (layer_name) VALUES (?1)")
            .bind(DEFAULT_LAYER)
            .execute(&pool)
            .await
            .map_err(open_err)?;

        debug!(path = %path.display(), "Opened SQLite tile store");
        Ok(Self { pool })
    }
}

#[async_trait]
impl TileStore for SqliteTileStore {
    async fn read_layers(&self) -> Result<HashMap<String, i64>, StoreError> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, layer_name FROM layers")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id, name)| (name, id)).collect())
    }

    async fn add_layer(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO layers (layer_name) VALUES (?1)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_tile(&self, key: &TileKey) -> Result<Option<Vec<u8>>, StoreError> {
        let blob: Option<Option<Vec<u8>>> = sqlx::query_scalar(
            "SELECT tile_data FROM tiles
             WHERE layer_id = ?1 AND zoom_level = ?2 AND tile_column = ?3 AND tile_row = ?4",
        )
        .bind(key.layer_id)
        .bind(key.zoom)
        .bind(key.column)
        .bind(key.row)
        .fetch_optional(&self.pool)
        .await?;
        Ok(blob.flatten())
    }

    async fn insert_tile(&self, key: &TileKey, blob: &[u8]) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO tiles (layer_id, zoom_level, tile_column, tile_row, tile_data)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (layer_id, zoom_level, tile_column, tile_row) DO NOTHING",
        )
        .bind(key.layer_id)
        .bind(key.zoom)
        .bind(key.column)
        .bind(key.row)
        .bind(blob)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn metadata(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT name, value FROM metadata")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn stats(&self) -> Result<CacheStats, StoreError> {
        let tiles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tiles")
            .fetch_one(&self.pool)
            .await?;
        let layers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM layers")
            .fetch_one(&self.pool)
            .await?;
        Ok(CacheStats {
            tiles: tiles.max(0) as u64,
            layers: layers.max(0) as u64,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
