//! Client/server PostgreSQL tile store.
//!
//! Same logical schema as the SQLite store, with a `BIGSERIAL` layer id.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::debug;

use crate::error::StoreError;

use super::store::{CacheMetadata, CacheStats, TileKey, TileStore, DEFAULT_LAYER};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS layers (
        id BIGSERIAL PRIMARY KEY,
        layer_name TEXT UNIQUE NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS metadata (name TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL)",
    "CREATE TABLE IF NOT EXISTS tiles (
        layer_id BIGINT NOT NULL,
        zoom_level BIGINT NOT NULL,
        tile_column BIGINT NOT NULL,
        tile_row BIGINT NOT NULL,
        tile_data BYTEA,
        PRIMARY KEY (layer_id, zoom_level, tile_column, tile_row)
    )",
];

/// Tile store backed by a PostgreSQL database.
pub struct PostgresTileStore {
    pool: Pool<Postgres>,
}

impl PostgresTileStore {
    /// Connect to `url`, create the schema and seed the metadata table.
    pub async fn open(url: &str, metadata: &CacheMetadata) -> Result<Self, StoreError> {
        let open_err = |e: sqlx::Error| StoreError::Open(e.to_string());

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(url)
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
                "INSERT INTO metadata (name, value) VALUES ($1, $2)
                 ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value",
            )
            .bind(name)
            .bind(value)
            .execute(&pool)
            .await
            .map_err(open_err)?;
        }

        sqlx::query("INSERT INTO layers (layer_name) VALUES ($1) ON CONFLICT (layer_name) DO NOTHING")
            .bind(DEFAULT_LAYER)
            .execute(&pool)
            .await
            .map_err(open_err)?;

        debug!("Opened PostgreSQL tile store");
        Ok(Self { pool })
    }
}

#[async_trait]
impl TileStore for PostgresTileStore {
    async fn read_layers(&self) -> Result<HashMap<String, i64>, StoreError> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, layer_name FROM layers")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id, name)| (name, id)).collect())
    }

    async fn add_layer(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO layers (layer_name) VALUES ($1) ON CONFLICT (layer_name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_tile(&self, key: &TileKey) -> Result<Option<Vec<u8>>, StoreError> {
        let blob: Option<Option<Vec<u8>>> = sqlx::query_scalar(
            "SELECT tile_data FROM tiles
             WHERE layer_id = $1 AND zoom_level = $2 AND tile_column = $3 AND tile_row = $4",
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
             VALUES ($1, $2, $3, $4, $5)
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
