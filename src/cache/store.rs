//! Storage backends for the tile cache.
//!
//! A [`TileStore`] is owned by exactly one cache worker and is never shared.
//! Every backend uses the same logical schema:
//!
//! - `layers(layer_name)` keyed by an implicit integer row id
//! - `metadata(name, value)`
//! - `tiles(layer_id, zoom_level, tile_column, tile_row, tile_data)` with the
//!   first four columns as primary key
//!
//! Rows in `tiles` always use the TMS convention.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::StoreError;
use crate::tile::{TileCoord, TileScheme};

use super::postgres::PostgresTileStore;
use super::sqlite::SqliteTileStore;

/// Name of the layer every store registers when it is created.
pub const DEFAULT_LAYER: &str = "default";

// =============================================================================
// Keys
// =============================================================================

/// Storage key of a tile, in the integer domain of the store's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileKey {
    pub layer_id: i64,
    pub zoom: i64,
    pub column: i64,
    pub row: i64,
}

impl TileKey {
    /// Build the storage key for `coord` under `layer_id`.
    ///
    /// The coordinate is flipped to TMS rows if necessary. Components that do
    /// not fit a signed 64-bit column are rejected.
    pub fn new(layer_id: i64, coord: &TileCoord) -> Result<Self, StoreError> {
        let coord = coord.clone().normalize_scheme(TileScheme::Tms);
        let out_of_range = || StoreError::CoordinateRange {
            zoom: coord.zoom,
            column: coord.x,
            row: coord.y,
        };

        Ok(Self {
            layer_id,
            zoom: i64::try_from(coord.zoom).map_err(|_| out_of_range())?,
            column: i64::try_from(coord.x).map_err(|_| out_of_range())?,
            row: i64::try_from(coord.y).map_err(|_| out_of_range())?,
        })
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Values written to the `metadata` table when a store is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheMetadata {
    pub name: String,
    pub kind: String,
    pub version: String,
    pub description: String,
    pub format: String,
    pub bounds: String,
    pub attribution: String,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self {
            name: "tilecache-server cache".to_string(),
            kind: "overlay".to_string(),
            version: "1".to_string(),
            description: "MBTiles 1.2 compatible tile cache holding multiple layers".to_string(),
            format: "png".to_string(),
            bounds: "-180.0,-85,180,85".to_string(),
            attribution: String::new(),
        }
    }
}

impl CacheMetadata {
    /// Set the attribution string.
    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = attribution.into();
        self
    }

    /// Rows of the `metadata` table, in insertion order.
    pub fn entries(&self) -> [(&'static str, &str); 7] {
        [
            ("name", &self.name),
            ("type", &self.kind),
            ("version", &self.version),
            ("description", &self.description),
            ("format", &self.format),
            ("bounds", &self.bounds),
            ("attribution", &self.attribution),
        ]
    }
}

/// Row counts reported by a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub tiles: u64,
    pub layers: u64,
}

// =============================================================================
// Store Trait
// =============================================================================

/// Persistent tile storage.
///
/// Implementations hold a single connection and are driven by one worker,
/// so they do not need to be `Sync`.
#[async_trait]
pub trait TileStore: Send {
    /// Map of layer name to layer id.
    async fn read_layers(&self) -> Result<HashMap<String, i64>, StoreError>;

    /// Register a layer name. Registering an existing name is a no-op.
    async fn add_layer(&self, name: &str) -> Result<(), StoreError>;

    /// Fetch the blob stored under `key`, if any.
    async fn fetch_tile(&self, key: &TileKey) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store `blob` under `key` unless a blob is already present.
    ///
    /// Returns `true` if a row was written.
    async fn insert_tile(&self, key: &TileKey, blob: &[u8]) -> Result<bool, StoreError>;

    /// All rows of the metadata table.
    async fn metadata(&self) -> Result<BTreeMap<String, String>, StoreError>;

    /// Tile and layer counts.
    async fn stats(&self) -> Result<CacheStats, StoreError>;

    /// Release the connection. Further calls fail.
    async fn close(&self);
}

// =============================================================================
// Backend Selection
// =============================================================================

/// The storage engines a cache can be opened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Embedded single-file SQLite database.
    #[default]
    Sqlite,

    /// Client/server PostgreSQL database.
    Postgres,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Sqlite => f.write_str("sqlite"),
            StoreBackend::Postgres => f.write_str("postgres"),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(StoreBackend::Sqlite),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(format!(
                "unknown cache engine '{}' (expected 'sqlite' or 'postgres')",
                other
            )),
        }
    }
}

/// Open a store on `backend`.
///
/// `location` is a file path for SQLite (`:memory:` for an in-memory
/// database) and a connection URL for PostgreSQL. The schema is created and
/// seeded before the store is returned.
pub async fn open_store(
    backend: StoreBackend,
    location: &str,
    metadata: &CacheMetadata,
) -> Result<Box<dyn TileStore>, StoreError> {
    match backend {
        StoreBackend::Sqlite => Ok(Box::new(SqliteTileStore::open(location, metadata).await?)),
        StoreBackend::Postgres => Ok(Box::new(PostgresTileStore::open(location, metadata).await?)),
    }
}
