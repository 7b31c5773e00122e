//! # tilecache-server
//!
//! A caching raster tile server.
//!
//! Tiles are addressed by layer, zoom, column and row. A request is answered
//! from a persistent cache when possible; otherwise it is rendered by the
//! layer's worker, returned to the client, and written back to the cache in
//! the background.
//!
//! ## Features
//!
//! - **Persistent cache**: MBTiles-style schema in SQLite or PostgreSQL, owned
//!   by a single worker task
//! - **Two layer kinds**: local stylesheets drawn by a raster engine, or
//!   upstream tile providers proxied from a URL template
//! - **XYZ and TMS**: both row conventions, with TMS capability documents
//!
//! ## Architecture
//!
//! - [`tile`] - Tile coordinates, messages and the request pipeline
//! - [`cache`] - Storage backends and the cache worker
//! - [`render`] - Per-layer render workers and the dispatcher
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tilecache_server::{
//!     create_router, CacheMetadata, LayerSource, RenderDispatcher, RenderOptions, RouterConfig,
//!     StoreBackend, TileCache, TileService, DEFAULT_REQUEST_TIMEOUT,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = TileCache::open(
//!         StoreBackend::Sqlite,
//!         "tiles.mbtiles",
//!         &CacheMetadata::default(),
//!         256,
//!     )
//!     .await?;
//!
//!     let mut dispatcher = RenderDispatcher::new(RenderOptions::default());
//!     dispatcher.register_layer(
//!         "osm",
//!         LayerSource::parse("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png"),
//!     )?;
//!
//!     let service = TileService::new(
//!         Arc::new(cache),
//!         Arc::new(dispatcher),
//!         DEFAULT_REQUEST_TIMEOUT,
//!     );
//!     let router = create_router(Arc::new(service), RouterConfig::default());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod render;
pub mod server;
pub mod tile;

// Re-export commonly used types
pub use cache::{
    CacheMetadata, CacheStats, PostgresTileStore, SqliteTileStore, StoreBackend, TileCache,
    TileKey, TileStore, DEFAULT_QUEUE_CAPACITY,
};
pub use config::{Cli, Command, Config, FileConfig};
pub use error::{CacheError, ConfigError, RenderError, StoreError};
pub use render::{
    LayerSource, MapEngine, ProxyFetcher, RasterEngine, RenderDispatcher, RenderOptions,
    Stylesheet, UrlTemplate,
};
pub use server::{create_router, AppState, RouterConfig};
pub use tile::{
    tile_bounds, BoundingBox, Projection, TileCoord, TileFetchRequest, TileFetchResult,
    TileResponse, TileScheme, TileService, DEFAULT_REQUEST_TIMEOUT,
};
