//! Persistent tile cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      TileCache                       │
//! │   submit_fetch ──► fetch queue  ─┐                   │
//! │   submit_insert ─► insert queue ─┼─► CacheWorker     │
//! │   metadata/stats/close ─► control┘        │          │
//! └───────────────────────────────────────────┼──────────┘
//!                                             ▼
//!                               ┌──────────────────────────┐
//!                               │   TileStore (one conn)   │
//!                               │   SQLite  |  PostgreSQL  │
//!                               └──────────────────────────┘
//! ```
//!
//! - [`TileCache`]: handle used by the rest of the server
//! - [`TileStore`]: storage backend trait, implemented by
//!   [`SqliteTileStore`] and [`PostgresTileStore`]
//! - [`CacheMetadata`]: rows seeded into the `metadata` table

mod postgres;
mod sqlite;
mod store;
mod worker;

pub use postgres::PostgresTileStore;
pub use sqlite::SqliteTileStore;
pub use store::{
    open_store, CacheMetadata, CacheStats, StoreBackend, TileKey, TileStore, DEFAULT_LAYER,
};
pub use worker::{TileCache, DEFAULT_QUEUE_CAPACITY};
