//! HTTP server layer for the tile server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │             GET /{layer}/{z}/{x}/{y}.png, /tms/...              │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │     tms     │  │        routes           │  │
//! │  │ (requests)  │  │ (XML docs)  │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;
pub mod tms;

pub use handlers::{
    error_response, index_handler, metadata_handler, ping_handler, request_error_handler,
    server_handler, tile_handler, tile_layers_handler, tms_root_handler, tms_service_handler,
    tms_tile_handler, tms_tile_map_handler, AppState, Envelope, MessageData, PingData,
    ServerProfile, TilePathParams, EXPECTED_FORMAT, MAX_ZOOM,
};
pub use routes::{create_router, RouterConfig};
