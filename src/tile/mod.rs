//! Tile addressing and the tile request pipeline.
//!
//! # Components
//!
//! - [`TileCoord`] / [`TileScheme`]: a tile address and its row convention
//! - [`tile_bounds`]: the geographic extent of a tile in a [`Projection`]
//! - [`TileFetchRequest`] / [`TileFetchResult`]: messages exchanged with the
//!   cache and render workers
//! - [`TileService`]: resolves a tile from the cache or by rendering it

mod coord;
mod message;
mod projection;
mod service;

pub use coord::{
    flip_row, pixel_to_lon_lat, tile_bounds, units_per_pixel, BoundingBox, TileCoord, TileScheme,
    TILE_SIZE, UNITS_PER_PIXEL_Z0,
};
pub use message::{TileFetchRequest, TileFetchResult};
pub use projection::{Projection, EARTH_RADIUS};
pub use service::{TileResponse, TileService, DEFAULT_REQUEST_TIMEOUT};
