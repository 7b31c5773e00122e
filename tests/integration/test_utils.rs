//! Test utilities for integration tests.
//!
//! This module provides a mock map engine, a throwaway SQLite cache, and a
//! local upstream tile server for proxy layers.

use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::Path as UrlPath;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use tempfile::TempDir;

use tilecache_server::error::RenderError;
use tilecache_server::render::{LayerSource, MapEngine, RenderDispatcher, RenderOptions};
use tilecache_server::tile::{BoundingBox, Projection, TileService};
use tilecache_server::{CacheMetadata, StoreBackend, TileCache};

pub const QUEUE_CAPACITY: usize = 16;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Images
// =============================================================================

/// Encode a solid `size` x `size` PNG.
pub fn solid_png(size: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(size, size, Rgba(color));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
}

/// Decode a PNG and return its dimensions.
pub fn png_dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory_with_format(data, ImageFormat::Png).unwrap();
    (img.width(), img.height())
}

// =============================================================================
// Mock Map Engine
// =============================================================================

/// A map engine that counts renders and optionally fails.
pub struct CountingEngine {
    renders: Arc<AtomicUsize>,
    boxes: Arc<Mutex<Vec<BoundingBox>>>,
    fail: bool,
}

impl CountingEngine {
    pub fn new() -> Self {
        Self {
            renders: Arc::new(AtomicUsize::new(0)),
            boxes: Arc::new(Mutex::new(Vec::new())),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Shared render counter, readable after the engine moved into a worker.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.renders)
    }

    pub fn boxes(&self) -> Arc<Mutex<Vec<BoundingBox>>> {
        Arc::clone(&self.boxes)
    }
}

impl MapEngine for CountingEngine {
    fn projection(&self) -> Projection {
        Projection::Wgs84
    }

    fn render(
        &mut self,
        bbox: &BoundingBox,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, RenderError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        self.boxes.lock().unwrap().push(*bbox);
        if self.fail {
            return Err(RenderError::Draw("mock failure".to_string()));
        }
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png)
            .map_err(|e| RenderError::Draw(e.to_string()))?;
        Ok(buf.into_inner())
    }
}

// =============================================================================
// Service Construction
// =============================================================================

/// Open a SQLite cache in `dir`.
pub async fn open_cache(dir: &Path) -> Arc<TileCache> {
    let path = dir.join("cache.mbtiles");
    let cache = TileCache::open(
        StoreBackend::Sqlite,
        path.to_str().unwrap(),
        &CacheMetadata::default(),
        QUEUE_CAPACITY,
    )
    .await
    .unwrap();
    Arc::new(cache)
}

pub fn render_options() -> RenderOptions {
    RenderOptions {
        queue_capacity: QUEUE_CAPACITY,
        upstream_timeout: Duration::from_secs(5),
        ..RenderOptions::default()
    }
}

/// A service with one engine layer, backed by a fresh cache.
///
/// Keep the returned directory alive for the duration of the test.
pub async fn service_with_engine(
    layer: &str,
    engine: CountingEngine,
) -> (Arc<TileService>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(dir.path()).await;

    let mut dispatcher = RenderDispatcher::new(render_options());
    dispatcher.register_engine(layer, Box::new(engine)).unwrap();

    let service = TileService::new(cache, Arc::new(dispatcher), REQUEST_TIMEOUT);
    (Arc::new(service), dir)
}

/// A service with layers registered from their sources.
pub async fn service_with_sources(
    layers: &[(&str, LayerSource)],
) -> (Arc<TileService>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(dir.path()).await;

    let mut dispatcher = RenderDispatcher::new(render_options());
    for (name, source) in layers {
        dispatcher.register_layer(name, source.clone()).unwrap();
    }

    let service = TileService::new(cache, Arc::new(dispatcher), REQUEST_TIMEOUT);
    (Arc::new(service), dir)
}

/// Write a stylesheet to `dir` and return its path.
pub fn write_stylesheet(dir: &Path, name: &str, json: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, json).unwrap();
    path
}

// =============================================================================
// Upstream Tile Server
// =============================================================================

/// A local HTTP server standing in for an upstream tile provider.
///
/// Serves `GET /tiles/{z}/{x}/{y}.png` with a fixed PNG for zoom levels up to
/// `max_zoom`, and 404 beyond that.
pub struct UpstreamServer {
    pub base_url: String,
    pub tile: Bytes,
    requests: Arc<Mutex<Vec<String>>>,
}

impl UpstreamServer {
    pub async fn start(max_zoom: u64) -> Self {
        let tile = Bytes::from(solid_png(256, [0, 128, 0, 255]));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let app = {
            let tile = tile.clone();
            let requests = Arc::clone(&requests);
            Router::new().route(
                "/tiles/{z}/{x}/{filename}",
                get(move |UrlPath((z, x, filename)): UrlPath<(u64, u64, String)>| {
                    let tile = tile.clone();
                    let requests = Arc::clone(&requests);
                    async move {
                        requests
                            .lock()
                            .unwrap()
                            .push(format!("{}/{}/{}", z, x, filename));
                        upstream_tile(z, max_zoom, tile)
                    }
                }),
            )
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            tile,
            requests,
        }
    }

    /// URL template pointing at this server.
    pub fn template(&self) -> String {
        format!("{}/tiles/{{z}}/{{x}}/{{y}}.png", self.base_url)
    }

    /// Paths requested so far, as `z/x/y.png`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn upstream_tile(z: u64, max_zoom: u64, tile: Bytes) -> Response {
    if z > max_zoom {
        return StatusCode::NOT_FOUND.into_response();
    }
    ([("content-type", "image/png")], tile).into_response()
}

/// Poll `cache` until the tile at `coord` is stored, or give up.
pub async fn wait_for_cached(
    cache: &TileCache,
    coord: &tilecache_server::tile::TileCoord,
) -> Option<Bytes> {
    for _ in 0..50 {
        let (request, reply) = tilecache_server::tile::TileFetchRequest::new(coord.clone());
        cache.submit_fetch(request).await.unwrap();
        if let Some(blob) = reply.await.unwrap().blob {
            return Some(blob);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    None
}
