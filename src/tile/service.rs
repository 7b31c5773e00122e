//! Tile Service for resolving tile requests.
//!
//! The TileService is the main entry point for tile requests. It runs the
//! cache-aside protocol over the cache and render workers:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          TileService                           │
//! │   resolve(coord)                                               │
//! │     1. AwaitingCache   ──► TileCache::submit_fetch             │
//! │          hit  ─────────────────────────────────► return blob   │
//! │          miss                                                  │
//! │     2. AwaitingRender  ──► RenderDispatcher::dispatch          │
//! │          rendered ──► 3. TileCache::submit_insert (detached)   │
//! │                      ──────────────────────────► return blob   │
//! │          failed / unknown layer ───────────────► not found     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each phase uses its own reply channel and its own deadline, so a late
//! answer to one phase can never be mistaken for the answer to another.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::cache::TileCache;
use crate::render::{LayerSource, RenderDispatcher};

use super::coord::TileCoord;
use super::message::{TileFetchRequest, TileFetchResult};

/// Default deadline for each phase of a request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Tile Response
// =============================================================================

/// A resolved tile.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The tile image
    pub data: Bytes,

    /// Whether this tile was served from the cache
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Copy)]
enum FetchPhase {
    AwaitingCache,
    AwaitingRender,
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchPhase::AwaitingCache => f.write_str("cache"),
            FetchPhase::AwaitingRender => f.write_str("render"),
        }
    }
}

// =============================================================================
// Tile Service
// =============================================================================

/// Resolves tiles from the cache, rendering and caching them on a miss.
///
/// # Example
///
/// ```ignore
/// let service = TileService::new(cache, dispatcher, DEFAULT_REQUEST_TIMEOUT);
///
/// match service.resolve(TileCoord::xyz("osm", 3, 4, 2)).await {
///     Some(tile) => println!("{} bytes, cache hit: {}", tile.data.len(), tile.cache_hit),
///     None => println!("not found"),
/// }
/// ```
pub struct TileService {
    cache: Arc<TileCache>,
    dispatcher: Arc<RenderDispatcher>,
    request_timeout: Duration,
}

impl TileService {
    pub fn new(
        cache: Arc<TileCache>,
        dispatcher: Arc<RenderDispatcher>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            dispatcher,
            request_timeout,
        }
    }

    /// Resolve one tile.
    ///
    /// Returns `None` when the layer is unknown, rendering failed, or a
    /// phase did not answer within the request timeout. A freshly rendered
    /// tile is written back to the cache without waiting for the write.
    pub async fn resolve(&self, coord: TileCoord) -> Option<TileResponse> {
        if !self.dispatcher.contains(&coord.layer) {
            debug!(tile = %coord, "No such layer");
            return None;
        }

        if let Some(data) = self.lookup_cache(&coord).await {
            return Some(TileResponse {
                data,
                cache_hit: true,
            });
        }

        let rendered = self.render(coord).await?;
        let data = rendered.blob.clone()?;

        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            let tile = rendered.coord.clone();
            if let Err(e) = cache.submit_insert(rendered).await {
                debug!(%tile, "Skipping cache write-back: {}", e);
            }
        });

        Some(TileResponse {
            data,
            cache_hit: false,
        })
    }

    async fn lookup_cache(&self, coord: &TileCoord) -> Option<Bytes> {
        let (request, reply) = TileFetchRequest::new(coord.clone());
        if let Err(e) = self.cache.submit_fetch(request).await {
            warn!(tile = %coord, "Cache unavailable, rendering directly: {}", e);
            return None;
        }

        self.await_reply(reply, FetchPhase::AwaitingCache, coord)
            .await
            .and_then(|result| result.blob)
    }

    async fn render(&self, coord: TileCoord) -> Option<TileFetchResult> {
        let (request, reply) = TileFetchRequest::new(coord.clone());
        if !self.dispatcher.dispatch(request).await {
            return None;
        }

        self.await_reply(reply, FetchPhase::AwaitingRender, &coord)
            .await
            .filter(TileFetchResult::is_found)
    }

    async fn await_reply(
        &self,
        reply: oneshot::Receiver<TileFetchResult>,
        phase: FetchPhase,
        coord: &TileCoord,
    ) -> Option<TileFetchResult> {
        match tokio::time::timeout(self.request_timeout, reply).await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(_)) => {
                debug!(tile = %coord, %phase, "Worker dropped the request");
                None
            }
            Err(_) => {
                warn!(
                    tile = %coord,
                    %phase,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Timed out waiting for worker"
                );
                None
            }
        }
    }

    /// Registered layer names, sorted.
    pub fn layers(&self) -> Vec<String> {
        self.dispatcher.layers()
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.dispatcher.contains(name)
    }

    pub fn layer_source(&self, name: &str) -> Option<&LayerSource> {
        self.dispatcher.source(name)
    }

    /// The cache this service reads from and writes to.
    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }
}
