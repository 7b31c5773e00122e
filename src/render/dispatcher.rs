//! Routing of tile requests to per-layer render workers.
//!
//! Every registered layer gets exactly one worker and one bounded queue.
//! Requests for the same layer are handled one after another; different
//! layers render in parallel.
//!
//! - Stylesheet layers run on a dedicated OS thread, because a map engine
//!   is not safe to drive from several threads and may block for a while.
//! - Proxy layers run as a tokio task around an HTTP client.
//!
//! Workers always see XYZ rows, whatever convention the request used.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::RenderError;
use crate::tile::{tile_bounds, TileFetchRequest, TileScheme, TILE_SIZE};

use super::engine::{MapEngine, RasterEngine};
use super::proxy::ProxyFetcher;
use super::source::LayerSource;

/// Default HTTP timeout for proxy layers.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by all render workers.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Edge length of rendered tiles in pixels
    pub tile_size: u32,

    /// Capacity of each layer's request queue
    pub queue_capacity: usize,

    /// Request timeout for proxy layers
    pub upstream_timeout: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            queue_capacity: crate::cache::DEFAULT_QUEUE_CAPACITY,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

struct LayerWorker {
    source: Option<LayerSource>,
    queue: mpsc::Sender<TileFetchRequest>,
}

/// Routes tile requests to the worker of their layer.
pub struct RenderDispatcher {
    workers: HashMap<String, LayerWorker>,
    options: RenderOptions,
}

impl RenderDispatcher {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            workers: HashMap::new(),
            options,
        }
    }

    /// Register `name` and start its worker.
    ///
    /// Stylesheet sources are loaded with [`RasterEngine`]. Re-registering a
    /// name replaces the previous worker, which stops once its queue drains.
    /// Must be called from within a tokio runtime.
    pub fn register_layer(&mut self, name: &str, source: LayerSource) -> Result<(), RenderError> {
        let queue = match &source {
            LayerSource::Stylesheet(path) => {
                let engine = RasterEngine::load(path)?;
                self.spawn_engine_worker(name, Box::new(engine))?
            }
            LayerSource::Proxy(template) => {
                let fetcher = ProxyFetcher::new(template, self.options.upstream_timeout)?;
                self.spawn_proxy_worker(name, fetcher)
            }
        };

        info!(layer = name, %source, "Registered layer");
        self.insert_worker(name, Some(source), queue);
        Ok(())
    }

    /// Register `name` with an already constructed engine.
    pub fn register_engine(
        &mut self,
        name: &str,
        engine: Box<dyn MapEngine>,
    ) -> Result<(), RenderError> {
        let queue = self.spawn_engine_worker(name, engine)?;
        self.insert_worker(name, None, queue);
        Ok(())
    }

    /// Hand `request` to the worker of its layer.
    ///
    /// Returns `false` if no such layer is registered or its worker is gone.
    /// The request is dropped in that case, which closes its reply channel.
    /// Otherwise the result arrives on the request's reply channel.
    pub async fn dispatch(&self, request: TileFetchRequest) -> bool {
        let Some(worker) = self.workers.get(&request.coord.layer) else {
            warn!(layer = %request.coord.layer, "No such layer");
            return false;
        };

        match worker.queue.send(request).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(request)) => {
                error!(layer = %request.coord.layer, "Render worker has stopped");
                false
            }
        }
    }

    /// Registered layer names, sorted.
    pub fn layers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.workers.contains_key(name)
    }

    /// Source a layer was registered with, if it came from a source string.
    pub fn source(&self, name: &str) -> Option<&LayerSource> {
        self.workers.get(name).and_then(|w| w.source.as_ref())
    }

    fn insert_worker(
        &mut self,
        name: &str,
        source: Option<LayerSource>,
        queue: mpsc::Sender<TileFetchRequest>,
    ) {
        if self
            .workers
            .insert(name.to_string(), LayerWorker { source, queue })
            .is_some()
        {
            debug!(layer = name, "Replaced existing layer worker");
        }
    }

    fn spawn_engine_worker(
        &self,
        name: &str,
        mut engine: Box<dyn MapEngine>,
    ) -> Result<mpsc::Sender<TileFetchRequest>, RenderError> {
        let (tx, mut rx) = mpsc::channel::<TileFetchRequest>(self.options.queue_capacity.max(1));
        let tile_size = self.options.tile_size;
        let layer = name.to_string();

        std::thread::Builder::new()
            .name(format!("render-{}", name))
            .spawn(move || {
                while let Some(request) = rx.blocking_recv() {
                    let coord = request.coord.clone().normalize_scheme(TileScheme::Xyz);
                    let bbox = tile_bounds(&coord, engine.projection());

                    let blob = match engine.render(&bbox, tile_size, tile_size) {
                        Ok(png) => {
                            debug!(tile = %coord, bytes = png.len(), "Rendered tile");
                            Some(Bytes::from(png))
                        }
                        Err(e) => {
                            error!(tile = %coord, "Render failed: {}", e);
                            None
                        }
                    };
                    request.respond(blob);
                }
                debug!(layer = %layer, "Render worker stopped");
            })
            .map_err(|e| RenderError::Spawn {
                layer: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(tx)
    }

    fn spawn_proxy_worker(
        &self,
        name: &str,
        mut fetcher: ProxyFetcher,
    ) -> mpsc::Sender<TileFetchRequest> {
        let (tx, mut rx) = mpsc::channel::<TileFetchRequest>(self.options.queue_capacity.max(1));
        let layer = name.to_string();

        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let coord = request.coord.clone().normalize_scheme(TileScheme::Xyz);

                let blob = match fetcher.fetch(&coord).await {
                    Ok(blob) => Some(blob),
                    Err(e) => {
                        warn!(tile = %coord, "Upstream fetch failed: {}", e);
                        None
                    }
                };
                request.respond(blob);
            }
            debug!(layer = %layer, "Proxy worker stopped");
        });

        tx
    }
}
