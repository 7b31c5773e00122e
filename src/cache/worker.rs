//! The tile cache actor.
//!
//! A [`TileCache`] owns one background worker, and that worker owns the
//! store. Callers never touch the store directly: they enqueue fetch requests,
//! insert results and control messages on bounded channels and the worker
//! handles them one at a time.
//!
//! # Ordering
//!
//! The worker picks fairly among its queues, so neither fetches, inserts nor
//! control messages can starve the others. Before answering a fetch it
//! applies the inserts already queued, so a fetch submitted after an insert
//! for the same tile observes the inserted blob.
//!
//! Layers are registered in the store by inserts only. A fetch for a layer
//! the store has never seen is a miss.
//!
//! # Shutdown
//!
//! [`TileCache::close`] sends a shutdown message. The worker stops accepting
//! new work, answers everything already queued, closes the store and exits.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{CacheError, StoreError};
use crate::tile::{TileCoord, TileFetchRequest, TileFetchResult};

use super::store::{open_store, CacheMetadata, CacheStats, StoreBackend, TileKey, TileStore};

/// Default capacity of each worker queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

enum Control {
    Metadata(oneshot::Sender<Result<BTreeMap<String, String>, StoreError>>),
    Stats(oneshot::Sender<Result<CacheStats, StoreError>>),
    Shutdown,
}

// =============================================================================
// Front-end
// =============================================================================

/// Handle to the cache worker.
///
/// The handle is cheap to share behind an `Arc`; all methods take `&self`.
pub struct TileCache {
    fetch_tx: mpsc::Sender<TileFetchRequest>,
    insert_tx: mpsc::Sender<TileFetchResult>,
    control_tx: mpsc::Sender<Control>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TileCache {
    /// Open a store on `backend` at `location` and start the worker.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be opened or its layer table cannot be
    /// read. No worker is started in that case.
    pub async fn open(
        backend: StoreBackend,
        location: &str,
        metadata: &CacheMetadata,
        queue_capacity: usize,
    ) -> Result<Self, CacheError> {
        let store = open_store(backend, location, metadata).await?;
        info!(%backend, location, "Opened tile cache");
        Self::with_store(store, queue_capacity).await
    }

    /// Start a worker around an already opened store.
    pub async fn with_store(
        store: Box<dyn TileStore>,
        queue_capacity: usize,
    ) -> Result<Self, CacheError> {
        let layer_ids = match store.read_layers().await {
            Ok(ids) => ids,
            Err(e) => {
                store.close().await;
                return Err(StoreError::Open(e.to_string()).into());
            }
        };
        debug!(layers = layer_ids.len(), "Loaded cache layer table");

        let capacity = queue_capacity.max(1);
        let (fetch_tx, fetch_rx) = mpsc::channel(capacity);
        let (insert_tx, insert_rx) = mpsc::channel(capacity);
        let (control_tx, control_rx) = mpsc::channel(capacity);

        let worker = CacheWorker {
            store,
            layer_ids,
            drain_limit: capacity,
        };
        let handle = tokio::spawn(worker.run(fetch_rx, insert_rx, control_rx));

        Ok(Self {
            fetch_tx,
            insert_tx,
            control_tx,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Enqueue a lookup. The reply carries the stored blob, or `None` on a
    /// miss or a store failure.
    ///
    /// Waits while the fetch queue is full.
    pub async fn submit_fetch(&self, request: TileFetchRequest) -> Result<(), CacheError> {
        self.fetch_tx
            .send(request)
            .await
            .map_err(|_| CacheError::Closed)
    }

    /// Enqueue a write-back. Results without a blob are ignored by the worker.
    pub async fn submit_insert(&self, result: TileFetchResult) -> Result<(), CacheError> {
        self.insert_tx
            .send(result)
            .await
            .map_err(|_| CacheError::Closed)
    }

    /// All rows of the store's metadata table.
    pub async fn metadata(&self) -> Result<BTreeMap<String, String>, CacheError> {
        let (tx, rx) = oneshot::channel();
        self.control(Control::Metadata(tx)).await?;
        Ok(rx.await.map_err(|_| CacheError::Closed)??)
    }

    /// Tile and layer counts of the store.
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let (tx, rx) = oneshot::channel();
        self.control(Control::Stats(tx)).await?;
        Ok(rx.await.map_err(|_| CacheError::Closed)??)
    }

    /// Stop the worker and close the store.
    ///
    /// Work that was already queued is still answered. Calling `close` more
    /// than once is harmless.
    pub async fn close(&self) {
        let Some(handle) = self.worker.lock().await.take() else {
            return;
        };

        if self.control_tx.send(Control::Shutdown).await.is_err() {
            debug!("Cache worker already stopped");
        }
        if let Err(e) = handle.await {
            error!("Cache worker terminated abnormally: {}", e);
        }
    }

    /// Whether the worker has stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.fetch_tx.is_closed()
    }

    async fn control(&self, message: Control) -> Result<(), CacheError> {
        self.control_tx
            .send(message)
            .await
            .map_err(|_| CacheError::Closed)
    }
}

// =============================================================================
// Worker
// =============================================================================

struct CacheWorker {
    store: Box<dyn TileStore>,
    layer_ids: HashMap<String, i64>,
    /// Most inserts applied ahead of a single fetch.
    drain_limit: usize,
}

impl CacheWorker {
    async fn run(
        mut self,
        mut fetch_rx: mpsc::Receiver<TileFetchRequest>,
        mut insert_rx: mpsc::Receiver<TileFetchResult>,
        mut control_rx: mpsc::Receiver<Control>,
    ) {
        loop {
            tokio::select! {
                Some(result) = insert_rx.recv() => self.insert(result).await,
                Some(request) = fetch_rx.recv() => {
                    self.apply_pending_inserts(&mut insert_rx).await;
                    self.fetch(request).await;
                }
                Some(message) = control_rx.recv() => {
                    if !self.handle_control(message).await {
                        break;
                    }
                }
                else => break,
            }
        }

        fetch_rx.close();
        insert_rx.close();
        control_rx.close();

        while let Ok(result) = insert_rx.try_recv() {
            self.insert(result).await;
        }
        while let Ok(request) = fetch_rx.try_recv() {
            self.fetch(request).await;
        }
        while let Ok(message) = control_rx.try_recv() {
            self.handle_control(message).await;
        }

        self.store.close().await;
        info!("Tile cache closed");
    }

    async fn apply_pending_inserts(&mut self, insert_rx: &mut mpsc::Receiver<TileFetchResult>) {
        for _ in 0..self.drain_limit {
            match insert_rx.try_recv() {
                Ok(result) => self.insert(result).await,
                Err(_) => break,
            }
        }
    }

    /// Returns `false` on shutdown.
    async fn handle_control(&mut self, message: Control) -> bool {
        match message {
            Control::Metadata(reply) => {
                let _ = reply.send(self.store.metadata().await);
            }
            Control::Stats(reply) => {
                let _ = reply.send(self.store.stats().await);
            }
            Control::Shutdown => return false,
        }
        true
    }

    async fn fetch(&mut self, request: TileFetchRequest) {
        let blob = match self.lookup(&request).await {
            Ok(blob) => blob,
            Err(e) => {
                error!(tile = %request.coord, "Cache lookup failed: {}", e);
                None
            }
        };

        if blob.is_some() {
            trace!(tile = %request.coord, "Cache hit");
        }
        if !request.respond(blob) {
            trace!("Fetch requester stopped waiting");
        }
    }

    async fn lookup(&mut self, request: &TileFetchRequest) -> Result<Option<Bytes>, StoreError> {
        let Some(&layer_id) = self.layer_ids.get(&request.coord.layer) else {
            return Ok(None);
        };
        let key = TileKey::new(layer_id, &request.coord)?;
        Ok(self.store.fetch_tile(&key).await?.map(Bytes::from))
    }

    async fn insert(&mut self, result: TileFetchResult) {
        let Some(blob) = result.blob else {
            return;
        };

        match self.store_tile(&result.coord, &blob).await {
            Ok(true) => trace!(tile = %result.coord, bytes = blob.len(), "Stored tile"),
            Ok(false) => trace!(tile = %result.coord, "Tile already cached"),
            Err(e) => error!(tile = %result.coord, "Failed to store tile: {}", e),
        }
    }

    async fn store_tile(&mut self, coord: &TileCoord, blob: &[u8]) -> Result<bool, StoreError> {
        let layer_id = self.layer_id(&coord.layer).await?;
        let key = TileKey::new(layer_id, coord)?;
        self.store.insert_tile(&key, blob).await
    }

    /// Resolve a layer name to its id, registering unknown layers.
    async fn layer_id(&mut self, layer: &str) -> Result<i64, StoreError> {
        if let Some(id) = self.layer_ids.get(layer) {
            return Ok(*id);
        }

        if let Err(e) = self.store.add_layer(layer).await {
            warn!(layer, "Failed to register layer: {}", e);
        }
        self.layer_ids = self.store.read_layers().await?;
        debug!(layer, "Registered cache layer");

        self.layer_ids
            .get(layer)
            .copied()
            .ok_or_else(|| StoreError::Query(format!("layer '{}' is not registered", layer)))
    }
}
