//! Cache integration tests.
//!
//! Tests verify:
//! - Tiles survive closing and reopening a SQLite cache file
//! - Concurrent readers and writers see a consistent cache
//! - Metadata and statistics reflect the stored content

use std::sync::Arc;

use bytes::Bytes;

use tilecache_server::tile::{TileCoord, TileFetchRequest, TileFetchResult};
use tilecache_server::{CacheError, CacheMetadata, StoreBackend, TileCache};

use super::test_utils::{open_cache, QUEUE_CAPACITY};

async fn fetch(cache: &TileCache, coord: &TileCoord) -> Option<Bytes> {
    let (request, reply) = TileFetchRequest::new(coord.clone());
    cache.submit_fetch(request).await.unwrap();
    reply.await.unwrap().blob
}

async fn insert(cache: &TileCache, coord: &TileCoord, data: &'static [u8]) {
    cache
        .submit_insert(TileFetchResult::found(coord.clone(), Bytes::from_static(data)))
        .await
        .unwrap();
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_tiles_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let coord = TileCoord::xyz("base", 4, 3, 7);

    let cache = open_cache(dir.path()).await;
    insert(&cache, &coord, b"persisted").await;
    cache.close().await;

    let reopened = open_cache(dir.path()).await;
    assert_eq!(
        fetch(&reopened, &coord).await,
        Some(Bytes::from_static(b"persisted"))
    );
    reopened.close().await;
}

#[tokio::test]
async fn test_reopen_keeps_layer_ids() {
    let dir = tempfile::tempdir().unwrap();
    let a = TileCoord::xyz("a", 1, 0, 0);
    let b = TileCoord::xyz("b", 1, 0, 0);

    let cache = open_cache(dir.path()).await;
    insert(&cache, &a, b"from a").await;
    insert(&cache, &b, b"from b").await;
    cache.close().await;

    // Layers registered in a different order must not swap tiles
    let reopened = open_cache(dir.path()).await;
    assert_eq!(fetch(&reopened, &b).await, Some(Bytes::from_static(b"from b")));
    assert_eq!(fetch(&reopened, &a).await, Some(Bytes::from_static(b"from a")));
    reopened.close().await;
}

#[tokio::test]
async fn test_open_invalid_location_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("deeper").join("cache.db");

    let result = TileCache::open(
        StoreBackend::Sqlite,
        path.to_str().unwrap(),
        &CacheMetadata::default(),
        QUEUE_CAPACITY,
    )
    .await;
    assert!(matches!(result, Err(CacheError::Store(_))));
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_writers_and_readers() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(dir.path()).await;

    let mut writers = Vec::new();
    for x in 0..32u64 {
        let cache = Arc::clone(&cache);
        writers.push(tokio::spawn(async move {
            let coord = TileCoord::xyz("grid", 5, x, x);
            cache
                .submit_insert(TileFetchResult::found(coord, format!("tile-{}", x)))
                .await
                .unwrap();
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let mut readers = Vec::new();
    for x in 0..32u64 {
        let cache = Arc::clone(&cache);
        readers.push(tokio::spawn(async move {
            let coord = TileCoord::xyz("grid", 5, x, x);
            let (request, reply) = TileFetchRequest::new(coord);
            cache.submit_fetch(request).await.unwrap();
            (x, reply.await.unwrap().blob)
        }));
    }
    for reader in readers {
        let (x, blob) = reader.await.unwrap();
        assert_eq!(blob, Some(Bytes::from(format!("tile-{}", x))));
    }

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.tiles, 32);

    cache.close().await;
}

#[tokio::test]
async fn test_requester_gone_does_not_stop_worker() {
    let dir = tempfile::tempdir().unwrap();
    let cache = open_cache(dir.path()).await;
    let coord = TileCoord::xyz("base", 0, 0, 0);

    let (request, reply) = TileFetchRequest::new(coord.clone());
    drop(reply);
    cache.submit_fetch(request).await.unwrap();

    insert(&cache, &coord, b"still alive").await;
    assert_eq!(
        fetch(&cache, &coord).await,
        Some(Bytes::from_static(b"still alive"))
    );

    cache.close().await;
}

// =============================================================================
// Metadata and Statistics
// =============================================================================

#[tokio::test]
async fn test_metadata_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meta.mbtiles");
    let cache = TileCache::open(
        StoreBackend::Sqlite,
        path.to_str().unwrap(),
        &CacheMetadata::default().with_attribution("© Contributors"),
        QUEUE_CAPACITY,
    )
    .await
    .unwrap();

    let metadata = cache.metadata().await.unwrap();
    assert_eq!(metadata.get("format").map(String::as_str), Some("png"));
    assert_eq!(
        metadata.get("attribution").map(String::as_str),
        Some("© Contributors")
    );

    let empty = cache.stats().await.unwrap();
    assert_eq!(empty.tiles, 0);
    assert_eq!(empty.layers, 1);

    insert(&cache, &TileCoord::xyz("base", 1, 0, 0), b"a").await;
    insert(&cache, &TileCoord::xyz("base", 1, 1, 0), b"b").await;

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.tiles, 2);
    assert_eq!(stats.layers, 2);

    cache.close().await;
    assert!(matches!(cache.stats().await, Err(CacheError::Closed)));
}
