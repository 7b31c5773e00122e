//! End-to-end tests of the tile request pipeline.
//!
//! Tests verify:
//! - A miss renders the tile and writes it back to the cache
//! - A later request for the same tile is a cache hit and does not render
//! - Render failures resolve to "not found" and are never cached
//! - Stylesheet layers draw through the raster engine
//! - XYZ and TMS addresses of the same tile share one cache row

use std::sync::atomic::Ordering;

use tilecache_server::render::LayerSource;
use tilecache_server::tile::{TileCoord, TileScheme};

use super::test_utils::{
    is_valid_png, png_dimensions, service_with_engine, service_with_sources, wait_for_cached,
    write_stylesheet, CountingEngine,
};

// =============================================================================
// Miss, Render, Write-back, Hit
// =============================================================================

#[tokio::test]
async fn test_miss_renders_then_hits_cache() {
    let engine = CountingEngine::new();
    let renders = engine.counter();
    let (service, _dir) = service_with_engine("base", engine).await;

    let coord = TileCoord::xyz("base", 2, 1, 1);

    let first = service.resolve(coord.clone()).await.unwrap();
    assert!(!first.cache_hit);
    assert!(is_valid_png(&first.data));
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    // Write-back is asynchronous
    let cached = wait_for_cached(service.cache(), &coord).await;
    assert_eq!(cached, Some(first.data.clone()));

    let second = service.resolve(coord).await.unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.data, first.data);
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    service.cache().close().await;
}

#[tokio::test]
async fn test_different_tiles_render_separately() {
    let engine = CountingEngine::new();
    let renders = engine.counter();
    let (service, _dir) = service_with_engine("base", engine).await;

    for x in 0..4 {
        let tile = service.resolve(TileCoord::xyz("base", 2, x, 0)).await;
        assert!(tile.is_some());
    }
    assert_eq!(renders.load(Ordering::SeqCst), 4);

    service.cache().close().await;
}

#[tokio::test]
async fn test_xyz_and_tms_share_cache_row() {
    let engine = CountingEngine::new();
    let renders = engine.counter();
    let (service, _dir) = service_with_engine("base", engine).await;

    let xyz = TileCoord::xyz("base", 3, 5, 2);
    let rendered = service.resolve(xyz.clone()).await.unwrap();
    wait_for_cached(service.cache(), &xyz).await.unwrap();

    // Row 2 from the north is row 5 from the south at zoom 3
    let tms = TileCoord::tms("base", 3, 5, 5);
    let hit = service.resolve(tms).await.unwrap();
    assert!(hit.cache_hit);
    assert_eq!(hit.data, rendered.data);
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    service.cache().close().await;
}

#[tokio::test]
async fn test_engine_receives_xyz_bounds() {
    let engine = CountingEngine::new();
    let boxes = engine.boxes();
    let (service, _dir) = service_with_engine("base", engine).await;

    // The northwest tile at zoom 1, addressed with a TMS row
    let coord = TileCoord::new("base", 1, 0, 1, TileScheme::Tms);
    service.resolve(coord).await.unwrap();

    let boxes = boxes.lock().unwrap().clone();
    assert_eq!(boxes.len(), 1);
    assert!((boxes[0].west - -180.0).abs() < 1e-9);
    assert!((boxes[0].east - 0.0).abs() < 1e-9);
    assert!(boxes[0].north > 85.0);
    assert!(boxes[0].south.abs() < 1e-9);

    service.cache().close().await;
}

// =============================================================================
// Not Found
// =============================================================================

#[tokio::test]
async fn test_render_failure_not_found_and_not_cached() {
    let engine = CountingEngine::failing();
    let renders = engine.counter();
    let (service, _dir) = service_with_engine("base", engine).await;

    let coord = TileCoord::xyz("base", 1, 0, 0);
    assert!(service.resolve(coord.clone()).await.is_none());
    assert!(service.resolve(coord).await.is_none());

    // Failures are never cached, so both requests reached the engine
    assert_eq!(renders.load(Ordering::SeqCst), 2);

    service.cache().close().await;
}

// =============================================================================
// Stylesheet Layers
// =============================================================================

#[tokio::test]
async fn test_stylesheet_layer_renders_png() {
    let styles = tempfile::tempdir().unwrap();
    let path = write_stylesheet(
        styles.path(),
        "world.json",
        r##"{"srs": "EPSG:4326", "background": "#1e90ff", "graticule": {"color": "#ffffff", "step": 30}}"##,
    );

    let (service, _dir) =
        service_with_sources(&[("world", LayerSource::Stylesheet(path))]).await;

    let tile = service.resolve(TileCoord::xyz("world", 1, 1, 0)).await.unwrap();
    assert!(is_valid_png(&tile.data));
    assert_eq!(png_dimensions(&tile.data), (256, 256));

    service.cache().close().await;
}

#[tokio::test]
async fn test_stylesheet_layer_out_of_range_tile() {
    let styles = tempfile::tempdir().unwrap();
    let path = write_stylesheet(styles.path(), "plain.json", r#"{"srs": "EPSG:4326"}"#);

    let (service, _dir) =
        service_with_sources(&[("plain", LayerSource::Stylesheet(path))]).await;

    // Column 8 does not exist at zoom 2
    let tile = service.resolve(TileCoord::xyz("plain", 2, 8, 0)).await;
    assert!(tile.is_none());

    service.cache().close().await;
}
