//! API integration tests for tile retrieval and error handling.
//!
//! Tests verify:
//! - Tile retrieval over XYZ and TMS URLs, with cache headers
//! - Error cases (unknown layer, malformed coordinates, unknown routes)
//! - JSON service endpoints and TMS capability documents

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use tilecache_server::tile::{TileCoord, TileScheme, TileService};
use tilecache_server::{create_router, RouterConfig};

use super::test_utils::{is_valid_png, service_with_engine, wait_for_cached, CountingEngine};

fn router(service: &Arc<TileService>) -> Router {
    create_router(Arc::clone(service), RouterConfig::default().with_tracing(false))
}

async fn get(router: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let request = Request::builder()
        .uri(uri)
        .header("host", "tiles.test")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body.to_vec())
}

async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = get(router, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;

    let (status, headers, body) = get(router(&service), "/base/2/1/1.png").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "image/png");
    assert_eq!(headers.get("cache-control").unwrap(), "public, max-age=3600");
    assert_eq!(headers.get("x-tile-cache-hit").unwrap(), "false");
    assert!(is_valid_png(&body), "Response should be a valid PNG");

    service.cache().close().await;
}

#[tokio::test]
async fn test_second_request_is_cache_hit() {
    let engine = CountingEngine::new();
    let renders = engine.counter();
    let (service, _dir) = service_with_engine("base", engine).await;

    let (status, _, first) = get(router(&service), "/base/3/2/1.png").await;
    assert_eq!(status, StatusCode::OK);
    wait_for_cached(service.cache(), &TileCoord::xyz("base", 3, 2, 1))
        .await
        .unwrap();

    let (status, headers, second) = get(router(&service), "/base/3/2/1.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-tile-cache-hit").unwrap(), "true");
    assert_eq!(first, second);
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    service.cache().close().await;
}

#[tokio::test]
async fn test_tile_without_extension_returns_400() {
    let engine = CountingEngine::new();
    let renders = engine.counter();
    let (service, _dir) = service_with_engine("base", engine).await;

    for uri in ["/base/0/0/0", "/tms/1.0/base/0/0/0"] {
        let (status, body) = get_json(router(&service), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(
            body["data"]["message"],
            "Expecting /{datasource}/{z}/{x}/{y}.png"
        );
    }
    assert_eq!(renders.load(Ordering::SeqCst), 0);

    service.cache().close().await;
}

#[tokio::test]
async fn test_tms_tile_url_flips_rows() {
    let engine = CountingEngine::new();
    let boxes = engine.boxes();
    let (service, _dir) = service_with_engine("base", engine).await;

    // TMS row 0 is the southern half at zoom 1
    let (status, _, _) = get(router(&service), "/tms/1.0/base/1/0/0.png").await;
    assert_eq!(status, StatusCode::OK);

    let bbox = boxes.lock().unwrap()[0];
    assert!(bbox.north.abs() < 1e-9);
    assert!(bbox.south < -85.0);

    service.cache().close().await;
}

#[tokio::test]
async fn test_router_configured_for_tms_rows() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;
    let router = create_router(
        Arc::clone(&service),
        RouterConfig::default()
            .with_scheme(TileScheme::Tms)
            .with_cache_max_age(60)
            .with_tracing(false),
    );

    let (status, headers, _) = get(router, "/base/1/1/1.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("cache-control").unwrap(), "public, max-age=60");

    // Stored under the same row as XYZ 1/1/0
    wait_for_cached(service.cache(), &TileCoord::xyz("base", 1, 1, 0))
        .await
        .unwrap();

    service.cache().close().await;
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_unknown_layer_returns_404() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;

    let (status, body) = get_json(router(&service), "/nope/0/0/0.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "error");
    assert!(body["data"]["message"]
        .as_str()
        .unwrap()
        .starts_with("Tile not found"));

    service.cache().close().await;
}

#[tokio::test]
async fn test_render_failure_returns_404() {
    let (service, _dir) = service_with_engine("base", CountingEngine::failing()).await;

    let (status, _) = get_json(router(&service), "/base/0/0/0.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    service.cache().close().await;
}

#[tokio::test]
async fn test_malformed_coordinates_return_400() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;

    for uri in [
        "/base/z/0/0.png",
        "/base/0/-1/0.png",
        "/base/0/0/abc.png",
        "/base/99/0/0.png",
    ] {
        let (status, body) = get_json(router(&service), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(
            body["data"]["message"],
            "Expecting /{datasource}/{z}/{x}/{y}.png"
        );
    }

    service.cache().close().await;
}

#[tokio::test]
async fn test_unknown_route_returns_400() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;

    let (status, body) = get_json(router(&service), "/base/1/2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    service.cache().close().await;
}

// =============================================================================
// JSON Endpoints
// =============================================================================

#[tokio::test]
async fn test_index_and_ping() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;

    let (status, body) = get_json(router(&service), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["data"]["message"].as_str().unwrap().contains("running"));

    let (status, body) = get_json(router(&service), "/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["result"], "Pong");

    service.cache().close().await;
}

#[tokio::test]
async fn test_tilelayers_lists_layers() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;

    let (status, body) = get_json(router(&service), "/tilelayers").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], serde_json::json!(["base"]));

    service.cache().close().await;
}

#[tokio::test]
async fn test_server_profile() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;

    let (status, body) = get_json(router(&service), "/server").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["num_cores"].as_u64().unwrap() >= 1);
    assert_eq!(body["data"]["tiles"], 0);

    service.cache().close().await;
}

#[tokio::test]
async fn test_metadata_endpoint() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;

    let (status, body) = get_json(router(&service), "/metadata").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["format"], "png");
    assert_eq!(body["data"]["version"], "1");

    service.cache().close().await;
}

#[tokio::test]
async fn test_metadata_after_close_returns_500() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;
    service.cache().close().await;

    let (status, body) = get_json(router(&service), "/metadata").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
}

// =============================================================================
// TMS Documents
// =============================================================================

#[tokio::test]
async fn test_tms_documents() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;

    let (status, headers, body) = get(router(&service), "/tms").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/xml"));
    let xml = String::from_utf8(body).unwrap();
    assert!(xml.contains(r#"href="http://tiles.test/tms/1.0""#));

    let (status, _, body) = get(router(&service), "/tms/1.0").await;
    assert_eq!(status, StatusCode::OK);
    let xml = String::from_utf8(body).unwrap();
    assert!(xml.contains(r#"href="http://tiles.test/tms/1.0/base""#));

    let (status, _, body) = get(router(&service), "/tms/1.0/base").await;
    assert_eq!(status, StatusCode::OK);
    let xml = String::from_utf8(body).unwrap();
    assert!(xml.contains("<Title>base</Title>"));
    assert!(xml.contains(r#"units-per-pixel="0.703125" order="0""#));

    service.cache().close().await;
}

#[tokio::test]
async fn test_tms_unknown_layer_returns_404() {
    let (service, _dir) = service_with_engine("base", CountingEngine::new()).await;

    let (status, _, _) = get(router(&service), "/tms/1.0/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    service.cache().close().await;
}
