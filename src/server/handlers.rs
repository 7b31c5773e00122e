//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /{layer}/{z}/{x}/{y}.png` - Serve a tile
//! - `GET /tms/1.0/{layer}/{z}/{x}/{y}.png` - Serve a tile addressed with TMS rows
//! - `GET /` - Greeting
//! - `GET /ping` - Health check
//! - `GET /server` - Start time, uptime and cache counts
//! - `GET /metadata` - Rows of the cache metadata table
//! - `GET /tilelayers` - Registered layer names
//! - `GET /tms`, `/tms/1.0`, `/tms/1.0/{layer}` - TMS capability documents
//!
//! JSON responses use the envelope `{"status": "ok" | "error", "data": ...}`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::render::is_valid_layer_name;
use crate::tile::{TileCoord, TileScheme, TileService};

use super::tms;

/// Highest zoom level accepted in tile URLs.
pub const MAX_ZOOM: u64 = 30;

/// Message returned for malformed requests.
pub const EXPECTED_FORMAT: &str = "Expecting /{datasource}/{z}/{x}/{y}.png";

const CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-tile-cache-hit");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    /// The tile service for processing tile requests
    pub tile_service: Arc<TileService>,

    /// Cache-Control max-age for tiles in seconds
    pub cache_max_age: u32,

    /// Row convention of incoming `/{layer}/{z}/{x}/{y}` requests
    pub scheme: TileScheme,

    /// When the server started
    pub started_at: SystemTime,
}

impl AppState {
    /// Create a new application state with the given tile service.
    pub fn new(tile_service: Arc<TileService>) -> Self {
        Self {
            tile_service,
            cache_max_age: 3600,
            scheme: TileScheme::Xyz,
            started_at: SystemTime::now(),
        }
    }

    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    pub fn with_scheme(mut self, scheme: TileScheme) -> Self {
        self.scheme = scheme;
        self
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/{layer}/{z}/{x}/{filename}`
/// where filename is `{y}.png`
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub layer: String,
    pub z: String,
    pub x: String,
    pub filename: String,
}

impl TilePathParams {
    /// Validate the parameters and build a coordinate in `scheme`.
    ///
    /// Returns `None` for an invalid layer name, non-numeric components or a
    /// zoom level above [`MAX_ZOOM`].
    pub fn coord(&self, scheme: TileScheme) -> Option<TileCoord> {
        if !is_valid_layer_name(&self.layer) {
            return None;
        }

        let zoom: u64 = self.z.parse().ok()?;
        if zoom > MAX_ZOOM {
            return None;
        }
        let x: u64 = self.x.parse().ok()?;
        let y: u64 = self
            .filename
            .strip_suffix(".png")?
            .parse()
            .ok()?;

        Some(TileCoord::new(self.layer.clone(), zoom, x, y, scheme))
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON envelope wrapping every JSON response.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: &'static str,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self { status: "ok", data }
    }
}

/// `{"message": ...}` payload.
#[derive(Debug, Serialize)]
pub struct MessageData {
    pub message: String,
}

/// Payload of `GET /ping`.
#[derive(Debug, Serialize)]
pub struct PingData {
    pub result: &'static str,
}

/// Payload of `GET /server`.
#[derive(Debug, Serialize)]
pub struct ServerProfile {
    /// Start time in seconds since the UNIX epoch
    pub registered: u64,

    /// Seconds since start
    pub uptime: f64,

    pub num_cores: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tiles: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<u64>,
}

/// Build an error envelope response.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = Envelope {
        status: "error",
        data: MessageData {
            message: message.into(),
        },
    };
    (status, Json(body)).into_response()
}

fn xml_response(xml: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        xml,
    )
        .into_response()
}

/// Base URL of the request, honoring `X-Forwarded-Proto`.
fn base_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");
    format!("{}://{}", proto, host)
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /{layer}/{z}/{x}/{y}.png`
///
/// Rows are interpreted in the server's configured convention.
///
/// # Response
///
/// - `200 OK`: PNG tile with `Content-Type: image/png`
/// - `400 Bad Request`: Malformed coordinates or layer name
/// - `404 Not Found`: Unknown layer, render failure or timeout
///
/// # Headers
///
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Cache-Hit: true|false`
pub async fn tile_handler(
    State(state): State<AppState>,
    Path(params): Path<TilePathParams>,
) -> Response {
    serve_tile(&state, &params, state.scheme).await
}

/// Handle tile requests addressed with TMS rows.
///
/// # Endpoint
///
/// `GET /tms/1.0/{layer}/{z}/{x}/{y}.png`
pub async fn tms_tile_handler(
    State(state): State<AppState>,
    Path(params): Path<TilePathParams>,
) -> Response {
    serve_tile(&state, &params, TileScheme::Tms).await
}

async fn serve_tile(state: &AppState, params: &TilePathParams, scheme: TileScheme) -> Response {
    let Some(coord) = params.coord(scheme) else {
        warn!(?params, "Malformed tile request");
        return error_response(StatusCode::BAD_REQUEST, EXPECTED_FORMAT);
    };

    let label = coord.to_string();
    match state.tile_service.resolve(coord).await {
        Some(tile) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/png".to_string()),
                (
                    header::CACHE_CONTROL,
                    format!("public, max-age={}", state.cache_max_age),
                ),
                (CACHE_HIT_HEADER, tile.cache_hit.to_string()),
            ],
            tile.data,
        )
            .into_response(),
        None => {
            debug!(tile = %label, "Tile not found");
            error_response(StatusCode::NOT_FOUND, format!("Tile not found: {}", label))
        }
    }
}

/// Handle `GET /`.
pub async fn index_handler() -> Json<Envelope<MessageData>> {
    Json(Envelope::ok(MessageData {
        message: format!("{} {} is running", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    }))
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /ping`
///
/// # Response
///
/// ```json
/// { "status": "ok", "data": { "result": "Pong" } }
/// ```
pub async fn ping_handler() -> Json<Envelope<PingData>> {
    Json(Envelope::ok(PingData { result: "Pong" }))
}

/// Handle `GET /server`.
///
/// Cache counts are omitted if the cache cannot answer.
pub async fn server_handler(State(state): State<AppState>) -> Json<Envelope<ServerProfile>> {
    let registered = state
        .started_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let uptime = SystemTime::now()
        .duration_since(state.started_at)
        .unwrap_or_default()
        .as_secs_f64();
    let num_cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let stats = match state.tile_service.cache().stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!("Cache stats unavailable: {}", e);
            None
        }
    };

    Json(Envelope::ok(ServerProfile {
        registered,
        uptime,
        num_cores,
        tiles: stats.map(|s| s.tiles),
        layers: stats.map(|s| s.layers),
    }))
}

/// Handle `GET /metadata`.
pub async fn metadata_handler(State(state): State<AppState>) -> Response {
    match state.tile_service.cache().metadata().await {
        Ok(metadata) => Json(Envelope::ok(metadata)).into_response(),
        Err(e) => {
            error!("Failed to read cache metadata: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Handle `GET /tilelayers`.
pub async fn tile_layers_handler(State(state): State<AppState>) -> Json<Envelope<Vec<String>>> {
    Json(Envelope::ok(state.tile_service.layers()))
}

/// Handle `GET /tms`.
pub async fn tms_root_handler(headers: HeaderMap) -> Response {
    xml_response(tms::generate_services_xml(&base_url(&headers)))
}

/// Handle `GET /tms/1.0`.
pub async fn tms_service_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    xml_response(tms::generate_tile_map_service_xml(
        &base_url(&headers),
        &state.tile_service.layers(),
    ))
}

/// Handle `GET /tms/1.0/{layer}`.
pub async fn tms_tile_map_handler(
    State(state): State<AppState>,
    Path(layer): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !state.tile_service.has_layer(&layer) {
        return error_response(StatusCode::NOT_FOUND, format!("Layer not found: {}", layer));
    }

    let source = state
        .tile_service
        .layer_source(&layer)
        .map(|s| s.to_string())
        .unwrap_or_default();
    xml_response(tms::generate_tile_map_xml(&base_url(&headers), &layer, &source))
}

/// Fallback for every unmatched request.
pub async fn request_error_handler() -> Response {
    error_response(StatusCode::BAD_REQUEST, EXPECTED_FORMAT)
}
