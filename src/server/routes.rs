//! Router configuration for the tile server.
//!
//! # Route Structure
//!
//! ```text
//! /                                          - Greeting
//! /ping                                      - Health check
//! /server                                    - Server profile
//! /metadata                                  - Cache metadata
//! /tilelayers                                - Layer names
//! /{layer}/{z}/{x}/{y}.png                   - Tile endpoint
//! /tms                                       - TMS services root
//! /tms/1.0                                   - TMS tile map service
//! /tms/1.0/{layer}                           - TMS tile map
//! /tms/1.0/{layer}/{z}/{x}/{y}.png           - Tile endpoint (TMS rows)
//! anything else                              - 400 with the expected URL format
//! ```
//!
//! # Example
//!
//! ```ignore
//! let router = create_router(tile_service, RouterConfig::default().with_cache_max_age(600));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    index_handler, metadata_handler, ping_handler, request_error_handler, server_handler,
    tile_handler, tile_layers_handler, tms_root_handler, tms_service_handler,
    tms_tile_handler, tms_tile_map_handler, AppState,
};
use crate::tile::{TileScheme, TileService};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Row convention of `/{layer}/{z}/{x}/{y}.png` requests
    pub scheme: TileScheme,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    /// CORS allows any origin, tiles are cached for an hour, rows are XYZ
    /// and tracing is enabled.
    fn default() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            scheme: TileScheme::Xyz,
            enable_tracing: true,
        }
    }
}

impl RouterConfig {
    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_scheme(mut self, scheme: TileScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
pub fn create_router(tile_service: Arc<TileService>, config: RouterConfig) -> Router {
    let app_state = AppState::new(tile_service)
        .with_cache_max_age(config.cache_max_age)
        .with_scheme(config.scheme);

    let cors = build_cors_layer(&config);

    // {filename} must be "{y}.png"
    let router = Router::new()
        .route("/", get(index_handler))
        .route("/ping", get(ping_handler))
        .route("/server", get(server_handler))
        .route("/metadata", get(metadata_handler))
        .route("/tilelayers", get(tile_layers_handler))
        .route("/tms", get(tms_root_handler))
        .route("/tms/1.0", get(tms_service_handler))
        .route("/tms/1.0/{layer}", get(tms_tile_map_handler))
        .route("/tms/1.0/{layer}/{z}/{x}/{filename}", get(tms_tile_handler))
        .route("/{layer}/{z}/{x}/{filename}", get(tile_handler))
        .fallback(request_error_handler)
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
