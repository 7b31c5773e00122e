//! tilecache-server - A caching raster tile server.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilecache_server::{
    cache::TileCache,
    config::{Cli, Command, Config},
    render::RenderDispatcher,
    server::{create_router, RouterConfig},
    tile::TileService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(mut config: Config) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.load_config_file() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    info!("Configuration:");
    info!("  Cache: {} ({})", config.cache, config.engine);
    info!("  Row convention: {:?}", config.scheme());
    info!(
        "  Timeouts: {}s per request phase, {}s upstream",
        config.request_timeout, config.upstream_timeout
    );
    for (name, source) in config.layer_sources() {
        info!("  Layer '{}': {}", name, source);
    }

    let cache = match open_cache(&config).await {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to open tile cache '{}': {}", config.cache, e);
            return ExitCode::FAILURE;
        }
    };

    let mut dispatcher = RenderDispatcher::new(config.render_options());
    for (name, source) in config.layer_sources() {
        if let Err(e) = dispatcher.register_layer(&name, source) {
            error!("Failed to load layer '{}': {}", name, e);
            cache.close().await;
            return ExitCode::FAILURE;
        }
    }

    let tile_service = Arc::new(TileService::new(
        Arc::clone(&cache),
        Arc::new(dispatcher),
        config.request_timeout(),
    ));

    let router = create_router(tile_service, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/ping", addr);
    info!("    curl http://{}/tilelayers", addr);
    info!("    curl http://{}/tms/1.0", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            cache.close().await;
            return ExitCode::FAILURE;
        }
    };

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Closing tile cache");
    cache.close().await;

    if let Err(e) = served {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("┌┬┐┬┬  ┌─┐┌─┐┌─┐┌─┐┬ ┬┌─┐");
    info!(" │ ││  ├┤ │  ├─┤│  ├─┤├┤ ");
    info!(" ┴ ┴┴─┘└─┘└─┘┴ ┴└─┘┴ ┴└─┘  v{}", version);
    info!("");
}

async fn open_cache(config: &Config) -> Result<Arc<TileCache>, String> {
    let backend = config.backend().map_err(|e| e.to_string())?;
    TileCache::open(
        backend,
        &config.cache,
        &config.cache_metadata(),
        config.queue_capacity,
    )
    .await
    .map(Arc::new)
    .map_err(|e| e.to_string())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilecache_server=debug,tower_http=debug"
    } else {
        "tilecache_server=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::default()
        .with_cache_max_age(config.cache_max_age)
        .with_scheme(config.scheme());

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(mut config: Config) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("tilecache-server Configuration Check");
    println!("════════════════════════════════════");
    println!();

    if let Some(path) = config.config.clone() {
        match config.load_config_file() {
            Ok(()) => println!("✓ Config file: {}", path.display()),
            Err(e) => {
                println!("✗ Config file: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if let Err(e) = config.validate() {
        println!("✗ Configuration: {}", e);
        return ExitCode::FAILURE;
    }
    println!("✓ Configuration valid");
    println!();

    print!("Opening cache '{}' ({})... ", config.cache, config.engine);
    let cache = match open_cache(&config).await {
        Ok(cache) => {
            println!("✓ success");
            cache
        }
        Err(e) => {
            println!("✗ failed");
            println!();
            println!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cache.stats().await {
        Ok(stats) => println!("  {} tile(s) in {} layer(s)", stats.tiles, stats.layers),
        Err(e) => println!("  Could not read cache statistics: {}", e),
    }
    println!();

    println!("Layers:");
    println!("───────");

    let mut failed = false;
    let mut dispatcher = RenderDispatcher::new(config.render_options());
    for (name, source) in config.layer_sources() {
        match dispatcher.register_layer(&name, source.clone()) {
            Ok(()) => println!("✓ {}: {}", name, source),
            Err(e) => {
                println!("✗ {}: {}", name, e);
                failed = true;
            }
        }
    }

    cache.close().await;

    println!();
    println!("════════════════════════════════════");
    if failed {
        println!("✗ Some layers failed to load");
        return ExitCode::FAILURE;
    }
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
