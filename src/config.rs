//! Configuration management for the tile server.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `TILECACHE_` prefix
//! - A JSON configuration file for the cache location and layer definitions
//!
//! # Example
//!
//! ```ignore
//! use tilecache_server::config::Cli;
//!
//! let cli = Cli::parse();
//! ```
//!
//! # Configuration File
//!
//! ```json
//! {
//!   "engine": "sqlite",
//!   "cache": "tilecache.mbtiles",
//!   "port": 8080,
//!   "layers": {
//!     "base": "styles/base.json",
//!     "osm": "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png"
//!   }
//! }
//! ```
//!
//! Values from the file only fill in settings left at their defaults on the
//! command line. Layers are merged; on a name collision the command line wins.
//!
//! # Environment Variables
//!
//! - `TILECACHE_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILECACHE_PORT` - Server port (default: 8080)
//! - `TILECACHE_CONFIG` - Path of the JSON configuration file
//! - `TILECACHE_ENGINE` - Cache engine, `sqlite` or `postgres` (default: sqlite)
//! - `TILECACHE_CACHE` - SQLite file or PostgreSQL URL (default: tilecache.mbtiles)
//! - `TILECACHE_TMS` - Incoming tile rows use the TMS convention
//! - `TILECACHE_REQUEST_TIMEOUT` - Per-phase request deadline in seconds (default: 30)
//! - `TILECACHE_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `TILECACHE_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use crate::cache::{CacheMetadata, StoreBackend, DEFAULT_QUEUE_CAPACITY};
use crate::error::ConfigError;
use crate::render::{is_valid_layer_name, LayerSource, RenderOptions};
use crate::tile::{TileScheme, TILE_SIZE};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default cache engine.
pub const DEFAULT_ENGINE: &str = "sqlite";

/// Default cache location.
pub const DEFAULT_CACHE: &str = "tilecache.mbtiles";

/// Default per-phase request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default upstream HTTP timeout in seconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Largest tile edge accepted for rendering.
pub const MAX_TILE_SIZE: u32 = 4096;

/// Layer names that would collide with fixed routes.
const RESERVED_LAYER_NAMES: [&str; 1] = ["tms"];

// =============================================================================
// CLI Arguments
// =============================================================================

/// tilecache-server - A caching raster tile server.
///
/// Renders tiles on demand from map stylesheets or upstream tile providers
/// and caches them in SQLite or PostgreSQL.
#[derive(Parser, Debug)]
#[command(name = "tilecache-server")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: Config,
}

impl Cli {
    /// The command to run; `serve` when none is given.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the tile server (default)
    Serve(Config),

    /// Validate the configuration, open the cache and load every layer, then exit
    Check(Config),
}

/// Server configuration.
#[derive(Args, Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILECACHE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILECACHE_PORT")]
    pub port: u16,

    /// JSON configuration file with the cache location and layer definitions.
    #[arg(short, long, env = "TILECACHE_CONFIG")]
    pub config: Option<PathBuf>,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Cache engine: `sqlite` or `postgres`.
    #[arg(long, default_value = DEFAULT_ENGINE, env = "TILECACHE_ENGINE")]
    pub engine: String,

    /// SQLite database file, or PostgreSQL connection URL.
    #[arg(long, default_value = DEFAULT_CACHE, env = "TILECACHE_CACHE")]
    pub cache: String,

    /// Capacity of each worker queue.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Attribution stored in the cache metadata.
    #[arg(long, default_value = "")]
    pub attribution: String,

    // =========================================================================
    // Layer Configuration
    // =========================================================================
    /// Layer definition, repeatable. SOURCE is a stylesheet path or an
    /// http(s) URL template with {z}, {x}, {y} and optionally {s}.
    #[arg(short = 'l', long = "layer", value_name = "NAME=SOURCE", value_parser = parse_layer_arg)]
    pub layers: Vec<(String, String)>,

    /// Interpret incoming tile rows with the TMS convention (row 0 = south).
    #[arg(long, default_value_t = false, env = "TILECACHE_TMS")]
    pub tms: bool,

    /// Edge length of rendered tiles in pixels.
    #[arg(long, default_value_t = TILE_SIZE)]
    pub tile_size: u32,

    /// Deadline in seconds for each phase (cache, render) of a tile request.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, env = "TILECACHE_REQUEST_TIMEOUT")]
    pub request_timeout: u64,

    /// HTTP timeout in seconds for proxy layers.
    #[arg(long, default_value_t = DEFAULT_UPSTREAM_TIMEOUT_SECS)]
    pub upstream_timeout: u64,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "TILECACHE_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TILECACHE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

fn parse_layer_arg(value: &str) -> Result<(String, String), String> {
    let (name, source) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=SOURCE, got '{}'", value))?;
    let (name, source) = (name.trim(), source.trim());
    if name.is_empty() || source.is_empty() {
        return Err(format!("expected NAME=SOURCE, got '{}'", value));
    }
    Ok((name.to_string(), source.to_string()))
}

// =============================================================================
// Configuration File
// =============================================================================

/// Contents of the JSON configuration file.
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub engine: Option<String>,
    pub cache: Option<String>,
    pub port: Option<u16>,
    pub layers: BTreeMap<String, String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl Config {
    /// Read the file named by `--config`, if any, and merge it in.
    pub fn load_config_file(&mut self) -> Result<(), ConfigError> {
        if let Some(path) = self.config.clone() {
            let file = FileConfig::load(&path)?;
            self.merge_file(file);
        }
        Ok(())
    }

    /// Merge file values into settings still at their defaults.
    pub fn merge_file(&mut self, file: FileConfig) {
        if let Some(engine) = file.engine {
            if self.engine == DEFAULT_ENGINE {
                self.engine = engine;
            }
        }
        if let Some(cache) = file.cache {
            if self.cache == DEFAULT_CACHE {
                self.cache = cache;
            }
        }
        if let Some(port) = file.port {
            if self.port == DEFAULT_PORT {
                self.port = port;
            }
        }
        for (name, source) in file.layers {
            if !self.layers.iter().any(|(existing, _)| *existing == name) {
                self.layers.push((name, source));
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend()?;

        if self.layers.is_empty() {
            return Err(ConfigError::Invalid(
                "No layers configured. Add --layer NAME=SOURCE or a \"layers\" map in the config file"
                    .to_string(),
            ));
        }
        for (name, _) in &self.layers {
            if !is_valid_layer_name(name) {
                return Err(ConfigError::Invalid(format!(
                    "Invalid layer name '{}': use letters, digits, '_' and '-'",
                    name
                )));
            }
            if RESERVED_LAYER_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Layer name '{}' is reserved",
                    name
                )));
            }
        }

        if self.cache.trim().is_empty() {
            return Err(ConfigError::Invalid("cache location must not be empty".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.tile_size == 0 || self.tile_size > MAX_TILE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "tile_size must be between 1 and {}",
                MAX_TILE_SIZE
            )));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout must be greater than 0".to_string(),
            ));
        }
        if self.upstream_timeout == 0 {
            return Err(ConfigError::Invalid(
                "upstream_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed cache engine.
    pub fn backend(&self) -> Result<StoreBackend, ConfigError> {
        self.engine.parse().map_err(ConfigError::Invalid)
    }

    /// Layer definitions in registration order.
    pub fn layer_sources(&self) -> Vec<(String, LayerSource)> {
        self.layers
            .iter()
            .map(|(name, source)| (name.clone(), LayerSource::parse(source)))
            .collect()
    }

    pub fn scheme(&self) -> TileScheme {
        TileScheme::from_tms_flag(self.tms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            tile_size: self.tile_size,
            queue_capacity: self.queue_capacity,
            upstream_timeout: Duration::from_secs(self.upstream_timeout),
        }
    }

    pub fn cache_metadata(&self) -> CacheMetadata {
        CacheMetadata::default().with_attribution(self.attribution.clone())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Tests
// =============================================================================
