use thiserror::Error;

/// Errors raised by a tile store backend
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store could not be opened or its schema could not be created.
    ///
    /// This is fatal for the cache: it cannot be constructed without a store.
    #[error("Failed to open tile store: {0}")]
    Open(String),

    /// A query against an open store failed
    #[error("Store query failed: {0}")]
    Query(String),

    /// A coordinate component does not fit the store's integer columns
    #[error("Coordinate out of range for storage: zoom {zoom}, column {column}, row {row}")]
    CoordinateRange { zoom: u64, column: u64, row: u64 },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Query(err.to_string())
    }
}

/// Errors surfaced by the tile cache front-end
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Error from the underlying store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The cache worker has shut down and no longer accepts work
    #[error("Tile cache is closed")]
    Closed,
}

/// Errors that can occur while rendering or proxying a tile
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// The stylesheet could not be read or parsed
    #[error("Invalid stylesheet {path}: {message}")]
    Stylesheet { path: String, message: String },

    /// The drawing engine failed to produce an image
    #[error("Drawing failed: {0}")]
    Draw(String),

    /// Network or protocol error talking to an upstream tile provider
    #[error("HTTP error: {0}")]
    Http(String),

    /// Upstream provider answered with a non-200 status
    #[error("Upstream returned HTTP {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    /// The upstream URL template does not produce a valid URL
    #[error("Invalid URL template: {0}")]
    InvalidTemplate(String),

    /// The layer's render worker could not be started
    #[error("Failed to start render worker for layer '{layer}': {message}")]
    Spawn { layer: String, message: String },
}

/// Errors in process configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON of the expected shape
    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    /// A configuration value is invalid
    #[error("{0}")]
    Invalid(String),
}
