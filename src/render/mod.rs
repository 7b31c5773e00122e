//! Tile rendering.
//!
//! - [`RenderDispatcher`]: one worker per layer, keyed by layer name
//! - [`LayerSource`]: a stylesheet path or an upstream URL template
//! - [`MapEngine`] / [`RasterEngine`]: draws stylesheet layers
//! - [`ProxyFetcher`] / [`UrlTemplate`]: fetches proxy layers over HTTP

mod dispatcher;
mod engine;
mod proxy;
mod source;

pub use dispatcher::{RenderDispatcher, RenderOptions, DEFAULT_UPSTREAM_TIMEOUT};
pub use engine::{GraticuleStyle, MapEngine, RasterEngine, Stylesheet, MIN_GRATICULE_STEP};
pub use proxy::{ProxyFetcher, UrlTemplate, SUBDOMAINS};
pub use source::{is_valid_layer_name, LayerSource};
