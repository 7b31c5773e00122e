//! Fetching tiles from upstream tile providers.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::RenderError;
use crate::tile::TileCoord;

/// Values substituted for `{s}`, in rotation.
pub const SUBDOMAINS: [&str; 3] = ["a", "b", "c"];

/// A URL with `{z}`, `{x}`, `{y}` and optional `{s}` placeholders.
///
/// Each expansion picks the next subdomain, so consecutive requests are
/// spread over the provider's hosts.
#[derive(Debug, Clone)]
pub struct UrlTemplate {
    template: String,
    next_subdomain: usize,
}

impl UrlTemplate {
    /// Validate `template`.
    ///
    /// The template must contain the three coordinate placeholders and must
    /// expand to an absolute http(s) URL.
    pub fn parse(template: &str) -> Result<Self, RenderError> {
        let template = template.trim();
        for placeholder in ["{z}", "{x}", "{y}"] {
            if !template.contains(placeholder) {
                return Err(RenderError::InvalidTemplate(format!(
                    "'{}' is missing the {} placeholder",
                    template, placeholder
                )));
            }
        }

        let sample = substitute(template, SUBDOMAINS[0], 0, 0, 0);
        let url = Url::parse(&sample)
            .map_err(|e| RenderError::InvalidTemplate(format!("'{}': {}", template, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RenderError::InvalidTemplate(format!(
                "'{}' must use http or https",
                template
            )));
        }

        Ok(Self {
            template: template.to_string(),
            next_subdomain: 0,
        })
    }

    /// Expand the template for one tile (XYZ row).
    pub fn expand(&mut self, zoom: u64, x: u64, y: u64) -> String {
        let subdomain = SUBDOMAINS[self.next_subdomain % SUBDOMAINS.len()];
        self.next_subdomain = (self.next_subdomain + 1) % SUBDOMAINS.len();
        substitute(&self.template, subdomain, zoom, x, y)
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

fn substitute(template: &str, subdomain: &str, zoom: u64, x: u64, y: u64) -> String {
    template
        .replace("{s}", subdomain)
        .replace("{z}", &zoom.to_string())
        .replace("{x}", &x.to_string())
        .replace("{y}", &y.to_string())
}

/// HTTP client for one proxy layer.
pub struct ProxyFetcher {
    client: Client,
    template: UrlTemplate,
}

impl ProxyFetcher {
    /// Create a fetcher for `template` whose requests give up after `timeout`.
    pub fn new(template: &str, timeout: Duration) -> Result<Self, RenderError> {
        let template = UrlTemplate::parse(template)?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RenderError::Http(e.to_string()))?;

        Ok(Self { client, template })
    }

    /// Fetch one tile. `coord` must use XYZ rows.
    ///
    /// Only a `200 OK` answer counts as a tile; its body is returned as is.
    pub async fn fetch(&mut self, coord: &TileCoord) -> Result<Bytes, RenderError> {
        let url = self.template.expand(coord.zoom, coord.x, coord.y);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RenderError::Http(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        debug!(%url, status = status.as_u16(), "Upstream tile response");
        if status != StatusCode::OK {
            return Err(RenderError::UpstreamStatus {
                status: status.as_u16(),
                url,
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| RenderError::Http(format!("GET {}: {}", url, e)))
    }

    pub fn template(&self) -> &UrlTemplate {
        &self.template
    }
}
