use std::fmt;
use std::path::PathBuf;

/// Where a layer's tiles come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSource {
    /// A stylesheet drawn locally by a map engine.
    Stylesheet(PathBuf),

    /// An upstream tile provider, addressed by a URL template with
    /// `{z}`, `{x}`, `{y}` and optionally `{s}` placeholders.
    Proxy(String),
}

impl LayerSource {
    /// Classify a layer source string.
    ///
    /// Anything that looks like an http(s) URL template is a proxy source;
    /// everything else is taken as a stylesheet path.
    pub fn parse(source: &str) -> Self {
        let source = source.trim();
        if is_url_template(source) {
            LayerSource::Proxy(source.to_string())
        } else {
            LayerSource::Stylesheet(PathBuf::from(source))
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, LayerSource::Proxy(_))
    }
}

impl fmt::Display for LayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerSource::Stylesheet(path) => write!(f, "{}", path.display()),
            LayerSource::Proxy(template) => f.write_str(template),
        }
    }
}

/// Whether `name` can be used as a layer name in tile URLs
/// (ASCII letters, digits, `_` and `-`).
pub fn is_valid_layer_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn is_url_template(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    (lower.starts_with("http://") || lower.starts_with("https://"))
        && ["{z}", "{x}", "{y}"].iter().all(|p| source.contains(p))
}
