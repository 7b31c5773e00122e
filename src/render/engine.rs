//! Map engines that draw a bounding box into a PNG image.
//!
//! The dispatcher only relies on the [`MapEngine`] trait. [`RasterEngine`]
//! is the engine used for stylesheet layers: it paints a background and an
//! optional graticule described by a small JSON stylesheet.
//!
//! # Stylesheet
//!
//! ```json
//! {
//!   "srs": "EPSG:3857",
//!   "background": "#aad3df",
//!   "graticule": { "color": "#ffffff80", "step": 10 }
//! }
//! ```

use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, Rgba, RgbaImage};
use serde::Deserialize;

use crate::error::RenderError;
use crate::tile::{BoundingBox, Projection};

/// Latitude limit of the Web Mercator square.
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// Smallest graticule spacing in degrees.
pub const MIN_GRATICULE_STEP: f64 = 0.01;

/// Draws map images.
///
/// An engine is owned by a single render worker and is never shared, so it
/// only needs to be `Send`.
pub trait MapEngine: Send {
    /// Projection the engine expects bounding boxes in.
    fn projection(&self) -> Projection;

    /// Draw `bbox` into a `width` x `height` image and return it PNG-encoded.
    fn render(&mut self, bbox: &BoundingBox, width: u32, height: u32)
        -> Result<Vec<u8>, RenderError>;
}

// =============================================================================
// Stylesheet
// =============================================================================

/// Parsed stylesheet of a [`RasterEngine`].
#[derive(Debug, Clone, Deserialize)]
pub struct Stylesheet {
    #[serde(default = "default_srs")]
    pub srs: String,

    #[serde(default = "default_background")]
    pub background: String,

    #[serde(default)]
    pub graticule: Option<GraticuleStyle>,
}

/// Lines drawn every `step` degrees of longitude and latitude.
#[derive(Debug, Clone, Deserialize)]
pub struct GraticuleStyle {
    pub color: String,
    pub step: f64,
}

fn default_srs() -> String {
    Projection::WebMercator.srs().to_string()
}

fn default_background() -> String {
    "#ffffff".to_string()
}

/// Parse `#rrggbb` or `#rrggbbaa`.
fn parse_color(value: &str) -> Result<Rgba<u8>, String> {
    let hex = value
        .strip_prefix('#')
        .ok_or_else(|| format!("color '{}' must start with '#'", value))?;
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(format!("color '{}' must be #rrggbb or #rrggbbaa", value));
    }

    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| format!("color '{}' is not hexadecimal", value))
    };
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };

    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

// =============================================================================
// Raster Engine
// =============================================================================

/// Built-in engine drawing a background fill and a graticule.
#[derive(Debug, Clone)]
pub struct RasterEngine {
    projection: Projection,
    background: Rgba<u8>,
    graticule: Option<(Rgba<u8>, f64)>,
}

impl RasterEngine {
    /// Load and validate the stylesheet at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RenderError> {
        let path = path.as_ref();
        let stylesheet_err = |message: String| RenderError::Stylesheet {
            path: path.display().to_string(),
            message,
        };

        let text = std::fs::read_to_string(path).map_err(|e| stylesheet_err(e.to_string()))?;
        let sheet: Stylesheet =
            serde_json::from_str(&text).map_err(|e| stylesheet_err(e.to_string()))?;
        Self::from_stylesheet(&sheet).map_err(stylesheet_err)
    }

    /// Build an engine from an already parsed stylesheet.
    pub fn from_stylesheet(sheet: &Stylesheet) -> Result<Self, String> {
        let projection = sheet.srs.parse::<Projection>()?;
        let background = parse_color(&sheet.background)?;

        let graticule = match &sheet.graticule {
            Some(style) => {
                if !(style.step.is_finite()
                    && style.step >= MIN_GRATICULE_STEP
                    && style.step <= 180.0)
                {
                    return Err(format!(
                        "graticule step must be in [{}, 180] degrees, got {}",
                        MIN_GRATICULE_STEP, style.step
                    ));
                }
                Some((parse_color(&style.color)?, style.step))
            }
            None => None,
        };

        Ok(Self {
            projection,
            background,
            graticule,
        })
    }

    fn draw_graticule(&self, image: &mut RgbaImage, bbox: &BoundingBox, color: Rgba<u8>, step: f64) {
        let (width, height) = image.dimensions();
        let scale_x = f64::from(width) / bbox.width();
        let scale_y = f64::from(height) / bbox.height();

        let meridians = (-180.0 / step).ceil() as i64..=(180.0 / step).floor() as i64;
        for k in meridians {
            let (x, _) = self.projection.forward(k as f64 * step, 0.0);
            if x < bbox.west || x >= bbox.east {
                continue;
            }
            let px = ((x - bbox.west) * scale_x).floor() as u32;
            if px < width {
                for py in 0..height {
                    image.put_pixel(px, py, color);
                }
            }
        }

        let parallels = (-90.0 / step).ceil() as i64..=(90.0 / step).floor() as i64;
        for k in parallels {
            let lat = k as f64 * step;
            if self.projection == Projection::WebMercator && lat.abs() >= MERCATOR_MAX_LAT {
                continue;
            }
            let (_, y) = self.projection.forward(0.0, lat);
            if y <= bbox.south || y > bbox.north {
                continue;
            }
            let py = ((bbox.north - y) * scale_y).floor() as u32;
            if py < height {
                for px in 0..width {
                    image.put_pixel(px, py, color);
                }
            }
        }
    }
}

impl MapEngine for RasterEngine {
    fn projection(&self) -> Projection {
        self.projection
    }

    fn render(
        &mut self,
        bbox: &BoundingBox,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::Draw(format!(
                "invalid image size {}x{}",
                width, height
            )));
        }

        let finite = [bbox.west, bbox.south, bbox.east, bbox.north]
            .iter()
            .all(|v| v.is_finite());
        if !finite || bbox.width() <= 0.0 || bbox.height() <= 0.0 {
            return Err(RenderError::Draw(format!("degenerate bounding box {:?}", bbox)));
        }

        let world = world_extent(self.projection);
        if bbox.east <= world.west
            || bbox.west >= world.east
            || bbox.north <= world.south
            || bbox.south >= world.north
        {
            return Err(RenderError::Draw(format!(
                "bounding box {:?} lies outside the {} extent",
                bbox, self.projection
            )));
        }

        let mut image = RgbaImage::from_pixel(width, height, self.background);
        if let Some((color, step)) = self.graticule {
            self.draw_graticule(&mut image, bbox, color, step);
        }

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| RenderError::Draw(e.to_string()))?;
        Ok(png)
    }
}

fn world_extent(projection: Projection) -> BoundingBox {
    let max_lat = match projection {
        Projection::Wgs84 => 90.0,
        Projection::WebMercator => MERCATOR_MAX_LAT,
    };
    let (west, south) = projection.forward(-180.0, -max_lat);
    let (east, north) = projection.forward(180.0, max_lat);
    BoundingBox {
        west,
        south,
        east,
        north,
    }
}
