//! Map projections used to express tile bounding boxes.
//!
//! Tile bounds are first computed in geographic coordinates (EPSG:4326) and
//! then forward-projected into the projection of the map definition that
//! renders them.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// WGS84 semi-major axis in meters, used by spherical Web Mercator.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Coordinate reference systems a map definition can be drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// Plain longitude/latitude in degrees (EPSG:4326).
    Wgs84,

    /// Spherical Web Mercator in meters (EPSG:3857).
    #[default]
    WebMercator,
}

impl Projection {
    /// Project a longitude/latitude pair (degrees) into this projection.
    pub fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Projection::Wgs84 => (lon, lat),
            Projection::WebMercator => {
                let x = EARTH_RADIUS * lon.to_radians();
                let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
                (x, y)
            }
        }
    }

    /// Canonical SRS identifier.
    pub fn srs(&self) -> &'static str {
        match self {
            Projection::Wgs84 => "EPSG:4326",
            Projection::WebMercator => "EPSG:3857",
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.srs())
    }
}

impl FromStr for Projection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EPSG:4326" | "WGS84" => Ok(Projection::Wgs84),
            "EPSG:3857" | "EPSG:900913" | "EPSG:3785" => Ok(Projection::WebMercator),
            other => Err(format!("unsupported SRS '{}'", other)),
        }
    }
}
