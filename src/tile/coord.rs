//! Tile addressing and tile geometry.
//!
//! Two vertical conventions exist for tile rows:
//!
//! - **XYZ** (slippy map): row 0 is the northernmost row
//! - **TMS**: row 0 is the southernmost row
//!
//! Converting between them is a flip at the tile's zoom level
//! (`row' = 2^zoom - row - 1`). The cache always stores TMS rows while the
//! renderers always work with XYZ rows, so every coordinate is normalized
//! before it reaches either of them.

use std::f64::consts::PI;
use std::fmt;

use super::projection::Projection;

/// Edge length of a rendered tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Map units per pixel at zoom 0 for the global-geodetic TMS profile
/// (180 degrees across one 256 pixel tile).
pub const UNITS_PER_PIXEL_Z0: f64 = 0.703125;

// =============================================================================
// Tile Scheme
// =============================================================================

/// Vertical axis convention of a tile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileScheme {
    /// Row 0 is the northernmost row.
    #[default]
    Xyz,

    /// Row 0 is the southernmost row.
    Tms,
}

impl TileScheme {
    /// Scheme for a server that receives TMS rows when `tms` is set.
    pub fn from_tms_flag(tms: bool) -> Self {
        if tms {
            TileScheme::Tms
        } else {
            TileScheme::Xyz
        }
    }
}

// =============================================================================
// Tile Coordinate
// =============================================================================

/// Identifies a single tile of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Tile column (0 = westernmost)
    pub x: u64,

    /// Tile row, interpreted according to `scheme`
    pub y: u64,

    /// Zoom level
    pub zoom: u64,

    /// Convention `y` is currently expressed in
    pub scheme: TileScheme,

    /// Layer the tile belongs to
    pub layer: String,
}

impl TileCoord {
    /// Create a new tile coordinate.
    pub fn new(layer: impl Into<String>, zoom: u64, x: u64, y: u64, scheme: TileScheme) -> Self {
        Self {
            x,
            y,
            zoom,
            scheme,
            layer: layer.into(),
        }
    }

    /// Create a coordinate whose row uses the XYZ convention.
    pub fn xyz(layer: impl Into<String>, zoom: u64, x: u64, y: u64) -> Self {
        Self::new(layer, zoom, x, y, TileScheme::Xyz)
    }

    /// Create a coordinate whose row uses the TMS convention.
    pub fn tms(layer: impl Into<String>, zoom: u64, x: u64, y: u64) -> Self {
        Self::new(layer, zoom, x, y, TileScheme::Tms)
    }

    /// Return this coordinate with its row expressed in `target`.
    ///
    /// No-op when the coordinate already uses `target`. Applying it twice with
    /// opposite targets yields the original coordinate, including for rows
    /// outside the zoom level's grid.
    pub fn normalize_scheme(mut self, target: TileScheme) -> Self {
        if self.scheme != target {
            self.y = flip_row(self.zoom, self.y);
            self.scheme = target;
        }
        self
    }

    /// Bounding box of this tile in `projection`.
    pub fn bounds(&self, projection: Projection) -> BoundingBox {
        tile_bounds(self, projection)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.layer, self.zoom, self.x, self.y)?;
        if self.scheme == TileScheme::Tms {
            f.write_str(" (tms)")?;
        }
        Ok(())
    }
}

/// Flip a row between the XYZ and TMS conventions at `zoom`.
///
/// Uses wrapping arithmetic so that out-of-grid rows still round-trip.
pub fn flip_row(zoom: u64, row: u64) -> u64 {
    let rows = u32::try_from(zoom)
        .ok()
        .and_then(|z| 1u64.checked_shl(z))
        .unwrap_or(0);
    rows.wrapping_sub(row).wrapping_sub(1)
}

// =============================================================================
// Geometry
// =============================================================================

/// Axis-aligned bounding box in the units of some projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }
}

/// Map units per pixel at `zoom` for the global-geodetic profile.
pub fn units_per_pixel(zoom: u32) -> f64 {
    UNITS_PER_PIXEL_Z0 / 2f64.powi(zoom as i32)
}

/// Convert a global pixel position at `zoom` to longitude/latitude degrees
/// using the spherical Mercator tile formula.
pub fn pixel_to_lon_lat(px: f64, py: f64, zoom: u64) -> (f64, f64) {
    let world = f64::from(TILE_SIZE) * 2f64.powi(zoom.min(i32::MAX as u64) as i32);
    let half = world / 2.0;
    let pixels_per_degree = world / 360.0;
    let pixels_per_radian = world / (2.0 * PI);

    let lon = (px - half) / pixels_per_degree;
    let g = (py - half) / -pixels_per_radian;
    let lat = (2.0 * g.exp().atan() - 0.5 * PI).to_degrees();

    (lon, lat)
}

/// Bounding box of a tile projected into `projection`.
///
/// The row is interpreted in the XYZ convention; TMS coordinates are
/// normalized first. Rows and columns are not bounds-checked, tiles outside
/// the grid produce degenerate boxes.
pub fn tile_bounds(coord: &TileCoord, projection: Projection) -> BoundingBox {
    let y = match coord.scheme {
        TileScheme::Xyz => coord.y,
        TileScheme::Tms => flip_row(coord.zoom, coord.y),
    };
    let size = f64::from(TILE_SIZE);

    // Bottom-left and top-right pixel corners
    let (west, south) = pixel_to_lon_lat(coord.x as f64 * size, (y as f64 + 1.0) * size, coord.zoom);
    let (east, north) = pixel_to_lon_lat((coord.x as f64 + 1.0) * size, y as f64 * size, coord.zoom);

    let (west, south) = projection.forward(west, south);
    let (east, north) = projection.forward(east, north);

    BoundingBox {
        west,
        south,
        east,
        north,
    }
}

// =============================================================================
// Tests
// =============================================================================
