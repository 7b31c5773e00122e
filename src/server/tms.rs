//! Tile Map Service (TMS 1.0) capability documents.
//!
//! Three documents describe the server to TMS clients:
//!
//! - `Services`: the root, pointing at the 1.0 service
//! - `TileMapService`: lists one `TileMap` per layer
//! - `TileMap`: describes one layer and its 21 tile sets
//!
//! Tile sets follow the global-geodetic profile. A TMS client requests
//! `{TileSet href}/{x}/{y}.png` with TMS rows.

use std::fmt::Write as _;

use crate::tile::{units_per_pixel, TILE_SIZE};

/// Highest zoom level advertised in a `TileMap`.
pub const TMS_MAX_ZOOM: u32 = 20;

/// Escape the five XML special characters.
pub fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Generate the `Services` root document.
///
/// # Example Output
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Services>
///   <TileMapService title="Tile Map Service" version="1.0" href="http://localhost:8080/tms/1.0" />
/// </Services>
/// ```
pub fn generate_services_xml(base_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Services>
  <TileMapService title="Tile Map Service" version="1.0" href="{}/tms/1.0" />
</Services>"#,
        xml_escape(base_url)
    )
}

/// Generate the `TileMapService` document listing every layer.
pub fn generate_tile_map_service_xml(base_url: &str, layers: &[String]) -> String {
    let base_url = xml_escape(base_url);
    let mut tile_maps = String::new();
    for layer in layers {
        let layer = xml_escape(layer);
        let _ = writeln!(
            tile_maps,
            r#"    <TileMap title="{layer}" srs="EPSG:4326" profile="global-geodetic" href="{base_url}/tms/1.0/{layer}" />"#
        );
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<TileMapService version="1.0" services="{base_url}/tms">
  <Title>Tile Map Service</Title>
  <Abstract></Abstract>
  <TileMaps>
{tile_maps}  </TileMaps>
</TileMapService>"#
    )
}

/// Generate the `TileMap` document of one layer.
///
/// `source` is the layer's stylesheet path or URL template.
pub fn generate_tile_map_xml(base_url: &str, layer: &str, source: &str) -> String {
    let base_url = xml_escape(base_url);
    let layer = xml_escape(layer);
    let source = xml_escape(source);

    let mut tile_sets = String::new();
    for zoom in 0..=TMS_MAX_ZOOM {
        let _ = writeln!(
            tile_sets,
            r#"    <TileSet href="{base_url}/tms/1.0/{layer}/{zoom}" units-per-pixel="{}" order="{zoom}" />"#,
            units_per_pixel(zoom)
        );
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<TileMap version="1.0" tilemapservice="{base_url}/tms/1.0">
  <Title>{layer}</Title>
  <Source>{source}</Source>
  <Abstract></Abstract>
  <SRS>EPSG:4326</SRS>
  <BoundingBox minx="-180" miny="-90" maxx="180" maxy="90" />
  <Origin x="-180" y="-90" />
  <TileFormat width="{TILE_SIZE}" height="{TILE_SIZE}" mime-type="image/png" extension="png" />
  <TileSets profile="global-geodetic">
{tile_sets}  </TileSets>
</TileMap>"#
    )
}
