//! Tiling-grid arithmetic for the two supported projections.
//!
//! Provides resolutions, tile↔bbox conversions and inverse index ranges for
//! the geodetic grid ("EPSG:4326", degrees, rows counted northward from the
//! southern edge) and the spherical web-mercator grid ("EPSG:3857", meters,
//! standard XYZ rows counted southward from the northern edge), plus the
//! point projection between them.
//!
//! The geodetic grid is the 360°-square scheme: a zoom-0 tile spans the full
//! 360° in both axes, so only the lower half of the row space is on-world
//! and zoom `z` has `2^z` columns but `max(1, 2^(z-1))` rows.

mod types;

pub use types::{
    BoundingBox, CoordError, Projection, TileCoord, TileRange, MAX_MERCATOR_LAT, MAX_ZOOM,
    TILE_SIZE,
};

use std::f64::consts::PI;

/// Degrees per pixel of the geodetic grid at zoom 0 (`×256 = 360°`).
pub const GEODETIC_BASE_RESOLUTION: f64 = 1.40625;

/// Meters per pixel of the mercator grid at zoom 0 (`×256` ≈ equatorial
/// circumference).
pub const MERCATOR_BASE_RESOLUTION: f64 = 156_543.033_928_040_97;

/// Half the mercator world span in meters; the grid origin sits at
/// `(-MERCATOR_ORIGIN, MERCATOR_ORIGIN)`.
pub const MERCATOR_ORIGIN: f64 = 20_037_508.342_789_244;

/// WGS84 equatorial radius in meters, the sphere radius of EPSG:3857.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Resolution of the geodetic grid in degrees per pixel.
#[inline]
pub fn geodetic_resolution(zoom: u8) -> f64 {
    GEODETIC_BASE_RESOLUTION / 2.0_f64.powi(zoom as i32)
}

/// Resolution of the mercator grid in meters per pixel.
#[inline]
pub fn mercator_resolution(zoom: u8) -> f64 {
    MERCATOR_BASE_RESOLUTION / 2.0_f64.powi(zoom as i32)
}

/// Edge length of one geodetic tile in degrees.
#[inline]
pub fn geodetic_tile_span(zoom: u8) -> f64 {
    geodetic_resolution(zoom) * TILE_SIZE as f64
}

/// Edge length of one mercator tile in meters.
#[inline]
pub fn mercator_tile_span(zoom: u8) -> f64 {
    mercator_resolution(zoom) * TILE_SIZE as f64
}

/// Grid resolution dispatcher.
#[inline]
pub fn resolution(grid: Projection, zoom: u8) -> f64 {
    match grid {
        Projection::Geodetic => geodetic_resolution(zoom),
        Projection::WebMercator => mercator_resolution(zoom),
    }
}

/// Rejects zoom levels past [`MAX_ZOOM`] before any shift arithmetic runs.
pub fn validate_zoom(zoom: u8) -> Result<(), CoordError> {
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }
    Ok(())
}

/// Number of addressable columns of `grid` at `zoom`.
#[inline]
pub fn grid_cols(grid: Projection, zoom: u8) -> i64 {
    match grid {
        Projection::Geodetic | Projection::WebMercator => 1_i64 << zoom,
    }
}

/// Number of addressable rows of `grid` at `zoom`.
///
/// The geodetic 360°-square scheme only populates rows covering the
/// -90°..90° band, which is half the column count (minimum one row).
#[inline]
pub fn grid_rows(grid: Projection, zoom: u8) -> i64 {
    match grid {
        Projection::Geodetic => {
            if zoom == 0 {
                1
            } else {
                1_i64 << (zoom - 1)
            }
        }
        Projection::WebMercator => 1_i64 << zoom,
    }
}

/// World extent of `grid` in its own unit.
pub fn grid_extent(grid: Projection) -> BoundingBox {
    match grid {
        Projection::Geodetic => BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
        Projection::WebMercator => BoundingBox::new(
            -MERCATOR_ORIGIN,
            -MERCATOR_ORIGIN,
            MERCATOR_ORIGIN,
            MERCATOR_ORIGIN,
        ),
    }
}

/// Geodetic bbox of tile `(col, row)` at `zoom`.
///
/// The grid origin is `(-180, 90)` with the row index counted northward
/// from the southern edge: `ymin = -90 + row×span`.
#[inline]
pub fn tile_bbox_4326(col: i64, row: i64, zoom: u8) -> BoundingBox {
    let span = geodetic_tile_span(zoom);
    let min_x = -180.0 + col as f64 * span;
    let min_y = -90.0 + row as f64 * span;
    BoundingBox::new(min_x, min_y, min_x + span, min_y + span)
}

/// Mercator bbox of tile `(col, row)` at `zoom`, standard XYZ math with the
/// row index counted southward from the northern edge.
#[inline]
pub fn tile_bbox_3857(col: i64, row: i64, zoom: u8) -> BoundingBox {
    let span = mercator_tile_span(zoom);
    let min_x = -MERCATOR_ORIGIN + col as f64 * span;
    let max_y = MERCATOR_ORIGIN - row as f64 * span;
    BoundingBox::new(min_x, max_y - span, min_x + span, max_y)
}

/// Tile bbox dispatcher.
#[inline]
pub fn tile_bbox(grid: Projection, col: i64, row: i64, zoom: u8) -> BoundingBox {
    match grid {
        Projection::Geodetic => tile_bbox_4326(col, row, zoom),
        Projection::WebMercator => tile_bbox_3857(col, row, zoom),
    }
}

/// Projects a geodetic point to mercator meters.
///
/// Latitude is clamped into the mercator-valid band so poleward tile edges
/// land on the world boundary instead of diverging.
#[inline]
pub fn geodetic_to_mercator(lon: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let x = lon.to_radians() * EARTH_RADIUS;
    let y = (lat.to_radians() / 2.0 + PI / 4.0).tan().ln() * EARTH_RADIUS;
    (x, y)
}

/// Inverse mercator projection back to geodetic degrees.
#[inline]
pub fn mercator_to_geodetic(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Converts a geodetic bbox to its mercator equivalent.
///
/// Both projection axes are monotone, so projecting the two extreme corners
/// is sufficient.
pub fn geodetic_bbox_to_mercator(bbox: &BoundingBox) -> BoundingBox {
    BoundingBox::from_corners(
        geodetic_to_mercator(bbox.min_x, bbox.min_y),
        geodetic_to_mercator(bbox.max_x, bbox.max_y),
    )
}

/// Converts a mercator bbox to its geodetic equivalent.
pub fn mercator_bbox_to_geodetic(bbox: &BoundingBox) -> BoundingBox {
    BoundingBox::from_corners(
        mercator_to_geodetic(bbox.min_x, bbox.min_y),
        mercator_to_geodetic(bbox.max_x, bbox.max_y),
    )
}

/// Inclusive geodetic tile index range covering `bbox` at `zoom`.
///
/// Inverse of [`tile_bbox_4326`], floor-based on both edges. The caller is
/// responsible for rejecting degenerate input boxes first.
pub fn geodetic_tile_range(bbox: &BoundingBox, zoom: u8) -> TileRange {
    let span = geodetic_tile_span(zoom);
    TileRange {
        min_col: ((bbox.min_x + 180.0) / span).floor() as i64,
        max_col: ((bbox.max_x + 180.0) / span).floor() as i64,
        min_row: ((bbox.min_y + 90.0) / span).floor() as i64,
        max_row: ((bbox.max_y + 90.0) / span).floor() as i64,
    }
}

/// Inclusive mercator tile index range covering `bbox` at `zoom`.
///
/// Rows grow southward, so the box's `max_y` edge produces `min_row`.
pub fn mercator_tile_range(bbox: &BoundingBox, zoom: u8) -> TileRange {
    let span = mercator_tile_span(zoom);
    TileRange {
        min_col: ((bbox.min_x + MERCATOR_ORIGIN) / span).floor() as i64,
        max_col: ((bbox.max_x + MERCATOR_ORIGIN) / span).floor() as i64,
        min_row: ((MERCATOR_ORIGIN - bbox.max_y) / span).floor() as i64,
        max_row: ((MERCATOR_ORIGIN - bbox.min_y) / span).floor() as i64,
    }
}

/// Tile range dispatcher.
pub fn tile_range(grid: Projection, bbox: &BoundingBox, zoom: u8) -> TileRange {
    match grid {
        Projection::Geodetic => geodetic_tile_range(bbox, zoom),
        Projection::WebMercator => mercator_tile_range(bbox, zoom),
    }
}
