//! Coverage planning for cross-projection tile requests.
//!
//! Given a requested tile in one grid, [`plan_coverage`] works out which
//! source tiles in the other grid are needed, together with the bounding
//! boxes the compositor and resampler operate on. Planning is pure
//! geometry; no network or raster work happens here.

use crate::coord::{
    geodetic_bbox_to_mercator, geodetic_tile_range, geodetic_to_mercator, grid_extent,
    mercator_bbox_to_geodetic, mercator_tile_range, mercator_to_geodetic, tile_bbox_3857,
    tile_bbox_4326, BoundingBox, Projection, TileCoord, MAX_ZOOM,
};
use crate::offset::apply_national_offset;

/// Which way a request crosses the projection boundary.
///
/// Named source-first: the source grid supplies the tiles, the other grid
/// addresses the requested output tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Geodetic source tiles composited into a requested mercator tile.
    GeodeticFromMercator,
    /// Mercator source tiles composited into a requested geodetic tile.
    MercatorFromGeodetic,
}

impl Direction {
    /// Derives the direction from the request's grid pair, rejecting
    /// same-grid pairs (nothing to reproject).
    pub fn from_grids(source: Projection, target: Projection) -> Option<Direction> {
        match (source, target) {
            (Projection::Geodetic, Projection::WebMercator) => {
                Some(Direction::GeodeticFromMercator)
            }
            (Projection::WebMercator, Projection::Geodetic) => {
                Some(Direction::MercatorFromGeodetic)
            }
            _ => None,
        }
    }

    /// Grid the source tiles are fetched from.
    pub fn source_grid(&self) -> Projection {
        match self {
            Direction::GeodeticFromMercator => Projection::Geodetic,
            Direction::MercatorFromGeodetic => Projection::WebMercator,
        }
    }

    /// Grid the requested tile is addressed in.
    pub fn target_grid(&self) -> Projection {
        match self {
            Direction::GeodeticFromMercator => Projection::WebMercator,
            Direction::MercatorFromGeodetic => Projection::Geodetic,
        }
    }
}

/// Everything the pipeline needs to render one request, built once and
/// discarded after use.
#[derive(Debug, Clone)]
pub struct TilePlan {
    /// The requested tile in the target grid.
    pub target: TileCoord,
    /// Source tiles to fetch, in row-major order. Indices may fall outside
    /// the source grid and must be validated before network use.
    pub tiles: Vec<TileCoord>,
    /// Extent of the enumerated source range in source-grid units; the
    /// mosaic's georeference.
    pub source_tiles_bbox: BoundingBox,
    /// Offset-corrected target footprint in source-grid units; the crop
    /// window for resampling pass 1.
    pub target_bbox: BoundingBox,
    /// One-tile reference frame in target-grid units, re-projected through
    /// the opposite grid; the crop frame for resampling pass 2.
    pub reprojected_bbox: BoundingBox,
}

impl TilePlan {
    /// Source zoom shared by every planned tile.
    pub fn source_zoom(&self) -> u8 {
        self.tiles.first().map(|t| t.zoom).unwrap_or(0)
    }
}

/// Plans the source coverage for one requested tile.
///
/// # Arguments
///
/// * `direction` - Which grid sources which
/// * `target` - Requested tile in the target grid
/// * `zoom_offset` - Added to the request zoom to pick the source zoom;
///   may be negative
/// * `national_offset` - Widen the footprint by the national datum shift
///
/// # Returns
///
/// `None` when the request has no source coverage: the source zoom falls
/// outside the representable range, the corrected footprint is degenerate
/// or entirely off the source grid, or the index range inverts. Callers
/// map `None` to a blank tile without touching the network.
pub fn plan_coverage(
    direction: Direction,
    target: TileCoord,
    zoom_offset: i32,
    national_offset: bool,
) -> Option<TilePlan> {
    let source_zoom = target.zoom as i32 + zoom_offset;
    if !(0..=MAX_ZOOM as i32).contains(&source_zoom) {
        return None;
    }
    let source_zoom = source_zoom as u8;

    match direction {
        Direction::GeodeticFromMercator => {
            plan_geodetic_sources(target, source_zoom, national_offset)
        }
        Direction::MercatorFromGeodetic => {
            plan_mercator_sources(target, source_zoom, national_offset)
        }
    }
}

/// Mercator target tile backed by geodetic source tiles.
fn plan_geodetic_sources(
    target: TileCoord,
    source_zoom: u8,
    national_offset: bool,
) -> Option<TilePlan> {
    let tile_bbox = tile_bbox_3857(target.col, target.row, target.zoom);
    let footprint = mercator_bbox_to_geodetic(&tile_bbox);
    let corrected = apply_national_offset(&footprint, Projection::Geodetic, national_offset);
    if corrected.is_degenerate() {
        return None;
    }
    corrected.intersect(&grid_extent(Projection::Geodetic))?;

    let range = geodetic_tile_range(&corrected, source_zoom);
    if range.is_inverted() {
        return None;
    }

    // The geodetic provider convention indexes fetch columns one west of
    // the geometric range; layout and georeference stay unshifted.
    let mut tiles = Vec::with_capacity(range.count());
    for row in range.min_row..=range.max_row {
        for col in range.min_col..=range.max_col {
            tiles.push(TileCoord::new(col - 1, row, source_zoom));
        }
    }

    let sw = tile_bbox_4326(range.min_col, range.min_row, source_zoom);
    let ne = tile_bbox_4326(range.max_col, range.max_row, source_zoom);
    let source_tiles_bbox = BoundingBox::new(sw.min_x, sw.min_y, ne.max_x, ne.max_y);

    Some(TilePlan {
        target,
        tiles,
        source_tiles_bbox,
        target_bbox: corrected,
        reprojected_bbox: roundtrip_mercator(&tile_bbox),
    })
}

/// Geodetic target tile backed by mercator source tiles.
fn plan_mercator_sources(
    target: TileCoord,
    source_zoom: u8,
    national_offset: bool,
) -> Option<TilePlan> {
    let tile_bbox = tile_bbox_4326(target.col, target.row, target.zoom);
    let footprint = geodetic_bbox_to_mercator(&tile_bbox);
    let corrected = apply_national_offset(&footprint, Projection::WebMercator, national_offset);
    if corrected.is_degenerate() {
        return None;
    }
    corrected.intersect(&grid_extent(Projection::WebMercator))?;

    let range = mercator_tile_range(&corrected, source_zoom);
    if range.is_inverted() {
        return None;
    }

    let mut tiles = Vec::with_capacity(range.count());
    for row in range.min_row..=range.max_row {
        for col in range.min_col..=range.max_col {
            tiles.push(TileCoord::new(col, row, source_zoom));
        }
    }

    // Mercator rows grow southward, so min_row holds the northern edge.
    let nw = tile_bbox_3857(range.min_col, range.min_row, source_zoom);
    let se = tile_bbox_3857(range.max_col, range.max_row, source_zoom);
    let source_tiles_bbox = BoundingBox::new(nw.min_x, se.min_y, se.max_x, nw.max_y);

    Some(TilePlan {
        target,
        tiles,
        source_tiles_bbox,
        target_bbox: corrected,
        reprojected_bbox: roundtrip_geodetic(&tile_bbox),
    })
}

/// Round-trips a mercator bbox through geodetic space, normalizing it into
/// the latitude band the projection can represent.
fn roundtrip_mercator(bbox: &BoundingBox) -> BoundingBox {
    let (min_lon, min_lat) = mercator_to_geodetic(bbox.min_x, bbox.min_y);
    let (max_lon, max_lat) = mercator_to_geodetic(bbox.max_x, bbox.max_y);
    BoundingBox::from_corners(
        geodetic_to_mercator(min_lon, min_lat),
        geodetic_to_mercator(max_lon, max_lat),
    )
}

/// Round-trips a geodetic bbox through mercator space; polar latitudes
/// collapse onto the mercator-representable band.
fn roundtrip_geodetic(bbox: &BoundingBox) -> BoundingBox {
    let (min_x, min_y) = geodetic_to_mercator(bbox.min_x, bbox.min_y);
    let (max_x, max_y) = geodetic_to_mercator(bbox.max_x, bbox.max_y);
    BoundingBox::from_corners(
        mercator_to_geodetic(min_x, min_y),
        mercator_to_geodetic(max_x, max_y),
    )
}
