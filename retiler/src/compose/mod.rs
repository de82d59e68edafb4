//! Mosaic assembly.
//!
//! Lays the fetched source tiles into one contiguous raster covering the
//! planned source range. Tiles that failed to fetch, or fell outside the
//! source grid, stay as fully transparent placeholders; a partial mosaic
//! is always preferred over aborting the request.

use crate::coord::{BoundingBox, Projection, TileCoord};
use crate::planner::TilePlan;
use crate::raster::{self, DEBUG_COLOR};
use image::{imageops, RgbaImage};
use tracing::debug;

/// One assembled source mosaic plus its georeference.
pub struct Mosaic {
    pub image: RgbaImage,
    /// Extent of the mosaic in source-grid units.
    pub bbox: BoundingBox,
}

/// Assembles fetched tiles into a mosaic.
///
/// `fetched` must be parallel to `plan.tiles`; `None` marks a tile that
/// could not be retrieved and keeps its cell transparent. The source grid
/// decides the vertical order: geodetic rows grow northward so the highest
/// row lands at the top of the canvas, mercator rows grow southward so the
/// lowest row does.
///
/// Debug mode outlines each cell and stamps its `col,row/zoom` label;
/// purely diagnostic, never part of normal output.
pub fn layout(
    plan: &TilePlan,
    fetched: &[Option<RgbaImage>],
    grid: Projection,
    tile_size: u32,
    debug: bool,
) -> Mosaic {
    if plan.tiles.is_empty() {
        return Mosaic {
            image: raster::blank_tile(tile_size),
            bbox: plan.source_tiles_bbox,
        };
    }

    let min_col = plan.tiles.iter().map(|t| t.col).min().unwrap_or(0);
    let max_col = plan.tiles.iter().map(|t| t.col).max().unwrap_or(0);
    let min_row = plan.tiles.iter().map(|t| t.row).min().unwrap_or(0);
    let max_row = plan.tiles.iter().map(|t| t.row).max().unwrap_or(0);

    let cols = (max_col - min_col + 1) as u32;
    let rows = (max_row - min_row + 1) as u32;
    let mut canvas = RgbaImage::new(cols * tile_size, rows * tile_size);

    for (tile, image) in plan.tiles.iter().zip(fetched) {
        let ox = (tile.col - min_col) as u32 * tile_size;
        let oy = cell_row_offset(grid, tile, min_row, max_row) * tile_size;

        if let Some(image) = image {
            imageops::replace(&mut canvas, image, ox as i64, oy as i64);
        }
        if debug {
            raster::draw_rect(&mut canvas, ox, oy, tile_size, tile_size, DEBUG_COLOR);
            let label = format!("{},{}/{}", tile.col, tile.row, tile.zoom);
            raster::draw_label(&mut canvas, &label, ox + 4, oy + 4, DEBUG_COLOR);
        }
    }

    debug!(
        cols,
        rows,
        present = fetched.iter().filter(|f| f.is_some()).count(),
        missing = fetched.iter().filter(|f| f.is_none()).count(),
        "mosaic assembled"
    );

    Mosaic {
        image: canvas,
        bbox: plan.source_tiles_bbox,
    }
}

/// Vertical cell index of `tile` inside the mosaic, top-down.
fn cell_row_offset(grid: Projection, tile: &TileCoord, min_row: i64, max_row: i64) -> u32 {
    match grid {
        Projection::Geodetic => (max_row - tile.row) as u32,
        Projection::WebMercator => (tile.row - min_row) as u32,
    }
}
