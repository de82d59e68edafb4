//! Two-pass pixel resampler.
//!
//! Pass 1 walks the mosaic crop covering the target footprint and projects
//! every source pixel's top edge and bottom edge into the target grid's
//! coordinate space, accumulating the running extent of all projected
//! points. Pass 2 rasterizes those samples into the target frame: each
//! sample paints one target column over the row span between its projected
//! top and bottom. This per-column stretch is deliberately approximate, a
//! fast substitute for true 2-D resampling; the sub-pixel gaps it leaves
//! are closed afterwards by [`crate::raster::repair_seams`].
//!
//! A degenerate geometry result (empty sample set, non-finite or collapsed
//! extent) is reported as `None`; callers render a blank tile for it.

use crate::compose::Mosaic;
use crate::coord::{geodetic_to_mercator, mercator_to_geodetic, BoundingBox, Projection};
use image::{Rgba, RgbaImage};
use tracing::{debug, trace};

/// One source pixel projected into target space.
///
/// `top` and `bottom` are the projections of the pixel's top-left corner
/// and of the point one source pixel below it. Ephemeral; produced by
/// pass 1 and consumed by pass 2 within the same request.
#[derive(Debug, Clone, Copy)]
pub struct PixelSample {
    pub top: (f64, f64),
    pub bottom: (f64, f64),
    pub rgba: Rgba<u8>,
}

/// Running min/max of every projected sample coordinate.
#[derive(Debug, Clone, Copy)]
pub struct ProjectedExtent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl ProjectedExtent {
    /// An extent no point has been folded into yet. Its width and height
    /// are negative infinity, which the pass-2 degenerate guard rejects.
    pub fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Pass 1: projects the mosaic pixels covering `footprint` into the
/// opposite grid's space.
///
/// The crop is widened by one source pixel on every side before
/// intersecting with the mosaic; this guard border is what keeps the
/// warped tile from opening gaps at its edges. `footprint` must be
/// expressed in the mosaic's own (source-grid) units.
pub fn project_samples(
    mosaic: &Mosaic,
    footprint: &BoundingBox,
    source_grid: Projection,
) -> (Vec<PixelSample>, ProjectedExtent) {
    let (width, height) = mosaic.image.dimensions();
    if width == 0 || height == 0 {
        return (Vec::new(), ProjectedExtent::empty());
    }
    let src_res = mosaic.bbox.width() / width as f64;

    let crop = match footprint.expanded(src_res).intersect(&mosaic.bbox) {
        Some(crop) => crop,
        None => return (Vec::new(), ProjectedExtent::empty()),
    };

    // Pixel window of the crop; the mosaic's first row sits at bbox.max_y.
    let px0 = (((crop.min_x - mosaic.bbox.min_x) / src_res).floor().max(0.0)) as u32;
    let px1 = ((((crop.max_x - mosaic.bbox.min_x) / src_res).ceil()) as u32).min(width);
    let py0 = (((mosaic.bbox.max_y - crop.max_y) / src_res).floor().max(0.0)) as u32;
    let py1 = ((((mosaic.bbox.max_y - crop.min_y) / src_res).ceil()) as u32).min(height);

    let project: fn(f64, f64) -> (f64, f64) = match source_grid {
        Projection::Geodetic => geodetic_to_mercator,
        Projection::WebMercator => mercator_to_geodetic,
    };

    let capacity = (px1.saturating_sub(px0) as usize) * (py1.saturating_sub(py0) as usize);
    let mut samples = Vec::with_capacity(capacity);
    let mut extent = ProjectedExtent::empty();

    for py in py0..py1 {
        let y_top = mosaic.bbox.max_y - py as f64 * src_res;
        let y_bottom = y_top - src_res;
        for px in px0..px1 {
            let x = mosaic.bbox.min_x + px as f64 * src_res;
            let top = project(x, y_top);
            let bottom = project(x, y_bottom);
            extent.include(top.0, top.1);
            extent.include(bottom.0, bottom.1);
            samples.push(PixelSample {
                top,
                bottom,
                rgba: *mosaic.image.get_pixel(px, py),
            });
        }
    }

    trace!(samples = samples.len(), "source pixels projected");
    (samples, extent)
}

/// Pass 2: rasterizes projected samples into the tile frame.
///
/// `frame` is the target tile's reprojected reference frame; its width and
/// height over `tile_size` give the column and row scale. The two scales
/// coincide except where the mercator latitude clamp shortened the frame,
/// in which case the shortened axis is stretched over the full tile.
///
/// Each sample paints its RGBA down one column from its top row to its
/// bottom row, exclusive. The `tile_size` square window positioned by the
/// frame's offset inside the extent becomes the final tile; window pixels
/// outside the intermediate raster stay transparent.
///
/// # Returns
///
/// `None` when the intermediate raster would be degenerate: non-finite,
/// zero, or negative in either dimension. Empty sample sets land here via
/// the infinite empty extent.
pub fn rasterize_samples(
    samples: &[PixelSample],
    extent: &ProjectedExtent,
    frame: &BoundingBox,
    tile_size: u32,
) -> Option<RgbaImage> {
    let res_x = frame.width() / tile_size as f64;
    let res_y = frame.height() / tile_size as f64;

    let w = (extent.width() / res_x).round();
    let h = (extent.height() / res_y).round();
    if !w.is_finite() || !h.is_finite() || w <= 0.0 || h <= 0.0 {
        debug!(w, h, "degenerate resample geometry");
        return None;
    }
    let w = w as u32;
    let h = h as u32;

    let mut intermediate = RgbaImage::new(w, h);
    for sample in samples {
        let col = ((sample.top.0 - extent.min_x) / res_x).round() as i64;
        if col < 0 || col >= w as i64 {
            continue;
        }
        let row_top = ((extent.max_y - sample.top.1) / res_y).round() as i64;
        let row_bottom = ((extent.max_y - sample.bottom.1) / res_y).round() as i64;
        for row in row_top.max(0)..row_bottom.min(h as i64) {
            intermediate.put_pixel(col as u32, row as u32, sample.rgba);
        }
    }

    let offset_x = ((frame.min_x - extent.min_x) / res_x).round() as i64;
    let offset_y = ((extent.max_y - frame.max_y) / res_y).round() as i64;

    let mut tile = RgbaImage::new(tile_size, tile_size);
    for py in 0..tile_size {
        let sy = offset_y + py as i64;
        if sy < 0 || sy >= h as i64 {
            continue;
        }
        for px in 0..tile_size {
            let sx = offset_x + px as i64;
            if sx < 0 || sx >= w as i64 {
                continue;
            }
            tile.put_pixel(px, py, *intermediate.get_pixel(sx as u32, sy as u32));
        }
    }
    Some(tile)
}
