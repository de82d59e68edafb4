//! Overzoom slicing.
//!
//! Requests deeper than a source's maximum zoom are served by rendering
//! the ancestor tile at the maximum zoom, cropping the fraction of it the
//! requested tile occupies, and upscaling that window back to full tile
//! size with bilinear filtering.

use crate::coord::{Projection, TileCoord};
use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Which ancestor to render and which fractional window of it to cut.
///
/// `fx` and `fy` are the window's top-left corner as fractions of the
/// ancestor raster, `frac` its side length. `fy` is already expressed in
/// raster orientation, so the geodetic grid's northward row axis has been
/// flipped by the time a slice is produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverzoomSlice {
    pub ancestor: TileCoord,
    pub fx: f64,
    pub fy: f64,
    pub frac: f64,
}

/// Maps a tile beyond `max_zoom` onto the ancestor window covering it.
///
/// Returns `None` when the tile is at or below `max_zoom` and needs no
/// slicing.
pub fn slice(tile: TileCoord, max_zoom: u8, grid: Projection) -> Option<OverzoomSlice> {
    if tile.zoom <= max_zoom {
        return None;
    }
    let k = (tile.zoom - max_zoom) as u32;
    let ancestor_col = tile.col >> k;
    let ancestor_row = tile.row >> k;
    let dx = tile.col - (ancestor_col << k);
    let dy = tile.row - (ancestor_row << k);

    let frac = 1.0 / (1u64 << k) as f64;
    let fx = dx as f64 * frac;
    let fy = match grid {
        // Mercator rows already run north to south like raster rows.
        Projection::WebMercator => dy as f64 * frac,
        // Geodetic rows run south to north; flip within the ancestor.
        Projection::Geodetic => ((1i64 << k) - 1 - dy) as f64 * frac,
    };

    Some(OverzoomSlice {
        ancestor: TileCoord::new(ancestor_col, ancestor_row, max_zoom),
        fx,
        fy,
        frac,
    })
}

/// Cuts the slice window out of a rendered ancestor and upscales it to
/// `tile_size`. The window is clamped to the raster and never collapses
/// below one pixel, so deep overzoom levels stay well defined.
pub fn crop_upscale(image: &RgbaImage, slice: &OverzoomSlice, tile_size: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    let size_x = (((width as f64 * slice.frac).round() as u32).max(1)).min(width);
    let size_y = (((height as f64 * slice.frac).round() as u32).max(1)).min(height);
    let x0 = ((width as f64 * slice.fx).round() as u32).min(width - size_x);
    let y0 = ((height as f64 * slice.fy).round() as u32).min(height - size_y);

    let window = imageops::crop_imm(image, x0, y0, size_x, size_y).to_image();
    imageops::resize(&window, tile_size, tile_size, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const NW: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const NE: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const SW: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const SE: Rgba<u8> = Rgba([255, 255, 0, 255]);

    /// 256x256 ancestor with a distinct solid color per quadrant.
    fn quadrant_image() -> RgbaImage {
        RgbaImage::from_fn(256, 256, |x, y| match (x < 128, y < 128) {
            (true, true) => NW,
            (false, true) => NE,
            (true, false) => SW,
            (false, false) => SE,
        })
    }

    #[test]
    fn test_at_or_below_max_zoom_needs_no_slice() {
        assert!(slice(TileCoord::new(3, 2, 4), 4, Projection::WebMercator).is_none());
        assert!(slice(TileCoord::new(3, 2, 4), 7, Projection::WebMercator).is_none());
    }

    #[test]
    fn test_mercator_slice_one_level_deep() {
        let s = slice(TileCoord::new(5, 6, 4), 3, Projection::WebMercator).expect("overzoomed");
        assert_eq!(s.ancestor, TileCoord::new(2, 3, 3));
        assert_eq!(s.frac, 0.5);
        assert_eq!(s.fx, 0.5);
        assert_eq!(s.fy, 0.0);
    }

    #[test]
    fn test_geodetic_slice_flips_the_row_axis() {
        // Geodetic child row 0 is the southern strip of its ancestor, which
        // sits at the bottom of the raster.
        let s = slice(TileCoord::new(0, 0, 4), 3, Projection::Geodetic).expect("overzoomed");
        assert_eq!(s.ancestor, TileCoord::new(0, 0, 3));
        assert_eq!(s.fx, 0.0);
        assert_eq!(s.fy, 0.5);

        let merc = slice(TileCoord::new(0, 0, 4), 3, Projection::WebMercator).expect("overzoomed");
        assert_eq!(merc.fy, 0.0);
    }

    #[test]
    fn test_two_levels_deep_addresses_a_sixteenth() {
        let tile = TileCoord::new((7 << 2) + 3, (2 << 2) + 1, 9);
        let s = slice(tile, 7, Projection::WebMercator).expect("overzoomed");
        assert_eq!(s.ancestor, TileCoord::new(7, 2, 7));
        assert_eq!(s.frac, 0.25);
        assert_eq!(s.fx, 0.75);
        assert_eq!(s.fy, 0.25);
    }

    #[test]
    fn test_crop_upscale_selects_the_right_quadrant() {
        let ancestor = quadrant_image();
        let s = slice(TileCoord::new(5, 6, 4), 3, Projection::WebMercator).expect("overzoomed");
        let tile = crop_upscale(&ancestor, &s, 256);

        assert_eq!(tile.dimensions(), (256, 256));
        assert_eq!(*tile.get_pixel(10, 10), NE);
        assert_eq!(*tile.get_pixel(128, 128), NE);
        assert_eq!(*tile.get_pixel(250, 250), NE);
    }

    #[test]
    fn test_deep_overzoom_window_never_collapses() {
        let ancestor = RgbaImage::from_pixel(256, 256, SE);
        // Ten levels past max zoom: the exact window would be under a pixel.
        let tile = TileCoord::new(1023, 1023, 13);
        let s = slice(tile, 3, Projection::WebMercator).expect("overzoomed");
        let out = crop_upscale(&ancestor, &s, 256);

        assert_eq!(out.dimensions(), (256, 256));
        assert_eq!(*out.get_pixel(128, 128), SE);
    }
}
