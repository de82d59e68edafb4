//! RGBA raster helpers shared by the compositor and resampler.
//!
//! Blank detection and the seam-repair scans operate on whole rows and
//! columns; the drawing helpers exist for the debug overlay only and have
//! no effect on normal output.

use image::{Rgba, RgbaImage};

/// Fully transparent pixel, the placeholder for missing data.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Border and label color used by the debug overlay.
pub const DEBUG_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Allocates a fully transparent square tile.
pub fn blank_tile(size: u32) -> RgbaImage {
    // A fresh buffer is zeroed, which is exactly the transparent placeholder.
    RgbaImage::new(size, size)
}

/// Returns `true` when every pixel of the raster is fully transparent.
pub fn is_blank(image: &RgbaImage) -> bool {
    image.pixels().all(|p| p[3] == 0)
}

/// Returns `true` when every pixel of column `x` is fully transparent.
pub fn column_is_blank(image: &RgbaImage, x: u32) -> bool {
    (0..image.height()).all(|y| image.get_pixel(x, y)[3] == 0)
}

/// Returns `true` when every pixel of row `y` is fully transparent.
pub fn row_is_blank(image: &RgbaImage, y: u32) -> bool {
    (0..image.width()).all(|x| image.get_pixel(x, y)[3] == 0)
}

/// Copies column `from` over column `to`.
pub fn copy_column(image: &mut RgbaImage, from: u32, to: u32) {
    for y in 0..image.height() {
        let pixel = *image.get_pixel(from, y);
        image.put_pixel(to, y, pixel);
    }
}

/// Copies row `from` over row `to`.
pub fn copy_row(image: &mut RgbaImage, from: u32, to: u32) {
    for x in 0..image.width() {
        let pixel = *image.get_pixel(x, from);
        image.put_pixel(x, to, pixel);
    }
}

/// Patches the single-pixel gaps the per-column stretch rasterization
/// leaves behind.
///
/// Blank column 0 takes column 1, a blank last row takes the row above it,
/// and each blank interior column takes its right neighbor when that one
/// holds data, otherwise its left.
pub fn repair_seams(image: &mut RgbaImage) {
    let (width, height) = image.dimensions();
    if width < 2 || height < 2 {
        return;
    }

    if column_is_blank(image, 0) {
        copy_column(image, 1, 0);
    }
    if row_is_blank(image, height - 1) {
        copy_row(image, height - 2, height - 1);
    }
    for x in 1..width - 1 {
        if column_is_blank(image, x) {
            if !column_is_blank(image, x + 1) {
                copy_column(image, x + 1, x);
            } else {
                copy_column(image, x - 1, x);
            }
        }
    }
}

/// Draws a one-pixel rectangle outline, clipped at the raster edge.
pub fn draw_rect(image: &mut RgbaImage, x0: u32, y0: u32, rect_w: u32, rect_h: u32, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    if rect_w == 0 || rect_h == 0 || width == 0 || height == 0 {
        return;
    }
    let x1 = x0 + rect_w - 1;
    let y1 = y0 + rect_h - 1;
    for x in x0..=x1.min(width.saturating_sub(1)) {
        if y0 < height {
            image.put_pixel(x, y0, color);
        }
        if y1 < height {
            image.put_pixel(x, y1, color);
        }
    }
    for y in y0..=y1.min(height.saturating_sub(1)) {
        if x0 < width {
            image.put_pixel(x0, y, color);
        }
        if x1 < width {
            image.put_pixel(x1, y, color);
        }
    }
}

/// Draws a one-pixel rectangle along the raster's outer edge.
pub fn draw_border(image: &mut RgbaImage, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    draw_rect(image, 0, 0, width, height, color);
}

// ============================================================================
// Debug label stamping
// ============================================================================

/// 3×5 bitmap glyphs for the characters the debug label needs. Each row is
/// a 3-bit mask with bit 2 as the leftmost pixel.
fn glyph(ch: char) -> Option<[u8; 5]> {
    let rows = match ch {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        _ => return None,
    };
    Some(rows)
}

/// Stamps `text` at `(origin_x, origin_y)`, clipping at the raster edge.
/// Characters without a glyph advance the cursor without drawing.
pub fn draw_label(image: &mut RgbaImage, text: &str, origin_x: u32, origin_y: u32, color: Rgba<u8>) {
    let (width, height) = image.dimensions();
    let mut cursor = origin_x;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (dy, row) in rows.iter().enumerate() {
                for dx in 0..3u32 {
                    if row & (0b100 >> dx) != 0 {
                        let px = cursor + dx;
                        let py = origin_y + dy as u32;
                        if px < width && py < height {
                            image.put_pixel(px, py, color);
                        }
                    }
                }
            }
        }
        cursor += 4;
    }
}
