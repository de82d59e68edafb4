//! Polygon mask collaborator seam.
//!
//! Clipping a rendered tile against region geometry is injected state; the
//! crate defines the trait and hands finished rasters through it when a
//! request names a mask. No polygon math lives here.

use crate::coord::{BoundingBox, Projection};
use image::RgbaImage;

/// Clips a rendered tile against the region identified by `mask_id`.
///
/// `tile_bbox` is the tile's extent in `grid` units so implementations can
/// georeference the raster. Implementations return the clipped raster,
/// which may be the input unchanged when the mask does not intersect it.
pub trait MaskClip {
    fn apply(
        &self,
        raster: RgbaImage,
        tile_bbox: &BoundingBox,
        grid: Projection,
        tile_size: u32,
        mask_id: &str,
    ) -> RgbaImage;
}
