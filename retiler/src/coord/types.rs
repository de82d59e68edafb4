//! Core geometry types shared across the pipeline.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Edge length of a square tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Highest zoom level accepted anywhere in the pipeline.
///
/// Bounds the bit-shift arithmetic used for grid extents and overzoom
/// ancestor lookup; real sources top out far below this.
pub const MAX_ZOOM: u8 = 30;

/// Latitude bound of the spherical web-mercator projection in degrees.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Errors from coordinate parsing and validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Zoom level exceeds [`MAX_ZOOM`].
    #[error("zoom level {0} exceeds maximum of {max}", max = MAX_ZOOM)]
    InvalidZoom(u8),

    /// Projection identifier is not one of the two supported grids.
    #[error("unknown projection identifier: {0}")]
    UnknownProjection(String),
}

/// One of the two tiling grids the pipeline converts between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Projection {
    /// Geodetic grid ("EPSG:4326"): degrees, rows grow northward.
    Geodetic,
    /// Spherical web-mercator grid ("EPSG:3857"): meters, rows grow southward.
    WebMercator,
}

impl Projection {
    /// Parses an EPSG-style identifier (`"EPSG:4326"`, `"4326"`, etc.).
    pub fn from_epsg(code: &str) -> Result<Self, CoordError> {
        match code.trim().to_ascii_uppercase().as_str() {
            "EPSG:4326" | "4326" => Ok(Projection::Geodetic),
            "EPSG:3857" | "3857" | "EPSG:900913" | "900913" => Ok(Projection::WebMercator),
            other => Err(CoordError::UnknownProjection(other.to_string())),
        }
    }

    /// Canonical EPSG identifier for this grid.
    pub fn epsg_code(&self) -> &'static str {
        match self {
            Projection::Geodetic => "EPSG:4326",
            Projection::WebMercator => "EPSG:3857",
        }
    }
}

impl FromStr for Projection {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Projection::from_epsg(s)
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.epsg_code())
    }
}

/// Integer tile address `(col, row, zoom)`.
///
/// Col and row are signed: offset correction and the geodetic boundary
/// convention can push enumerated source tiles outside the grid, and those
/// must survive until validation rather than wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub col: i64,
    pub row: i64,
    pub zoom: u8,
}

impl TileCoord {
    pub fn new(col: i64, row: i64, zoom: u8) -> Self {
        Self { col, row, zoom }
    }

    /// Whether this tile lies inside the addressable extent of `grid`.
    ///
    /// Out-of-grid source tiles are skipped before any network use and
    /// composited as transparent placeholders.
    pub fn in_grid(&self, grid: Projection) -> bool {
        self.col >= 0
            && self.row >= 0
            && self.col < super::grid_cols(grid, self.zoom)
            && self.row < super::grid_rows(grid, self.zoom)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.col, self.row)
    }
}

/// Axis-aligned box `[min_x, min_y, max_x, max_y]` in an implied unit.
///
/// Callers enforce `min <= max`; an inverted or non-finite box signals
/// "no coverage" rather than an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest box containing both corner points in any order.
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            min_x: a.0.min(b.0),
            min_y: a.1.min(b.1),
            max_x: a.0.max(b.0),
            max_y: a.1.max(b.1),
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True when inverted, collapsed, or containing non-finite values.
    pub fn is_degenerate(&self) -> bool {
        !(self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite())
            || self.min_x >= self.max_x
            || self.min_y >= self.max_y
    }

    /// Grows the box by `margin` on every side.
    pub fn expanded(&self, margin: f64) -> Self {
        Self {
            min_x: self.min_x - margin,
            min_y: self.min_y - margin,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    /// Intersection with `other`, or `None` when the boxes are disjoint.
    pub fn intersect(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let candidate = BoundingBox {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        if candidate.is_degenerate() {
            None
        } else {
            Some(candidate)
        }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn contains_bbox(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.min_y >= self.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }
}

/// Inclusive tile index range produced by the inverse tile-bbox math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub min_col: i64,
    pub min_row: i64,
    pub max_col: i64,
    pub max_row: i64,
}

impl TileRange {
    /// An inverted range means the footprint covers no tiles.
    pub fn is_inverted(&self) -> bool {
        self.max_col < self.min_col || self.max_row < self.min_row
    }

    /// Number of tiles in the range; zero when inverted.
    pub fn count(&self) -> usize {
        if self.is_inverted() {
            return 0;
        }
        ((self.max_col - self.min_col + 1) * (self.max_row - self.min_row + 1)) as usize
    }
}
