//! Elevation collaborator surface and color-ramp compilation.
//!
//! Terrain payload decoding is injected: the crate defines the decode seam
//! and the elevation raster it produces, and owns the compiled color-ramp
//! cache used to colorize decoded grids. A ramp compiles once per distinct
//! definition and the compiled form stays cached for the life of the
//! process.

use bytes::Bytes;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TerrainError {
    #[error("malformed terrain payload: {0}")]
    Malformed(String),
    #[error("invalid color ramp: {0}")]
    InvalidRamp(String),
}

// ============================================================================
// Decode seam
// ============================================================================

/// Wire encodings an elevation payload may arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElevationEncoding {
    /// Mapbox terrain-rgb: `e = -10000 + (r*65536 + g*256 + b) * 0.1`.
    MapboxRgb,
    /// Terrarium: `e = (r*256 + g + b/256) - 32768`.
    Terrarium,
}

/// Decodes a raw payload into an elevation grid.
///
/// The crate never parses terrain formats itself; embedders supply an
/// implementation and feed it payloads retrieved through the buffer cache.
pub trait TerrainDecoder {
    fn decode(
        &self,
        payload: &Bytes,
        encoding: ElevationEncoding,
    ) -> Result<ElevationGrid, TerrainError>;
}

/// Row-major grid of elevation samples in meters.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationGrid {
    width: u32,
    height: u32,
    samples: Vec<f32>,
}

impl ElevationGrid {
    pub fn new(width: u32, height: u32, samples: Vec<f32>) -> Result<Self, TerrainError> {
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(TerrainError::Malformed(format!(
                "expected {expected} samples for {width}x{height}, got {}",
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn sample(&self, x: u32, y: u32) -> f32 {
        self.samples[y as usize * self.width as usize + x as usize]
    }
}

// ============================================================================
// Color ramps
// ============================================================================

/// One elevation-to-color anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampStop {
    pub elevation: f64,
    pub color: [u8; 4],
}

/// User-supplied ramp definition. Stop order does not matter; compilation
/// sorts by elevation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRamp {
    pub stops: Vec<RampStop>,
}

/// A validated ramp with stops sorted ascending by elevation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRamp {
    stops: Vec<RampStop>,
}

impl CompiledRamp {
    fn compile(ramp: &ColorRamp) -> Result<Self, TerrainError> {
        if ramp.stops.is_empty() {
            return Err(TerrainError::InvalidRamp("ramp has no stops".into()));
        }
        if ramp.stops.iter().any(|s| !s.elevation.is_finite()) {
            return Err(TerrainError::InvalidRamp(
                "ramp stop elevation is not finite".into(),
            ));
        }
        let mut stops = ramp.stops.clone();
        stops.sort_by(|a, b| a.elevation.total_cmp(&b.elevation));
        Ok(Self { stops })
    }

    /// Interpolated color for an elevation. Values beyond the outermost
    /// stops clamp to the first or last stop's color.
    pub fn color_at(&self, elevation: f64) -> Rgba<u8> {
        let stops = &self.stops;
        if elevation <= stops[0].elevation {
            return Rgba(stops[0].color);
        }
        let last = &stops[stops.len() - 1];
        if elevation >= last.elevation {
            return Rgba(last.color);
        }

        let idx = stops.partition_point(|s| s.elevation <= elevation);
        let lo = &stops[idx - 1];
        let hi = &stops[idx];
        let span = hi.elevation - lo.elevation;
        let t = if span > 0.0 {
            (elevation - lo.elevation) / span
        } else {
            0.0
        };

        let mut channels = [0u8; 4];
        for (i, channel) in channels.iter_mut().enumerate() {
            let a = lo.color[i] as f64;
            let b = hi.color[i] as f64;
            *channel = (a + (b - a) * t).round() as u8;
        }
        Rgba(channels)
    }
}

/// Process-lifetime cache of compiled ramps, keyed by the serialized ramp
/// definition. Entries are never invalidated; the cache is plain owned
/// state so tests and embedders instantiate their own.
#[derive(Default)]
pub struct RampCache {
    compiled: Mutex<HashMap<String, Arc<CompiledRamp>>>,
}

impl RampCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the compiled form of `ramp`, compiling it on first sight.
    pub fn compiled(&self, ramp: &ColorRamp) -> Result<Arc<CompiledRamp>, TerrainError> {
        let key = serde_json::to_string(ramp)
            .map_err(|err| TerrainError::InvalidRamp(err.to_string()))?;
        if let Some(hit) = self.compiled.lock().get(&key) {
            return Ok(Arc::clone(hit));
        }

        let built = Arc::new(CompiledRamp::compile(ramp)?);
        debug!(stops = built.stops.len(), "compiled color ramp");
        // A racing compile of the same key is harmless; last insert wins.
        self.compiled.lock().insert(key, Arc::clone(&built));
        Ok(built)
    }

    pub fn len(&self) -> usize {
        self.compiled.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Colorizes an elevation grid through a compiled ramp.
pub fn colorize(grid: &ElevationGrid, ramp: &CompiledRamp) -> RgbaImage {
    RgbaImage::from_fn(grid.width(), grid.height(), |x, y| {
        ramp.color_at(grid.sample(x, y) as f64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [u8; 4] = [0, 0, 0, 255];
    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn gray_ramp() -> ColorRamp {
        ColorRamp {
            stops: vec![
                RampStop {
                    elevation: 0.0,
                    color: BLACK,
                },
                RampStop {
                    elevation: 100.0,
                    color: WHITE,
                },
            ],
        }
    }

    /// Test decoder treating each payload byte as one elevation sample.
    struct ByteDecoder;

    impl TerrainDecoder for ByteDecoder {
        fn decode(
            &self,
            payload: &Bytes,
            _encoding: ElevationEncoding,
        ) -> Result<ElevationGrid, TerrainError> {
            let side = (payload.len() as f64).sqrt() as u32;
            let samples = payload.iter().map(|&b| b as f32).collect();
            ElevationGrid::new(side, side, samples)
        }
    }

    #[test]
    fn test_grid_rejects_sample_count_mismatch() {
        let result = ElevationGrid::new(2, 2, vec![1.0, 2.0, 3.0]);
        assert!(matches!(result, Err(TerrainError::Malformed(_))));
    }

    #[test]
    fn test_ramp_interpolates_between_stops() {
        let ramp = CompiledRamp::compile(&gray_ramp()).expect("valid ramp");
        assert_eq!(ramp.color_at(25.0), Rgba([64, 64, 64, 255]));
        assert_eq!(ramp.color_at(100.0), Rgba(WHITE));
    }

    #[test]
    fn test_ramp_clamps_beyond_outermost_stops() {
        let ramp = CompiledRamp::compile(&gray_ramp()).expect("valid ramp");
        assert_eq!(ramp.color_at(-500.0), Rgba(BLACK));
        assert_eq!(ramp.color_at(9000.0), Rgba(WHITE));
    }

    #[test]
    fn test_unsorted_stops_are_sorted_at_compile() {
        let ramp = ColorRamp {
            stops: vec![
                RampStop {
                    elevation: 100.0,
                    color: WHITE,
                },
                RampStop {
                    elevation: 0.0,
                    color: BLACK,
                },
            ],
        };
        let compiled = CompiledRamp::compile(&ramp).expect("valid ramp");
        assert_eq!(compiled.color_at(0.0), Rgba(BLACK));
        assert_eq!(compiled.color_at(25.0), Rgba([64, 64, 64, 255]));
    }

    #[test]
    fn test_empty_and_non_finite_ramps_are_rejected() {
        let empty = ColorRamp { stops: vec![] };
        assert!(matches!(
            CompiledRamp::compile(&empty),
            Err(TerrainError::InvalidRamp(_))
        ));

        let nan = ColorRamp {
            stops: vec![RampStop {
                elevation: f64::NAN,
                color: BLACK,
            }],
        };
        assert!(matches!(
            CompiledRamp::compile(&nan),
            Err(TerrainError::InvalidRamp(_))
        ));
    }

    #[test]
    fn test_cache_compiles_each_definition_once() {
        let cache = RampCache::new();
        let first = cache.compiled(&gray_ramp()).expect("valid ramp");
        let second = cache.compiled(&gray_ramp()).expect("valid ramp");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let mut other = gray_ramp();
        other.stops[1].elevation = 200.0;
        cache.compiled(&other).expect("valid ramp");
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_decode_then_colorize() {
        let cache = RampCache::new();
        let ramp = cache.compiled(&gray_ramp()).expect("valid ramp");
        let payload = Bytes::from_static(&[0, 100, 100, 0]);
        let grid = ByteDecoder
            .decode(&payload, ElevationEncoding::MapboxRgb)
            .expect("decodes");

        let image = colorize(&grid, &ramp);
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(*image.get_pixel(0, 0), Rgba(BLACK));
        assert_eq!(*image.get_pixel(1, 0), Rgba(WHITE));
        assert_eq!(*image.get_pixel(0, 1), Rgba(WHITE));
        assert_eq!(*image.get_pixel(1, 1), Rgba(BLACK));
    }
}
