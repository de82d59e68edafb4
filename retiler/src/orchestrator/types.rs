//! Orchestrator request, source, and output types.

use crate::coord::{Projection, TileCoord, TILE_SIZE};
use image::RgbaImage;
use std::time::Duration;
use thiserror::Error;

/// Rejection kinds for a render request.
///
/// These are the only two ways a request fails outright. Per-tile
/// retrieval failures, empty coverage and degenerate geometry all degrade
/// to a blank tile instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request cancelled")]
    Cancelled,
}

/// One tile render request.
///
/// `x`/`y`/`z` address the requested tile in the target grid. Source and
/// target projections must differ; reprojecting a grid onto itself is not
/// a supported operation.
#[derive(Debug, Clone)]
pub struct TileRequest {
    pub x: i64,
    pub y: i64,
    pub z: u8,
    pub source: Projection,
    pub target: Projection,
    /// Added to `z` when picking the source zoom.
    pub zoom_offset: i32,
    /// Apply the national coordinate offset while planning coverage.
    pub national_offset: bool,
    /// Absorbed per-tile failures log at `warn` when set, `debug` otherwise.
    pub log_errors: bool,
    /// Draw mosaic cell outlines and the tile boundary into the output.
    pub debug: bool,
    /// Cancellation group this request's retrievals register under.
    pub task_id: String,
    /// Per-retrieval deadline; an elapsed deadline cancels that retrieval.
    pub timeout: Option<Duration>,
    /// Bypass both cache lookup and cache store for every retrieval.
    pub skip_cache: bool,
    /// Region mask to clip the finished tile against, when one is wired.
    pub mask_id: Option<String>,
}

impl TileRequest {
    pub fn new(x: i64, y: i64, z: u8, source: Projection, target: Projection) -> Self {
        Self {
            x,
            y,
            z,
            source,
            target,
            zoom_offset: 0,
            national_offset: false,
            log_errors: true,
            debug: false,
            task_id: "adhoc".to_string(),
            timeout: None,
            skip_cache: false,
            mask_id: None,
        }
    }

    pub fn with_zoom_offset(mut self, zoom_offset: i32) -> Self {
        self.zoom_offset = zoom_offset;
        self
    }

    pub fn with_national_offset(mut self, enabled: bool) -> Self {
        self.national_offset = enabled;
        self
    }

    pub fn with_log_errors(mut self, enabled: bool) -> Self {
        self.log_errors = enabled;
        self
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }

    pub fn with_mask(mut self, mask_id: impl Into<String>) -> Self {
        self.mask_id = Some(mask_id.into());
        self
    }

    /// The requested tile in target-grid indexing.
    pub fn tile(&self) -> TileCoord {
        TileCoord::new(self.x, self.y, self.z)
    }
}

/// Where and how source tiles are fetched.
#[derive(Debug, Clone)]
pub struct TileSourceConfig {
    /// URL template with `{x}`, `{y}` and `{z}` placeholders.
    pub url_template: String,
    /// Extra request headers sent with every retrieval.
    pub headers: Vec<(String, String)>,
    /// Deepest zoom the source serves; deeper requests are overzoomed.
    pub max_available_zoom: u8,
    /// Edge length of the source's square tiles in pixels.
    pub tile_size: u32,
}

impl TileSourceConfig {
    pub fn new(url_template: impl Into<String>) -> Self {
        Self {
            url_template: url_template.into(),
            headers: Vec::new(),
            max_available_zoom: 18,
            tile_size: TILE_SIZE,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_max_available_zoom(mut self, max_available_zoom: u8) -> Self {
        self.max_available_zoom = max_available_zoom;
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Expands the URL template for one tile.
    pub fn url_for(&self, tile: TileCoord) -> String {
        self.url_template
            .replace("{x}", &tile.col.to_string())
            .replace("{y}", &tile.row.to_string())
            .replace("{z}", &tile.zoom.to_string())
    }

    pub(crate) fn validate(&self) -> Result<(), RenderError> {
        for placeholder in ["{x}", "{y}", "{z}"] {
            if !self.url_template.contains(placeholder) {
                return Err(RenderError::InvalidRequest(format!(
                    "url template {:?} is missing the {placeholder} placeholder",
                    self.url_template
                )));
            }
        }
        if self.tile_size == 0 {
            return Err(RenderError::InvalidRequest(
                "tile size must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Finished render output.
#[derive(Debug, Clone)]
pub struct RenderedTile {
    pub image: RgbaImage,
    /// True when no pixel of the output carries any alpha, which covers
    /// both the explicit blank placeholders and tiles whose every source
    /// failed.
    pub blank: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_template_substitution() {
        let config = TileSourceConfig::new("https://tiles.test/{z}/{x}/{y}.png");
        let url = config.url_for(TileCoord::new(3, 5, 7));
        assert_eq!(url, "https://tiles.test/7/3/5.png");
    }

    #[test]
    fn test_url_template_handles_negative_columns() {
        let config = TileSourceConfig::new("https://tiles.test/{z}/{x}/{y}.png");
        let url = config.url_for(TileCoord::new(-1, 0, 4));
        assert_eq!(url, "https://tiles.test/4/-1/0.png");
    }

    #[test]
    fn test_template_validation_requires_all_placeholders() {
        for template in [
            "https://tiles.test/{x}/{y}.png",
            "https://tiles.test/{z}/{y}.png",
            "https://tiles.test/{z}/{x}.png",
            "https://tiles.test/static.png",
        ] {
            let config = TileSourceConfig::new(template);
            assert!(
                matches!(config.validate(), Err(RenderError::InvalidRequest(_))),
                "template {template} should be rejected"
            );
        }
        let good = TileSourceConfig::new("https://tiles.test/{z}/{x}/{y}.png");
        assert!(good.validate().is_ok());
    }

    #[test]
    fn test_zero_tile_size_is_rejected() {
        let config = TileSourceConfig::new("https://t.test/{z}/{x}/{y}").with_tile_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_builder_defaults() {
        let request = TileRequest::new(1, 2, 3, Projection::WebMercator, Projection::Geodetic);
        assert_eq!(request.zoom_offset, 0);
        assert!(!request.national_offset);
        assert!(request.log_errors);
        assert!(!request.debug);
        assert!(!request.skip_cache);
        assert!(request.timeout.is_none());
        assert!(request.mask_id.is_none());
        assert_eq!(request.tile(), TileCoord::new(1, 2, 3));

        let tuned = request
            .with_zoom_offset(1)
            .with_national_offset(true)
            .with_task_id("scene-7")
            .with_skip_cache(true)
            .with_mask("coastline");
        assert_eq!(tuned.zoom_offset, 1);
        assert!(tuned.national_offset);
        assert_eq!(tuned.task_id, "scene-7");
        assert!(tuned.skip_cache);
        assert_eq!(tuned.mask_id.as_deref(), Some("coastline"));
    }
}
