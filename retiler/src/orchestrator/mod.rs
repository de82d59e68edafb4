//! Tile render orchestration.
//!
//! Drives one request through the fixed pipeline: validate, redirect
//! overzoom, plan coverage, fetch sources sequentially, composite,
//! resample, repair seams, mask, output. Per-tile retrieval failures
//! become transparent placeholders in the mosaic; only invalid parameters
//! and cancellation reject a request, everything else degrades to a blank
//! tile.

mod types;

pub use types::{RenderError, RenderedTile, TileRequest, TileSourceConfig};

use crate::compose;
use crate::coord::{self, TileCoord};
use crate::fetch::{FetchCache, FetchError, RetrieveOptions, TileFetcher};
use crate::mask::MaskClip;
use crate::overzoom;
use crate::planner::{plan_coverage, Direction, TilePlan};
use crate::raster;
use crate::resample;
use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, warn};

/// Renders reprojected tiles out of one configured source.
///
/// All shared state lives behind `&self`, so one orchestrator serves any
/// number of concurrent requests.
pub struct TileOrchestrator<C> {
    cache: FetchCache<C>,
    source: TileSourceConfig,
    mask: Option<Arc<dyn MaskClip + Send + Sync>>,
}

impl<C: TileFetcher> TileOrchestrator<C> {
    pub fn new(client: C, source: TileSourceConfig) -> Self {
        Self {
            cache: FetchCache::new(client),
            source,
            mask: None,
        }
    }

    /// Wires a mask collaborator. Requests naming a `mask_id` are clipped
    /// through it after resampling.
    pub fn with_mask(mut self, mask: Arc<dyn MaskClip + Send + Sync>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// The retrieval cache backing this orchestrator.
    pub fn cache(&self) -> &FetchCache<C> {
        &self.cache
    }

    /// Cancels every in-flight retrieval registered under `task_id`.
    pub fn cancel_task(&self, task_id: &str) -> usize {
        self.cache.cancel_task(task_id)
    }

    /// Renders one tile.
    ///
    /// Requests deeper than the source's maximum zoom render the covering
    /// ancestor once and serve an upscaled window of it.
    ///
    /// # Errors
    ///
    /// [`RenderError::InvalidRequest`] for parameter problems and
    /// [`RenderError::Cancelled`] when the request's task group was
    /// cancelled mid-flight. Retrieval failures, empty coverage and
    /// degenerate geometry all produce `Ok` blank or partial tiles.
    pub async fn render(&self, request: &TileRequest) -> Result<RenderedTile, RenderError> {
        let direction = self.validate(request)?;
        let target = request.tile();
        debug!(%target, source = %request.source, target_grid = %request.target, "rendering tile");

        if let Some(slice) =
            overzoom::slice(target, self.source.max_available_zoom, request.target)
        {
            debug!(%target, ancestor = %slice.ancestor, "overzoom redirect");
            let ancestor = self.render_tile(request, direction, slice.ancestor).await?;
            let image = overzoom::crop_upscale(&ancestor.image, &slice, self.source.tile_size);
            let blank = raster::is_blank(&image);
            return Ok(RenderedTile { image, blank });
        }

        self.render_tile(request, direction, target).await
    }

    fn validate(&self, request: &TileRequest) -> Result<Direction, RenderError> {
        self.source.validate()?;
        let direction = Direction::from_grids(request.source, request.target).ok_or_else(|| {
            RenderError::InvalidRequest("source and target projections must differ".to_string())
        })?;
        coord::validate_zoom(request.z)
            .map_err(|err| RenderError::InvalidRequest(err.to_string()))?;
        if !request.tile().in_grid(request.target) {
            return Err(RenderError::InvalidRequest(format!(
                "tile {} lies outside the {} grid",
                request.tile(),
                request.target
            )));
        }
        Ok(direction)
    }

    /// Runs the pipeline for one concrete target tile, either the
    /// requested tile or its overzoom ancestor.
    async fn render_tile(
        &self,
        request: &TileRequest,
        direction: Direction,
        target: TileCoord,
    ) -> Result<RenderedTile, RenderError> {
        let plan = match plan_coverage(
            direction,
            target,
            request.zoom_offset,
            request.national_offset,
        ) {
            Some(plan) => plan,
            None => {
                debug!(%target, "no source coverage, serving blank tile");
                return Ok(self.blank_tile());
            }
        };

        let fetched = self.fetch_sources(request, &plan).await?;
        let mosaic = compose::layout(
            &plan,
            &fetched,
            request.source,
            self.source.tile_size,
            request.debug,
        );
        let (samples, extent) =
            resample::project_samples(&mosaic, &plan.target_bbox, request.source);
        let mut image = match resample::rasterize_samples(
            &samples,
            &extent,
            &plan.reprojected_bbox,
            self.source.tile_size,
        ) {
            Some(image) => image,
            None => {
                debug!(%target, "degenerate resample geometry, serving blank tile");
                return Ok(self.blank_tile());
            }
        };

        raster::repair_seams(&mut image);
        if request.debug {
            raster::draw_border(&mut image, raster::DEBUG_COLOR);
        }

        let image = match (self.mask.as_deref(), request.mask_id.as_deref()) {
            (Some(mask), Some(mask_id)) => {
                let tile_bbox =
                    coord::tile_bbox(request.target, target.col, target.row, target.zoom);
                mask.apply(
                    image,
                    &tile_bbox,
                    request.target,
                    self.source.tile_size,
                    mask_id,
                )
            }
            _ => image,
        };

        let blank = raster::is_blank(&image);
        Ok(RenderedTile { image, blank })
    }

    /// Sequential index-driven fetch pass over the plan.
    ///
    /// Tiles outside the source grid never reach the network and keep
    /// their mosaic cell as a transparent placeholder. Failed retrievals
    /// are absorbed the same way; cancellation aborts the whole request.
    async fn fetch_sources(
        &self,
        request: &TileRequest,
        plan: &TilePlan,
    ) -> Result<Vec<Option<RgbaImage>>, RenderError> {
        let mut options = RetrieveOptions::new(request.task_id.as_str())
            .with_headers(self.source.headers.clone())
            .with_skip_cache(request.skip_cache);
        if let Some(timeout) = request.timeout {
            options = options.with_timeout(timeout);
        }

        let mut fetched = Vec::with_capacity(plan.tiles.len());
        for tile in &plan.tiles {
            if !tile.in_grid(request.source) {
                fetched.push(None);
                continue;
            }
            let url = self.source.url_for(*tile);
            match self.cache.retrieve_raster(&url, &options).await {
                Ok(image) => fetched.push(Some(image)),
                Err(FetchError::Cancelled) => {
                    debug!(task_id = %request.task_id, %tile, "retrieval cancelled, aborting request");
                    return Err(RenderError::Cancelled);
                }
                Err(err) => {
                    if request.log_errors {
                        warn!(%tile, %url, error = %err, "source tile failed, using placeholder");
                    } else {
                        debug!(%tile, %url, error = %err, "source tile failed, using placeholder");
                    }
                    fetched.push(None);
                }
            }
        }
        Ok(fetched)
    }

    fn blank_tile(&self) -> RenderedTile {
        RenderedTile {
            image: raster::blank_tile(self.source.tile_size),
            blank: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{BoundingBox, Projection};
    use bytes::Bytes;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn png_bytes(color: Rgba<u8>) -> Bytes {
        let image = RgbaImage::from_pixel(256, 256, color);
        let mut cursor = Cursor::new(Vec::new());
        image
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("png encode");
        Bytes::from(cursor.into_inner())
    }

    /// Stub fetcher with an externally readable call counter, wired the
    /// way an embedder would stub the network seam.
    struct CountingFetcher {
        response: Result<Bytes, FetchError>,
        delay: Option<Duration>,
        calls: Arc<AtomicUsize>,
    }

    impl CountingFetcher {
        fn serving(color: Rgba<u8>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let fetcher = Self {
                response: Ok(png_bytes(color)),
                delay: None,
                calls: Arc::clone(&calls),
            };
            (fetcher, calls)
        }

        fn failing() -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let fetcher = Self {
                response: Err(FetchError::Network("connection refused".to_string())),
                delay: None,
                calls: Arc::clone(&calls),
            };
            (fetcher, calls)
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    impl TileFetcher for CountingFetcher {
        async fn fetch(
            &self,
            _url: &str,
            _headers: &[(String, String)],
        ) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.clone()
        }
    }

    fn test_source() -> TileSourceConfig {
        TileSourceConfig::new("https://tiles.test/{z}/{x}/{y}.png")
    }

    /// Request a geodetic tile backed by a mercator source.
    fn geodetic_request(x: i64, y: i64, z: u8) -> TileRequest {
        TileRequest::new(x, y, z, Projection::WebMercator, Projection::Geodetic)
    }

    #[tokio::test]
    async fn test_rejects_matching_projections() {
        let (fetcher, _) = CountingFetcher::serving(RED);
        let orchestrator = TileOrchestrator::new(fetcher, test_source());
        let request = TileRequest::new(0, 0, 2, Projection::Geodetic, Projection::Geodetic);

        let err = orchestrator.render(&request).await.expect_err("must reject");
        assert!(matches!(err, RenderError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_rejects_broken_url_template() {
        let (fetcher, _) = CountingFetcher::serving(RED);
        let source = TileSourceConfig::new("https://tiles.test/static.png");
        let orchestrator = TileOrchestrator::new(fetcher, source);

        let err = orchestrator
            .render(&geodetic_request(0, 0, 2))
            .await
            .expect_err("must reject");
        assert!(matches!(err, RenderError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_rejects_out_of_grid_and_out_of_zoom_tiles() {
        let (fetcher, _) = CountingFetcher::serving(RED);
        let orchestrator = TileOrchestrator::new(fetcher, test_source());

        // Column 99 does not exist in the 8-column geodetic grid at zoom 3.
        let err = orchestrator
            .render(&geodetic_request(99, 0, 3))
            .await
            .expect_err("must reject");
        assert!(matches!(err, RenderError::InvalidRequest(_)));

        let err = orchestrator
            .render(&geodetic_request(0, 0, 31))
            .await
            .expect_err("must reject");
        assert!(matches!(err, RenderError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_empty_coverage_serves_blank_without_network() {
        let (fetcher, calls) = CountingFetcher::serving(RED);
        let orchestrator = TileOrchestrator::new(fetcher, test_source());

        // Geodetic row 63 at zoom 7 lies fully north of the mercator band.
        let tile = orchestrator
            .render(&geodetic_request(0, 63, 7))
            .await
            .expect("blank, not an error");

        assert!(tile.blank);
        assert_eq!(tile.image.dimensions(), (256, 256));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_sources_become_placeholders() {
        let (fetcher, calls) = CountingFetcher::failing();
        let orchestrator = TileOrchestrator::new(fetcher, test_source());

        let tile = orchestrator
            .render(&geodetic_request(0, 0, 2).with_log_errors(false))
            .await
            .expect("absorbed, not an error");

        assert!(tile.blank);
        // The plan spans 2 columns over 3 rows but only the 4 tiles inside
        // the mercator grid ever reach the network.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_renders_solid_source_end_to_end() {
        let (fetcher, _) = CountingFetcher::serving(RED);
        let orchestrator = TileOrchestrator::new(fetcher, test_source());

        let tile = orchestrator
            .render(&geodetic_request(0, 0, 2))
            .await
            .expect("renders");

        assert!(!tile.blank);
        assert_eq!(tile.image.dimensions(), (256, 256));
        assert_eq!(*tile.image.get_pixel(128, 128), RED);
        assert_eq!(*tile.image.get_pixel(5, 5), RED);
        let transparent = tile.image.pixels().filter(|p| p[3] == 0).count();
        assert!(
            transparent <= 512,
            "expected at most a thin border of gaps, found {transparent}"
        );
    }

    #[tokio::test]
    async fn test_cancel_aborts_request() {
        let (fetcher, _) = CountingFetcher::serving(RED);
        let fetcher = fetcher.with_delay(Duration::from_millis(300));
        let orchestrator = Arc::new(TileOrchestrator::new(fetcher, test_source()));

        let request = geodetic_request(0, 0, 2).with_task_id("scene-1");
        let render = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.render(&request).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(orchestrator.cancel_task("scene-1") >= 1);

        let result = render.await.expect("join");
        assert!(matches!(result, Err(RenderError::Cancelled)));
    }

    #[tokio::test]
    async fn test_overzoom_serves_ancestor_window() {
        let (fetcher, calls) = CountingFetcher::serving(RED);
        let source = test_source().with_max_available_zoom(2);
        let orchestrator = TileOrchestrator::new(fetcher, source);

        let tile = orchestrator
            .render(&geodetic_request(0, 0, 4))
            .await
            .expect("renders");

        assert!(!tile.blank);
        assert_eq!(tile.image.dimensions(), (256, 256));
        assert_eq!(*tile.image.get_pixel(128, 128), RED);
        // Fetches belong to the zoom-2 ancestor's plan, not to zoom 4.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_mask_applied_when_named() {
        struct EastClearMask;

        impl MaskClip for EastClearMask {
            fn apply(
                &self,
                mut raster: RgbaImage,
                _tile_bbox: &BoundingBox,
                _grid: Projection,
                tile_size: u32,
                _mask_id: &str,
            ) -> RgbaImage {
                for y in 0..raster.height() {
                    for x in tile_size / 2..raster.width() {
                        raster.put_pixel(x, y, Rgba([0, 0, 0, 0]));
                    }
                }
                raster
            }
        }

        let (fetcher, _) = CountingFetcher::serving(RED);
        let orchestrator =
            TileOrchestrator::new(fetcher, test_source()).with_mask(Arc::new(EastClearMask));

        let tile = orchestrator
            .render(&geodetic_request(0, 0, 2).with_mask("coastline"))
            .await
            .expect("renders");

        assert!(!tile.blank);
        assert_eq!(tile.image.get_pixel(10, 128)[3], 255);
        assert_eq!(tile.image.get_pixel(250, 128)[3], 0);
    }

    #[tokio::test]
    async fn test_debug_mode_draws_tile_boundary() {
        let (fetcher, _) = CountingFetcher::serving(BLUE);
        let orchestrator = TileOrchestrator::new(fetcher, test_source());

        let tile = orchestrator
            .render(&geodetic_request(0, 0, 2).with_debug(true))
            .await
            .expect("renders");

        assert_eq!(*tile.image.get_pixel(0, 0), raster::DEBUG_COLOR);
        assert_eq!(*tile.image.get_pixel(255, 255), raster::DEBUG_COLOR);
        assert_eq!(*tile.image.get_pixel(128, 128), BLUE);
    }
}
