//! Retiler - cross-projection map tile reprojection
//!
//! This library rerenders web map tiles between the geodetic (EPSG:4326)
//! and spherical web-mercator (EPSG:3857) tiling schemes, optionally
//! applying the national coordinate-offset correction used by providers
//! in the affected region. For a requested tile it plans the covering
//! source tiles, retrieves and caches them, assembles a mosaic, warps it
//! pixel-by-pixel into the target grid, repairs seam artifacts and serves
//! over-zoomed windows past the source's deepest level.
//!
//! # High-Level API
//!
//! Most callers drive the [`orchestrator`] module:
//!
//! ```ignore
//! use retiler::coord::Projection;
//! use retiler::fetch::ReqwestFetcher;
//! use retiler::orchestrator::{TileOrchestrator, TileRequest, TileSourceConfig};
//!
//! let source = TileSourceConfig::new("https://tiles.example.com/{z}/{x}/{y}.png")
//!     .with_max_available_zoom(18);
//! let orchestrator = TileOrchestrator::new(ReqwestFetcher::new()?, source);
//!
//! let request = TileRequest::new(3, 2, 4, Projection::WebMercator, Projection::Geodetic);
//! let tile = orchestrator.render(&request).await?;
//! ```

pub mod compose;
pub mod coord;
pub mod fetch;
pub mod logging;
pub mod mask;
pub mod offset;
pub mod orchestrator;
pub mod overzoom;
pub mod planner;
pub mod raster;
pub mod resample;
pub mod terrain;

/// Version of the retiler library and CLI.
///
/// Defined once in the workspace manifest and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
