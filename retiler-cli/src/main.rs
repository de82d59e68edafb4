//! Retiler CLI - render one reprojected tile from the command line.
//!
//! This binary is a thin front end over the retiler library: it builds a
//! tile source from the flags, renders a single target tile and writes the
//! result as PNG.

use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use retiler::coord::Projection;
use retiler::fetch::ReqwestFetcher;
use retiler::logging::{default_log_dir, default_log_file, init_logging};
use retiler::orchestrator::{TileOrchestrator, TileRequest, TileSourceConfig};

#[derive(Parser)]
#[command(name = "retiler")]
#[command(about = "Reproject map tiles between EPSG:4326 and EPSG:3857 grids", long_about = None)]
struct Args {
    /// Target tile column
    #[arg(long)]
    x: i64,

    /// Target tile row
    #[arg(long)]
    y: i64,

    /// Target zoom level
    #[arg(long)]
    z: u8,

    /// Grid the source provider serves tiles in (EPSG:4326 or EPSG:3857)
    #[arg(long, default_value = "EPSG:3857")]
    source: Projection,

    /// Grid of the requested tile (EPSG:4326 or EPSG:3857)
    #[arg(long, default_value = "EPSG:4326")]
    target: Projection,

    /// Source URL template with {x}, {y} and {z} placeholders
    #[arg(long)]
    url: String,

    /// Extra HTTP header in "Name: value" form (repeatable)
    #[arg(long = "header")]
    headers: Vec<String>,

    /// Source zoom adjustment relative to the target zoom
    #[arg(long, default_value = "0")]
    zoom_offset: i32,

    /// Highest zoom the provider serves; deeper requests overzoom
    #[arg(long, default_value = "18")]
    max_zoom: u8,

    /// Apply the national coordinate offset correction to source placement
    #[arg(long)]
    national_offset: bool,

    /// Draw source tile borders and labels into the output
    #[arg(long)]
    debug: bool,

    /// Per-fetch timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Output PNG path
    #[arg(long, default_value = "tile.png")]
    output: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _log_guard = match init_logging(default_log_dir(), default_log_file()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {}", e);
            process::exit(1);
        }
    };
    info!(version = retiler::VERSION, "retiler cli starting");

    let headers = match parse_headers(&args.headers) {
        Ok(headers) => headers,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    println!("Rendering tile:");
    println!("  Tile:   col={}, row={}, zoom={}", args.x, args.y, args.z);
    println!("  Source: {}", args.source);
    println!("  Target: {}", args.target);
    println!();

    let client = match ReqwestFetcher::new() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error creating HTTP client: {}", e);
            process::exit(1);
        }
    };

    let source = TileSourceConfig::new(args.url)
        .with_headers(headers)
        .with_max_available_zoom(args.max_zoom);
    let orchestrator = TileOrchestrator::new(client, source);

    let mut request = TileRequest::new(args.x, args.y, args.z, args.source, args.target)
        .with_zoom_offset(args.zoom_offset)
        .with_national_offset(args.national_offset)
        .with_debug(args.debug)
        .with_task_id("cli");
    if let Some(secs) = args.timeout {
        request = request.with_timeout(Duration::from_secs(secs));
    }

    let start = std::time::Instant::now();
    let tile = match orchestrator.render(&request).await {
        Ok(tile) => tile,
        Err(e) => {
            eprintln!("Error rendering tile: {}", e);
            process::exit(1);
        }
    };
    let elapsed = start.elapsed();

    if tile.blank {
        println!("No source coverage; rendered a blank tile.");
    }
    println!(
        "Rendered {}x{} in {:.2}s",
        tile.image.width(),
        tile.image.height(),
        elapsed.as_secs_f64()
    );

    match tile.image.save(&args.output) {
        Ok(()) => {
            let file_size = std::fs::metadata(&args.output).map(|m| m.len()).unwrap_or(0);
            println!(
                "✓ Saved: {} ({:.1} KiB)",
                args.output,
                file_size as f64 / 1024.0
            );
        }
        Err(e) => {
            eprintln!("Error writing {}: {}", args.output, e);
            process::exit(1);
        }
    }
}

/// Split raw `--header` values on the first colon.
fn parse_headers(raw: &[String]) -> Result<Vec<(String, String)>, String> {
    raw.iter()
        .map(|entry| {
            entry
                .split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                .ok_or_else(|| format!("invalid header {:?}, expected \"Name: value\"", entry))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_headers_splits_on_first_colon() {
        let raw = vec!["Referer: https://example.test/map".to_string()];
        let parsed = parse_headers(&raw).unwrap();
        assert_eq!(
            parsed,
            vec![(
                "Referer".to_string(),
                "https://example.test/map".to_string()
            )]
        );
    }

    #[test]
    fn test_parse_headers_rejects_missing_colon() {
        let raw = vec!["NotAHeader".to_string()];
        assert!(parse_headers(&raw).is_err());
    }
}
