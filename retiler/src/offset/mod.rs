//! National coordinate-offset correction.
//!
//! Chinese map providers serve imagery in the GCJ-02 datum, a deliberate
//! deviation from WGS84 of a few hundred meters that varies smoothly with
//! position. To fetch the source tiles that actually cover a target area,
//! the planner widens the target footprint by pushing its corners through
//! the published obfuscation polynomial and taking the envelope.
//!
//! Points outside the mainland-China window pass through unchanged, so the
//! correction is safe to leave enabled for worldwide requests.

use crate::coord::{geodetic_to_mercator, mercator_to_geodetic, BoundingBox, Projection};
use std::f64::consts::PI;

/// Semi-major axis of the GCJ-02 reference ellipsoid (Krasovsky 1940).
const GCJ_A: f64 = 6_378_245.0;

/// First eccentricity squared of the same ellipsoid.
const GCJ_EE: f64 = 0.006_693_421_622_965_943;

/// Returns `true` when the point lies outside the region the datum
/// obfuscation applies to.
#[inline]
fn outside_offset_region(lon: f64, lat: f64) -> bool {
    !(72.004..=137.8347).contains(&lon) || !(0.8293..=55.8271).contains(&lat)
}

fn transform_lat(x: f64, y: f64) -> f64 {
    let mut ret =
        -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn transform_lon(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}

/// Shifts a WGS84 point into the GCJ-02 datum.
///
/// # Arguments
///
/// * `lon` - Longitude in degrees
/// * `lat` - Latitude in degrees
///
/// # Returns
///
/// The offset `(lon, lat)`, or the input unchanged outside the affected
/// region.
pub fn wgs84_to_gcj02(lon: f64, lat: f64) -> (f64, f64) {
    if outside_offset_region(lon, lat) {
        return (lon, lat);
    }
    let dlat = transform_lat(lon - 105.0, lat - 35.0);
    let dlon = transform_lon(lon - 105.0, lat - 35.0);
    let rad_lat = lat / 180.0 * PI;
    let mut magic = rad_lat.sin();
    magic = 1.0 - GCJ_EE * magic * magic;
    let sqrt_magic = magic.sqrt();
    let dlat = (dlat * 180.0) / ((GCJ_A * (1.0 - GCJ_EE)) / (magic * sqrt_magic) * PI);
    let dlon = (dlon * 180.0) / (GCJ_A / sqrt_magic * rad_lat.cos() * PI);
    (lon + dlon, lat + dlat)
}

/// Envelope of the four bbox corners pushed through the datum shift, in
/// geodetic degrees.
fn offset_envelope_geodetic(bbox: &BoundingBox) -> BoundingBox {
    let corners = [
        (bbox.min_x, bbox.min_y),
        (bbox.min_x, bbox.max_y),
        (bbox.max_x, bbox.min_y),
        (bbox.max_x, bbox.max_y),
    ];
    let mut env = BoundingBox::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (lon, lat) in corners {
        let (olon, olat) = wgs84_to_gcj02(lon, lat);
        env.min_x = env.min_x.min(olon);
        env.min_y = env.min_y.min(olat);
        env.max_x = env.max_x.max(olon);
        env.max_y = env.max_y.max(olat);
    }
    env
}

/// Applies the national offset correction to a bbox.
///
/// The box is interpreted, and returned, in the coordinate `space` given.
/// The mercator variant routes through geodetic degrees because the datum
/// shift is only defined there, then reprojects the corrected envelope
/// corner points separately.
///
/// # Arguments
///
/// * `bbox` - Footprint to correct
/// * `space` - Coordinate space of `bbox`
/// * `enabled` - When `false` the input is returned unchanged
pub fn apply_national_offset(bbox: &BoundingBox, space: Projection, enabled: bool) -> BoundingBox {
    if !enabled {
        return *bbox;
    }
    match space {
        Projection::Geodetic => offset_envelope_geodetic(bbox),
        Projection::WebMercator => {
            let (min_lon, min_lat) = mercator_to_geodetic(bbox.min_x, bbox.min_y);
            let (max_lon, max_lat) = mercator_to_geodetic(bbox.max_x, bbox.max_y);
            let env = offset_envelope_geodetic(&BoundingBox::new(
                min_lon, min_lat, max_lon, max_lat,
            ));
            BoundingBox::from_corners(
                geodetic_to_mercator(env.min_x, env.min_y),
                geodetic_to_mercator(env.max_x, env.max_y),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::geodetic_bbox_to_mercator;

    #[test]
    fn test_beijing_point_is_shifted() {
        let (lon, lat) = wgs84_to_gcj02(116.404, 39.915);
        let dlon = lon - 116.404;
        let dlat = lat - 39.915;
        // The obfuscation moves points by a few hundred meters.
        assert!(dlon.abs() > 1e-4 && dlon.abs() < 0.02, "dlon = {dlon}");
        assert!(dlat.abs() > 1e-4 && dlat.abs() < 0.02, "dlat = {dlat}");
    }

    #[test]
    fn test_paris_point_passes_through() {
        let (lon, lat) = wgs84_to_gcj02(2.3522, 48.8566);
        assert_eq!(lon, 2.3522);
        assert_eq!(lat, 48.8566);
    }

    #[test]
    fn test_disabled_returns_input() {
        let bbox = BoundingBox::new(116.0, 39.0, 117.0, 40.0);
        assert_eq!(apply_national_offset(&bbox, Projection::Geodetic, false), bbox);
    }

    #[test]
    fn test_geodetic_envelope_stays_ordered() {
        let bbox = BoundingBox::new(116.0, 39.0, 117.0, 40.0);
        let out = apply_national_offset(&bbox, Projection::Geodetic, true);
        assert!(out.min_x < out.max_x);
        assert!(out.min_y < out.max_y);
        assert_ne!(out, bbox);
    }

    #[test]
    fn test_envelope_straddling_region_boundary() {
        // West corners pass through, east corners shift; the envelope must
        // still be ordered.
        let bbox = BoundingBox::new(71.0, 39.0, 73.0, 40.0);
        let out = apply_national_offset(&bbox, Projection::Geodetic, true);
        assert!(out.min_x <= 71.0);
        assert!(out.min_x < out.max_x);
        assert!(out.min_y < out.max_y);
    }

    #[test]
    fn test_mercator_box_outside_region_roundtrips() {
        let geo = BoundingBox::new(2.0, 48.0, 3.0, 49.0);
        let merc = geodetic_bbox_to_mercator(&geo);
        let out = apply_national_offset(&merc, Projection::WebMercator, true);
        assert!((out.min_x - merc.min_x).abs() < 1e-6);
        assert!((out.min_y - merc.min_y).abs() < 1e-6);
        assert!((out.max_x - merc.max_x).abs() < 1e-6);
        assert!((out.max_y - merc.max_y).abs() < 1e-6);
    }

    #[test]
    fn test_mercator_box_in_region_widens() {
        let geo = BoundingBox::new(116.0, 39.0, 117.0, 40.0);
        let merc = geodetic_bbox_to_mercator(&geo);
        let out = apply_national_offset(&merc, Projection::WebMercator, true);
        assert!(out.min_x < out.max_x);
        assert!(out.min_y < out.max_y);
        assert!((out.min_x - merc.min_x).abs() > 10.0, "expected a shift of hundreds of meters");
    }
}
