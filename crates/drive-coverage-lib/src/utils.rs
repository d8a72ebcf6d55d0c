//! Utility functions for coordinate conversions and bounding-box operations

use geo::{Coord, Point, Rect};

/// CRS tag for Web Mercator, the planar system the GPX loader projects into
pub const CRS_WEB_MERCATOR: &str = "EPSG:3857";

/// CRS tag for WGS84 geographic coordinates
pub const CRS_WGS84: &str = "EPSG:4326";

/// Web Mercator bounds in meters (EPSG:3857)
pub const EARTH_MERCATOR_MAX: f64 = 20037508.34;
pub const EARTH_MERCATOR_MIN: f64 = -20037508.34;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Precomputed constant: EARTH_MERCATOR_MAX / 180.0
const LON_TO_X_FACTOR: f64 = EARTH_MERCATOR_MAX / 180.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / PI
const Y_FACTOR: f64 = EARTH_MERCATOR_MAX / std::f64::consts::PI;

/// Precomputed constant: 180.0 / EARTH_MERCATOR_MAX
const X_TO_LON_FACTOR: f64 = 180.0 / EARTH_MERCATOR_MAX;

/// Precomputed constant: PI / EARTH_MERCATOR_MAX
const Y_TO_LAT_FACTOR: f64 = std::f64::consts::PI / EARTH_MERCATOR_MAX;

/// Convert WGS84 (lat, lon) to Web Mercator (x, y) in meters
///
/// # Arguments
/// * `lat` - Latitude in degrees (-85.05 to 85.05)
/// * `lon` - Longitude in degrees (-180 to 180)
///
/// # Returns
/// A `Point<f64>` with x (easting) and y (northing) in meters
#[inline(always)]
pub fn wgs84_to_mercator(lat: f64, lon: f64) -> Point<f64> {
    // Clamp latitude to valid Web Mercator range
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);

    let x = lon * LON_TO_X_FACTOR;
    let lat_rad = lat.to_radians();
    let y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * Y_FACTOR;

    Point::new(x, y)
}

/// Convert Web Mercator (x, y) in meters to WGS84 (lat, lon)
///
/// # Returns
/// A tuple of (latitude, longitude) in degrees
#[inline(always)]
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x * X_TO_LON_FACTOR;
    let lat =
        (std::f64::consts::PI / 2.0 - 2.0 * ((-y * Y_TO_LAT_FACTOR).exp()).atan()).to_degrees();
    (lat, lon)
}

/// Convert a GPX waypoint to Web Mercator point
#[inline(always)]
pub fn waypoint_to_mercator(waypoint: &gpx::Waypoint) -> Point<f64> {
    wgs84_to_mercator(waypoint.point().y(), waypoint.point().x())
}

/// Check if a point is within Web Mercator bounds
#[inline(always)]
pub fn is_valid_mercator(point: &Point<f64>) -> bool {
    let x = point.x();
    let y = point.y();
    x >= EARTH_MERCATOR_MIN
        && x <= EARTH_MERCATOR_MAX
        && y >= EARTH_MERCATOR_MIN
        && y <= EARTH_MERCATOR_MAX
}

/// Check that all four bounds of a rectangle are finite numbers
#[inline]
pub fn rect_is_finite(rect: &Rect<f64>) -> bool {
    let min = rect.min();
    let max = rect.max();
    min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()
}

/// Check if two rectangles intersect (touching edges count as intersecting)
#[inline]
pub fn rects_intersect(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    let amin = a.min();
    let amax = a.max();
    let bmin = b.min();
    let bmax = b.max();

    !(amax.x < bmin.x || amin.x > bmax.x || amax.y < bmin.y || amin.y > bmax.y)
}

/// Check if `outer` fully contains `inner` (shared edges allowed)
#[inline]
pub fn rect_contains(outer: &Rect<f64>, inner: &Rect<f64>) -> bool {
    let omin = outer.min();
    let omax = outer.max();
    let imin = inner.min();
    let imax = inner.max();

    imin.x >= omin.x && imin.y >= omin.y && imax.x <= omax.x && imax.y <= omax.y
}

/// Smallest rectangle covering both inputs
#[inline]
pub fn union_rect(a: &Rect<f64>, b: &Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

/// Grow a rectangle by `margin` on every side
#[inline]
pub fn expand_rect(rect: &Rect<f64>, margin: f64) -> Rect<f64> {
    Rect::new(
        Coord {
            x: rect.min().x - margin,
            y: rect.min().y - margin,
        },
        Coord {
            x: rect.max().x + margin,
            y: rect.max().y + margin,
        },
    )
}
