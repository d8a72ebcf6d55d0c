//! Orientation and parallelism tests for segments
//!
//! Orientation is direction-agnostic: a segment and its reverse share the same angle,
//! folded into `[0, 180)` degrees. Parallelism compares two such angles while treating
//! the 0/180 seam as continuous, so 179° and 1° are 2° apart.

use crate::{DataError, Result, Segment};
use geo::LineString;

/// Half turn in degrees; orientations are folded modulo this value
pub const HALF_TURN_DEG: f64 = 180.0;

/// Compute the orientation of a polyline from its first and last points
///
/// Intermediate vertices are ignored. Returns `None` when the polyline has fewer than
/// two points or its endpoints coincide.
pub fn line_orientation(line: &LineString<f64>) -> Option<f64> {
    let coords = &line.0;
    if coords.len() < 2 {
        return None;
    }

    let first = coords[0];
    let last = coords[coords.len() - 1];
    let mut dx = last.x - first.x;
    let mut dy = last.y - first.y;

    if dx == 0.0 && dy == 0.0 {
        return None;
    }

    // Canonical direction (upper half-plane) so a line and its reverse agree bit for bit
    if dy < 0.0 || (dy == 0.0 && dx < 0.0) {
        dx = -dx;
        dy = -dy;
    }

    let angle = dy.atan2(dx).to_degrees().rem_euclid(HALF_TURN_DEG);
    if angle >= HALF_TURN_DEG {
        Some(0.0)
    } else {
        Some(angle)
    }
}

/// Orientation angle of a segment in degrees, in `[0, 180)`
///
/// Fails with [`DataError::DegenerateGeometry`] when the orientation is undefined.
#[inline]
pub fn orientation_angle(segment: &Segment) -> Result<f64> {
    segment
        .orientation()
        .ok_or(DataError::DegenerateGeometry {
            index: segment.index(),
        })
}

/// Check whether two orientation angles are within `threshold_deg` of each other,
/// either directly or across the 0/180 seam
#[inline]
pub fn angles_parallel(angle_a: f64, angle_b: f64, threshold_deg: f64) -> bool {
    let diff = (angle_a - angle_b).abs();
    diff <= threshold_deg || (HALF_TURN_DEG - diff).abs() <= threshold_deg
}

/// Check whether two segments are nearly parallel
///
/// Fails if either segment is degenerate.
pub fn is_parallel(segment_a: &Segment, segment_b: &Segment, threshold_deg: f64) -> Result<bool> {
    let angle_a = orientation_angle(segment_a)?;
    let angle_b = orientation_angle(segment_b)?;
    Ok(angles_parallel(angle_a, angle_b, threshold_deg))
}
