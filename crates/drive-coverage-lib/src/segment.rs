//! Segment storage with precomputed metadata
//!
//! A `Segment` wraps one single-part polyline and caches everything the coverage check
//! reads repeatedly: its length, bounding box and orientation.

use crate::{DataError, Result, geometry};
use geo::{BoundingRect, Distance, Euclidean, LineString, Rect};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One line geometry of the network with precomputed metadata
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Segment {
    /// Stable index in the owning collection
    index: usize,
    /// The polyline itself
    geometry: LineString<f64>,
    /// Euclidean length along the polyline
    length: f64,
    /// Axis-aligned bounds of all points
    bounding_box: Rect<f64>,
    /// Orientation in degrees, `None` when degenerate
    orientation: Option<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Segment {
    /// Create a new segment from a polyline
    ///
    /// # Arguments
    /// * `index` - Stable index of the segment in its collection
    /// * `geometry` - Polyline with at least one point and finite coordinates
    ///
    /// # Returns
    /// The segment, or [`DataError::InvalidGeometry`] if the polyline is empty or
    /// contains non-finite coordinates. Single-point or closed polylines are accepted
    /// and reported as degenerate by [`Segment::is_degenerate`].
    pub fn new(index: usize, geometry: LineString<f64>) -> Result<Self> {
        if geometry.0.is_empty() {
            return Err(DataError::InvalidGeometry(format!(
                "segment {index} has no points"
            )));
        }

        if let Some(coord) = geometry
            .coords()
            .find(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(DataError::InvalidGeometry(format!(
                "segment {index} has non-finite coordinate ({}, {})",
                coord.x, coord.y
            )));
        }

        let bounding_box = geometry.bounding_rect().ok_or_else(|| {
            DataError::InvalidGeometry(format!("segment {index} has no bounding box"))
        })?;

        let length = geometry
            .lines()
            .map(|line| Euclidean.distance(line.start_point(), line.end_point()))
            .sum();

        let orientation = geometry::line_orientation(&geometry);

        Ok(Self {
            index,
            geometry,
            length,
            bounding_box,
            orientation,
        })
    }

    /// Index of this segment in its collection
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The underlying polyline
    #[inline]
    pub fn geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    /// Euclidean length along the polyline
    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Bounding box of the polyline
    #[inline]
    pub fn bounding_box(&self) -> Rect<f64> {
        self.bounding_box
    }

    /// Cached orientation angle in degrees, `None` when degenerate
    #[inline]
    pub fn orientation(&self) -> Option<f64> {
        self.orientation
    }

    /// Whether the orientation of this segment is undefined
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.orientation.is_none()
    }

    /// Number of points in the polyline
    #[inline]
    pub fn num_points(&self) -> usize {
        self.geometry.0.len()
    }

    /// Minimum Euclidean distance between this segment and another
    #[inline]
    pub fn distance_to(&self, other: &Segment) -> f64 {
        Euclidean.distance(&self.geometry, &other.geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;

    #[test]
    fn test_segment_creation() {
        let seg = Segment::new(3, line_string![(x: 0.0, y: 0.0), (x: 3.0, y: 4.0)]).unwrap();

        assert_eq!(seg.index(), 3);
        assert_eq!(seg.num_points(), 2);
        assert!((seg.length() - 5.0).abs() < 1e-12);
        assert!(!seg.is_degenerate());
    }

    #[test]
    fn test_polyline_length_and_bounds() {
        let seg = Segment::new(
            0,
            line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 5.0)],
        )
        .unwrap();

        assert!((seg.length() - 15.0).abs() < 1e-12);
        let bbox = seg.bounding_box();
        assert_eq!(bbox.min().x, 0.0);
        assert_eq!(bbox.min().y, 0.0);
        assert_eq!(bbox.max().x, 10.0);
        assert_eq!(bbox.max().y, 5.0);
    }

    #[test]
    fn test_empty_segment_fails() {
        let result = Segment::new(0, LineString::new(vec![]));
        assert!(matches!(result, Err(DataError::InvalidGeometry(_))));
    }

    #[test]
    fn test_non_finite_segment_fails() {
        let result = Segment::new(0, line_string![(x: 0.0, y: 0.0), (x: f64::NAN, y: 1.0)]);
        assert!(matches!(result, Err(DataError::InvalidGeometry(_))));
    }

    #[test]
    fn test_single_point_is_degenerate() {
        let seg = Segment::new(1, line_string![(x: 2.0, y: 2.0)]).unwrap();
        assert!(seg.is_degenerate());
        assert_eq!(seg.length(), 0.0);
    }

    #[test]
    fn test_distance_between_parallel_segments() {
        let a = Segment::new(0, line_string![(x: 0.0, y: 0.0), (x: 50.0, y: 0.0)]).unwrap();
        let b = Segment::new(1, line_string![(x: 50.0, y: 5.0), (x: 0.0, y: 5.0)]).unwrap();

        assert!((a.distance_to(&b) - 5.0).abs() < 1e-9);
        assert!((b.distance_to(&a) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_crossing_segments_is_zero() {
        let a = Segment::new(0, line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 10.0)]).unwrap();
        let b = Segment::new(1, line_string![(x: 0.0, y: 10.0), (x: 10.0, y: 0.0)]).unwrap();
        assert_eq!(a.distance_to(&b), 0.0);
    }
}
