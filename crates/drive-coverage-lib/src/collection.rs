//! SegmentCollection - Ordered, index-stable storage for the segments of one run
//!
//! The position of a segment in the collection is its identity: the spatial index,
//! the checker and the error report all refer to segments by this index.

use crate::{DataError, Result, Segment, utils};

use geo::{LineString, Rect};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// Information about the segment collection
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollectionInfo {
    /// Number of segments loaded
    pub segment_count: usize,
    /// Total number of points across all segments
    pub total_points: usize,
    /// Total length of all segments in CRS units
    pub total_length: f64,
    /// Number of segments with undefined orientation
    pub degenerate_count: usize,
}

/// Cached statistics for the collection
///
/// These are updated incrementally when segments are pushed,
/// avoiding expensive recalculation.
#[derive(Debug, Clone, Default)]
struct CachedStats {
    total_points: usize,
    total_length: f64,
    degenerate_count: usize,
    /// Combined bounding box of all segments (None if empty)
    bounding_box: Option<Rect<f64>>,
}

/// Ordered sequence of segments indexed `0..N-1`
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentCollection {
    /// All loaded segments, in insertion order
    segments: Vec<Segment>,
    /// Coordinate reference system tag, carried through unchanged
    crs: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip, default))]
    cached_stats: CachedStats,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SegmentCollection {
    /// Create an empty collection without a CRS tag
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection tagged with the given CRS
    pub fn with_crs(crs: impl Into<String>) -> Self {
        Self {
            crs: Some(crs.into()),
            ..Self::default()
        }
    }

    /// Build a collection from polylines, assigning indices in iteration order
    pub fn from_line_strings<I>(crs: Option<String>, lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = LineString<f64>>,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("collection::from_line_strings");

        let mut collection = Self {
            crs,
            ..Self::default()
        };
        for line in lines {
            collection.push(line)?;
        }
        Ok(collection)
    }

    /// Append a polyline as the next segment and return its index
    pub fn push(&mut self, geometry: LineString<f64>) -> Result<usize> {
        let index = self.segments.len();
        let segment = Segment::new(index, geometry)?;

        if segment.is_degenerate() {
            tracing::debug!(index, "Segment has undefined orientation");
        }

        self.update_stats_for_added_segment(&segment);
        self.segments.push(segment);
        Ok(index)
    }

    /// Get total number of segments
    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if the collection is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Get a segment by index
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    /// All segments, in index order
    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Iterate over segments in index order
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    /// Coordinate reference system tag, if any
    #[inline]
    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    /// Combined bounding box of all segments
    ///
    /// This is O(1) as the bounding box is cached and updated incrementally.
    #[inline]
    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        self.cached_stats.bounding_box
    }

    /// Get collection information
    ///
    /// This is O(1) as all values are cached.
    #[inline]
    pub fn get_info(&self) -> CollectionInfo {
        CollectionInfo {
            segment_count: self.segments.len(),
            total_points: self.cached_stats.total_points,
            total_length: self.cached_stats.total_length,
            degenerate_count: self.cached_stats.degenerate_count,
        }
    }

    /// Fail with [`DataError::EmptyInput`] if there is nothing to check
    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.is_empty() {
            return Err(DataError::EmptyInput);
        }
        Ok(())
    }

    /// Update cached statistics when a segment is added
    #[inline]
    fn update_stats_for_added_segment(&mut self, segment: &Segment) {
        self.cached_stats.total_points += segment.num_points();
        self.cached_stats.total_length += segment.length();
        if segment.is_degenerate() {
            self.cached_stats.degenerate_count += 1;
        }

        let segment_bbox = segment.bounding_box();
        self.cached_stats.bounding_box = Some(match self.cached_stats.bounding_box {
            Some(bbox) => utils::union_rect(&bbox, &segment_bbox),
            None => segment_bbox,
        });
    }
}

impl Index<usize> for SegmentCollection {
    type Output = Segment;

    fn index(&self, index: usize) -> &Segment {
        &self.segments[index]
    }
}

impl<'a> IntoIterator for &'a SegmentCollection {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}
