//! Drive Coverage Library - Bidirectional Coverage Checking for Road Networks
//!
//! This library detects segments of a road network that lack an opposite-direction
//! counterpart: for every segment it looks for another segment that is nearly parallel
//! and lies within a distance proportional to the longer of the two. Segments without
//! such a counterpart are reported as coverage errors.
//!
//! # Architecture
//!
//! - **[`Segment`]**: Immutable polyline with precomputed length, bounds and orientation
//! - **[`SegmentCollection`]**: Ordered, index-stable set of segments plus a CRS tag
//! - **[`geometry`]**: Orientation angle and parallelism tests
//! - **[`Quadtree`]**: Bounding-box spatial index built once per run
//! - **[`CoverageChecker`]**: Per-segment candidate matching producing an [`ErrorSet`]
//! - **[`io`]**: GPX loading and error export
//!
//! # Performance Characteristics
//!
//! - **Index Build**: O(N log N) for N segments
//! - **Query Time**: O(log N + K) where K=candidates
//! - **Check**: O(N × K), parallelizable over segments

mod checker;
mod collection;
pub mod geometry;
pub mod io;
mod quadtree;
mod segment;
pub mod utils;

// Public API exports
pub use checker::{
    CoverageChecker, CoverageConfig, CoverageMode, CoverageReport, ErrorKind, ErrorSet,
    FlaggedSegment, check_coverage,
};
pub use collection::{CollectionInfo, SegmentCollection};
pub use quadtree::Quadtree;
pub use segment::Segment;

/// Error types for coverage analysis
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("GPX parsing error: {0}")]
    GpxParse(#[from] gpx::errors::GpxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Degenerate geometry: segment {index} has no defined orientation")]
    DegenerateGeometry { index: usize },

    #[error("Spatial index query error: {0}")]
    SpatialIndexQuery(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Deadline exceeded after checking {checked} of {total} segments")]
    DeadlineExceeded { checked: usize, total: usize },

    #[error("No segments found in input")]
    EmptyInput,
}

pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that all public types are accessible
        let _: fn(CoverageConfig) -> CoverageChecker = CoverageChecker::new;
        let _: fn() -> CoverageConfig = CoverageConfig::default;
        let _: fn() -> SegmentCollection = SegmentCollection::new;
    }

    #[test]
    fn test_error_messages() {
        let err = DataError::DegenerateGeometry { index: 7 };
        assert!(err.to_string().contains("segment 7"));

        let err = DataError::DeadlineExceeded {
            checked: 3,
            total: 10,
        };
        assert_eq!(
            err.to_string(),
            "Deadline exceeded after checking 3 of 10 segments"
        );
    }
}
