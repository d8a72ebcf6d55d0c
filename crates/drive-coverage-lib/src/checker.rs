//! Coverage checking - classify every segment as covered or erroneous
//!
//! A segment is covered when some other segment is nearly parallel to it and lies
//! within `max(length_a, length_b) * distance_factor` of it. The spatial index limits
//! each segment's comparisons to its neighbourhood; the distance and angle tests decide.

use crate::geometry::angles_parallel;
use crate::quadtree::Candidates;
use crate::{DataError, Quadtree, Result, Segment, SegmentCollection, utils};

use geo::LineString;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Upper bound on the search margin; keeps grown boxes finite for huge distance factors
const MAX_SEARCH_MARGIN: f64 = f64::MAX / 8.0;

/// How the covering relation is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CoverageMode {
    /// Each segment scans its own candidates and stops at the first match
    #[default]
    Independent,
    /// Every unordered pair is tested once; both ends of a match are covered
    Symmetric,
}

/// Configuration for a coverage check
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoverageConfig {
    /// Angular tolerance accepted at the public entry point (default 30°).
    /// Reserved: matching is governed by `parallel_threshold_deg` only.
    pub angle_threshold_deg: f64,
    /// Maximum orientation difference, in degrees, for two segments to count as
    /// parallel (default 10°)
    pub parallel_threshold_deg: f64,
    /// Multiplier on the longer segment's length giving the maximum allowed distance
    /// between a segment and its counterpart (default 0.2)
    pub distance_factor: f64,
    /// Evaluation strategy
    pub mode: CoverageMode,
    /// Shard the per-segment loop across the rayon thread pool
    pub parallel: bool,
    /// Abort the run once this instant has passed
    #[cfg_attr(feature = "serde", serde(skip))]
    pub deadline: Option<Instant>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            angle_threshold_deg: 30.0,
            parallel_threshold_deg: 10.0,
            distance_factor: 0.2,
            mode: CoverageMode::default(),
            parallel: false,
            deadline: None,
        }
    }
}

impl CoverageConfig {
    /// Check that thresholds are usable
    pub fn validate(&self) -> Result<()> {
        if !self.angle_threshold_deg.is_finite() || self.angle_threshold_deg < 0.0 {
            return Err(DataError::InvalidConfig(format!(
                "angle threshold must be a non-negative number of degrees, got {}",
                self.angle_threshold_deg
            )));
        }
        if !self.parallel_threshold_deg.is_finite()
            || !(0.0..=90.0).contains(&self.parallel_threshold_deg)
        {
            return Err(DataError::InvalidConfig(format!(
                "parallel threshold must be within [0, 90] degrees, got {}",
                self.parallel_threshold_deg
            )));
        }
        if !self.distance_factor.is_finite() || self.distance_factor < 0.0 {
            return Err(DataError::InvalidConfig(format!(
                "distance factor must be a non-negative number, got {}",
                self.distance_factor
            )));
        }
        Ok(())
    }
}

/// Why a segment ended up in the error set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ErrorKind {
    /// No nearby parallel counterpart was found
    Uncovered,
    /// Orientation is undefined, so the segment cannot be matched at all
    Degenerate,
}

/// A segment classified as a coverage error
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlaggedSegment {
    /// Index of the segment in the checked collection
    pub index: usize,
    pub kind: ErrorKind,
    /// Orientation at detection time (None for degenerate segments)
    pub orientation_deg: Option<f64>,
    pub length: f64,
    pub geometry: LineString<f64>,
}

/// Ordered error geometries of one run, tagged with the collection's CRS
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ErrorSet {
    crs: Option<String>,
    entries: Vec<FlaggedSegment>,
}

impl ErrorSet {
    /// Coordinate reference system carried over from the input
    #[inline]
    pub fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }

    /// Flagged segments in collection order
    #[inline]
    pub fn entries(&self) -> &[FlaggedSegment] {
        &self.entries
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, FlaggedSegment> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices of all flagged segments
    pub fn indices(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.index).collect()
    }

    /// Geometries of all flagged segments
    pub fn geometries(&self) -> Vec<&LineString<f64>> {
        self.entries.iter().map(|e| &e.geometry).collect()
    }

    /// Flagged segments of a single kind
    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &FlaggedSegment> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }
}

impl<'a> IntoIterator for &'a ErrorSet {
    type Item = &'a FlaggedSegment;
    type IntoIter = std::slice::Iter<'a, FlaggedSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Outcome of a coverage check
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoverageReport {
    pub errors: ErrorSet,
    /// Number of segments classified
    pub checked: usize,
    pub covered: usize,
    pub uncovered: usize,
    pub degenerate: usize,
    pub elapsed: Duration,
}

/// Per-segment classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Covered,
    Uncovered,
    Degenerate,
}

/// Runs coverage checks with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct CoverageChecker {
    config: CoverageConfig,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl CoverageChecker {
    /// Create a new checker with the given configuration
    pub fn new(config: CoverageConfig) -> Self {
        Self { config }
    }

    /// Get a reference to the configuration
    #[inline]
    pub fn config(&self) -> &CoverageConfig {
        &self.config
    }

    /// Classify every segment of the collection
    ///
    /// Builds the spatial index, evaluates coverage in the configured mode and returns
    /// the error set in collection order. Degenerate segments are never compared and
    /// are reported with [`ErrorKind::Degenerate`].
    pub fn check(&self, collection: &SegmentCollection) -> Result<CoverageReport> {
        #[cfg(feature = "profiling")]
        profiling::scope!("checker::check");

        self.config.validate()?;
        let started = Instant::now();

        let index = self.build_index(collection)?;
        let statuses = match self.config.mode {
            CoverageMode::Independent => self.classify_independent(collection, &index)?,
            CoverageMode::Symmetric => self.classify_symmetric(collection, &index)?,
        };

        let report = Self::assemble(collection, &statuses, started.elapsed());
        tracing::info!(
            "Coverage check finished: {} of {} segments flagged ({} degenerate) in {:.2?}",
            report.errors.len(),
            report.checked,
            report.degenerate,
            report.elapsed
        );
        Ok(report)
    }

    /// Every unordered pair `(i, j)` with `i < j` where the two segments cover each other
    pub fn covering_pairs(&self, collection: &SegmentCollection) -> Result<Vec<(usize, usize)>> {
        self.config.validate()?;
        let index = self.build_index(collection)?;
        self.collect_pairs(collection, &index)
    }

    /// Whether segment `b` is a counterpart of segment `a`
    ///
    /// Both must have a defined orientation; the distance bound scales with the longer
    /// of the two.
    pub fn pair_covers(&self, a: &Segment, b: &Segment) -> bool {
        let (Some(angle_a), Some(angle_b)) = (a.orientation(), b.orientation()) else {
            return false;
        };

        if !angles_parallel(angle_a, angle_b, self.config.parallel_threshold_deg) {
            return false;
        }

        let dynamic_threshold = a.length().max(b.length()) * self.config.distance_factor;
        a.distance_to(b) <= dynamic_threshold
    }

    /// Largest distance at which `segment` could still match a segment no longer than itself
    #[inline]
    fn search_margin(&self, segment: &Segment) -> f64 {
        (segment.length() * self.config.distance_factor).min(MAX_SEARCH_MARGIN)
    }

    fn build_index(&self, collection: &SegmentCollection) -> Result<Quadtree> {
        Quadtree::build_with_margin(collection, |segment| self.search_margin(segment))
    }

    /// Candidate indices for `segment`, self included
    fn candidates(&self, index: &Quadtree, segment: &Segment) -> Result<Candidates> {
        let query = utils::expand_rect(&segment.bounding_box(), self.search_margin(segment));
        index.query(query)
    }

    fn check_deadline(&self, checked: &AtomicUsize, total: usize) -> Result<()> {
        match self.config.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(DataError::DeadlineExceeded {
                checked: checked.load(Ordering::Relaxed),
                total,
            }),
            _ => Ok(()),
        }
    }

    /// Run `f` over every segment index, sequentially or on the rayon pool,
    /// keeping results in collection order
    fn map_segments<T, F>(&self, total: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync + Send,
    {
        let checked = AtomicUsize::new(0);
        let run = |i: usize| -> Result<T> {
            self.check_deadline(&checked, total)?;
            let out = f(i)?;
            checked.fetch_add(1, Ordering::Relaxed);
            Ok(out)
        };

        if self.config.parallel {
            (0..total).into_par_iter().map(run).collect()
        } else {
            (0..total).map(run).collect()
        }
    }

    fn classify_independent(
        &self,
        collection: &SegmentCollection,
        index: &Quadtree,
    ) -> Result<Vec<Status>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("checker::classify_independent");

        self.map_segments(collection.len(), |i| {
            let segment = &collection[i];
            let status = if segment.is_degenerate() {
                Status::Degenerate
            } else {
                let covered = self
                    .candidates(index, segment)?
                    .into_iter()
                    .filter(|&j| j != i)
                    .any(|j| self.pair_covers(segment, &collection[j]));
                if covered {
                    Status::Covered
                } else {
                    Status::Uncovered
                }
            };
            log_detection(segment, status);
            Ok(status)
        })
    }

    fn collect_pairs(
        &self,
        collection: &SegmentCollection,
        index: &Quadtree,
    ) -> Result<Vec<(usize, usize)>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("checker::collect_pairs");

        let per_segment = self.map_segments(collection.len(), |i| {
            let segment = &collection[i];
            if segment.is_degenerate() {
                return Ok(Vec::new());
            }
            let pairs = self
                .candidates(index, segment)?
                .into_iter()
                .filter(|&j| j > i)
                .filter(|&j| self.pair_covers(segment, &collection[j]))
                .map(|j| (i, j))
                .collect::<Vec<_>>();
            Ok(pairs)
        })?;

        Ok(per_segment.into_iter().flatten().collect())
    }

    fn classify_symmetric(
        &self,
        collection: &SegmentCollection,
        index: &Quadtree,
    ) -> Result<Vec<Status>> {
        let pairs = self.collect_pairs(collection, index)?;

        let mut covered = vec![false; collection.len()];
        for (i, j) in pairs {
            covered[i] = true;
            covered[j] = true;
        }

        let statuses = collection
            .iter()
            .zip(covered)
            .map(|(segment, covered)| {
                let status = match (segment.is_degenerate(), covered) {
                    (true, _) => Status::Degenerate,
                    (false, true) => Status::Covered,
                    (false, false) => Status::Uncovered,
                };
                log_detection(segment, status);
                status
            })
            .collect();

        Ok(statuses)
    }

    fn assemble(
        collection: &SegmentCollection,
        statuses: &[Status],
        elapsed: Duration,
    ) -> CoverageReport {
        let mut report = CoverageReport {
            errors: ErrorSet {
                crs: collection.crs().map(str::to_owned),
                entries: Vec::new(),
            },
            checked: statuses.len(),
            covered: 0,
            uncovered: 0,
            degenerate: 0,
            elapsed,
        };

        for (segment, status) in collection.iter().zip(statuses) {
            let kind = match status {
                Status::Covered => {
                    report.covered += 1;
                    continue;
                }
                Status::Uncovered => {
                    report.uncovered += 1;
                    ErrorKind::Uncovered
                }
                Status::Degenerate => {
                    report.degenerate += 1;
                    ErrorKind::Degenerate
                }
            };
            report.errors.entries.push(FlaggedSegment {
                index: segment.index(),
                kind,
                orientation_deg: segment.orientation(),
                length: segment.length(),
                geometry: segment.geometry().clone(),
            });
        }

        report
    }
}

fn log_detection(segment: &Segment, status: Status) {
    match (status, segment.orientation()) {
        (Status::Uncovered, Some(angle)) => tracing::warn!(
            index = segment.index(),
            angle,
            "Segment {} is an ERROR | Angle: {:.2}°",
            segment.index(),
            angle
        ),
        (Status::Degenerate, _) | (Status::Uncovered, None) => tracing::warn!(
            index = segment.index(),
            "Segment {} is an ERROR | Degenerate geometry, orientation undefined",
            segment.index()
        ),
        (Status::Covered, _) => {}
    }
}

/// Check bidirectional coverage of a collection with explicit thresholds
///
/// `angle_threshold_deg` is validated but reserved; `parallel_threshold_deg` governs
/// the parallelism test. Uses the sequential, independent evaluation.
pub fn check_coverage(
    collection: &SegmentCollection,
    angle_threshold_deg: f64,
    parallel_threshold_deg: f64,
    distance_factor: f64,
) -> Result<ErrorSet> {
    let checker = CoverageChecker::new(CoverageConfig {
        angle_threshold_deg,
        parallel_threshold_deg,
        distance_factor,
        ..CoverageConfig::default()
    });
    Ok(checker.check(collection)?.errors)
}
