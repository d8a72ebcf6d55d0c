//! Quadtree spatial index over segment bounding boxes
//!
//! This module provides a region quadtree that limits coverage comparisons to
//! spatially nearby segments. Each bounding box is stored at the deepest node that
//! fully contains it; nodes subdivide lazily once they hold more than a handful of
//! entries. The tree is built once per run and is read-only afterwards, so it can be
//! shared freely between worker threads.

use crate::{DataError, Result, Segment, SegmentCollection, utils};
use geo::{Coord, Rect};
use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum depth of the quadtree to prevent infinite recursion
const MAX_DEPTH: u32 = 20;

/// Number of entries a leaf may hold before it is subdivided
const MAX_ENTRIES_PER_NODE: usize = 8;

/// Candidate list returned by queries; most neighbourhoods are small
pub type Candidates = SmallVec<[usize; 16]>;

/// A segment bounding box stored in the quadtree
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct IndexEntry {
    /// Index of the segment in the collection
    index: usize,
    /// Bounding box of the segment
    bounding_box: Rect<f64>,
}

/// Root container for the quadtree spatial index
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Quadtree {
    /// Root node covering the combined bounds of all inserted boxes
    root: QuadtreeNode,
    /// Number of inserted entries
    len: usize,
}

/// A single node in the quadtree
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct QuadtreeNode {
    /// Region covered by this node
    bounding_box: Rect<f64>,
    /// Depth level in the tree (0 = root)
    level: u32,
    /// Entries that do not fit entirely inside a single child
    entries: Vec<IndexEntry>,
    /// Child nodes (NW, NE, SW, SE) if subdivided
    children: Option<Box<[QuadtreeNode; 4]>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Quadtree {
    /// Create an empty quadtree covering the given region
    ///
    /// Boxes inserted later must lie within `bounds`.
    pub fn new(bounds: Rect<f64>) -> Self {
        Self {
            root: QuadtreeNode::new(bounds, 0),
            len: 0,
        }
    }

    /// Build the index for every segment of a collection
    ///
    /// Each segment's bounding box is keyed by its collection index. Fails with
    /// [`DataError::SpatialIndexQuery`] if any bounding box is not finite.
    pub fn build(collection: &SegmentCollection) -> Result<Self> {
        Self::build_with_margin(collection, |_| 0.0)
    }

    /// Build the index with every stored box grown by a per-segment margin
    ///
    /// Growing a box by the largest distance at which its segment may still match
    /// keeps bounding-box queries conservative for proximity searches.
    pub fn build_with_margin<F>(collection: &SegmentCollection, margin: F) -> Result<Self>
    where
        F: Fn(&Segment) -> f64,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("quadtree::build");

        let mut boxes = Vec::with_capacity(collection.len());
        let mut bounds: Option<Rect<f64>> = None;
        for segment in collection {
            let bbox = utils::expand_rect(&segment.bounding_box(), margin(segment));
            if !utils::rect_is_finite(&bbox) {
                return Err(DataError::SpatialIndexQuery(format!(
                    "segment {} has a malformed bounding box {:?}",
                    segment.index(),
                    bbox
                )));
            }
            bounds = Some(match bounds {
                Some(b) => utils::union_rect(&b, &bbox),
                None => bbox,
            });
            boxes.push((segment.index(), bbox));
        }

        let bounds = bounds.unwrap_or_else(|| {
            Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 })
        });
        let mut quadtree = Self::new(bounds);

        for (index, bbox) in boxes {
            quadtree.insert(index, bbox)?;
        }

        tracing::debug!(
            entries = quadtree.len,
            nodes = quadtree.node_count(),
            depth = quadtree.depth(),
            "Spatial index built"
        );

        Ok(quadtree)
    }

    /// Insert a bounding box keyed by a segment index
    pub fn insert(&mut self, index: usize, bounding_box: Rect<f64>) -> Result<()> {
        if !utils::rect_is_finite(&bounding_box) {
            return Err(DataError::SpatialIndexQuery(format!(
                "cannot index segment {index} with malformed bounding box {bounding_box:?}"
            )));
        }
        if !utils::rect_contains(&self.root.bounding_box, &bounding_box) {
            return Err(DataError::SpatialIndexQuery(format!(
                "segment {index} bounding box {:?} lies outside the index bounds {:?}",
                bounding_box, self.root.bounding_box
            )));
        }

        self.root.insert(IndexEntry {
            index,
            bounding_box,
        });
        self.len += 1;
        Ok(())
    }

    /// Query for all segment indices whose bounding box intersects `query`
    ///
    /// Touching boxes count as intersecting. Results are sorted ascending. Fails with
    /// [`DataError::SpatialIndexQuery`] if the query box has NaN coordinates.
    pub fn query(&self, query: Rect<f64>) -> Result<Candidates> {
        let min = query.min();
        let max = query.max();
        if min.x.is_nan() || min.y.is_nan() || max.x.is_nan() || max.y.is_nan() {
            return Err(DataError::SpatialIndexQuery(format!(
                "malformed query box {query:?}"
            )));
        }

        let mut results = Candidates::new();
        self.root.query(&query, &mut results);
        results.sort_unstable();
        Ok(results)
    }

    /// Number of indexed entries
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the index is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Region covered by the root node
    #[inline]
    pub fn bounds(&self) -> Rect<f64> {
        self.root.bounding_box
    }

    /// Total number of nodes in the tree
    pub fn node_count(&self) -> usize {
        self.root.node_count()
    }

    /// Deepest level that has been created
    pub fn depth(&self) -> u32 {
        self.root.depth()
    }
}

impl QuadtreeNode {
    fn new(bounding_box: Rect<f64>, level: u32) -> Self {
        Self {
            bounding_box,
            level,
            entries: Vec::new(),
            children: None,
        }
    }

    /// Subdivide this node into 4 children
    fn subdivide(&mut self) {
        if self.children.is_some() {
            return; // Already subdivided
        }

        let min = self.bounding_box.min();
        let max = self.bounding_box.max();
        let mid_x = (min.x + max.x) / 2.0;
        let mid_y = (min.y + max.y) / 2.0;

        let child_level = self.level + 1;

        // Create 4 children: NW, NE, SW, SE
        let nw = QuadtreeNode::new(
            Rect::new(Coord { x: min.x, y: mid_y }, Coord { x: mid_x, y: max.y }),
            child_level,
        );
        let ne = QuadtreeNode::new(
            Rect::new(Coord { x: mid_x, y: mid_y }, Coord { x: max.x, y: max.y }),
            child_level,
        );
        let sw = QuadtreeNode::new(
            Rect::new(Coord { x: min.x, y: min.y }, Coord { x: mid_x, y: mid_y }),
            child_level,
        );
        let se = QuadtreeNode::new(
            Rect::new(Coord { x: mid_x, y: min.y }, Coord { x: max.x, y: mid_y }),
            child_level,
        );

        self.children = Some(Box::new([nw, ne, sw, se]));
    }

    /// Index of the child that fully contains `bbox`, if any
    fn child_for(&self, bbox: &Rect<f64>) -> Option<usize> {
        let children = self.children.as_ref()?;
        children
            .iter()
            .position(|child| utils::rect_contains(&child.bounding_box, bbox))
    }

    /// Insert an entry at the deepest node that fully contains it
    fn insert(&mut self, entry: IndexEntry) {
        if let Some(child) = self.child_for(&entry.bounding_box) {
            if let Some(children) = &mut self.children {
                children[child].insert(entry);
                return;
            }
        }

        self.entries.push(entry);

        if self.children.is_none()
            && self.level < MAX_DEPTH
            && self.entries.len() > MAX_ENTRIES_PER_NODE
        {
            self.subdivide();

            // Push down every entry that now fits inside a child
            let entries = std::mem::take(&mut self.entries);
            for entry in entries {
                match self.child_for(&entry.bounding_box) {
                    Some(child) => {
                        if let Some(children) = &mut self.children {
                            children[child].insert(entry);
                        }
                    }
                    None => self.entries.push(entry),
                }
            }
        }
    }

    /// Collect entries from this node and its children that intersect `query`
    fn query(&self, query: &Rect<f64>, results: &mut Candidates) {
        if !utils::rects_intersect(&self.bounding_box, query) {
            return;
        }

        results.extend(
            self.entries
                .iter()
                .filter(|entry| utils::rects_intersect(&entry.bounding_box, query))
                .map(|entry| entry.index),
        );

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(query, results);
            }
        }
    }

    fn node_count(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map(|children| children.iter().map(QuadtreeNode::node_count).sum::<usize>())
            .unwrap_or(0)
    }

    fn depth(&self) -> u32 {
        self.children
            .as_ref()
            .map(|children| children.iter().map(QuadtreeNode::depth).max().unwrap_or(0))
            .unwrap_or(self.level)
    }
}
