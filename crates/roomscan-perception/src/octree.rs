//! Spatial index over point clouds.
//!
//! Partitions 3-D space using a recursive **Octree** so that the neighbour
//! searches of every stage (outlier statistics, normal estimation, density
//! clustering, object proximity) run in roughly `O(log n)` per query instead
//! of scanning the whole cloud.
//!
//! # Key types
//!
//! | Type | Role |
//! |------|------|
//! | [`Octree`]   | Spatial index; insert indexed points, query neighbours. |
//! | [`Neighbor`] | One query hit: the point's index and squared distance. |
//!
//! # Example
//!
//! ```rust
//! use roomscan_perception::octree::Octree;
//! use roomscan_types::Point3;
//!
//! let points = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(0.1, 0.0, 0.0),
//!     Point3::new(5.0, 5.0, 5.0),
//! ];
//! let tree = Octree::from_points(&points);
//!
//! let hits = tree.within_radius(Point3::new(0.0, 0.0, 0.0), 0.5);
//! assert_eq!(hits.len(), 2);
//!
//! let nearest = tree.nearest(Point3::new(4.0, 4.0, 4.0), 1);
//! assert_eq!(nearest[0].index, 2);
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use roomscan_types::{Aabb, Point3};

/// Default leaf capacity used by [`Octree::from_points`].
const DEFAULT_CAPACITY: usize = 16;
/// Default subdivision limit used by [`Octree::from_points`].
const DEFAULT_MAX_DEPTH: usize = 10;

/// A query result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index the point was inserted with.
    pub index: usize,
    pub distance_squared: f32,
}

// ────────────────────────────────────────────────────────────────────────────
// Octree
// ────────────────────────────────────────────────────────────────────────────

/// A recursive spatial index that subdivides 3-D space into eight octants.
///
/// Points are stored in the deepest node whose bounding box still contains
/// them.  Subdividing stops when either
/// - the number of points in a node is ≤ `capacity`, or
/// - `max_depth` levels have already been created.
///
/// The tree layout depends only on the insertion sequence, so queries are
/// deterministic for a given cloud.
#[derive(Debug)]
pub struct Octree {
    root: OctreeNode,
    max_depth: usize,
    len: usize,
}

impl Octree {
    /// Create an empty octree covering `bounds`.
    ///
    /// - `capacity` – maximum points per leaf before subdivision is attempted.
    pub fn new(bounds: Aabb, capacity: usize) -> Self {
        Self::with_max_depth(bounds, capacity, DEFAULT_MAX_DEPTH)
    }

    /// Create an empty octree with an explicit maximum subdivision depth.
    pub fn with_max_depth(bounds: Aabb, capacity: usize, max_depth: usize) -> Self {
        Self {
            root: OctreeNode::new(bounds, capacity.max(1)),
            max_depth,
            len: 0,
        }
    }

    /// Index every point of `points` under its position in the slice.
    pub fn from_points(points: &[Point3]) -> Self {
        let bounds = Aabb::from_points(points.iter().copied())
            .unwrap_or_else(|| Aabb::new(Point3::zero(), Point3::zero()));
        let mut tree = Self::new(bounds, DEFAULT_CAPACITY);
        for (index, &p) in points.iter().enumerate() {
            tree.insert(p, index);
        }
        tree
    }

    /// Insert a point under `index`.
    ///
    /// Points outside the root bounding box are ignored and `false` is
    /// returned.
    pub fn insert(&mut self, point: Point3, index: usize) -> bool {
        let inserted = self.root.insert(Entry { point, index }, self.max_depth, 0);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Return the total number of points stored in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the tree contains no points.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// All points within `radius` of `centre` (inclusive), the centre point
    /// itself included when it is indexed.  Order follows the tree layout.
    pub fn within_radius(&self, centre: Point3, radius: f32) -> Vec<Neighbor> {
        let mut out = Vec::new();
        self.root.within_radius(centre, radius * radius, &mut out);
        out
    }

    /// The `k` points closest to `query`, nearest first.  Ties are broken by
    /// ascending index.
    pub fn nearest(&self, query: Point3, k: usize) -> Vec<Neighbor> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        let mut best: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        let mut frontier: BinaryHeap<Pending<'_>> = BinaryHeap::new();
        frontier.push(Pending {
            distance_squared: self.root.bounds.distance_squared_to(query),
            node: &self.root,
        });

        while let Some(Pending { distance_squared, node }) = frontier.pop() {
            if best.len() == k
                && let Some(worst) = best.peek()
                && distance_squared > worst.distance_squared
            {
                break;
            }
            match &node.children {
                None => {
                    for e in &node.entries {
                        let candidate = Candidate {
                            distance_squared: e.point.distance_squared(query),
                            index: e.index,
                        };
                        if best.len() < k {
                            best.push(candidate);
                        } else if let Some(worst) = best.peek()
                            && candidate < *worst
                        {
                            best.pop();
                            best.push(candidate);
                        }
                    }
                }
                Some(children) => {
                    for child in children.iter() {
                        frontier.push(Pending {
                            distance_squared: child.bounds.distance_squared_to(query),
                            node: child,
                        });
                    }
                }
            }
        }

        best.into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                index: c.index,
                distance_squared: c.distance_squared,
            })
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Search bookkeeping
// ────────────────────────────────────────────────────────────────────────────

/// Max-heap entry of the k-nearest search; the heap top is the worst kept hit.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance_squared: f32,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_squared
            .total_cmp(&other.distance_squared)
            .then(self.index.cmp(&other.index))
    }
}

/// Min-heap entry of the node frontier (ordering reversed on distance).
struct Pending<'a> {
    distance_squared: f32,
    node: &'a OctreeNode,
}

impl PartialEq for Pending<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.distance_squared.total_cmp(&other.distance_squared) == Ordering::Equal
    }
}

impl Eq for Pending<'_> {}

impl PartialOrd for Pending<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.distance_squared.total_cmp(&self.distance_squared)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// OctreeNode – internal implementation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Entry {
    point: Point3,
    index: usize,
}

#[derive(Debug)]
struct OctreeNode {
    bounds: Aabb,
    capacity: usize,
    /// Points stored at this node (only non-empty when the node is a leaf).
    entries: Vec<Entry>,
    /// Eight children; `None` while this node is a leaf.
    children: Option<Box<[OctreeNode; 8]>>,
}

impl OctreeNode {
    fn new(bounds: Aabb, capacity: usize) -> Self {
        Self {
            bounds,
            capacity,
            entries: Vec::new(),
            children: None,
        }
    }

    fn insert(&mut self, entry: Entry, max_depth: usize, depth: usize) -> bool {
        if !self.bounds.contains_point(entry.point) {
            return false;
        }

        match self.children.as_mut() {
            None => {
                self.entries.push(entry);
                // Subdivide when over capacity and depth budget remains.
                if self.entries.len() > self.capacity && depth < max_depth {
                    self.subdivide(max_depth, depth);
                }
                true
            }
            Some(children) => children
                .iter_mut()
                .find(|c| c.bounds.contains_point(entry.point))
                .is_some_and(|c| c.insert(entry, max_depth, depth + 1)),
        }
    }

    fn within_radius(&self, centre: Point3, radius_squared: f32, out: &mut Vec<Neighbor>) {
        if self.bounds.distance_squared_to(centre) > radius_squared {
            return;
        }
        match &self.children {
            None => {
                for e in &self.entries {
                    let d2 = e.point.distance_squared(centre);
                    if d2 <= radius_squared {
                        out.push(Neighbor {
                            index: e.index,
                            distance_squared: d2,
                        });
                    }
                }
            }
            Some(children) => {
                for child in children.iter() {
                    child.within_radius(centre, radius_squared, out);
                }
            }
        }
    }

    /// Split this leaf into eight children and redistribute existing points.
    fn subdivide(&mut self, max_depth: usize, depth: usize) {
        let c = self.bounds.centre();
        let min = self.bounds.min;
        let max = self.bounds.max;

        // Build the eight octant AABBs around the centre point.
        let octants = [
            Aabb::new(min, c),
            Aabb::new(Point3::new(c.x, min.y, min.z), Point3::new(max.x, c.y, c.z)),
            Aabb::new(Point3::new(min.x, c.y, min.z), Point3::new(c.x, max.y, c.z)),
            Aabb::new(Point3::new(c.x, c.y, min.z), Point3::new(max.x, max.y, c.z)),
            Aabb::new(Point3::new(min.x, min.y, c.z), Point3::new(c.x, c.y, max.z)),
            Aabb::new(Point3::new(c.x, min.y, c.z), Point3::new(max.x, c.y, max.z)),
            Aabb::new(Point3::new(min.x, c.y, c.z), Point3::new(c.x, max.y, max.z)),
            Aabb::new(c, max),
        ];

        let cap = self.capacity;
        let mut children = Box::new(octants.map(|b| OctreeNode::new(b, cap)));

        let entries = std::mem::take(&mut self.entries);
        for e in entries {
            if let Some(child) = children.iter_mut().find(|c| c.bounds.contains_point(e.point)) {
                child.insert(e, max_depth, depth + 1);
            }
        }

        self.children = Some(children);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tree(capacity: usize) -> Octree {
        Octree::new(
            Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
            capacity,
        )
    }

    /// Deterministic pseudo-random points in `[0, 1)^3`.
    fn scattered(n: usize) -> Vec<Point3> {
        let mut state = 0x2545_f491_u32;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 10_000) as f32 / 10_000.0
        };
        (0..n).map(|_| Point3::new(next(), next(), next())).collect()
    }

    #[test]
    fn empty_tree_finds_nothing() {
        let tree = unit_tree(4);
        assert!(tree.is_empty());
        assert!(tree.within_radius(Point3::new(0.5, 0.5, 0.5), 1.0).is_empty());
        assert!(tree.nearest(Point3::new(0.5, 0.5, 0.5), 3).is_empty());
    }

    #[test]
    fn insert_outside_bounds_is_ignored() {
        let mut tree = unit_tree(4);
        assert!(!tree.insert(Point3::new(5.0, 5.0, 5.0), 0)); // outside [0,1]^3
        assert!(tree.is_empty());
    }

    #[test]
    fn subdivision_preserves_all_points() {
        // capacity=2 → subdivision triggered on 3rd insert
        let mut tree = unit_tree(2);
        let pts = [
            Point3::new(0.1, 0.1, 0.1),
            Point3::new(0.9, 0.9, 0.9),
            Point3::new(0.2, 0.8, 0.3),
            Point3::new(0.7, 0.2, 0.6),
        ];
        for (i, &p) in pts.iter().enumerate() {
            assert!(tree.insert(p, i));
        }
        assert_eq!(tree.len(), 4);
        let mut all: Vec<usize> = tree
            .within_radius(Point3::new(0.5, 0.5, 0.5), 2.0)
            .iter()
            .map(|n| n.index)
            .collect();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3]);
    }

    #[test]
    fn duplicate_points_beyond_capacity_are_kept() {
        // Identical points cannot be separated; max_depth bounds the recursion.
        let pts = vec![Point3::new(0.5, 0.5, 0.5); 100];
        let tree = Octree::from_points(&pts);
        assert_eq!(tree.len(), 100);
        assert_eq!(tree.within_radius(Point3::new(0.5, 0.5, 0.5), 0.0).len(), 100);
    }

    #[test]
    fn radius_query_matches_brute_force() {
        let pts = scattered(2_000);
        let tree = Octree::from_points(&pts);
        let centre = Point3::new(0.4, 0.6, 0.5);
        let r = 0.15;

        let mut got: Vec<usize> = tree.within_radius(centre, r).iter().map(|n| n.index).collect();
        got.sort_unstable();
        let expected: Vec<usize> = (0..pts.len())
            .filter(|&i| pts[i].distance_squared(centre) <= r * r)
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn nearest_matches_brute_force() {
        let pts = scattered(1_500);
        let tree = Octree::from_points(&pts);
        let query = Point3::new(0.25, 0.75, 0.1);

        let got = tree.nearest(query, 10);
        let mut expected: Vec<(f32, usize)> = pts
            .iter()
            .enumerate()
            .map(|(i, p)| (p.distance_squared(query), i))
            .collect();
        expected.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        assert_eq!(got.len(), 10);
        for (hit, (d2, i)) in got.iter().zip(expected.iter()) {
            assert_eq!(hit.index, *i);
            assert!((hit.distance_squared - d2).abs() < 1e-9);
        }
    }

    #[test]
    fn nearest_returns_all_when_k_exceeds_len() {
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
        ];
        let tree = Octree::from_points(&pts);
        let got = tree.nearest(Point3::new(0.9, 0.0, 0.0), 10);
        let order: Vec<usize> = got.iter().map(|n| n.index).collect();
        assert_eq!(order, vec![1, 0, 2]);
    }

    #[test]
    fn flat_cloud_is_indexable() {
        // All points on z = 0: the root box has zero thickness.
        let pts: Vec<Point3> = (0..400)
            .map(|i| Point3::new((i % 20) as f32 * 0.05, (i / 20) as f32 * 0.05, 0.0))
            .collect();
        let tree = Octree::from_points(&pts);
        assert_eq!(tree.len(), 400);
        // Grid neighbours at 0.05: the point itself plus four axis neighbours.
        let hits = tree.within_radius(pts[210], 0.051);
        assert_eq!(hits.len(), 5);
    }
}
