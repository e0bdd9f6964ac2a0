//! A dynamic kd-tree over cluster centroids.
//!
//! Nodes live in an arena and keep the owning cluster's id next to a copy of
//! its centroid taken at insertion time, so a query hit maps straight back to
//! a registry slot. The tree is never rebalanced: the only shape heuristic is
//! that a new node splits on the dimension of largest extent of the bounds
//! shrunk along its insertion path, so insertion order affects shape and
//! worst-case query cost. There is no deletion; assignment passes rebuild the
//! tree from the current centroids instead.

use crate::stats::squared_distance;

/// Child link value for "no child".
const NONE: u32 = u32::MAX;

/// One arena node; the point itself lives in [`KdTree::points`].
#[derive(Clone, Copy)]
struct Node {
    /// Cluster id handed back by queries.
    id: u16,
    /// The dimension this node splits on.
    split: usize,
    /// Arena index of the left child, or [`NONE`].
    left: u32,
    /// Arena index of the right child, or [`NONE`].
    right: u32,
}

/// Running best candidate of a nearest-neighbor query.
struct Best {
    /// Squared distance to the best point seen so far.
    dist: u64,
    /// Cluster id of the best point seen so far.
    id: u16,
}

/// A kd-tree over `dimension`-length `u8` vectors inside an axis-aligned
/// bounding hyperrectangle.
pub(crate) struct KdTree {
    /// Number of values per point.
    dimension: usize,
    /// Lower bound of the root hyperrectangle, per dimension.
    bound_min: Vec<u8>,
    /// Upper bound of the root hyperrectangle, per dimension.
    bound_max: Vec<u8>,
    /// Node arena; the first insertion is the root.
    nodes: Vec<Node>,
    /// Flat point storage, `dimension` values per node.
    points: Vec<u8>,
}

impl KdTree {
    /// Creates an empty tree over the given bounding hyperrectangle.
    pub(crate) fn new(dimension: usize, bound_min: Vec<u8>, bound_max: Vec<u8>) -> Self {
        assert_eq!(bound_min.len(), dimension);
        assert_eq!(bound_max.len(), dimension);
        Self {
            dimension,
            bound_min,
            bound_max,
            nodes: Vec::new(),
            points: Vec::new(),
        }
    }

    /// The point stored at arena index `node`.
    fn point(&self, node: u32) -> &[u8] {
        let start = node as usize * self.dimension;
        &self.points[start..start + self.dimension]
    }

    /// The dimension of largest extent of the given bounds.
    fn widest_dimension(min: &[u8], max: &[u8]) -> usize {
        let mut widest = 0;
        let mut extent = i16::from(max[0]) - i16::from(min[0]);
        for (d, (&lo, &hi)) in min.iter().zip(max).enumerate().skip(1) {
            let e = i16::from(hi) - i16::from(lo);
            if e > extent {
                extent = e;
                widest = d;
            }
        }
        widest
    }

    /// Inserts `value` under cluster id `id`.
    ///
    /// Descends comparing `value` to each node on that node's split dimension
    /// (left on less-or-equal, right otherwise), shrinking a scratch copy of
    /// the root bounds as it goes; the new node splits on the widest dimension
    /// of the shrunk bounds.
    pub(crate) fn insert(&mut self, id: u16, value: &[u8]) {
        assert_eq!(value.len(), self.dimension);

        let mut min = self.bound_min.clone();
        let mut max = self.bound_max.clone();

        #[allow(clippy::cast_possible_truncation)]
        let new_index = self.nodes.len() as u32;

        if !self.nodes.is_empty() {
            let mut current = 0u32;
            loop {
                let Node { split, left, right, .. } = self.nodes[current as usize];
                let node_value = self.points[current as usize * self.dimension + split];
                if value[split] <= node_value {
                    max[split] = node_value;
                    if left == NONE {
                        self.nodes[current as usize].left = new_index;
                        break;
                    }
                    current = left;
                } else {
                    min[split] = node_value;
                    if right == NONE {
                        self.nodes[current as usize].right = new_index;
                        break;
                    }
                    current = right;
                }
            }
        }

        let split = Self::widest_dimension(&min, &max);
        self.nodes.push(Node { id, split, left: NONE, right: NONE });
        self.points.extend_from_slice(value);
    }

    /// Returns the id of the nearest inserted point and its squared distance,
    /// or `None` if the tree is empty.
    pub(crate) fn nearest_neighbor(&self, target: &[u8]) -> Option<(u16, u64)> {
        if self.nodes.is_empty() {
            return None;
        }
        assert_eq!(target.len(), self.dimension);

        let mut min = self.bound_min.clone();
        let mut max = self.bound_max.clone();
        let mut best = Best { dist: u64::MAX, id: 0 };
        self.nearest_rec(0, target, &mut min, &mut max, &mut best);
        Some((best.id, best.dist))
    }

    /// Recursive descent: near child first, then the far child if its
    /// hyperrectangle can still contain a closer point, then this node.
    /// A candidate replaces the best only on strictly smaller distance.
    fn nearest_rec(
        &self,
        current: u32,
        target: &[u8],
        min: &mut [u8],
        max: &mut [u8],
        best: &mut Best,
    ) {
        let Node { id, split, left, right } = self.nodes[current as usize];
        let node_value = self.point(current)[split];
        let dist = squared_distance(target, self.point(current));

        let (near, far, near_is_left) = if target[split] <= node_value {
            (left, right, true)
        } else {
            (right, left, false)
        };

        if near != NONE {
            if near_is_left {
                let saved = max[split];
                max[split] = node_value;
                self.nearest_rec(near, target, min, max, best);
                max[split] = saved;
            } else {
                let saved = min[split];
                min[split] = node_value;
                self.nearest_rec(near, target, min, max, best);
                min[split] = saved;
            }
        }

        if far != NONE {
            if near_is_left {
                let saved = min[split];
                min[split] = node_value;
                if sphere_intersects(min, max, best.dist, target) {
                    self.nearest_rec(far, target, min, max, best);
                }
                min[split] = saved;
            } else {
                let saved = max[split];
                max[split] = node_value;
                if sphere_intersects(min, max, best.dist, target) {
                    self.nearest_rec(far, target, min, max, best);
                }
                max[split] = saved;
            }
        }

        if dist < best.dist {
            best.dist = dist;
            best.id = id;
        }
    }
}

/// Whether the hyperrectangle `[min, max]` intersects the sphere of squared
/// radius `radius_squared` around `target`: clamp the target into the
/// rectangle and compare the squared distance to the clamped point.
/// Deliberately conservative; equality counts as an intersection.
fn sphere_intersects(min: &[u8], max: &[u8], radius_squared: u64, target: &[u8]) -> bool {
    let mut sum = 0u64;
    for ((&t, &lo), &hi) in target.iter().zip(min).zip(max) {
        let clamped = t.clamp(lo, hi);
        let diff = i64::from(t) - i64::from(clamped);
        #[allow(clippy::cast_sign_loss)] // square
        {
            sum += (diff * diff) as u64;
        }
    }
    sum <= radius_squared
}
