//! One full-image assignment sweep per strategy.
//!
//! Every pass shares the same contract: visit pixels in raster order, find the
//! nearest live cluster by squared Euclidean distance, write its id into the
//! label buffer, and feed the pixel's raw channel vector back into that
//! cluster's running statistics. Centroids read during a pass are the ones
//! produced by the last restart; new values only take effect next pass.

use crate::kdtree::KdTree;
use crate::registry::ClusterRegistry;
use crate::stats::squared_distance;
use crate::types::ImageSlice;
use crate::{MAX_CHANNEL, MIN_CHANNEL};

/// Nearest live cluster to `pixel` by linear scan over `active`, which must be
/// ascending and non-empty. Ties go to the earliest candidate: a later cluster
/// replaces the best only on strictly smaller distance.
pub(crate) fn nearest_active(
    registry: &ClusterRegistry,
    active: &[u16],
    pixel: &[u8],
) -> (u16, u64) {
    let mut best_id = active[0];
    let mut best = squared_distance(pixel, registry.centroid(best_id));
    for &id in &active[1..] {
        let dist = squared_distance(pixel, registry.centroid(id));
        if dist < best {
            best = dist;
            best_id = id;
        }
    }
    (best_id, best)
}

/// Linear-scan pass: every pixel is compared against every live cluster.
pub(crate) fn scan_pass(image: ImageSlice<'_>, registry: &mut ClusterRegistry, labels: &mut [u16]) {
    let active = registry.active_ids();
    assert!(!active.is_empty(), "assignment requires a live cluster");

    let mut pixel = vec![0; image.depth()];
    for (p, label) in labels.iter_mut().enumerate() {
        image.copy_pixel(p, &mut pixel);
        let (id, _) = nearest_active(registry, &active, &pixel);
        *label = id;
        registry.accumulate(id, &pixel);
    }
}

/// Kd-tree pass: the index is rebuilt from the current centroids at the start
/// of every pass (centroids move between passes and the tree has no deletion),
/// then queried once per pixel.
pub(crate) fn kdtree_pass(
    image: ImageSlice<'_>,
    registry: &mut ClusterRegistry,
    labels: &mut [u16],
) {
    let active = registry.active_ids();
    assert!(!active.is_empty(), "assignment requires a live cluster");

    let depth = image.depth();
    let mut tree = KdTree::new(depth, vec![MIN_CHANNEL; depth], vec![MAX_CHANNEL; depth]);
    for &id in &active {
        tree.insert(id, registry.centroid(id));
    }

    let mut pixel = vec![0; depth];
    for (p, label) in labels.iter_mut().enumerate() {
        image.copy_pixel(p, &mut pixel);
        if let Some((id, _)) = tree.nearest_neighbor(&pixel) {
            *label = id;
            registry.accumulate(id, &pixel);
        }
    }
}

/// Locality-cached pass, valid from the third pass (`pass >= 2`) onward.
///
/// The first two passes run the full scan and seed `labels` and `cache` (the
/// squared distance each pixel had to its cluster). Later passes first check
/// whether the pixel's previous cluster is still at least as close as the
/// cached distance; if so the assignment is kept without scanning (and without
/// refreshing the cache), otherwise the full scan runs for that pixel only.
pub(crate) fn cached_pass(
    image: ImageSlice<'_>,
    registry: &mut ClusterRegistry,
    labels: &mut [u16],
    cache: &mut [u64],
    pass: u32,
) {
    let active = registry.active_ids();
    assert!(!active.is_empty(), "assignment requires a live cluster");

    let mut pixel = vec![0; image.depth()];
    for p in 0..labels.len() {
        image.copy_pixel(p, &mut pixel);

        let mut kept = None;
        if pass >= 2 {
            let previous = labels[p];
            let dist = squared_distance(&pixel, registry.centroid(previous));
            if dist <= cache[p] {
                kept = Some(previous);
            }
        }

        let id = if let Some(id) = kept {
            id
        } else {
            let (id, dist) = nearest_active(registry, &active, &pixel);
            labels[p] = id;
            cache[p] = dist;
            id
        };
        registry.accumulate(id, &pixel);
    }
}
