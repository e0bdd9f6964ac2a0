//! Isodata pixel clustering.
//!
//! Each round runs a bounded inner k-means loop, then mutates the cluster set:
//! clusters with too few pixels are discarded, clusters whose centroids sit
//! too close together are merged, and a cluster spread too wide along one
//! channel is split in two. Rounds repeat until nothing changes registry-wide
//! or the round budget runs out. Candidate scans for merge and split walk ids
//! in ascending order; that order decides which mutation happens first and is
//! what makes runs reproducible.

use crate::assign::{nearest_active, scan_pass};
use crate::kmeans::{initial_centroids, registry_from_centroids};
use crate::registry::ClusterRegistry;
use crate::stats::{mean_distance, truncated_distance};
use crate::types::{ClusterCount, ImageSlice, SegmentError, SegmentOutput};

/// A builder struct to specify the parameters for the isodata driver.
///
/// # Examples
/// ```
/// # use segmette::IsodataOptions;
/// let options = IsodataOptions::new()
///     .min_distance(12.0)
///     .min_elements(20)
///     .max_std_dev(30.0)
///     .seed(42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsodataOptions {
    /// Centroids closer than this merge.
    pub(crate) min_distance: f64,
    /// Clusters with fewer elements are discarded.
    pub(crate) min_elements: u32,
    /// A per-channel standard deviation above this triggers a split.
    pub(crate) max_std_dev: f64,
    /// Assignment passes per round.
    pub(crate) inner_iterations: u32,
    /// Merges allowed per round.
    pub(crate) merge_budget: u32,
    /// Overall round budget.
    pub(crate) max_rounds: u32,
    /// The seed value for the random number generator.
    pub(crate) seed: u64,
}

impl Default for IsodataOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl IsodataOptions {
    /// Creates a new [`IsodataOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_distance: 10.0,
            min_elements: 10,
            max_std_dev: 15.0,
            inner_iterations: 10,
            merge_budget: 2,
            max_rounds: 10,
            seed: 0,
        }
    }

    /// Sets the minimum inter-centroid distance.
    ///
    /// The merge phase joins the first cluster pair whose centroids lie closer
    /// than this (Euclidean distance truncated to a whole number), and a split
    /// is undone when its two halves end up closer than `1.1` times this.
    /// The default is `10.0`.
    #[must_use]
    pub const fn min_distance(mut self, min_distance: f64) -> Self {
        self.min_distance = min_distance;
        self
    }

    /// Sets the minimum number of elements per cluster; the discard phase
    /// deletes clusters below it. The default is `10`.
    #[must_use]
    pub const fn min_elements(mut self, min_elements: u32) -> Self {
        self.min_elements = min_elements;
        self
    }

    /// Sets the per-channel standard deviation above which a cluster is split.
    ///
    /// [`channel_std_dev`](crate::channel_std_dev) of the whole image gives a
    /// useful scale for this threshold. The default is `15.0`.
    #[must_use]
    pub const fn max_std_dev(mut self, max_std_dev: f64) -> Self {
        self.max_std_dev = max_std_dev;
        self
    }

    /// Sets the number of assignment passes per round. The default is `10`.
    #[must_use]
    pub const fn inner_iterations(mut self, inner_iterations: u32) -> Self {
        self.inner_iterations = inner_iterations;
        self
    }

    /// Sets the number of merges allowed per round. The default is `2`.
    #[must_use]
    pub const fn merge_budget(mut self, merge_budget: u32) -> Self {
        self.merge_budget = merge_budget;
        self
    }

    /// Sets the overall round budget. Reaching it is normal termination and
    /// produces the current assignment. The default is `10`.
    #[must_use]
    pub const fn max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Sets the seed value for the random number generator.
    ///
    /// The default seed is `0`.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Segments `image` with isodata clustering, self-tuning the cluster count
/// around the target `k`.
///
/// # Errors
/// Returns a [`SegmentError`] if `k` is zero, the image is empty, `k` exceeds
/// the number of pixels, or the discard phase empties the registry
/// (`min_elements` too high for this image).
pub fn segment(
    image: ImageSlice<'_>,
    k: ClusterCount,
    options: &IsodataOptions,
) -> Result<SegmentOutput, SegmentError> {
    let centroids = initial_centroids(image, k, options.seed)?;
    let mut registry = registry_from_centroids(image.depth(), k, &centroids);
    drive(image, &mut registry, k, options)
}

/// The round loop, starting from an already seeded registry.
pub(crate) fn drive(
    image: ImageSlice<'_>,
    registry: &mut ClusterRegistry,
    k: ClusterCount,
    options: &IsodataOptions,
) -> Result<SegmentOutput, SegmentError> {
    let k = usize::from(k.into_inner());
    let mut labels = vec![0u16; image.num_pixels() as usize];

    let mut round = 0;
    let mut changed = true;
    while round < options.max_rounds && changed {
        // inner assignment: restart only between consecutive passes, so the
        // statistics the later phases read are the ones the last pass built
        let mut inner = 0;
        let mut drifting = true;
        while inner < options.inner_iterations && drifting {
            if inner > 0 {
                registry.restart();
            }
            scan_pass(image, registry, &mut labels);
            drifting = !registry.has_converged();
            inner += 1;
        }

        let mut mutated = false;

        for id in registry.active_ids() {
            if registry.count(id) < options.min_elements {
                registry.remove_cluster(id);
                mutated = true;
            }
        }
        if registry.active_count() == 0 {
            return Err(SegmentError::NoActiveClusters);
        }

        if registry.active_count() >= 2 * k {
            mutated |= merge_phase(
                image,
                registry,
                &mut labels,
                options.min_distance,
                options.merge_budget,
            );
        }

        let count = registry.active_count();
        if count <= k / 2 || (round % 2 == 1 && count < 2 * k) {
            mutated |= split_phase(
                image,
                registry,
                &mut labels,
                options.min_distance,
                options.max_std_dev,
            );
        }

        changed = mutated || !registry.has_converged();
        round += 1;
    }

    // a discard in the final round can leave labels pointing at freed slots;
    // the run still has to produce the current assignment
    let active = registry.active_ids();
    if active.is_empty() {
        return Err(SegmentError::NoActiveClusters);
    }
    let mut pixel = vec![0; image.depth()];
    for (p, label) in labels.iter_mut().enumerate() {
        if !registry.is_active(*label) {
            image.copy_pixel(p, &mut pixel);
            let (id, _) = nearest_active(registry, &active, &pixel);
            *label = id;
        }
    }

    Ok(registry.to_output(labels))
}

/// Merges cluster pairs whose centroids lie closer than `min_distance`.
///
/// Pairs are scanned in ascending id order; on a hit, every pixel of the lower
/// id moves to the higher id (re-accumulating into the survivor), the lower id
/// is deleted, and the scan restarts from a fresh snapshot. Stops after
/// `merge_budget` merges or when no pair qualifies. Returns whether anything
/// merged.
pub(crate) fn merge_phase(
    image: ImageSlice<'_>,
    registry: &mut ClusterRegistry,
    labels: &mut [u16],
    min_distance: f64,
    merge_budget: u32,
) -> bool {
    let mut pixel = vec![0; image.depth()];
    let mut merges = 0;
    let mut merged_any = false;

    let mut mergeable = true;
    'merging: while merges < merge_budget && mergeable {
        mergeable = false;
        let ids = registry.active_ids();
        for (i, &low) in ids.iter().enumerate() {
            for &high in &ids[i + 1..] {
                let distance = truncated_distance(registry.centroid(low), registry.centroid(high));
                if distance < min_distance {
                    for (p, label) in labels.iter_mut().enumerate() {
                        if *label == low {
                            *label = high;
                            image.copy_pixel(p, &mut pixel);
                            registry.accumulate(high, &pixel);
                        }
                    }
                    registry.remove_cluster(low);
                    merges += 1;
                    merged_any = true;
                    mergeable = true;
                    continue 'merging;
                }
            }
        }
    }
    merged_any
}

/// Splits the first cluster (ascending ids) with a channel whose standard
/// deviation exceeds `max_std_dev`, partitioning its pixels at that channel's
/// mean. The split is undone if the two halves' means end up closer than
/// `1.1 * min_distance`, leaving registry and labels exactly as they were.
/// At most one split per call. Returns whether a split was kept.
pub(crate) fn split_phase(
    image: ImageSlice<'_>,
    registry: &mut ClusterRegistry,
    labels: &mut [u16],
    min_distance: f64,
    max_std_dev: f64,
) -> bool {
    let mut pixel = vec![0; image.depth()];

    for parent in registry.active_ids() {
        let Some(channel) = registry
            .std_dev(parent)
            .iter()
            .position(|&sd| sd > max_std_dev)
        else {
            continue;
        };
        let threshold = registry.mean(parent)[channel];

        let placeholder = registry.centroid(parent).to_vec();
        let first = next_free(registry);
        registry.add_cluster(first, &placeholder);
        let second = next_free(registry);
        registry.add_cluster(second, &placeholder);

        for (p, label) in labels.iter_mut().enumerate() {
            if *label == parent {
                image.copy_pixel(p, &mut pixel);
                let child = if f64::from(pixel[channel]) >= threshold {
                    first
                } else {
                    second
                };
                registry.accumulate(child, &pixel);
                *label = child;
            }
        }

        if mean_distance(registry.mean(first), registry.mean(second)) < 1.1 * min_distance {
            // undo: the parent was never touched, so deleting the halves and
            // restoring their labels recovers the pre-split state exactly
            registry.remove_cluster(first);
            registry.remove_cluster(second);
            for label in labels.iter_mut() {
                if *label == first || *label == second {
                    *label = parent;
                }
            }
            return false;
        }

        registry.remove_cluster(parent);
        registry.set_centroid_from_mean(first);
        registry.set_centroid_from_mean(second);
        return true;
    }
    false
}

/// The lowest free slot; the split gates keep at least two slots free, so an
/// exhausted registry here is a driver bug.
fn next_free(registry: &ClusterRegistry) -> u16 {
    registry
        .next_free_id()
        .unwrap_or_else(|| panic!("no free cluster slot for a split"))
}
