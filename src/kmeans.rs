//! K-means pixel clustering.
//!
//! Every driver repeats one assignment pass until the centroids stop moving at
//! integer-truncated precision or the iteration budget runs out; they differ
//! only in how a pass finds the nearest cluster. Initial centroids are drawn
//! from distinct uniformly-random pixels, so all drivers produce identical
//! results for an image, `k` and seed up to distance ties.

use crate::assign::{cached_pass, kdtree_pass, scan_pass};
use crate::registry::ClusterRegistry;
use crate::types::{ClusterCount, ImageSlice, SegmentError, SegmentOutput};

use bitvec::prelude::*;
use rand::{prelude::Distribution, SeedableRng};
use rand_distr::Uniform;
use rand_xoshiro::Xoroshiro128PlusPlus;

/// A builder struct to specify the parameters for the k-means drivers.
///
/// # Examples
/// ```
/// # use segmette::KmeansOptions;
/// let options = KmeansOptions::new()
///     .max_iterations(20)
///     .seed(42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KmeansOptions {
    /// The maximum number of assignment passes.
    pub(crate) max_iterations: u32,
    /// The seed value for the random number generator.
    pub(crate) seed: u64,
}

impl Default for KmeansOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl KmeansOptions {
    /// Creates a new [`KmeansOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self { max_iterations: 10, seed: 0 }
    }

    /// Sets the maximum number of assignment passes.
    ///
    /// The driver stops earlier if an entire pass leaves every centroid
    /// unchanged at integer precision. The default is `10`.
    #[must_use]
    pub const fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
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

/// How a pass finds the nearest cluster for a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    /// Linear scan over the live clusters.
    Scan,
    /// Kd-tree over the centroids, rebuilt each pass.
    KdTree,
    /// Previous assignment reused when still at least as close.
    Cached,
}

/// Segments `image` into `k` clusters with linear-scan k-means.
///
/// # Errors
/// Returns a [`SegmentError`] if `k` is zero, the image is empty, or `k`
/// exceeds the number of pixels.
pub fn segment(
    image: ImageSlice<'_>,
    k: ClusterCount,
    options: &KmeansOptions,
) -> Result<SegmentOutput, SegmentError> {
    run(image, k, options, Strategy::Scan)
}

/// Segments `image` into `k` clusters with kd-tree-accelerated k-means.
///
/// Same fixed point as [`segment`]; each pass queries a kd-tree instead of
/// scanning every cluster, O(pixels·log k) expected.
///
/// # Errors
/// Returns a [`SegmentError`] under the same conditions as [`segment`].
pub fn segment_kdtree(
    image: ImageSlice<'_>,
    k: ClusterCount,
    options: &KmeansOptions,
) -> Result<SegmentOutput, SegmentError> {
    run(image, k, options, Strategy::KdTree)
}

/// Segments `image` into `k` clusters with locality-cached k-means.
///
/// From the third pass onward a pixel keeps its previous cluster whenever that
/// cluster is still at least as close as it was, skipping the scan for most
/// pixels once assignments settle. Early-pass labelings can differ from
/// [`segment`]'s, but the fixed point is the same.
///
/// # Errors
/// Returns a [`SegmentError`] under the same conditions as [`segment`].
pub fn segment_cached(
    image: ImageSlice<'_>,
    k: ClusterCount,
    options: &KmeansOptions,
) -> Result<SegmentOutput, SegmentError> {
    run(image, k, options, Strategy::Cached)
}

/// Shared driver: seed centroids, then iterate the chosen pass to convergence.
fn run(
    image: ImageSlice<'_>,
    k: ClusterCount,
    options: &KmeansOptions,
    strategy: Strategy,
) -> Result<SegmentOutput, SegmentError> {
    let centroids = initial_centroids(image, k, options.seed)?;
    let mut registry = registry_from_centroids(image.depth(), k, &centroids);
    Ok(drive(image, &mut registry, options.max_iterations, strategy))
}

/// Draws `k` initial centroids from distinct uniformly-random pixels.
pub(crate) fn initial_centroids(
    image: ImageSlice<'_>,
    k: ClusterCount,
    seed: u64,
) -> Result<Vec<Vec<u8>>, SegmentError> {
    let k = usize::from(k.into_inner());
    if k == 0 {
        return Err(SegmentError::ZeroClusters);
    }
    let pixels = image.num_pixels() as usize;
    if pixels == 0 {
        return Err(SegmentError::EmptyImage);
    }
    if k > pixels {
        #[allow(clippy::cast_possible_truncation)]
        let clusters = k as u16;
        return Err(SegmentError::NotEnoughPixels { pixels: image.num_pixels(), clusters });
    }

    let rng = &mut Xoroshiro128PlusPlus::seed_from_u64(seed);
    let distribution = Uniform::new(0, pixels);
    let mut taken = bitvec![0; pixels];

    let mut centroids = Vec::with_capacity(k);
    while centroids.len() < k {
        let p = distribution.sample(rng);
        if taken[p] {
            continue;
        }
        taken.set(p, true);

        let mut value = vec![0; image.depth()];
        image.copy_pixel(p, &mut value);
        centroids.push(value);
    }
    Ok(centroids)
}

/// Fills a fresh registry with the given centroids in slots `0..k`.
pub(crate) fn registry_from_centroids(
    depth: usize,
    k: ClusterCount,
    centroids: &[Vec<u8>],
) -> ClusterRegistry {
    let mut registry = ClusterRegistry::new(k.into_inner(), depth);
    for (id, centroid) in centroids.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let id = id as u16;
        registry.add_cluster(id, centroid);
    }
    registry
}

/// Repeats the chosen pass until convergence or the iteration budget, then
/// collects the final assignment. Reaching the budget is normal termination.
pub(crate) fn drive(
    image: ImageSlice<'_>,
    registry: &mut ClusterRegistry,
    max_iterations: u32,
    strategy: Strategy,
) -> SegmentOutput {
    let pixels = image.num_pixels() as usize;
    let mut labels = vec![0u16; pixels];
    let mut cache = match strategy {
        Strategy::Cached => vec![0u64; pixels],
        Strategy::Scan | Strategy::KdTree => Vec::new(),
    };

    let mut iteration = 0;
    let mut converged = false;
    while iteration < max_iterations && !converged {
        match strategy {
            Strategy::Scan => scan_pass(image, registry, &mut labels),
            Strategy::KdTree => kdtree_pass(image, registry, &mut labels),
            Strategy::Cached => {
                cached_pass(image, registry, &mut labels, &mut cache, iteration);
            }
        }
        converged = registry.has_converged();
        registry.restart();
        iteration += 1;
    }

    registry.to_output(labels)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tests::{three_blob_image, two_band_image};

    /// (centroid, count) pairs sorted by centroid, for order-free comparison.
    fn sorted_clusters(output: &SegmentOutput) -> Vec<(Vec<u8>, u32)> {
        let mut clusters = output
            .centroids
            .chunks_exact(output.depth)
            .zip(&output.counts)
            .map(|(centroid, &count)| (centroid.to_vec(), count))
            .collect::<Vec<_>>();
        clusters.sort();
        clusters
    }

    #[test]
    fn two_bands_with_one_seed_per_band() {
        let image = two_band_image();

        for (low, high) in [(10u8, 200u8), (200, 10)] {
            let centroids = vec![vec![low], vec![high]];
            let mut registry = registry_from_centroids(1, ClusterCount::from(2), &centroids);
            let output = drive(image.as_slice(), &mut registry, 10, Strategy::Scan);

            assert_eq!(sorted_clusters(&output), vec![(vec![10], 8), (vec![200], 8)]);
        }
    }

    #[test]
    fn two_bands_from_any_seed_pixels() {
        // both seeds in one band still separate within three passes: the idle
        // cluster keeps its centroid and captures its band on the next pass
        type Driver =
            fn(ImageSlice<'_>, ClusterCount, &KmeansOptions) -> Result<SegmentOutput, SegmentError>;

        let image = two_band_image();
        for seed in 0..8 {
            for run in [segment as Driver, segment_kdtree, segment_cached] {
                let options = KmeansOptions::new().seed(seed);
                let output = run(image.as_slice(), ClusterCount::from(2), &options).unwrap();
                assert_eq!(sorted_clusters(&output), vec![(vec![10], 8), (vec![200], 8)]);
            }
        }
    }

    #[test]
    fn strategies_share_a_fixed_point() {
        let image = three_blob_image();
        let centroids = vec![vec![10; 3], vec![120; 3], vec![240; 3]];
        let expected = vec![
            (vec![12, 12, 12], 3),
            (vec![122, 122, 122], 3),
            (vec![242, 242, 242], 3),
        ];

        let mut outputs = Vec::new();
        for strategy in [Strategy::Scan, Strategy::KdTree, Strategy::Cached] {
            let mut registry = registry_from_centroids(3, ClusterCount::from(3), &centroids);
            let output = drive(image.as_slice(), &mut registry, 100, strategy);
            assert_eq!(sorted_clusters(&output), expected);
            outputs.push(output);
        }

        // the fixture has no distance ties, so even the labels agree
        assert_eq!(outputs[0], outputs[1]);
        assert_eq!(outputs[0], outputs[2]);
    }

    #[test]
    fn seeds_are_distinct_pixels() {
        // k equals the pixel count, so every pixel must be chosen exactly once
        let image = crate::tests::planar_image(vec![1, 2, 3, 4], 2, 2, 1);
        let mut centroids = initial_centroids(image.as_slice(), ClusterCount::from(4), 99).unwrap();
        centroids.sort();
        assert_eq!(centroids, vec![vec![1], vec![2], vec![3], vec![4]]);
    }

    #[test]
    fn degenerate_parameters_are_errors() {
        let image = two_band_image();
        let options = KmeansOptions::new();

        assert_eq!(
            segment(image.as_slice(), ClusterCount::from(0), &options),
            Err(SegmentError::ZeroClusters)
        );
        assert_eq!(
            segment(image.as_slice(), ClusterCount::from_clamped(17), &options),
            Err(SegmentError::NotEnoughPixels { pixels: 16, clusters: 17 })
        );

        let empty = crate::ImageSlice::new(&[], 0, 0, 1).unwrap();
        assert_eq!(
            segment(empty, ClusterCount::from(1), &options),
            Err(SegmentError::EmptyImage)
        );
    }

    #[test]
    fn counts_match_labels() {
        let image = two_band_image();
        let options = KmeansOptions::new().seed(3);
        let output = segment(image.as_slice(), ClusterCount::from(2), &options).unwrap();

        let mut counts = vec![0u32; output.counts.len()];
        for &label in &output.labels {
            counts[usize::from(label)] += 1;
        }
        assert_eq!(counts, output.counts);
    }

    #[test]
    fn default_options() {
        let options = KmeansOptions::default();
        assert_eq!(options, KmeansOptions::new());
        assert_eq!(options.max_iterations, 10);
        assert_eq!(options.seed, 0);
    }
}
