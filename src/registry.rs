//! A slot-based store of clusters and their running statistics.
//!
//! A cluster id is its slot index. Slots are never compacted: removing a
//! cluster frees its slot, and [`ClusterRegistry::next_free_id`] hands out the
//! lowest free slot, so ids freed in one isodata round can be reused in the
//! next without disturbing the ascending scan order the phases rely on.

use crate::stats::{update_mean, update_std_dev};
use crate::SegmentOutput;

/// One live cluster.
#[derive(Debug, Clone, PartialEq)]
struct Slot {
    /// Integer centroid; the truncation of the running mean at the last
    /// restart boundary.
    centroid: Vec<u8>,
    /// Running per-channel mean of the samples fed since the last restart.
    mean: Vec<f64>,
    /// Running per-channel standard deviation since the last restart.
    std_dev: Vec<f64>,
    /// Number of samples fed since the last restart.
    count: u32,
}

/// A fixed-capacity slot array of clusters.
///
/// Capacity is `2k + 2` for a target count of `k`, leaving room for the
/// transient clusters an isodata split creates before the parent is removed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ClusterRegistry {
    /// Number of channels per centroid.
    depth: usize,
    /// The slot array; `None` slots are free.
    slots: Vec<Option<Slot>>,
}

impl ClusterRegistry {
    /// Creates an empty registry sized for `target_clusters` clusters.
    pub(crate) fn new(target_clusters: u16, depth: usize) -> Self {
        let capacity = 2 * usize::from(target_clusters) + 2;
        Self { depth, slots: vec![None; capacity] }
    }

    /// Returns the lowest free slot id, or `None` if the registry is full.
    pub(crate) fn next_free_id(&self) -> Option<u16> {
        #[allow(clippy::cast_possible_truncation)]
        {
            self.slots
                .iter()
                .position(Option::is_none)
                .map(|id| id as u16)
        }
    }

    /// Creates a cluster in slot `id` with the given centroid and zeroed
    /// statistics. Panics if the slot is occupied.
    pub(crate) fn add_cluster(&mut self, id: u16, centroid: &[u8]) {
        assert_eq!(centroid.len(), self.depth);
        let slot = &mut self.slots[usize::from(id)];
        assert!(slot.is_none(), "cluster slot {id} is already occupied");
        *slot = Some(Slot {
            centroid: centroid.to_vec(),
            mean: vec![0.0; self.depth],
            std_dev: vec![0.0; self.depth],
            count: 0,
        });
    }

    /// Frees slot `id`. A no-op on an already free slot; other slots keep
    /// their ids.
    pub(crate) fn remove_cluster(&mut self, id: u16) {
        self.slots[usize::from(id)] = None;
    }

    /// Whether slot `id` holds a live cluster.
    pub(crate) fn is_active(&self, id: u16) -> bool {
        self.slots[usize::from(id)].is_some()
    }

    /// Feeds one sample into cluster `id`'s running statistics.
    /// A no-op on a free slot.
    pub(crate) fn accumulate(&mut self, id: u16, value: &[u8]) {
        let Some(slot) = &mut self.slots[usize::from(id)] else {
            return;
        };
        debug_assert_eq!(value.len(), slot.mean.len());
        for (c, &v) in value.iter().enumerate() {
            let mean_before = slot.mean[c];
            let mean_after = update_mean(mean_before, slot.count, f64::from(v));
            slot.std_dev[c] = update_std_dev(slot.std_dev[c], slot.count, mean_before, mean_after);
            slot.mean[c] = mean_after;
        }
        slot.count += 1;
    }

    /// Ends a pass: every cluster that received samples takes the truncation
    /// of its running mean as its new centroid, and all statistics reset to
    /// zero. Clusters that received nothing keep their centroids; their mean
    /// was never fed and is not read.
    pub(crate) fn restart(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            if slot.count > 0 {
                for (centroid, &mean) in slot.centroid.iter_mut().zip(&slot.mean) {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    {
                        // means of u8 samples stay within [0, 255]
                        *centroid = mean as u8;
                    }
                }
            }
            slot.mean.fill(0.0);
            slot.std_dev.fill(0.0);
            slot.count = 0;
        }
    }

    /// Whether the last pass moved nothing: every cluster that received
    /// samples already has the truncation of its running mean as its centroid.
    pub(crate) fn has_converged(&self) -> bool {
        self.slots.iter().flatten().all(|slot| {
            slot.count == 0
                || slot
                    .centroid
                    .iter()
                    .zip(&slot.mean)
                    .all(|(&centroid, &mean)| {
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        {
                            centroid == mean as u8
                        }
                    })
        })
    }

    /// The ids of all live clusters, ascending.
    pub(crate) fn active_ids(&self) -> Vec<u16> {
        #[allow(clippy::cast_possible_truncation)]
        {
            self.slots
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.is_some())
                .map(|(id, _)| id as u16)
                .collect()
        }
    }

    /// Number of live clusters.
    pub(crate) fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Total number of slots.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of channels per centroid.
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// The live cluster in slot `id`; panics on a free slot.
    fn slot(&self, id: u16) -> &Slot {
        self.slots[usize::from(id)]
            .as_ref()
            .unwrap_or_else(|| panic!("cluster {id} is not active"))
    }

    /// The centroid of cluster `id`; panics on a free slot.
    pub(crate) fn centroid(&self, id: u16) -> &[u8] {
        &self.slot(id).centroid
    }

    /// The running mean of cluster `id`; panics on a free slot.
    pub(crate) fn mean(&self, id: u16) -> &[f64] {
        &self.slot(id).mean
    }

    /// The running standard deviation of cluster `id`; panics on a free slot.
    pub(crate) fn std_dev(&self, id: u16) -> &[f64] {
        &self.slot(id).std_dev
    }

    /// The sample count of cluster `id`; panics on a free slot.
    pub(crate) fn count(&self, id: u16) -> u32 {
        self.slot(id).count
    }

    /// Sets cluster `id`'s centroid to the truncation of its running mean
    /// without resetting statistics. Used when a split is kept, so the new
    /// clusters enter the next pass with centroids describing their members.
    pub(crate) fn set_centroid_from_mean(&mut self, id: u16) {
        let slot = self.slots[usize::from(id)]
            .as_mut()
            .unwrap_or_else(|| panic!("cluster {id} is not active"));
        for (centroid, &mean) in slot.centroid.iter_mut().zip(&slot.mean) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                *centroid = mean as u8;
            }
        }
    }

    /// Collects the final assignment: compacts live clusters into dense
    /// indices (ascending id order), remaps the labels, and recomputes counts
    /// from the labels themselves.
    ///
    /// Every label must reference a live cluster.
    pub(crate) fn to_output(&self, mut labels: Vec<u16>) -> SegmentOutput {
        let ids = self.active_ids();

        let mut remap = vec![0u16; self.slots.len()];
        for (dense, &id) in ids.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            {
                remap[usize::from(id)] = dense as u16;
            }
        }

        let mut centroids = Vec::with_capacity(ids.len() * self.depth);
        for &id in &ids {
            centroids.extend_from_slice(self.centroid(id));
        }

        for label in &mut labels {
            debug_assert!(self.is_active(*label));
            *label = remap[usize::from(*label)];
        }

        let mut counts = vec![0u32; ids.len()];
        for &label in &labels {
            counts[usize::from(label)] += 1;
        }

        SegmentOutput { centroids, counts, labels, depth: self.depth }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn capacity_leaves_room_for_transient_clusters() {
        let registry = ClusterRegistry::new(3, 1);
        assert_eq!(registry.capacity(), 8);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn next_free_id_is_lowest() {
        let mut registry = ClusterRegistry::new(2, 1);
        assert_eq!(registry.next_free_id(), Some(0));

        registry.add_cluster(0, &[1]);
        registry.add_cluster(1, &[2]);
        registry.add_cluster(2, &[3]);
        assert_eq!(registry.next_free_id(), Some(3));

        registry.remove_cluster(1);
        assert_eq!(registry.next_free_id(), Some(1));
        assert_eq!(registry.active_ids(), vec![0, 2]);
    }

    #[test]
    fn full_registry_has_no_free_id() {
        let mut registry = ClusterRegistry::new(0, 1);
        registry.add_cluster(0, &[1]);
        registry.add_cluster(1, &[2]);
        assert_eq!(registry.next_free_id(), None);
    }

    #[test]
    fn accumulate_and_restart_truncate_the_mean() {
        let mut registry = ClusterRegistry::new(1, 2);
        registry.add_cluster(0, &[0, 0]);

        registry.accumulate(0, &[10, 101]);
        registry.accumulate(0, &[11, 102]);
        assert_eq!(registry.count(0), 2);
        assert!((registry.mean(0)[0] - 10.5).abs() < 1e-12);

        registry.restart();
        assert_eq!(registry.centroid(0), &[10, 101]);
        assert_eq!(registry.count(0), 0);
        assert_eq!(registry.mean(0), &[0.0, 0.0]);
        assert_eq!(registry.std_dev(0), &[0.0, 0.0]);
    }

    #[test]
    fn restart_without_samples_keeps_centroids() {
        let mut registry = ClusterRegistry::new(2, 3);
        registry.add_cluster(0, &[5, 6, 7]);
        registry.add_cluster(3, &[200, 201, 202]);

        registry.restart();
        registry.restart();
        assert_eq!(registry.centroid(0), &[5, 6, 7]);
        assert_eq!(registry.centroid(3), &[200, 201, 202]);
    }

    #[test]
    fn convergence_at_truncated_precision() {
        let mut registry = ClusterRegistry::new(1, 1);
        registry.add_cluster(0, &[10]);

        // mean 10.5 truncates to the current centroid
        registry.accumulate(0, &[10]);
        registry.accumulate(0, &[11]);
        assert!(registry.has_converged());

        registry.restart();
        registry.accumulate(0, &[30]);
        assert!(!registry.has_converged());

        // restart adopted the new mean; empty clusters do not block convergence
        registry.restart();
        assert_eq!(registry.centroid(0), &[30]);
        registry.add_cluster(1, &[99]);
        registry.accumulate(0, &[30]);
        assert!(registry.has_converged());
    }

    #[test]
    fn accumulate_on_free_slot_is_a_no_op() {
        let mut registry = ClusterRegistry::new(1, 1);
        registry.add_cluster(0, &[1]);
        let before = registry.clone();
        registry.accumulate(3, &[100]);
        assert_eq!(registry, before);
    }

    #[test]
    #[should_panic(expected = "not active")]
    fn reading_a_free_slot_panics() {
        let registry = ClusterRegistry::new(1, 1);
        let _ = registry.centroid(0);
    }

    #[test]
    fn output_compacts_sparse_ids() {
        let mut registry = ClusterRegistry::new(2, 1);
        registry.add_cluster(1, &[10]);
        registry.add_cluster(3, &[20]);

        let output = registry.to_output(vec![3, 1, 3, 3]);
        assert_eq!(output.centroids, vec![10, 20]);
        assert_eq!(output.labels, vec![1, 0, 1, 1]);
        assert_eq!(output.counts, vec![1, 3]);
        assert_eq!(output.depth, 1);
    }
}
