//! Outlier pruning and id compaction.

use std::collections::BTreeMap;

use hotspot_engine_models::OutlierConfig;
use hotspot_incident_models::{ClusterId, IncidentRecord, NOISE_CLUSTER};

use crate::density::haversine;

/// Labels after pruning plus how many members each cluster lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneOutcome {
    /// One cluster id per working-set record.
    pub labels: Vec<ClusterId>,
    /// Members turned into noise, per cluster. Clusters that lost nothing
    /// are absent.
    pub removed: BTreeMap<ClusterId, usize>,
}

impl PruneOutcome {
    /// Total members turned into noise.
    #[must_use]
    pub fn total_removed(&self) -> usize {
        self.removed.values().sum()
    }
}

/// Groups record indices by cluster id, skipping noise.
#[must_use]
pub fn members_by_cluster(labels: &[ClusterId]) -> BTreeMap<ClusterId, Vec<usize>> {
    let mut members: BTreeMap<ClusterId, Vec<usize>> = BTreeMap::new();
    for (index, &label) in labels.iter().enumerate() {
        if label != NOISE_CLUSTER {
            members.entry(label).or_default().push(index);
        }
    }
    members
}

/// Centroid of `indices` as the mean of latitude and longitude in radians.
#[must_use]
pub fn centroid_radians(records: &[IncidentRecord], indices: &[usize]) -> (f64, f64) {
    #[allow(clippy::cast_precision_loss)]
    let n = indices.len().max(1) as f64;
    let (lat, lon) = indices.iter().fold((0.0, 0.0), |(lat, lon), &i| {
        (
            lat + records[i].latitude.to_radians(),
            lon + records[i].longitude.to_radians(),
        )
    });
    (lat / n, lon / n)
}

/// Great-circle distance (radians) of each member from the centroid.
#[must_use]
pub fn centroid_distances(records: &[IncidentRecord], indices: &[usize]) -> Vec<f64> {
    let (c_lat, c_lon) = centroid_radians(records, indices);
    indices
        .iter()
        .map(|&i| {
            haversine(
                c_lat,
                c_lon,
                records[i].latitude.to_radians(),
                records[i].longitude.to_radians(),
            )
        })
        .collect()
}

/// Turns spatially extreme members into noise.
///
/// In every cluster with at least `min_members` members, a member whose
/// distance from the centroid exceeds `mean + std_dev_factor × std` of the
/// members' distances becomes noise. Clusters never gain members.
#[must_use]
pub fn prune_outliers(
    labels: Vec<ClusterId>,
    records: &[IncidentRecord],
    config: &OutlierConfig,
) -> PruneOutcome {
    let mut labels = labels;
    let mut removed = BTreeMap::new();

    for (cluster, indices) in members_by_cluster(&labels) {
        if indices.len() < config.min_members {
            continue;
        }

        let distances = centroid_distances(records, &indices);
        #[allow(clippy::cast_precision_loss)]
        let n = distances.len() as f64;
        let mean = distances.iter().sum::<f64>() / n;
        let std = (distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n).sqrt();
        let cutoff = config.std_dev_factor.mul_add(std, mean);

        let mut count = 0;
        for (&index, &distance) in indices.iter().zip(&distances) {
            if distance > cutoff {
                labels[index] = NOISE_CLUSTER;
                count += 1;
            }
        }

        if count > 0 {
            log::debug!("Pruned {count} outliers from cluster {cluster}");
            removed.insert(cluster, count);
        }
    }

    PruneOutcome { labels, removed }
}

/// Maps the sorted distinct non-noise ids onto `0..k`, preserving order.
#[must_use]
pub fn renumber(labels: Vec<ClusterId>) -> Vec<ClusterId> {
    let mapping: BTreeMap<ClusterId, ClusterId> = members_by_cluster(&labels)
        .into_keys()
        .zip(0..)
        .collect();

    labels
        .into_iter()
        .map(|label| mapping.get(&label).copied().unwrap_or(NOISE_CLUSTER))
        .collect()
}
