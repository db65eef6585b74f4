//! Sub-clustering of oversized hotspots.
//!
//! A corridor or a whole barangay can come out of the primary pass as one
//! giant cluster. Such clusters are re-clustered in a feature space where
//! location is scaled by recency, so an old hotspot and a new one on the
//! same road separate:
//!
//! `[z_lat × w, z_lon × w, w, trend × trend_scale]`
//!
//! with `z_*` the member coordinates standardized within the cluster and
//! `w` the member's temporal weight.

use std::collections::{BTreeMap, BTreeSet};

use hotspot_engine_models::SubclusterConfig;
use hotspot_incident_models::{ClusterId, NOISE_CLUSTER};
use rayon::prelude::*;

use crate::density::{DensityClusterer, DensityParams, DistanceMetric, FeatureMatrix};
use crate::prune::members_by_cluster;
use crate::{EngineError, RecordColumns};

/// Labels after refinement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefineOutcome {
    /// One cluster id per working-set record. Split clusters' members carry
    /// freshly minted ids; the parent id disappears.
    pub labels: Vec<ClusterId>,
    /// Number of clusters that were split.
    pub split_clusters: usize,
}

/// Splits every cluster with more than `threshold` members, once.
///
/// Oversized clusters are re-clustered in parallel and the splits applied
/// in ascending id order. A split only applies when the re-clustering
/// yields more than one non-noise sub-cluster; its sub-noise becomes
/// noise.
///
/// # Errors
///
/// Returns [`EngineError`] if a feature matrix cannot be built or the
/// clusterer fails.
pub fn refine_oversized(
    labels: Vec<ClusterId>,
    columns: RecordColumns<'_>,
    threshold: usize,
    config: &SubclusterConfig,
    clusterer: &dyn DensityClusterer,
) -> Result<RefineOutcome, EngineError> {
    let oversized: Vec<(ClusterId, Vec<usize>)> = members_by_cluster(&labels)
        .into_iter()
        .filter(|(_, indices)| indices.len() > threshold)
        .collect();

    let splits = oversized
        .par_iter()
        .map(|(cluster, indices)| -> Result<Vec<ClusterId>, EngineError> {
            let params = subcluster_params(indices.len(), config);
            log::info!(
                "Sub-clustering cluster {cluster} ({} members, min_cluster_size={}, min_samples={})",
                indices.len(),
                params.min_cluster_size,
                params.min_samples
            );
            let features = feature_matrix(indices, columns, config.trend_scale)?;
            Ok(clusterer.cluster(&features, DistanceMetric::Euclidean, &params)?)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut labels = labels;
    let mut next_id = labels.iter().copied().max().unwrap_or(NOISE_CLUSTER) + 1;
    let mut split_clusters = 0;

    for ((cluster, indices), sub_labels) in oversized.iter().zip(splits) {
        let distinct: BTreeSet<ClusterId> = sub_labels
            .iter()
            .copied()
            .filter(|&l| l != NOISE_CLUSTER)
            .collect();
        if distinct.len() <= 1 {
            log::debug!("Cluster {cluster} has no meaningful sub-clusters, keeping it");
            continue;
        }

        let mut minted: BTreeMap<ClusterId, ClusterId> = BTreeMap::new();
        for (&index, &sub) in indices.iter().zip(&sub_labels) {
            labels[index] = if sub == NOISE_CLUSTER {
                NOISE_CLUSTER
            } else {
                *minted.entry(sub).or_insert_with(|| {
                    let id = next_id;
                    next_id += 1;
                    id
                })
            };
        }

        log::info!("Split cluster {cluster} into {} sub-clusters", distinct.len());
        split_clusters += 1;
    }

    Ok(RefineOutcome {
        labels,
        split_clusters,
    })
}

/// Sub-clustering parameters scaled to the parent's size.
#[must_use]
pub fn subcluster_params(size: usize, config: &SubclusterConfig) -> DensityParams {
    DensityParams {
        min_cluster_size: config.min_cluster_size_floor.max(size / config.size_divisor),
        min_samples: config.min_samples_floor.max(size / config.samples_divisor),
        cluster_selection_epsilon: config.epsilon,
        allow_single_cluster: false,
    }
    .normalized()
}

fn feature_matrix(
    indices: &[usize],
    columns: RecordColumns<'_>,
    trend_scale: f64,
) -> Result<FeatureMatrix, EngineError> {
    let lat = standardize(indices.iter().map(|&i| columns.records[i].latitude));
    let lon = standardize(indices.iter().map(|&i| columns.records[i].longitude));

    let mut data = Vec::with_capacity(indices.len() * 4);
    for (k, &i) in indices.iter().enumerate() {
        let w = columns.weights[i];
        data.extend([lat[k] * w, lon[k] * w, w, columns.trends[i] * trend_scale]);
    }
    Ok(FeatureMatrix::new(4, data)?)
}

/// Z-scores with population standard deviation; a constant column
/// standardizes to zeros.
fn standardize(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return values;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

    if std > 0.0 {
        values.iter().map(|v| (v - mean) / std).collect()
    } else {
        vec![0.0; values.len()]
    }
}
