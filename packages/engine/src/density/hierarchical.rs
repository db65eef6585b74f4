//! HDBSCAN* through the `hdbscan` crate.
//!
//! The crate clusters rows under its euclidean metric. Great-circle rows
//! (`[lat, lon]` in radians) are projected onto an equirectangular plane
//! centred on the rows' mean latitude first; at hotspot scale euclidean
//! distance on that plane matches the central angle, so epsilons stay in
//! radians.
//!
//! Backend labels are renumbered in first-seen row order so ids are a pure
//! function of the input rows and parameters.

use std::collections::BTreeMap;

use ::hdbscan::HdbscanHyperParams;
use hotspot_incident_models::{ClusterId, NOISE_CLUSTER};

use super::{DensityClusterer, DensityError, DensityParams, DistanceMetric, FeatureMatrix};

/// The HDBSCAN* clusterer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hdbscan;

impl DensityClusterer for Hdbscan {
    fn name(&self) -> &'static str {
        "hdbscan"
    }

    fn cluster(
        &self,
        features: &FeatureMatrix,
        metric: DistanceMetric,
        params: &DensityParams,
    ) -> Result<Vec<ClusterId>, DensityError> {
        if let Some(expected) = metric.required_dims()
            && features.dims() != expected
        {
            return Err(DensityError::MetricDimensions {
                metric: metric.as_str(),
                expected,
                actual: features.dims(),
            });
        }

        let params = params.normalized();
        let n = features.len();
        if n < 2 || n < params.min_cluster_size {
            return Ok(vec![NOISE_CLUSTER; n]);
        }

        let rows = plane_rows(features, metric);
        let hyper_params = HdbscanHyperParams::builder()
            .min_cluster_size(params.min_cluster_size)
            .min_samples(params.min_samples)
            .epsilon(params.cluster_selection_epsilon)
            .allow_single_cluster(params.allow_single_cluster)
            .build();

        let labels = ::hdbscan::Hdbscan::new(&rows, hyper_params)
            .cluster()
            .map_err(|e| DensityError::Backend(format!("{e:?}")))?;

        Ok(first_seen_order(&labels))
    }
}

/// Rows the backend can measure with euclidean distance.
fn plane_rows(features: &FeatureMatrix, metric: DistanceMetric) -> Vec<Vec<f64>> {
    let n = features.len();
    match metric {
        DistanceMetric::Euclidean => (0..n).map(|i| features.row(i).to_vec()).collect(),
        DistanceMetric::Haversine => {
            #[allow(clippy::cast_precision_loss)]
            let mean_lat = (0..n).map(|i| features.row(i)[0]).sum::<f64>() / n as f64;
            let scale = mean_lat.cos();
            (0..n)
                .map(|i| {
                    let row = features.row(i);
                    vec![row[0], row[1] * scale]
                })
                .collect()
        }
    }
}

/// Maps backend labels to `0..k` in order of first appearance; negative
/// labels are noise.
fn first_seen_order(labels: &[i32]) -> Vec<ClusterId> {
    let mut ids: BTreeMap<i32, ClusterId> = BTreeMap::new();
    labels
        .iter()
        .map(|&label| {
            if label < 0 {
                return NOISE_CLUSTER;
            }
            let next = ClusterId::try_from(ids.len()).unwrap_or(ClusterId::MAX);
            *ids.entry(label).or_insert(next)
        })
        .collect()
}
