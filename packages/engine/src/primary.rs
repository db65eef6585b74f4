//! Primary clustering over great-circle distance.
//!
//! Parameters come from the size-keyed tier table in [`PrimaryConfig`]:
//! small working sets use a small minimum cluster size so sparse towns
//! still yield hotspots, large ones raise it so city-wide data does not
//! shatter into thousands of micro-clusters.

use hotspot_engine_models::{ParameterTier, PrimaryConfig};
use hotspot_incident_models::{ClusterId, IncidentRecord, NOISE_CLUSTER};

use crate::density::{DensityClusterer, DensityParams, DistanceMetric, FeatureMatrix};
use crate::EngineError;

/// Labels from the primary pass plus the oversized-cluster threshold for
/// the refiner.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryClustering {
    /// One cluster id per working-set record.
    pub labels: Vec<ClusterId>,
    /// Member count above which a cluster is sub-clustered.
    pub subcluster_threshold: usize,
    /// Parameters the clusterer ran with.
    pub params: DensityParams,
}

impl PrimaryClustering {
    /// Number of distinct non-noise clusters.
    #[must_use]
    pub fn cluster_count(&self) -> usize {
        count_clusters(&self.labels)
    }
}

/// Density parameters for a working set of `n` records.
///
/// # Errors
///
/// Returns [`EngineError::NoParameterTier`] if the tier table is empty.
pub fn params_for(n: usize, config: &PrimaryConfig) -> Result<DensityParams, EngineError> {
    let ParameterTier {
        min_cluster_size,
        min_samples,
        epsilon,
        ..
    } = *config.tier_for(n).ok_or(EngineError::NoParameterTier)?;

    Ok(DensityParams {
        min_cluster_size,
        min_samples,
        cluster_selection_epsilon: epsilon,
        allow_single_cluster: config.allow_single_cluster,
    }
    .normalized())
}

/// Clusters `records` by location.
///
/// # Errors
///
/// Returns [`EngineError`] if the parameter table is empty or the
/// clusterer rejects the coordinates.
pub fn primary_cluster(
    records: &[IncidentRecord],
    config: &PrimaryConfig,
    clusterer: &dyn DensityClusterer,
) -> Result<PrimaryClustering, EngineError> {
    let n = records.len();
    let params = params_for(n, config)?;
    let subcluster_threshold = config.subcluster_threshold(n);

    log::info!(
        "Primary {} over {n} records: min_cluster_size={}, min_samples={}, epsilon={:e}",
        clusterer.name(),
        params.min_cluster_size,
        params.min_samples,
        params.cluster_selection_epsilon
    );

    let coordinates = FeatureMatrix::new(
        2,
        records
            .iter()
            .flat_map(|r| [r.latitude.to_radians(), r.longitude.to_radians()])
            .collect(),
    )?;
    let labels = clusterer.cluster(&coordinates, DistanceMetric::Haversine, &params)?;

    let clustering = PrimaryClustering {
        labels,
        subcluster_threshold,
        params,
    };
    log::info!(
        "Primary pass found {} clusters ({} noise); sub-clustering above {subcluster_threshold} members",
        clustering.cluster_count(),
        clustering.labels.iter().filter(|&&l| l == NOISE_CLUSTER).count()
    );

    Ok(clustering)
}

/// Number of distinct non-noise ids in `labels`.
#[must_use]
pub fn count_clusters(labels: &[ClusterId]) -> usize {
    labels
        .iter()
        .filter(|&&l| l != NOISE_CLUSTER)
        .collect::<std::collections::BTreeSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::Hdbscan;
    use crate::test_support::{record_at, spiral};

    #[test]
    fn tiers_follow_working_set_size() {
        let config = PrimaryConfig::default();

        let small = params_for(120, &config).unwrap();
        assert_eq!((small.min_cluster_size, small.min_samples), (8, 5));

        let medium = params_for(1500, &config).unwrap();
        assert_eq!((medium.min_cluster_size, medium.min_samples), (20, 17));

        let large = params_for(12_000, &config).unwrap();
        assert_eq!((large.min_cluster_size, large.min_samples), (25, 15));
        assert!(large.allow_single_cluster);
    }

    #[test]
    fn empty_tier_table_is_an_error() {
        let config = PrimaryConfig {
            tiers: Vec::new(),
            ..PrimaryConfig::default()
        };
        assert!(matches!(params_for(10, &config), Err(EngineError::NoParameterTier)));
    }

    #[test]
    fn separates_two_intersections() {
        let mut records: Vec<IncidentRecord> = spiral(14.60, 121.00, 30.0, 40)
            .into_iter()
            .map(|(lat, lon)| record_at(lat, lon, 0))
            .collect();
        records.extend(
            spiral(14.62, 121.03, 30.0, 40)
                .into_iter()
                .map(|(lat, lon)| record_at(lat, lon, 0)),
        );

        let clustering =
            primary_cluster(&records, &PrimaryConfig::default(), &Hdbscan).unwrap();

        assert_eq!(clustering.cluster_count(), 2);
        assert_eq!(clustering.subcluster_threshold, 300);
        assert!(clustering.labels[..40].iter().all(|&l| l == clustering.labels[0]));
        assert!(clustering.labels[40..].iter().all(|&l| l == clustering.labels[40]));
    }
}
