//! Density-based hierarchical clustering capability.
//!
//! The engine clusters twice: once over geographic coordinates with
//! great-circle distance, and again over a weighted feature space with
//! euclidean distance when a hotspot is oversized. Both go through the
//! [`DensityClusterer`] trait so the algorithm can be swapped in tests.

pub mod hierarchical;
pub mod metric;

pub use hierarchical::Hdbscan;
pub use metric::{DistanceMetric, EARTH_RADIUS_M, haversine, haversine_m};

use hotspot_incident_models::ClusterId;

/// Errors from building feature matrices or running a clusterer.
#[derive(Debug, thiserror::Error)]
pub enum DensityError {
    /// The flat buffer length is not a multiple of the row width.
    #[error("Feature buffer of {len} values does not divide into rows of {dims}")]
    RaggedMatrix {
        /// Buffer length.
        len: usize,
        /// Requested row width.
        dims: usize,
    },

    /// The metric cannot be evaluated on rows of this width.
    #[error("{metric} distance needs {expected} dimensions, got {actual}")]
    MetricDimensions {
        /// Metric name.
        metric: &'static str,
        /// Width the metric needs.
        expected: usize,
        /// Width of the matrix.
        actual: usize,
    },

    /// A feature value is NaN or infinite.
    #[error("Non-finite feature value in row {row}")]
    NonFinite {
        /// Offending row.
        row: usize,
    },

    /// The clustering backend rejected its input.
    #[error("HDBSCAN backend error: {0}")]
    Backend(String),
}

/// Dense row-major matrix of `f64` features, one row per point.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    dims: usize,
    data: Vec<f64>,
}

impl FeatureMatrix {
    /// Wraps a flat row-major buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DensityError`] if the buffer is ragged or holds a
    /// non-finite value.
    pub fn new(dims: usize, data: Vec<f64>) -> Result<Self, DensityError> {
        if dims == 0 || data.len() % dims != 0 {
            return Err(DensityError::RaggedMatrix {
                len: data.len(),
                dims,
            });
        }
        if let Some(pos) = data.iter().position(|v| !v.is_finite()) {
            return Err(DensityError::NonFinite { row: pos / dims });
        }
        Ok(Self { dims, data })
    }

    /// Builds a matrix from fixed-width rows.
    ///
    /// # Errors
    ///
    /// Returns [`DensityError::NonFinite`] if any value is NaN or infinite.
    pub fn from_rows<const D: usize>(rows: &[[f64; D]]) -> Result<Self, DensityError> {
        Self::new(D, rows.iter().flatten().copied().collect())
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.dims
    }

    /// Whether the matrix has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row width.
    #[must_use]
    pub const fn dims(&self) -> usize {
        self.dims
    }

    /// Row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.dims..(i + 1) * self.dims]
    }
}

/// Parameters for one clustering call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityParams {
    /// Smallest group that counts as a cluster.
    pub min_cluster_size: usize,
    /// Neighbourhood size used for core distances.
    pub min_samples: usize,
    /// Clusters born below this distance are merged into their parent.
    pub cluster_selection_epsilon: f64,
    /// Whether the whole dataset may come back as one cluster.
    pub allow_single_cluster: bool,
}

impl DensityParams {
    /// Returns a copy with `min_samples` clamped to `min_cluster_size`
    /// and both clamped to at least their meaningful minimums.
    #[must_use]
    pub fn normalized(self) -> Self {
        let min_cluster_size = self.min_cluster_size.max(2);
        Self {
            min_cluster_size,
            min_samples: self.min_samples.clamp(1, min_cluster_size),
            cluster_selection_epsilon: self.cluster_selection_epsilon.max(0.0),
            allow_single_cluster: self.allow_single_cluster,
        }
    }
}

/// A density-based clustering algorithm.
pub trait DensityClusterer: Send + Sync {
    /// Short algorithm name, for logs.
    fn name(&self) -> &'static str;

    /// Returns one label per row of `features`; [`hotspot_incident_models::NOISE_CLUSTER`]
    /// marks noise and clusters are numbered from 0.
    ///
    /// # Errors
    ///
    /// Returns [`DensityError`] if `metric` cannot be applied to the
    /// matrix.
    fn cluster(
        &self,
        features: &FeatureMatrix,
        metric: DistanceMetric,
        params: &DensityParams,
    ) -> Result<Vec<ClusterId>, DensityError>;
}
