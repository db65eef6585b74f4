//! Engine configuration with documented defaults.
//!
//! Every tunable the pipeline uses lives here and is passed into the
//! pipeline explicitly. The defaults reproduce the tuning used for the road
//! traffic accident dataset; the size tiers and the oversized-cluster
//! threshold are empirical and should be re-calibrated for other data.
//!
//! A TOML file may override any subset of fields:
//!
//! ```toml
//! [temporal]
//! decay_rate = 0.2
//!
//! [[primary.tiers]]
//! max_points = 1000
//! min_cluster_size = 10
//! min_samples = 5
//! epsilon = 5e-7
//!
//! [[primary.tiers]]
//! min_cluster_size = 25
//! min_samples = 15
//! epsilon = 8e-7
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use hotspot_incident_models::FieldMapping;
use serde::{Deserialize, Serialize};

/// Errors loading or validating an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of its valid range.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Temporal decay weighting.
    pub temporal: TemporalConfig,
    /// Spatial/monthly trend estimation.
    pub trend: TrendConfig,
    /// Primary haversine clustering.
    pub primary: PrimaryConfig,
    /// Oversized-cluster refinement.
    pub subcluster: SubclusterConfig,
    /// Outlier pruning.
    pub outliers: OutlierConfig,
    /// Danger scoring and alerting.
    pub scoring: ScoringConfig,
    /// Snapshot property names.
    pub fields: FieldMapping,
    /// Result cache policy.
    pub cache: CacheConfig,
    /// Pinned "now". When unset, callers use the wall clock.
    pub reference_time: Option<DateTime<Utc>>,
}

impl EngineConfig {
    /// Parses a TOML document, filling unspecified fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or a value fails
    /// validation.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges and tier ordering.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.temporal.decay_rate.is_finite() && self.temporal.decay_rate >= 0.0) {
            return invalid("temporal.decay_rate must be a non-negative number");
        }
        if self.trend.grid_bins == 0 {
            return invalid("trend.grid_bins must be at least 1");
        }
        if self.trend.min_observations < 2 {
            return invalid("trend.min_observations must be at least 2");
        }
        self.primary.validate()?;
        if self.subcluster.min_cluster_size_floor < 2 {
            return invalid("subcluster.min_cluster_size_floor must be at least 2");
        }
        if self.subcluster.size_divisor == 0 || self.subcluster.samples_divisor == 0 {
            return invalid("subcluster divisors must be non-zero");
        }
        if self.outliers.std_dev_factor < 0.0 {
            return invalid("outliers.std_dev_factor must be non-negative");
        }
        if !(0.0..=100.0).contains(&self.scoring.alert_percentile) {
            return invalid("scoring.alert_percentile must be within 0..=100");
        }
        if self.scoring.frequency_cap == 0 {
            return invalid("scoring.frequency_cap must be non-zero");
        }
        Ok(())
    }
}

fn invalid<T>(message: &str) -> Result<T, ConfigError> {
    Err(ConfigError::Invalid {
        message: message.to_string(),
    })
}

/// Temporal decay settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Exponential decay rate per year of age.
    pub decay_rate: f64,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self { decay_rate: 0.15 }
    }
}

/// Trend estimation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Equal-width bins per axis of the lat/lon grid.
    pub grid_bins: usize,
    /// Minimum observed months before a bin gets a regression.
    pub min_observations: usize,
    /// Minimum |Pearson r| for a slope to be kept.
    pub min_correlation: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            grid_bins: 50,
            min_observations: 3,
            min_correlation: 0.3,
        }
    }
}

/// One row of the size-keyed primary clustering parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterTier {
    /// Exclusive upper bound on working-set size. `None` covers every
    /// larger size and must be the last tier.
    #[serde(default)]
    pub max_points: Option<usize>,
    /// Smallest group that counts as a cluster.
    pub min_cluster_size: usize,
    /// Neighbourhood size for core distances.
    pub min_samples: usize,
    /// Cluster selection epsilon in radians of arc.
    pub epsilon: f64,
}

/// Primary clustering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryConfig {
    /// Size tiers in ascending `max_points` order.
    pub tiers: Vec<ParameterTier>,
    /// Whether a single all-encompassing cluster may be selected.
    pub allow_single_cluster: bool,
    /// Lower bound of the oversized-cluster threshold.
    pub subcluster_min_threshold: usize,
    /// Fraction of the working set used for the oversized-cluster
    /// threshold.
    pub subcluster_fraction: f64,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                ParameterTier {
                    max_points: Some(500),
                    min_cluster_size: 8,
                    min_samples: 5,
                    epsilon: 0.000_000_5,
                },
                ParameterTier {
                    max_points: Some(2000),
                    min_cluster_size: 20,
                    min_samples: 17,
                    epsilon: 0.000_002_5,
                },
                ParameterTier {
                    max_points: None,
                    min_cluster_size: 25,
                    min_samples: 15,
                    epsilon: 0.000_000_8,
                },
            ],
            allow_single_cluster: true,
            subcluster_min_threshold: 300,
            subcluster_fraction: 0.035,
        }
    }
}

impl PrimaryConfig {
    /// Returns the tier covering a working set of `n` points.
    ///
    /// Falls back to the last tier if no bound matches, which
    /// [`Self::validate`] rules out for validated configs.
    #[must_use]
    pub fn tier_for(&self, n: usize) -> Option<&ParameterTier> {
        self.tiers
            .iter()
            .find(|tier| tier.max_points.is_none_or(|max| n < max))
            .or_else(|| self.tiers.last())
    }

    /// Member count above which a cluster is sub-clustered:
    /// `max(subcluster_min_threshold, floor(n × subcluster_fraction))`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn subcluster_threshold(&self, n: usize) -> usize {
        let proportional = (n as f64 * self.subcluster_fraction).floor() as usize;
        self.subcluster_min_threshold.max(proportional)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let Some(last) = self.tiers.last() else {
            return invalid("primary.tiers must not be empty");
        };
        if last.max_points.is_some() {
            return invalid("the last primary tier must omit max_points");
        }

        let mut previous = 0;
        for tier in &self.tiers {
            if tier.min_cluster_size < 2 {
                return invalid("primary tier min_cluster_size must be at least 2");
            }
            if tier.min_samples == 0 {
                return invalid("primary tier min_samples must be at least 1");
            }
            if !(tier.epsilon.is_finite() && tier.epsilon >= 0.0) {
                return invalid("primary tier epsilon must be a non-negative number");
            }
            if let Some(max) = tier.max_points {
                if max <= previous {
                    return invalid("primary tiers must be in ascending max_points order");
                }
                previous = max;
            }
        }

        if !(0.0..=1.0).contains(&self.subcluster_fraction) {
            return invalid("primary.subcluster_fraction must be within 0..=1");
        }
        Ok(())
    }
}

/// Oversized-cluster refinement settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubclusterConfig {
    /// `min_cluster_size = max(floor, size / size_divisor)`.
    pub size_divisor: usize,
    /// `min_samples = max(floor, size / samples_divisor)`.
    pub samples_divisor: usize,
    /// Floor for the sub-cluster `min_cluster_size`.
    pub min_cluster_size_floor: usize,
    /// Floor for the sub-cluster `min_samples`.
    pub min_samples_floor: usize,
    /// Cluster selection epsilon in feature-space units.
    pub epsilon: f64,
    /// Multiplier applied to trend scores in the feature vector.
    pub trend_scale: f64,
}

impl Default for SubclusterConfig {
    fn default() -> Self {
        Self {
            size_divisor: 20,
            samples_divisor: 40,
            min_cluster_size_floor: 10,
            min_samples_floor: 5,
            epsilon: 0.1,
            trend_scale: 10.0,
        }
    }
}

/// Outlier pruning settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Clusters smaller than this are left alone.
    pub min_members: usize,
    /// Members farther than `mean + factor × std` from the centroid are
    /// pruned.
    pub std_dev_factor: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            min_members: 5,
            std_dev_factor: 1.2,
        }
    }
}

/// Danger scoring and alert settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of the mean temporal weight.
    pub temporal_weight: f64,
    /// Weight of the clipped mean trend.
    pub trend_weight: f64,
    /// Weight of the capped member count.
    pub frequency_weight: f64,
    /// Member count at which the frequency component saturates.
    pub frequency_cap: usize,
    /// Trailing window for the recent-member count.
    pub recent_window_days: i64,
    /// Clamp the final score into `[0, 1]`.
    pub clamp_score: bool,
    /// Top percentile of scores flagged as alert-worthy.
    pub alert_percentile: f64,
    /// Radius advertised on mobile alerts.
    pub alert_radius_km: f64,
    /// Max centroid distance (radians) before a spread warning is logged.
    pub spread_warning_radians: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            temporal_weight: 0.4,
            trend_weight: 0.3,
            frequency_weight: 0.3,
            frequency_cap: 100,
            recent_window_days: 365,
            clamp_score: false,
            alert_percentile: 20.0,
            alert_radius_km: 0.5,
            spread_warning_radians: 0.0015,
        }
    }
}

/// Result cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether results are cached at all.
    pub enabled: bool,
    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn tier_lookup_by_size() {
        let primary = PrimaryConfig::default();
        assert_eq!(primary.tier_for(10).unwrap().min_cluster_size, 8);
        assert_eq!(primary.tier_for(499).unwrap().min_cluster_size, 8);
        assert_eq!(primary.tier_for(500).unwrap().min_cluster_size, 20);
        assert_eq!(primary.tier_for(1999).unwrap().min_samples, 17);
        assert_eq!(primary.tier_for(13_000).unwrap().min_cluster_size, 25);
    }

    #[test]
    fn subcluster_threshold_scales_with_size() {
        let primary = PrimaryConfig::default();
        assert_eq!(primary.subcluster_threshold(100), 300);
        assert_eq!(primary.subcluster_threshold(8_571), 300);
        assert_eq!(primary.subcluster_threshold(20_000), 700);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str(
            "reference_time = \"2024-01-01T00:00:00Z\"\n\n[temporal]\ndecay_rate = 0.3\n\n[scoring]\nclamp_score = true\n",
        )
        .unwrap();

        assert!((config.temporal.decay_rate - 0.3).abs() < f64::EPSILON);
        assert!(config.scoring.clamp_score);
        assert_eq!(config.trend, TrendConfig::default());
        assert_eq!(config.primary, PrimaryConfig::default());
        assert_eq!(
            config.reference_time.unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
    }

    #[test]
    fn rejects_bounded_last_tier() {
        let err = EngineConfig::from_toml_str(
            "[[primary.tiers]]\nmax_points = 100\nmin_cluster_size = 5\nmin_samples = 3\nepsilon = 0.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn rejects_unsorted_tiers() {
        let mut config = EngineConfig::default();
        config.primary.tiers.swap(0, 1);
        assert!(config.validate().is_err());
    }

    #[test]
    fn field_mapping_overrides() {
        let config = EngineConfig::from_toml_str("[fields]\nregion = \"district\"\n").unwrap();
        assert_eq!(config.fields.region, "district");
        assert_eq!(config.fields.category, "offensetype");
    }
}
