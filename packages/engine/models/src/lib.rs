#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Configuration and result types for the hotspot clustering engine.

pub mod config;

pub use config::{
    CacheConfig, ConfigError, EngineConfig, OutlierConfig, ParameterTier, PrimaryConfig,
    ScoringConfig, SubclusterConfig, TemporalConfig, TrendConfig,
};

use hotspot_incident_models::ClusterId;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Aggregate description of one final cluster.
///
/// Produced once per cluster by the danger scorer and written as the
/// properties of a `cluster_center` feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Dense cluster id (`0..k-1`).
    pub cluster_id: ClusterId,
    /// Mean member latitude in degrees.
    pub center_lat: f64,
    /// Mean member longitude in degrees.
    pub center_lon: f64,
    /// Number of members.
    pub accident_count: usize,
    /// Composite danger score, rounded to 4 decimals.
    pub danger_score: f64,
    /// Members within the trailing recency window.
    pub recent_accidents: usize,
    /// Mean temporal weight, rounded to 4 decimals.
    pub avg_temporal_weight: f64,
    /// Mean trend score, rounded to 4 decimals.
    pub avg_trend_score: f64,
    /// Distinct region names in first-seen order.
    pub regions: Vec<String>,
    /// Largest member distance from the centroid, in metres.
    pub max_spread_m: f64,
    /// Whether the score falls in the alert-worthy top percentile.
    pub alert: bool,
}

/// Coarse danger bucket used by mobile alerts.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DangerLevel {
    /// Score of at least 0.7.
    High,
    /// Score of at least 0.4.
    Medium,
    /// Anything lower.
    Low,
}

impl DangerLevel {
    /// Buckets a danger score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Self::High
        } else if score >= 0.4 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Direction label derived from a cluster's mean trend score.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrendDirection {
    /// Mean trend above 0.1 incidents per month.
    Increasing,
    /// Everything else.
    Stable,
}

impl TrendDirection {
    /// Classifies a mean trend score.
    #[must_use]
    pub fn from_trend(avg_trend: f64) -> Self {
        if avg_trend > 0.1 {
            Self::Increasing
        } else {
            Self::Stable
        }
    }
}

/// Proximity alert for one alert-worthy cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileAlert {
    /// Cluster this alert describes.
    pub cluster_id: ClusterId,
    /// Alert centre latitude in degrees.
    pub center_lat: f64,
    /// Alert centre longitude in degrees.
    pub center_lon: f64,
    /// Trigger radius around the centre.
    pub radius_km: f64,
    /// Danger bucket.
    pub danger_level: DangerLevel,
    /// Rounded danger score.
    pub danger_score: f64,
    /// Cluster member count.
    pub accident_count: usize,
    /// Members within the recency window.
    pub recent_accidents: usize,
    /// Trend direction label.
    pub trend: TrendDirection,
    /// Human-readable message shown to drivers.
    pub alert_message: String,
}

/// Counters describing one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Records in the loaded snapshot.
    pub snapshot_records: usize,
    /// Records dropped while loading.
    pub dropped_records: usize,
    /// Records surviving the filter.
    pub working_set: usize,
    /// Clusters after the primary pass.
    pub primary_clusters: usize,
    /// Oversized clusters that were split.
    pub subclustered: usize,
    /// Members pruned as spatial outliers.
    pub outliers_removed: usize,
    /// Final cluster count.
    pub clusters: usize,
    /// Final noise count.
    pub noise: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn danger_level_buckets() {
        assert_eq!(DangerLevel::from_score(0.95), DangerLevel::High);
        assert_eq!(DangerLevel::from_score(0.7), DangerLevel::High);
        assert_eq!(DangerLevel::from_score(0.69), DangerLevel::Medium);
        assert_eq!(DangerLevel::from_score(0.4), DangerLevel::Medium);
        assert_eq!(DangerLevel::from_score(0.1), DangerLevel::Low);
        assert_eq!(DangerLevel::High.to_string(), "HIGH");
    }

    #[test]
    fn trend_direction_threshold() {
        assert_eq!(TrendDirection::from_trend(0.25), TrendDirection::Increasing);
        assert_eq!(TrendDirection::from_trend(0.1), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_trend(-2.0), TrendDirection::Stable);
    }

    #[test]
    fn alert_serializes_with_labels() {
        let alert = MobileAlert {
            cluster_id: 3,
            center_lat: 14.6,
            center_lon: 121.0,
            radius_km: 0.5,
            danger_level: DangerLevel::Medium,
            danger_score: 0.55,
            accident_count: 40,
            recent_accidents: 12,
            trend: TrendDirection::Stable,
            alert_message: "Drive carefully.".to_string(),
        };

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["danger_level"], "MEDIUM");
        assert_eq!(json["trend"], "stable");
    }
}
