#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Incident record, filter descriptor, and cluster id types.
//!
//! These are the shapes shared between the snapshot loader, the hotspot
//! engine, and the result cache. Records are immutable once loaded; the
//! engine never mutates them and tracks derived values (weights, trends,
//! cluster ids) in parallel columns instead.

use chrono::{DateTime, Datelike as _, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Cluster identifier assigned to each record by the engine.
pub type ClusterId = i32;

/// Reserved cluster id for records that belong to no dense cluster.
pub const NOISE_CLUSTER: ClusterId = -1;

/// Filter value meaning "no constraint".
pub const ALL_SENTINEL: &str = "all";

/// A single geolocated, time-stamped incident from the point snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    /// Latitude in degrees (WGS84).
    pub latitude: f64,
    /// Longitude in degrees (WGS84).
    pub longitude: f64,
    /// When the incident occurred. Defaults to the load time when the
    /// source carried no date at all.
    pub occurred_at: DateTime<Utc>,
    /// Explicit year attribute from the source, if any.
    pub year: Option<i32>,
    /// Offense / incident type.
    pub category: Option<String>,
    /// Ordinal severity label (e.g. `"Fatal"`, `"Damage to Property"`).
    pub severity: Option<String>,
    /// Region name (barangay, district, ...).
    pub region: Option<String>,
    /// Source properties passed through untouched.
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl IncidentRecord {
    /// Returns the year used for year filtering: the explicit year
    /// attribute when present, otherwise the year of `occurred_at`.
    #[must_use]
    pub fn effective_year(&self) -> i32 {
        self.year.unwrap_or_else(|| self.occurred_at.year())
    }

    /// Whether the coordinates are finite and inside the valid WGS84 range.
    #[must_use]
    pub fn has_valid_coordinates(&self) -> bool {
        is_valid_coordinate(self.latitude, self.longitude)
    }
}

/// Whether `(lat, lon)` is finite and within −90..90 / −180..180.
#[must_use]
pub fn is_valid_coordinate(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
}

/// Names of the snapshot feature properties the loader reads.
///
/// Defaults match the road traffic accident export (`barangay`,
/// `offensetype`, `datecommitted`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    /// Explicit year property.
    pub year: String,
    /// Region name property.
    pub region: String,
    /// Category / offense type property.
    pub category: String,
    /// Severity label property.
    pub severity: String,
    /// Date property (date only or full timestamp).
    pub date: String,
    /// Optional time-of-day property combined with [`Self::date`].
    pub time: String,
    /// Timestamp property consulted when [`Self::date`] is absent.
    pub fallback_date: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            year: "year".to_string(),
            region: "barangay".to_string(),
            category: "offensetype".to_string(),
            severity: "severity".to_string(),
            date: "datecommitted".to_string(),
            time: "timecommitted".to_string(),
            fallback_date: "date".to_string(),
        }
    }
}

/// Kind discriminator written to the `type` property of output features.
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
pub enum FeatureKind {
    /// An individual incident with its derived weight, trend, and cluster.
    AccidentPoint,
    /// A cluster centroid carrying the cluster summary.
    ClusterCenter,
}

/// Conjunctive filter applied to the snapshot before clustering.
///
/// Absent fields, empty strings, and the `"all"` sentinel all mean "no
/// constraint". Field aliases match the names sent by the map front end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDescriptor {
    /// Years to include. Empty means every year.
    #[serde(
        default,
        deserialize_with = "deserialize_years",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub years: Vec<i32>,
    /// Exact region name.
    #[serde(default, alias = "location", skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Exact category / offense type.
    #[serde(
        default,
        alias = "offenseType",
        skip_serializing_if = "Option::is_none"
    )]
    pub category: Option<String>,
    /// Exact severity label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

impl FilterDescriptor {
    /// Returns the canonical form of this filter: years sorted and
    /// de-duplicated, string values trimmed, and `"all"`/blank values
    /// collapsed to `None`.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut years = self.years.clone();
        years.sort_unstable();
        years.dedup();

        Self {
            years,
            region: normalize_constraint(self.region.as_deref()),
            category: normalize_constraint(self.category.as_deref()),
            severity: normalize_constraint(self.severity.as_deref()),
        }
    }

    /// Whether this filter places no constraint on any field.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        let normalized = self.normalized();
        normalized.years.is_empty()
            && normalized.region.is_none()
            && normalized.category.is_none()
            && normalized.severity.is_none()
    }

    /// Whether `record` satisfies every populated constraint.
    #[must_use]
    pub fn matches(&self, record: &IncidentRecord) -> bool {
        let normalized = self.normalized();

        if !normalized.years.is_empty()
            && normalized
                .years
                .binary_search(&record.effective_year())
                .is_err()
        {
            return false;
        }

        field_matches(normalized.region.as_deref(), record.region.as_deref())
            && field_matches(normalized.category.as_deref(), record.category.as_deref())
            && field_matches(normalized.severity.as_deref(), record.severity.as_deref())
    }
}

fn normalize_constraint(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(ALL_SENTINEL) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn field_matches(constraint: Option<&str>, value: Option<&str>) -> bool {
    constraint.is_none_or(|wanted| value.is_some_and(|v| v.trim() == wanted))
}

/// Accepts years as JSON numbers or numeric strings (`[2018, "2019"]`).
fn deserialize_years<'de, D>(deserializer: D) -> Result<Vec<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum YearValue {
        Number(i32),
        Text(String),
    }

    let raw: Option<Vec<YearValue>> = Option::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|value| match value {
            YearValue::Number(year) => Ok(year),
            YearValue::Text(text) => text
                .trim()
                .parse::<i32>()
                .map_err(|_| {
                    <D::Error as serde::de::Error>::custom(format!("invalid year: {text:?}"))
                }),
        })
        .collect()
}
