#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point snapshot loading for the hotspot engine.
//!
//! A snapshot is an immutable collection of [`IncidentRecord`]s read from a
//! `GeoJSON` `FeatureCollection` of `Point` features. Features with missing
//! or out-of-range coordinates, non-point geometry, or an unparseable date
//! are dropped and counted in [`LoadStats`] instead of failing the load.
//! Only a snapshot that cannot be read or parsed at all is an error.

pub mod parsing;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use geojson::{Feature, GeoJson};
use hotspot_incident_models::{FieldMapping, IncidentRecord, is_valid_coordinate};
use serde::{Deserialize, Serialize};

/// Errors that make a snapshot unusable.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// I/O error reading the snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The snapshot text is not valid `GeoJSON`.
    #[error("GeoJSON parse error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The snapshot parsed but is not a `FeatureCollection`.
    #[error("Snapshot is not a FeatureCollection (found {found})")]
    NotFeatureCollection {
        /// The `GeoJSON` object type that was found instead.
        found: &'static str,
    },
}

/// Counts of features seen and dropped while loading a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStats {
    /// Features present in the collection.
    pub total_features: usize,
    /// Records kept.
    pub loaded: usize,
    /// Dropped for missing or non-`Point` geometry.
    pub dropped_geometry: usize,
    /// Dropped for missing or out-of-range coordinates.
    pub dropped_coordinates: usize,
    /// Dropped because a date was present but unparseable.
    pub dropped_date: usize,
    /// Kept records whose date was absent and defaulted to "now".
    pub defaulted_date: usize,
}

impl LoadStats {
    /// Total number of dropped features.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped_geometry + self.dropped_coordinates + self.dropped_date
    }
}

/// An immutable, validated point snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    /// Valid incident records in source order.
    pub records: Vec<IncidentRecord>,
    /// Load statistics.
    pub stats: LoadStats,
}

impl Snapshot {
    /// Builds a snapshot from already-constructed records, dropping any
    /// with invalid coordinates.
    #[must_use]
    pub fn from_records(records: Vec<IncidentRecord>) -> Self {
        let total_features = records.len();
        let records: Vec<IncidentRecord> = records
            .into_iter()
            .filter(IncidentRecord::has_valid_coordinates)
            .collect();

        let stats = LoadStats {
            total_features,
            loaded: records.len(),
            dropped_coordinates: total_features - records.len(),
            ..LoadStats::default()
        };

        Self { records, stats }
    }
}

/// Supplies the immutable point snapshot for a pipeline run.
///
/// `Ok(None)` means the source does not exist (an empty-input outcome,
/// not a failure). `now` is the reference time used for records that carry
/// no date at all.
pub trait PointSource {
    /// Human-readable description for log output.
    fn describe(&self) -> String;

    /// Loads the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the source exists but cannot be read
    /// or parsed.
    fn load(&self, now: DateTime<Utc>) -> Result<Option<Snapshot>, SnapshotError>;
}

/// Reads a `GeoJSON` `FeatureCollection` file.
#[derive(Debug, Clone)]
pub struct GeoJsonFileSource {
    path: PathBuf,
    fields: FieldMapping,
}

impl GeoJsonFileSource {
    /// Creates a file source with the given property mapping.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, fields: FieldMapping) -> Self {
        Self {
            path: path.into(),
            fields,
        }
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PointSource for GeoJsonFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self, now: DateTime<Utc>) -> Result<Option<Snapshot>, SnapshotError> {
        if !self.path.exists() {
            log::warn!("Snapshot not found: {}", self.path.display());
            return Ok(None);
        }

        log::info!("Loading incidents from {}...", self.path.display());
        let text = std::fs::read_to_string(&self.path)?;
        let snapshot = parse_feature_collection(&text, &self.fields, now)?;
        Ok(Some(snapshot))
    }
}

/// A snapshot held in memory, mostly for tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    snapshot: Option<Snapshot>,
}

impl InMemorySource {
    /// Wraps pre-built records.
    #[must_use]
    pub fn new(records: Vec<IncidentRecord>) -> Self {
        Self {
            snapshot: Some(Snapshot::from_records(records)),
        }
    }

    /// A source that reports itself as absent.
    #[must_use]
    pub const fn absent() -> Self {
        Self { snapshot: None }
    }
}

impl PointSource for InMemorySource {
    fn describe(&self) -> String {
        self.snapshot.as_ref().map_or_else(
            || "in-memory (absent)".to_string(),
            |s| format!("in-memory ({} records)", s.records.len()),
        )
    }

    fn load(&self, _now: DateTime<Utc>) -> Result<Option<Snapshot>, SnapshotError> {
        Ok(self.snapshot.clone())
    }
}

/// Parses `GeoJSON` text into a validated [`Snapshot`].
///
/// # Errors
///
/// Returns [`SnapshotError`] if the text is not valid `GeoJSON` or not a
/// `FeatureCollection`.
pub fn parse_feature_collection(
    text: &str,
    fields: &FieldMapping,
    now: DateTime<Utc>,
) -> Result<Snapshot, SnapshotError> {
    let collection = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection,
        GeoJson::Feature(_) => return Err(SnapshotError::NotFeatureCollection { found: "Feature" }),
        GeoJson::Geometry(_) => {
            return Err(SnapshotError::NotFeatureCollection { found: "Geometry" });
        }
    };

    let mut stats = LoadStats {
        total_features: collection.features.len(),
        ..LoadStats::default()
    };
    let mut records = Vec::with_capacity(collection.features.len());

    for feature in collection.features {
        match feature_to_record(feature, fields, now) {
            Ok((record, defaulted)) => {
                if defaulted {
                    stats.defaulted_date += 1;
                }
                records.push(record);
            }
            Err(Rejection::Geometry) => stats.dropped_geometry += 1,
            Err(Rejection::Coordinates) => stats.dropped_coordinates += 1,
            Err(Rejection::Date) => stats.dropped_date += 1,
        }
    }

    stats.loaded = records.len();
    log::info!("Loaded {} incident records", stats.loaded);
    if stats.dropped() > 0 {
        log::warn!(
            "Dropped {} malformed features ({} geometry, {} coordinates, {} dates)",
            stats.dropped(),
            stats.dropped_geometry,
            stats.dropped_coordinates,
            stats.dropped_date
        );
    }
    if stats.defaulted_date > 0 {
        log::info!(
            "{} records had no date and were stamped with the reference time",
            stats.defaulted_date
        );
    }

    Ok(Snapshot { records, stats })
}

enum Rejection {
    Geometry,
    Coordinates,
    Date,
}

/// Converts a feature into a record. The boolean is `true` when the
/// record's date was absent and defaulted to `now`.
fn feature_to_record(
    feature: Feature,
    fields: &FieldMapping,
    now: DateTime<Utc>,
) -> Result<(IncidentRecord, bool), Rejection> {
    let Some(geometry) = feature.geometry else {
        return Err(Rejection::Geometry);
    };
    let geojson::Value::Point(position) = geometry.value else {
        return Err(Rejection::Geometry);
    };
    let (Some(&longitude), Some(&latitude)) = (position.first(), position.get(1)) else {
        return Err(Rejection::Coordinates);
    };
    if !is_valid_coordinate(latitude, longitude) {
        return Err(Rejection::Coordinates);
    }

    let attributes = feature.properties.unwrap_or_default();
    let text = |key: &str| attributes.get(key).and_then(parsing::value_as_text);

    let (occurred_at, defaulted) = match (text(&fields.date), text(&fields.fallback_date)) {
        (Some(date), _) => {
            let time = text(&fields.time);
            let parsed = parsing::combine_date_time(&date, time.as_deref());
            (parsed.ok_or(Rejection::Date)?, false)
        }
        (None, Some(timestamp)) => (
            parsing::parse_timestamp(&timestamp).ok_or(Rejection::Date)?,
            false,
        ),
        (None, None) => (now, true),
    };

    let record = IncidentRecord {
        latitude,
        longitude,
        occurred_at,
        year: attributes.get(&fields.year).and_then(parsing::value_as_year),
        category: text(&fields.category),
        severity: text(&fields.severity),
        region: text(&fields.region),
        attributes,
    };

    Ok((record, defaulted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [121.05, 14.60]},
             "properties": {"barangay": "Poblacion", "offensetype": "Collision", "severity": "Fatal",
                            "datecommitted": "2024-03-02", "timecommitted": "13:10", "year": 2024}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [121.06, 14.61]},
             "properties": {"barangay": "San Jose"}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [200.0, 14.61]},
             "properties": {}},
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
             "properties": {}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [121.0, 14.0]},
             "properties": {"datecommitted": "someday"}},
            {"type": "Feature", "geometry": null, "properties": {}}
        ]
    }"#;

    #[test]
    fn loads_valid_points_and_counts_drops() {
        let snapshot = parse_feature_collection(SAMPLE, &FieldMapping::default(), now()).unwrap();

        assert_eq!(snapshot.stats.total_features, 6);
        assert_eq!(snapshot.stats.loaded, 2);
        assert_eq!(snapshot.stats.dropped_coordinates, 1);
        assert_eq!(snapshot.stats.dropped_geometry, 2);
        assert_eq!(snapshot.stats.dropped_date, 1);
        assert_eq!(snapshot.stats.defaulted_date, 1);

        let first = &snapshot.records[0];
        assert_eq!(first.region.as_deref(), Some("Poblacion"));
        assert_eq!(first.category.as_deref(), Some("Collision"));
        assert_eq!(first.severity.as_deref(), Some("Fatal"));
        assert_eq!(first.year, Some(2024));
        assert_eq!(first.occurred_at.to_string(), "2024-03-02 13:10:00 UTC");
        assert!((first.longitude - 121.05).abs() < f64::EPSILON);
        assert_eq!(
            first.attributes.get("timecommitted"),
            Some(&serde_json::json!("13:10"))
        );

        let second = &snapshot.records[1];
        assert_eq!(second.occurred_at, now());
        assert_eq!(second.effective_year(), 2025);
    }

    #[test]
    fn falls_back_to_generic_date_property() {
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
             "properties": {"date": "2020-05-06T07:08:09"}}
        ]}"#;
        let snapshot = parse_feature_collection(text, &FieldMapping::default(), now()).unwrap();
        assert_eq!(
            snapshot.records[0].occurred_at.to_string(),
            "2020-05-06 07:08:09 UTC"
        );
    }

    #[test]
    fn rejects_non_collection_geojson() {
        let text = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
        let err = parse_feature_collection(text, &FieldMapping::default(), now()).unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::NotFeatureCollection { found: "Geometry" }
        ));
    }

    #[test]
    fn rejects_unparseable_text() {
        let err = parse_feature_collection("{not json", &FieldMapping::default(), now());
        assert!(matches!(err, Err(SnapshotError::GeoJson(_))));
    }

    #[test]
    fn missing_file_is_absent_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = GeoJsonFileSource::new(dir.path().join("missing.geojson"), FieldMapping::default());
        assert!(source.load(now()).unwrap().is_none());
    }

    #[test]
    fn reads_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accidents.geojson");
        std::fs::write(&path, SAMPLE).unwrap();

        let source = GeoJsonFileSource::new(&path, FieldMapping::default());
        let snapshot = source.load(now()).unwrap().unwrap();
        assert_eq!(snapshot.records.len(), 2);
    }

    #[test]
    fn in_memory_source_drops_invalid_coordinates() {
        let valid = IncidentRecord {
            latitude: 10.0,
            longitude: 20.0,
            occurred_at: now(),
            year: None,
            category: None,
            severity: None,
            region: None,
            attributes: serde_json::Map::new(),
        };
        let invalid = IncidentRecord {
            latitude: 95.0,
            ..valid.clone()
        };

        let snapshot = InMemorySource::new(vec![valid, invalid])
            .load(now())
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.stats.dropped_coordinates, 1);
        assert!(InMemorySource::absent().load(now()).unwrap().is_none());
    }
}
