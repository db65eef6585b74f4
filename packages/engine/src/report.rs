//! `GeoJSON` report of an analysis run.
//!
//! A report is one `FeatureCollection`: an `accident_point` feature per
//! working-set record, followed by a `cluster_center` feature per cluster
//! in ranking order. Run counters ride along as the `stats` foreign
//! member. A run with nothing to cluster produces an empty collection
//! flagged with `no_data` and an `error` reason.

use chrono::SecondsFormat;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, JsonValue};
use hotspot_engine_models::{ClusterSummary, RunStats};
use hotspot_incident_models::{ClusterId, FeatureKind, IncidentRecord};

use crate::{EngineError, RecordColumns};

/// Reason reported when the filter leaves no records.
pub const NO_MATCHING_DATA: &str = "No data matches filters";

/// Builds the report for a completed analysis.
///
/// # Errors
///
/// Returns [`EngineError::Json`] if a summary or the stats cannot be
/// converted to JSON.
pub fn build_report(
    columns: RecordColumns<'_>,
    labels: &[ClusterId],
    summaries: &[ClusterSummary],
    stats: &RunStats,
) -> Result<FeatureCollection, EngineError> {
    let mut features = Vec::with_capacity(columns.records.len() + summaries.len());

    for (i, record) in columns.records.iter().enumerate() {
        features.push(accident_point(
            record,
            columns.weights[i],
            columns.trends[i],
            labels[i],
        ));
    }

    for summary in summaries {
        features.push(cluster_center(summary)?);
    }

    let mut foreign_members = JsonObject::new();
    foreign_members.insert("stats".to_string(), serde_json::to_value(stats)?);

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    })
}

fn accident_point(
    record: &IncidentRecord,
    temporal_weight: f64,
    trend_score: f64,
    cluster: ClusterId,
) -> Feature {
    let mut properties = record.attributes.clone();
    properties.insert(
        "date".to_string(),
        JsonValue::from(
            record
                .occurred_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
    );
    properties.insert("temporal_weight".to_string(), JsonValue::from(temporal_weight));
    properties.insert("trend_score".to_string(), JsonValue::from(trend_score));
    properties.insert("cluster".to_string(), JsonValue::from(cluster));
    properties.insert(
        "type".to_string(),
        JsonValue::from(FeatureKind::AccidentPoint.as_ref()),
    );

    point_feature(record.longitude, record.latitude, properties)
}

fn cluster_center(summary: &ClusterSummary) -> Result<Feature, EngineError> {
    let JsonValue::Object(mut properties) = serde_json::to_value(summary)? else {
        return Err(EngineError::InvalidReport(format!(
            "cluster {} did not serialize to an object",
            summary.cluster_id
        )));
    };
    properties.insert(
        "type".to_string(),
        JsonValue::from(FeatureKind::ClusterCenter.as_ref()),
    );

    Ok(point_feature(summary.center_lon, summary.center_lat, properties))
}

fn point_feature(lon: f64, lat: f64, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::Point(vec![lon, lat]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// An empty report flagged as carrying no data.
#[must_use]
pub fn no_data_report(reason: &str) -> FeatureCollection {
    let mut foreign_members = JsonObject::new();
    foreign_members.insert("no_data".to_string(), JsonValue::Bool(true));
    foreign_members.insert("error".to_string(), JsonValue::from(reason));

    FeatureCollection {
        bbox: None,
        features: Vec::new(),
        foreign_members: Some(foreign_members),
    }
}

/// Whether `collection` is a no-data report.
#[must_use]
pub fn is_no_data(collection: &FeatureCollection) -> bool {
    collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("no_data"))
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
}

/// Parses a serialized report.
///
/// # Errors
///
/// Returns [`EngineError::InvalidReport`] if `payload` is not a `GeoJSON`
/// `FeatureCollection`.
pub fn parse_report(payload: &str) -> Result<FeatureCollection, EngineError> {
    match payload.parse::<GeoJson>() {
        Ok(GeoJson::FeatureCollection(collection)) => Ok(collection),
        Ok(_) => Err(EngineError::InvalidReport(
            "expected a FeatureCollection".to_string(),
        )),
        Err(e) => Err(EngineError::InvalidReport(e.to_string())),
    }
}

/// Extracts the cluster summaries from a report's `cluster_center`
/// features, in report (ranking) order.
///
/// # Errors
///
/// Returns [`EngineError::Json`] if a `cluster_center` feature's
/// properties do not describe a cluster summary.
pub fn summaries_from_report(
    collection: &FeatureCollection,
) -> Result<Vec<ClusterSummary>, EngineError> {
    let center = FeatureKind::ClusterCenter.as_ref();

    collection
        .features
        .iter()
        .filter_map(|feature| feature.properties.as_ref())
        .filter(|properties| properties.get("type").and_then(JsonValue::as_str) == Some(center))
        .map(|properties| {
            let mut properties = properties.clone();
            properties.remove("type");
            Ok(serde_json::from_value(JsonValue::Object(properties))?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record_at;

    fn summary(cluster_id: ClusterId, danger_score: f64) -> ClusterSummary {
        ClusterSummary {
            cluster_id,
            center_lat: 14.6,
            center_lon: 121.0,
            accident_count: 12,
            danger_score,
            recent_accidents: 4,
            avg_temporal_weight: 0.8,
            avg_trend_score: 0.0,
            regions: vec!["Poblacion".to_string()],
            max_spread_m: 35.5,
            alert: cluster_id == 1,
        }
    }

    #[test]
    fn points_then_centers_in_ranking_order() {
        let mut record = record_at(14.6, 121.0, 3);
        record
            .attributes
            .insert("barangay".to_string(), JsonValue::from("Poblacion"));
        let records = vec![record, record_at(14.7, 121.1, 3)];
        let weights = vec![0.99, 0.98];
        let trends = vec![0.5, 0.0];
        let columns = RecordColumns {
            records: &records,
            weights: &weights,
            trends: &trends,
        };
        let summaries = vec![summary(1, 0.9), summary(0, 0.4)];

        let report = build_report(columns, &[0, -1], &summaries, &RunStats::default()).unwrap();

        assert_eq!(report.features.len(), 4);
        let kinds: Vec<&str> = report
            .features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()["type"].as_str().unwrap())
            .collect();
        assert_eq!(
            kinds,
            ["accident_point", "accident_point", "cluster_center", "cluster_center"]
        );

        let first = report.features[0].properties.as_ref().unwrap();
        assert_eq!(first["barangay"], "Poblacion");
        assert_eq!(first["cluster"], 0);
        assert_eq!(first["trend_score"], 0.5);
        assert_eq!(first["date"], "2024-05-29T12:00:00Z");
        assert_eq!(report.features[1].properties.as_ref().unwrap()["cluster"], -1);

        let parsed = summaries_from_report(&report).unwrap();
        assert_eq!(parsed, summaries);
        assert!(!is_no_data(&report));
    }

    #[test]
    fn no_data_report_serializes_flag_and_reason() {
        let report = no_data_report(NO_MATCHING_DATA);
        let json: JsonValue = serde_json::to_value(&report).unwrap();

        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"].as_array().unwrap().len(), 0);
        assert_eq!(json["no_data"], true);
        assert_eq!(json["error"], NO_MATCHING_DATA);
        assert!(is_no_data(&report));
    }

    #[test]
    fn parses_serialized_reports() {
        let text = serde_json::to_string(&no_data_report("gone")).unwrap();
        let parsed = parse_report(&text).unwrap();
        assert!(is_no_data(&parsed));
        assert!(summaries_from_report(&parsed).unwrap().is_empty());

        assert!(matches!(
            parse_report(r#"{"type":"Point","coordinates":[1.0,2.0]}"#),
            Err(EngineError::InvalidReport(_))
        ));
    }
}
