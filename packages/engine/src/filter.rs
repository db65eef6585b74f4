//! Filter stage: narrows a snapshot to the working set.

use hotspot_incident_models::{FilterDescriptor, IncidentRecord};

/// Result of applying a filter to a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// No record satisfied the filter. A valid "no data" result.
    Empty,
    /// The records to analyze, in snapshot order.
    Working(Vec<IncidentRecord>),
}

impl FilterOutcome {
    /// Number of records in the working set.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Working(records) => records.len(),
        }
    }

    /// Whether the working set is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Keeps the records matching every populated constraint of `filter`.
///
/// Records with invalid coordinates are skipped here as well, so sources
/// that bypass the snapshot loader cannot feed them to the clusterer.
#[must_use]
pub fn apply_filter(records: Vec<IncidentRecord>, filter: &FilterDescriptor) -> FilterOutcome {
    let normalized = filter.normalized();
    let total = records.len();

    let mut invalid = 0_usize;
    let working: Vec<IncidentRecord> = records
        .into_iter()
        .filter(|record| {
            if record.has_valid_coordinates() {
                true
            } else {
                invalid += 1;
                false
            }
        })
        .filter(|record| normalized.matches(record))
        .collect();

    if invalid > 0 {
        log::warn!("Skipped {invalid} records with invalid coordinates");
    }
    log::info!("Filter kept {}/{total} records", working.len());

    if working.is_empty() {
        FilterOutcome::Empty
    } else {
        FilterOutcome::Working(working)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};

    use super::*;

    fn record(year: i32, region: &str, lat: f64) -> IncidentRecord {
        IncidentRecord {
            latitude: lat,
            longitude: 121.0,
            occurred_at: Utc.with_ymd_and_hms(year, 5, 1, 0, 0, 0).unwrap(),
            year: None,
            category: Some("Collision".to_string()),
            severity: Some("Fatal".to_string()),
            region: Some(region.to_string()),
            attributes: serde_json::Map::new(),
        }
    }

    fn snapshot() -> Vec<IncidentRecord> {
        vec![
            record(2018, "Poblacion", 14.0),
            record(2019, "Poblacion", 14.1),
            record(2019, "San Jose", 14.2),
            record(2020, "Poblacion", 95.0),
        ]
    }

    #[test]
    fn narrows_by_year_and_region() {
        let filter: FilterDescriptor =
            serde_json::from_str(r#"{"years": [2019], "location": "Poblacion"}"#).unwrap();
        let FilterOutcome::Working(records) = apply_filter(snapshot(), &filter) else {
            panic!("expected records");
        };
        assert_eq!(records.len(), 1);
        assert!((records[0].latitude - 14.1).abs() < f64::EPSILON);
    }

    #[test]
    fn year_order_does_not_matter() {
        let a: FilterDescriptor = serde_json::from_str(r#"{"years": [2018, 2019]}"#).unwrap();
        let b: FilterDescriptor = serde_json::from_str(r#"{"years": [2019, 2018]}"#).unwrap();
        assert_eq!(apply_filter(snapshot(), &a), apply_filter(snapshot(), &b));
    }

    #[test]
    fn empty_selection_is_not_an_error() {
        let filter: FilterDescriptor = serde_json::from_str(r#"{"years": [1999]}"#).unwrap();
        let outcome = apply_filter(snapshot(), &filter);
        assert!(outcome.is_empty());
        assert_eq!(outcome.len(), 0);
    }

    #[test]
    fn invalid_coordinates_never_reach_the_working_set() {
        let outcome = apply_filter(snapshot(), &FilterDescriptor::default());
        assert_eq!(outcome.len(), 3);
    }
}
