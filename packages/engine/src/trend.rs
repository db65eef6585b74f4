//! Localized incident-frequency trends.
//!
//! The working set's bounding box is cut into an equal-width lat/lon grid.
//! Within each grid cell, incidents are counted per calendar month and a
//! least-squares line is fitted through the counts of the observed months.
//! A cell's trend is the fitted slope (incidents per observed month) when
//! the fit is correlated enough, and 0 otherwise. Every record inherits
//! its cell's trend.

use std::collections::BTreeMap;

use chrono::Datelike as _;
use hotspot_engine_models::TrendConfig;
use hotspot_incident_models::IncidentRecord;

/// Trend score for every record, in record order.
#[must_use]
pub fn trend_scores(records: &[IncidentRecord], config: &TrendConfig) -> Vec<f64> {
    if records.is_empty() {
        return Vec::new();
    }

    let lat_axis = GridAxis::fit(records.iter().map(|r| r.latitude), config.grid_bins);
    let lon_axis = GridAxis::fit(records.iter().map(|r| r.longitude), config.grid_bins);

    let cells: Vec<(usize, usize)> = records
        .iter()
        .map(|r| (lat_axis.bin(r.latitude), lon_axis.bin(r.longitude)))
        .collect();

    let mut monthly: BTreeMap<(usize, usize), BTreeMap<i32, u32>> = BTreeMap::new();
    for (record, cell) in records.iter().zip(&cells) {
        *monthly
            .entry(*cell)
            .or_default()
            .entry(month_index(record))
            .or_default() += 1;
    }

    let cell_trends: BTreeMap<(usize, usize), f64> = monthly
        .into_iter()
        .map(|(cell, months)| {
            let counts: Vec<f64> = months.into_values().map(f64::from).collect();
            (cell, linear_trend(&counts, config))
        })
        .collect();

    let nonzero = cell_trends.values().filter(|t| **t != 0.0).count();
    log::debug!(
        "Trend grid: {} occupied cells, {nonzero} with a significant trend",
        cell_trends.len()
    );

    cells
        .iter()
        .map(|cell| cell_trends.get(cell).copied().unwrap_or(0.0))
        .collect()
}

/// Months since year 0, used only for chronological ordering.
fn month_index(record: &IncidentRecord) -> i32 {
    #[allow(clippy::cast_possible_wrap)]
    let month0 = record.occurred_at.month0() as i32;
    record.occurred_at.year() * 12 + month0
}

/// Slope of `counts` against their positional index, or 0 when there are
/// too few observations or the correlation is too weak.
#[must_use]
pub fn linear_trend(counts: &[f64], config: &TrendConfig) -> f64 {
    if counts.len() < config.min_observations.max(2) {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let n = counts.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = counts.iter().sum::<f64>() / n;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (i, &y) in counts.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let dx = i as f64 - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if syy == 0.0 {
        return 0.0;
    }

    let r = sxy / (sxx * syy).sqrt();
    if r.abs() > config.min_correlation {
        sxy / sxx
    } else {
        0.0
    }
}

/// Equal-width binning of one axis, right-closed like a histogram cut:
/// the minimum falls in bin 0 and each bin covers `(lo, hi]`.
#[derive(Debug, Clone, Copy)]
struct GridAxis {
    min: f64,
    width: f64,
    bins: usize,
}

impl GridAxis {
    fn fit(values: impl Iterator<Item = f64>, bins: usize) -> Self {
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        let bins = bins.max(1);
        #[allow(clippy::cast_precision_loss)]
        let width = (max - min) / bins as f64;
        Self { min, width, bins }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn bin(&self, value: f64) -> usize {
        if !self.width.is_finite() || self.width <= 0.0 {
            return 0;
        }
        let position = ((value - self.min) / self.width).ceil() - 1.0;
        if position <= 0.0 {
            0
        } else {
            (position as usize).min(self.bins - 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};

    use super::*;

    fn record(lat: f64, lon: f64, year: i32, month: u32) -> IncidentRecord {
        IncidentRecord {
            latitude: lat,
            longitude: lon,
            occurred_at: Utc.with_ymd_and_hms(year, month, 10, 9, 0, 0).unwrap(),
            year: None,
            category: None,
            severity: None,
            region: None,
            attributes: serde_json::Map::new(),
        }
    }

    #[test]
    fn rising_counts_give_positive_slope() {
        let config = TrendConfig::default();
        let slope = linear_trend(&[1.0, 2.0, 3.0, 4.0], &config);
        assert!((slope - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weak_correlation_is_suppressed() {
        let config = TrendConfig::default();
        assert!(linear_trend(&[3.0, 1.0, 1.0, 3.0], &config).abs() < f64::EPSILON);
    }

    #[test]
    fn flat_or_short_series_have_no_trend() {
        let config = TrendConfig::default();
        assert!(linear_trend(&[2.0, 2.0, 2.0, 2.0], &config).abs() < f64::EPSILON);
        assert!(linear_trend(&[1.0, 5.0], &config).abs() < f64::EPSILON);
    }

    #[test]
    fn records_inherit_cell_trend() {
        // A growing cell at the south-west corner and a shrinking one at
        // the north-east corner.
        let mut records = Vec::new();
        for (month, count) in [(1, 1), (2, 2), (3, 3), (4, 4)] {
            for _ in 0..count {
                records.push(record(14.0, 121.0, 2023, month));
            }
        }
        for (month, count) in [(1, 4), (2, 3), (3, 2), (4, 1)] {
            for _ in 0..count {
                records.push(record(15.0, 122.0, 2023, month));
            }
        }

        let scores = trend_scores(&records, &TrendConfig::default());
        assert!(scores[..10].iter().all(|&s| (s - 1.0).abs() < 1e-12));
        assert!(scores[10..].iter().all(|&s| (s + 1.0).abs() < 1e-12));
    }

    #[test]
    fn gaps_between_months_are_not_counted() {
        // Observed months are indexed positionally, so a gap does not
        // flatten the slope.
        let mut records = Vec::new();
        for (year, month, count) in [(2021, 1, 1), (2022, 6, 2), (2023, 12, 3)] {
            for _ in 0..count {
                records.push(record(14.5, 121.5, year, month));
            }
        }
        let scores = trend_scores(&records, &TrendConfig::default());
        assert!(scores.iter().all(|&s| (s - 1.0).abs() < 1e-12));
    }

    #[test]
    fn degenerate_axis_uses_single_bin() {
        let axis = GridAxis::fit([5.0, 5.0, 5.0].into_iter(), 50);
        assert_eq!(axis.bin(5.0), 0);

        let axis = GridAxis::fit([0.0, 10.0].into_iter(), 10);
        assert_eq!(axis.bin(0.0), 0);
        assert_eq!(axis.bin(1.0), 0);
        assert_eq!(axis.bin(1.5), 1);
        assert_eq!(axis.bin(10.0), 9);
    }
}
