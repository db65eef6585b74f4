//! Danger scoring, ranking, and alert selection.
//!
//! `danger = temporal_weight × mean(w) + trend_weight × max(0, mean(trend))
//! + frequency_weight × min(count / frequency_cap, 1)`
//!
//! Each component is roughly bounded to `[0, 1]`, but the trend term is an
//! unnormalized slope, so the sum can exceed 1 for sharply rising clusters
//! unless [`ScoringConfig::clamp_score`] is set.

use chrono::{DateTime, TimeDelta, Utc};
use geo::{Centroid as _, MultiPoint, Point};
use hotspot_engine_models::{ClusterSummary, DangerLevel, MobileAlert, ScoringConfig, TrendDirection};
use hotspot_incident_models::ClusterId;

use crate::density::EARTH_RADIUS_M;
use crate::prune::{centroid_distances, members_by_cluster};
use crate::RecordColumns;

/// Scores every non-noise cluster and returns the summaries ranked by
/// danger (descending, ties by ascending id), with alert flags set.
#[must_use]
pub fn score_clusters(
    labels: &[ClusterId],
    columns: RecordColumns<'_>,
    now: DateTime<Utc>,
    config: &ScoringConfig,
) -> Vec<ClusterSummary> {
    let recent_cutoff = now - TimeDelta::days(config.recent_window_days);

    let mut scored: Vec<(f64, ClusterSummary)> = members_by_cluster(labels)
        .into_iter()
        .map(|(cluster, indices)| {
            #[allow(clippy::cast_precision_loss)]
            let count = indices.len() as f64;
            let mean_weight = indices.iter().map(|&i| columns.weights[i]).sum::<f64>() / count;
            let mean_trend = indices.iter().map(|&i| columns.trends[i]).sum::<f64>() / count;
            let danger = danger_score(mean_weight, mean_trend, indices.len(), config);

            let recent_accidents = indices
                .iter()
                .filter(|&&i| columns.records[i].occurred_at > recent_cutoff)
                .count();

            let (center_lat, center_lon) = center(columns, &indices);

            let mut regions: Vec<String> = Vec::new();
            for &i in &indices {
                if let Some(region) = &columns.records[i].region
                    && !regions.contains(region)
                {
                    regions.push(region.clone());
                }
            }

            let max_spread = centroid_distances(columns.records, &indices)
                .into_iter()
                .fold(0.0_f64, f64::max);
            if max_spread > config.spread_warning_radians {
                log::warn!(
                    "Cluster {cluster} is spread out: {} members, radius {:.0} m",
                    indices.len(),
                    max_spread * EARTH_RADIUS_M
                );
            }

            let summary = ClusterSummary {
                cluster_id: cluster,
                center_lat,
                center_lon,
                accident_count: indices.len(),
                danger_score: round_to(danger, 4),
                recent_accidents,
                avg_temporal_weight: round_to(mean_weight, 4),
                avg_trend_score: round_to(mean_trend, 4),
                regions,
                max_spread_m: round_to(max_spread * EARTH_RADIUS_M, 2),
                alert: false,
            };
            (danger, summary)
        })
        .collect();

    scored.sort_by(|(a, x), (b, y)| b.total_cmp(a).then(x.cluster_id.cmp(&y.cluster_id)));
    let mut summaries: Vec<ClusterSummary> = scored.into_iter().map(|(_, s)| s).collect();
    mark_alerts(&mut summaries, config.alert_percentile);
    summaries
}

/// Composite danger score for one cluster.
#[must_use]
pub fn danger_score(mean_weight: f64, mean_trend: f64, count: usize, config: &ScoringConfig) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let frequency = (count as f64 / config.frequency_cap as f64).min(1.0);
    let score = config.trend_weight.mul_add(
        mean_trend.max(0.0),
        config.temporal_weight.mul_add(mean_weight, config.frequency_weight * frequency),
    );
    if config.clamp_score {
        score.clamp(0.0, 1.0)
    } else {
        score
    }
}

fn center(columns: RecordColumns<'_>, indices: &[usize]) -> (f64, f64) {
    let points: MultiPoint<f64> = indices
        .iter()
        .map(|&i| Point::new(columns.records[i].longitude, columns.records[i].latitude))
        .collect();
    points
        .centroid()
        .map_or((f64::NAN, f64::NAN), |c| (c.y(), c.x()))
}

/// Flags the clusters whose score reaches the top `top_percent` of all
/// scores.
pub fn mark_alerts(summaries: &mut [ClusterSummary], top_percent: f64) {
    let scores: Vec<f64> = summaries.iter().map(|s| s.danger_score).collect();
    let Some(threshold) = percentile(&scores, 100.0 - top_percent) else {
        return;
    };

    for summary in summaries.iter_mut() {
        summary.alert = summary.danger_score >= threshold;
    }
    log::info!(
        "Alert threshold {threshold:.4}: {} of {} clusters",
        summaries.iter().filter(|s| s.alert).count(),
        summaries.len()
    );
}

/// The `q`-th percentile of `values` with linear interpolation between
/// closest ranks. `None` for an empty slice.
#[must_use]
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    #[allow(clippy::cast_precision_loss)]
    let position = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (lo, hi) = (position.floor() as usize, position.ceil() as usize);
    #[allow(clippy::cast_precision_loss)]
    let fraction = position - lo as f64;

    Some((sorted[hi] - sorted[lo]).mul_add(fraction, sorted[lo]))
}

/// Mobile alerts for every alert-flagged summary, in ranking order.
#[must_use]
pub fn mobile_alerts(summaries: &[ClusterSummary], config: &ScoringConfig) -> Vec<MobileAlert> {
    summaries
        .iter()
        .filter(|s| s.alert)
        .map(|s| {
            let trend = TrendDirection::from_trend(s.avg_trend_score);
            MobileAlert {
                cluster_id: s.cluster_id,
                center_lat: s.center_lat,
                center_lon: s.center_lon,
                radius_km: config.alert_radius_km,
                danger_level: DangerLevel::from_score(s.danger_score),
                danger_score: s.danger_score,
                accident_count: s.accident_count,
                recent_accidents: s.recent_accidents,
                trend,
                alert_message: alert_message(trend, s.recent_accidents),
            }
        })
        .collect()
}

fn alert_message(trend: TrendDirection, recent_accidents: usize) -> String {
    let mut message = String::from("Accident-prone area ahead");
    if trend == TrendDirection::Increasing {
        message.push_str(" with increasing accidents");
    }
    message.push('.');
    if recent_accidents > 0 {
        message.push_str(&format!(" {recent_accidents} recent accidents reported here."));
    }
    message.push_str(" Drive carefully.");
    message
}

/// Rounds half away from zero to `decimals` places.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use hotspot_incident_models::{IncidentRecord, NOISE_CLUSTER};

    use super::*;
    use crate::test_support::{record_at, reference_now};

    fn columns<'a>(
        records: &'a [IncidentRecord],
        weights: &'a [f64],
        trends: &'a [f64],
    ) -> RecordColumns<'a> {
        RecordColumns {
            records,
            weights,
            trends,
        }
    }

    #[test]
    fn composite_formula() {
        let config = ScoringConfig::default();
        let score = danger_score(0.8, 0.5, 50, &config);
        assert!((score - (0.4 * 0.8 + 0.3 * 0.5 + 0.3 * 0.5)).abs() < 1e-12);

        let negative_trend = danger_score(0.8, -3.0, 200, &config);
        assert!((negative_trend - (0.4 * 0.8 + 0.3)).abs() < 1e-12);
    }

    #[test]
    fn realistic_clusters_stay_within_unit_interval() {
        let config = ScoringConfig::default();
        for count in [1, 10, 100, 5000] {
            for weight in [0.05, 0.5, 1.0] {
                for trend in [-2.0, 0.0, 0.5, 1.0] {
                    let score = danger_score(weight, trend, count, &config);
                    assert!(
                        (0.0..=1.0 + 1e-9).contains(&score),
                        "{weight} {trend} {count}: {score}"
                    );
                }
            }
        }
    }

    #[test]
    fn steep_trend_exceeds_one_unless_clamped() {
        let mut config = ScoringConfig::default();
        assert!(danger_score(1.0, 5.0, 150, &config) > 1.0);

        config.clamp_score = true;
        assert!((danger_score(1.0, 5.0, 150, &config) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn percentile_interpolates() {
        let values = [0.1, 0.2, 0.3, 0.4, 0.5];
        assert!((percentile(&values, 80.0).unwrap() - 0.42).abs() < 1e-12);
        assert!((percentile(&values, 0.0).unwrap() - 0.1).abs() < 1e-12);
        assert!((percentile(&values, 100.0).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn summaries_are_ranked_and_counted() {
        let now = reference_now();
        let mut records = Vec::new();
        let mut labels = Vec::new();
        let mut weights = Vec::new();

        // Cluster 0: old and sparse. Cluster 1: recent and busy.
        for i in 0..6 {
            let mut r = record_at(14.6, 121.0 + f64::from(i) * 1e-5, 800);
            r.region = Some("Poblacion".to_string());
            records.push(r);
            labels.push(0);
            weights.push(0.3);
        }
        for i in 0..20 {
            let mut r = record_at(14.7, 121.1 + f64::from(i) * 1e-5, 10);
            r.region = Some(if i % 2 == 0 { "San Jose" } else { "Bagong Silang" }.to_string());
            records.push(r);
            labels.push(1);
            weights.push(0.95);
        }
        records.push(record_at(15.0, 122.0, 5));
        labels.push(NOISE_CLUSTER);
        weights.push(1.0);
        let trends = vec![0.0; records.len()];

        let summaries = score_clusters(
            &labels,
            columns(&records, &weights, &trends),
            now,
            &ScoringConfig::default(),
        );

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].cluster_id, 1);
        assert_eq!(summaries[0].accident_count, 20);
        assert_eq!(summaries[0].recent_accidents, 20);
        assert_eq!(summaries[0].regions, vec!["San Jose", "Bagong Silang"]);
        assert!(summaries[0].alert);
        assert_eq!(summaries[1].recent_accidents, 0);
        assert!(!summaries[1].alert);
        assert!((summaries[1].center_lat - 14.6).abs() < 1e-9);
        assert!(summaries[0].danger_score > summaries[1].danger_score);
    }

    #[test]
    fn alerts_describe_flagged_clusters() {
        let summary = ClusterSummary {
            cluster_id: 0,
            center_lat: 14.6,
            center_lon: 121.0,
            accident_count: 120,
            danger_score: 0.82,
            recent_accidents: 14,
            avg_temporal_weight: 0.9,
            avg_trend_score: 0.4,
            regions: vec![],
            max_spread_m: 40.0,
            alert: true,
        };
        let quiet = ClusterSummary {
            cluster_id: 1,
            danger_score: 0.35,
            recent_accidents: 0,
            avg_trend_score: 0.0,
            alert: true,
            ..summary.clone()
        };
        let unflagged = ClusterSummary {
            cluster_id: 2,
            alert: false,
            ..summary.clone()
        };

        let alerts = mobile_alerts(&[summary, quiet, unflagged], &ScoringConfig::default());
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].danger_level, DangerLevel::High);
        assert_eq!(alerts[0].trend, TrendDirection::Increasing);
        assert_eq!(
            alerts[0].alert_message,
            "Accident-prone area ahead with increasing accidents. 14 recent accidents reported here. Drive carefully."
        );
        assert_eq!(alerts[1].danger_level, DangerLevel::Low);
        assert_eq!(alerts[1].alert_message, "Accident-prone area ahead. Drive carefully.");
        assert!((alerts[1].radius_km - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn rounding() {
        assert!((round_to(0.123_456, 4) - 0.1235).abs() < 1e-12);
        assert!((round_to(12.345, 0) - 12.0).abs() < 1e-12);
    }
}
