//! Temporal decay weighting.
//!
//! An incident's relevance decays exponentially with age:
//! `w = exp(-decay_rate × days / 365.25)`. With the default rate of 0.15 a
//! one-year-old incident weighs ~0.86 and a ten-year-old one ~0.22.

use chrono::{DateTime, Utc};
use hotspot_engine_models::TemporalConfig;
use hotspot_incident_models::IncidentRecord;

const DAYS_PER_YEAR: f64 = 365.25;

/// Weight of an incident that occurred at `occurred_at`, seen from `now`.
///
/// Age is counted in whole days; future-dated incidents have age 0, so the
/// result is always in `(0, 1]` for a non-negative rate.
#[must_use]
pub fn temporal_weight(occurred_at: DateTime<Utc>, now: DateTime<Utc>, decay_rate: f64) -> f64 {
    let days = now.signed_duration_since(occurred_at).num_days().max(0);
    #[allow(clippy::cast_precision_loss)]
    let years = days as f64 / DAYS_PER_YEAR;
    (-decay_rate * years).exp()
}

/// Weights for every record, in record order.
#[must_use]
pub fn temporal_weights(
    records: &[IncidentRecord],
    now: DateTime<Utc>,
    config: &TemporalConfig,
) -> Vec<f64> {
    records
        .iter()
        .map(|r| temporal_weight(r.occurred_at, now, config.decay_rate))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone as _};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn today_weighs_one() {
        assert!((temporal_weight(now(), now(), 0.15) - 1.0).abs() < 1e-12);
        assert!(
            (temporal_weight(now() - TimeDelta::hours(23), now(), 0.15) - 1.0).abs() < 1e-12,
            "partial days are floored"
        );
    }

    #[test]
    fn decays_with_age() {
        let one_year = temporal_weight(now() - TimeDelta::days(365), now(), 0.15);
        assert!((one_year - (-0.15_f64 * 365.0 / 365.25).exp()).abs() < 1e-12);

        let ten_years = temporal_weight(now() - TimeDelta::days(3652), now(), 0.15);
        assert!(ten_years < one_year);
        assert!(ten_years > 0.0);
    }

    #[test]
    fn future_records_are_clamped() {
        let w = temporal_weight(now() + TimeDelta::days(30), now(), 0.15);
        assert!((w - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_rate_disables_decay() {
        let w = temporal_weight(now() - TimeDelta::days(5000), now(), 0.0);
        assert!((w - 1.0).abs() < 1e-12);
    }
}
