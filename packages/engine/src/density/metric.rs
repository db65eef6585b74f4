//! Distance metrics over feature rows.

use std::fmt;

/// Mean Earth radius in metres, for converting central angles.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Distance function applied to pairs of feature rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceMetric {
    /// Great-circle central angle in radians between `[lat, lon]` rows
    /// given in radians.
    Haversine,
    /// Straight-line distance in feature space.
    Euclidean,
}

impl DistanceMetric {
    /// Row width the metric requires, if fixed.
    #[must_use]
    pub const fn required_dims(self) -> Option<usize> {
        match self {
            Self::Haversine => Some(2),
            Self::Euclidean => None,
        }
    }

    /// Lowercase metric name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Haversine => "haversine",
            Self::Euclidean => "euclidean",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Central angle in radians between two points given in radians.
#[must_use]
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt())
}

/// Great-circle distance in metres between two points given in degrees.
#[must_use]
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    EARTH_RADIUS_M
        * haversine(
            lat1.to_radians(),
            lon1.to_radians(),
            lat2.to_radians(),
            lon2.to_radians(),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_latitude() {
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_195.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn haversine_is_symmetric_and_zero_on_diagonal() {
        let (lat1, lon1) = (14.6_f64.to_radians(), 121.0_f64.to_radians());
        let (lat2, lon2) = (14.61_f64.to_radians(), 121.02_f64.to_radians());
        assert!(haversine(lat1, lon1, lat1, lon1).abs() < 1e-15);
        assert!((haversine(lat1, lon1, lat2, lon2) - haversine(lat2, lon2, lat1, lon1)).abs() < 1e-15);
    }
}
