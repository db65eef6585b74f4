//! Date, time, and property parsing helpers for snapshot features.
//!
//! Spreadsheet exports carry dates in a handful of layouts and times as
//! separate columns, so every parser here tries a short list of formats and
//! returns `None` rather than an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%B %d, %Y"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M:%S", "%H:%M", "%I:%M:%S %p", "%I:%M %p"];

/// Parses a full timestamp: RFC 3339, a naive datetime, or a bare date
/// (midnight UTC).
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    parse_date(s).map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Parses a calendar date in any of the supported layouts.
#[must_use]
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(s, format).ok())
}

/// Parses a time of day (24-hour or 12-hour with AM/PM).
#[must_use]
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(s, format).ok())
}

/// Combines a date column with an optional time column.
///
/// A missing or unparseable time falls back to midnight; an unparseable
/// date yields `None`. If the date column already carries a time, the
/// separate time column is ignored.
#[must_use]
pub fn combine_date_time(date: &str, time: Option<&str>) -> Option<DateTime<Utc>> {
    if let Some(date_only) = parse_date(date) {
        let time_of_day = time.and_then(parse_time).unwrap_or(NaiveTime::MIN);
        return Some(date_only.and_time(time_of_day).and_utc());
    }
    parse_timestamp(date)
}

/// Renders a JSON property as trimmed text. Numbers are rendered in their
/// JSON form; null, blank strings, and structured values yield `None`.
#[must_use]
pub fn value_as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            None
        }
    }
}

/// Reads a year from a JSON number (`2021`, `2021.0`) or numeric string.
#[must_use]
pub fn value_as_year(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|y| i32::try_from(y).ok())
            .or_else(|| n.as_f64().and_then(whole_year)),
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i32>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(whole_year))
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn whole_year(value: f64) -> Option<i32> {
    (value.fract() == 0.0 && value.abs() < 100_000.0).then(|| value as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_and_rfc3339_timestamps() {
        let dt = parse_timestamp("2024-01-15T14:30:00").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 14:30:00 UTC");

        let dt = parse_timestamp("2024-01-15T14:30:00+08:00").unwrap();
        assert_eq!(dt.to_string(), "2024-01-15 06:30:00 UTC");
    }

    #[test]
    fn bare_date_becomes_midnight() {
        let dt = parse_timestamp("2023-07-04").unwrap();
        assert_eq!(dt.to_string(), "2023-07-04 00:00:00 UTC");
    }

    #[test]
    fn combines_separate_date_and_time_columns() {
        let dt = combine_date_time("2022-11-30", Some("5:45 PM")).unwrap();
        assert_eq!(dt.to_string(), "2022-11-30 17:45:00 UTC");

        let dt = combine_date_time("11/30/2022", Some("08:15:00")).unwrap();
        assert_eq!(dt.to_string(), "2022-11-30 08:15:00 UTC");
    }

    #[test]
    fn unparseable_time_falls_back_to_midnight() {
        let dt = combine_date_time("2022-11-30", Some("unknown")).unwrap();
        assert_eq!(dt.to_string(), "2022-11-30 00:00:00 UTC");
    }

    #[test]
    fn rejects_garbage_dates() {
        assert!(parse_timestamp("not-a-date").is_none());
        assert!(combine_date_time("31/31/2022", None).is_none());
    }

    #[test]
    fn reads_years_from_numbers_and_strings() {
        assert_eq!(value_as_year(&serde_json::json!(2021)), Some(2021));
        assert_eq!(value_as_year(&serde_json::json!(2021.0)), Some(2021));
        assert_eq!(value_as_year(&serde_json::json!(" 2019 ")), Some(2019));
        assert_eq!(value_as_year(&serde_json::json!("n/a")), None);
    }

    #[test]
    fn renders_property_text() {
        assert_eq!(value_as_text(&serde_json::json!("  Poblacion ")).as_deref(), Some("Poblacion"));
        assert_eq!(value_as_text(&serde_json::json!(3)).as_deref(), Some("3"));
        assert_eq!(value_as_text(&serde_json::json!("   ")), None);
        assert_eq!(value_as_text(&serde_json::Value::Null), None);
    }
}
