//! Timestamp normalization to UTC.
//!
//! Kiwify webhooks carry naive local timestamps (`"2024-10-18 17:40:00"`)
//! that mean wall-clock time in São Paulo, while the REST API sends either
//! explicit-offset ISO strings or Unix epoch seconds. Whether a string has an
//! offset marker decides which instant it denotes, so the two forms are kept
//! strictly apart.

use std::sync::LazyLock;

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, SecondsFormat, TimeZone,
    Utc,
};
use chrono_tz::America::Sao_Paulo;
use regex::Regex;
use serde_json::Value;

use crate::path::get_path;

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})(?:[ T](\d{2})(?::(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?)?)?\s*(Z|z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("valid regex")
});

/// Returns the first path that parses as a timestamp.
///
/// Numbers are Unix epoch seconds. Strings with a `Z` or `±HH:MM`/`±HHMM`
/// suffix are taken at that offset. Strings without one are São Paulo local
/// time, converted with the zone's offset at that date.
#[must_use]
pub fn normalize_date(payload: &Value, paths: &[&str]) -> Option<DateTime<Utc>> {
    paths
        .iter()
        .filter_map(|p| get_path(payload, p))
        .find_map(parse_date_value)
}

/// Same as [`normalize_date`], rendered as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn normalize_date_string(payload: &Value, paths: &[&str]) -> Option<String> {
    normalize_date(payload, paths).map(|dt| format_utc_millis(&dt))
}

#[must_use]
pub fn format_utc_millis(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[must_use]
pub fn parse_date_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(epoch_seconds_to_utc),
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

/// Parses a single timestamp string. See [`normalize_date`] for the rules.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let Some(caps) = TIMESTAMP_RE.captures(trimmed) else {
        return DateTime::parse_from_rfc3339(trimmed)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    };

    let num = |i: usize| -> Option<u32> {
        caps.get(i).map_or(Some(0), |m| m.as_str().parse::<u32>().ok())
    };
    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?;
    let nanos = caps.get(7).map_or(Some(0), |m| {
        let digits = m.as_str();
        format!("{digits:0<9}").parse::<u32>().ok()
    })?;
    let time = NaiveTime::from_hms_nano_opt(num(4)?, num(5)?, num(6)?, nanos)?;
    let naive = NaiveDateTime::new(date, time);

    match caps.get(8) {
        Some(marker) => {
            let offset = parse_offset(marker.as_str())?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
        None => Some(sao_paulo_to_utc(naive)),
    }
}

/// Interprets `naive` as São Paulo wall-clock time.
///
/// Starts from treating the digits as UTC, reads the zone offset in effect at
/// that guess, shifts, then repeats once so instants near a DST boundary land
/// on the offset that actually applied.
#[must_use]
pub fn sao_paulo_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    let offset_at = |utc: NaiveDateTime| -> i64 {
        i64::from(
            Sao_Paulo
                .offset_from_utc_datetime(&utc)
                .fix()
                .local_minus_utc(),
        )
    };
    let first = naive - chrono::Duration::seconds(offset_at(naive));
    let second = naive - chrono::Duration::seconds(offset_at(first));
    Utc.from_utc_datetime(&second)
}

fn parse_offset(marker: &str) -> Option<FixedOffset> {
    if marker.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    let sign = if marker.starts_with('-') { -1 } else { 1 };
    let digits: String = marker[1..].chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 4 {
        return None;
    }
    let hours = digits[..2].parse::<i32>().ok()?;
    let minutes = digits[2..].parse::<i32>().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_seconds_to_utc(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let millis = (secs * 1000.0).round() as i64;
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn naive_timestamp_is_sao_paulo_local() {
        let v = json!({"t": "2024-10-18 17:40:00"});
        assert_eq!(
            normalize_date_string(&v, &["t"]).as_deref(),
            Some("2024-10-18T20:40:00.000Z")
        );
    }

    #[test]
    fn explicit_offset_is_honoured() {
        let v = json!({"t": "2024-10-18T17:40:00-03:00"});
        assert_eq!(
            normalize_date_string(&v, &["t"]).as_deref(),
            Some("2024-10-18T20:40:00.000Z")
        );
        let compact = json!({"t": "2024-10-18T17:40:00-0300"});
        assert_eq!(
            normalize_date_string(&compact, &["t"]).as_deref(),
            Some("2024-10-18T20:40:00.000Z")
        );
    }

    #[test]
    fn epoch_seconds_are_converted() {
        let v = json!({"t": 1_729_276_800});
        assert_eq!(
            normalize_date_string(&v, &["t"]).as_deref(),
            Some("2024-10-18T18:40:00.000Z")
        );
    }

    #[test]
    fn zulu_suffix_is_utc() {
        let v = json!({"t": "2024-10-18T17:40:00.123Z"});
        assert_eq!(
            normalize_date_string(&v, &["t"]).as_deref(),
            Some("2024-10-18T17:40:00.123Z")
        );
    }

    #[test]
    fn date_only_defaults_to_local_midnight() {
        let v = json!({"t": "2024-10-18"});
        assert_eq!(
            normalize_date_string(&v, &["t"]).as_deref(),
            Some("2024-10-18T03:00:00.000Z")
        );
    }

    #[test]
    fn historical_dst_offset_is_applied() {
        // São Paulo observed DST (UTC-2) in January 2018.
        let v = json!({"t": "2018-01-15 12:00:00"});
        assert_eq!(
            normalize_date_string(&v, &["t"]).as_deref(),
            Some("2018-01-15T14:00:00.000Z")
        );
    }

    #[test]
    fn first_parseable_path_wins() {
        let v = json!({"a": "not a date", "b": null, "c": "2024-01-02T00:00:00Z"});
        assert_eq!(
            normalize_date_string(&v, &["a", "b", "c"]).as_deref(),
            Some("2024-01-02T00:00:00.000Z")
        );
        assert_eq!(normalize_date(&v, &["a", "b"]), None);
    }

    #[test]
    fn invalid_calendar_dates_are_rejected() {
        assert_eq!(parse_timestamp("2024-02-30 10:00:00"), None);
        assert_eq!(parse_timestamp("2024-10-18 25:00:00"), None);
    }
}
