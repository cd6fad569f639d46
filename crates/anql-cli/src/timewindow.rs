//! Time window parsing.
//!
//! A time window scopes the data scanned by a query. Each bound accepts:
//!
//! - an empty string (bound unset)
//! - `now` (case-insensitive)
//! - a Unix timestamp in seconds between 2000-01-01 and 2100-01-01
//! - a relative offset such as `-30m`, `-24h`, `-1w` (units `s m h d w`)
//! - an RFC3339 datetime, or `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`,
//!   `YYYY-MM-DD HH:MM`, `YYYY-MM-DD` (read as UTC)
//!
//! `now` and relative offsets read the wall clock, so two parses of the same
//! input can differ by the time elapsed between them.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use thiserror::Error;

/// 2000-01-01T00:00:00Z, inclusive.
pub const MIN_UNIX_TIMESTAMP: i64 = 946_684_800;
/// 2100-01-01T00:00:00Z, exclusive.
pub const MAX_UNIX_TIMESTAMP: i64 = 4_102_444_800;

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeWindowError {
    #[error("invalid {bound} time '{input}': timestamp {value} is out of reasonable range")]
    OutOfRange {
        bound: &'static str,
        input: String,
        value: i64,
    },

    #[error("invalid {bound} time '{input}': {reason}")]
    InvalidFormat {
        bound: &'static str,
        input: String,
        reason: String,
    },

    #[error("from time ({from}) must be before to time ({to})")]
    InvalidRange { from: i64, to: i64 },
}

/// Failure for a single bound, before it is attributed to `from` or `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BoundError {
    OutOfRange(i64),
    InvalidFormat(String),
}

impl BoundError {
    fn attribute(self, bound: &'static str, input: &str) -> TimeWindowError {
        match self {
            BoundError::OutOfRange(value) => TimeWindowError::OutOfRange {
                bound,
                input: input.to_string(),
                value,
            },
            BoundError::InvalidFormat(reason) => TimeWindowError::InvalidFormat {
                bound,
                input: input.to_string(),
                reason,
            },
        }
    }
}

/// Inclusive-exclusive time range applied to a query, in epoch seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl TimeWindow {
    pub fn is_unset(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Human readable description used by `.window show`.
    pub fn describe(&self) -> String {
        if self.is_unset() {
            return "No time window set (queries will use default time range)".to_string();
        }

        let line = |value: Option<i64>| match value {
            Some(ts) => format!("{} ({})", ts, format_timestamp(ts)),
            None => "(not set)".to_string(),
        };

        format!(
            "Current time window:\n  From: {}\n  To:   {}",
            line(self.from),
            line(self.to)
        )
    }
}

/// Render an epoch timestamp as local-time RFC3339.
pub fn format_timestamp(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, false),
        None => ts.to_string(),
    }
}

/// Parse a `from`/`to` pair against the current wall clock.
pub fn parse_time_window(from: &str, to: &str) -> Result<TimeWindow, TimeWindowError> {
    parse_time_window_at(from, to, Utc::now())
}

/// Parse a `from`/`to` pair relative to an explicit `now`.
pub fn parse_time_window_at(
    from: &str,
    to: &str,
    now: DateTime<Utc>,
) -> Result<TimeWindow, TimeWindowError> {
    let from_ts = parse_bound(from, now).map_err(|e| e.attribute("from", from))?;
    let to_ts = parse_bound(to, now).map_err(|e| e.attribute("to", to))?;

    // Zero is the unset sentinel for the range check, matching what the
    // service treats as "no bound".
    if let (Some(f), Some(t)) = (from_ts, to_ts) {
        if f != 0 && t != 0 && f >= t {
            return Err(TimeWindowError::InvalidRange { from: f, to: t });
        }
    }

    Ok(TimeWindow {
        from: from_ts,
        to: to_ts,
    })
}

fn parse_bound(input: &str, now: DateTime<Utc>) -> Result<Option<i64>, BoundError> {
    if input.is_empty() {
        return Ok(None);
    }
    parse_time_point(input, now).map(Some)
}

fn parse_time_point(input: &str, now: DateTime<Utc>) -> Result<i64, BoundError> {
    if input.eq_ignore_ascii_case("now") {
        return Ok(now.timestamp());
    }

    if let Ok(ts) = input.parse::<i64>() {
        if (MIN_UNIX_TIMESTAMP..MAX_UNIX_TIMESTAMP).contains(&ts) {
            return Ok(ts);
        }
        return Err(BoundError::OutOfRange(ts));
    }

    if let Some(relative) = input.strip_prefix('-') {
        let seconds = parse_relative_seconds(relative)?;
        return Ok(now.timestamp() - seconds);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.timestamp());
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(dt.and_utc().timestamp());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, DATE_FORMAT) {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc().timestamp());
        }
    }

    Err(BoundError::InvalidFormat(
        "unable to parse time format".to_string(),
    ))
}

/// Parse `<integer><unit>` into seconds.
fn parse_relative_seconds(relative: &str) -> Result<i64, BoundError> {
    let unit = match relative.chars().last() {
        Some(unit) if relative.len() > unit.len_utf8() => unit,
        _ => {
            return Err(BoundError::InvalidFormat(
                "invalid relative time format".to_string(),
            ))
        }
    };
    let digits = &relative[..relative.len() - unit.len_utf8()];

    let value: i64 = digits.parse().map_err(|_| {
        BoundError::InvalidFormat("invalid numeric value in relative time".to_string())
    })?;

    let unit_seconds = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 604_800,
        other => {
            return Err(BoundError::InvalidFormat(format!(
                "unsupported time unit '{}' (supported: s, m, h, d, w)",
                other
            )))
        }
    };

    value
        .checked_mul(unit_seconds)
        .ok_or_else(|| BoundError::InvalidFormat("relative time is too large".to_string()))
}
