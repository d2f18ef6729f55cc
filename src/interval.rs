//! Interval math shared by every module that needs to decide whether two date
//! ranges are concurrent. `overlaps` is the only overlap predicate in the crate.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::model::Ms;

/// Closed-interval intersection: `[a_start, a_end]` and `[b_start, b_end]`
/// share at least one instant. Touching endpoints overlap.
pub fn overlaps(a_start: Ms, a_end: Ms, b_start: Ms, b_end: Ms) -> bool {
    a_start <= b_end && b_start <= a_end
}

/// Accept an allocation percentage in `[1, 100]`.
pub fn allocation_percentage(value: i64) -> Option<u8> {
    if (1..=100).contains(&value) {
        Some(value as u8)
    } else {
        None
    }
}

/// Share of `[start, end]` that has elapsed at `now`, clamped to `[0, 100]`.
pub fn fraction_elapsed(now: Ms, start: Ms, end: Ms) -> f64 {
    let total = end - start;
    if total <= 0 {
        return if now >= end { 100.0 } else { 0.0 };
    }
    let elapsed = (now - start) as f64 / total as f64 * 100.0;
    elapsed.clamp(0.0, 100.0)
}

/// Round to two decimal places, the precision reports are published at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Midnight UTC of a calendar date, in unix milliseconds.
pub fn date_ms(date: NaiveDate) -> Ms {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Parse a timestamp given as unix milliseconds, an ISO-8601 date
/// (`2024-06-01`), an RFC 3339 datetime, or a naive `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_timestamp(s: &str) -> Option<Ms> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<i64>() {
        return Some(ms);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date_ms(date));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

pub fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}
