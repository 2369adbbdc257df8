//! Business-day arithmetic for stage deadlines
//!
//! All computations are date-only: any time-of-day is truncated at the
//! parsing boundary (`parse_date_lenient`) and never considered again.
//! A business day is Monday through Friday; the workflow tracks no holiday
//! calendar.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

/// Whether the date falls Monday-Friday
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Signed count of business days strictly between two dates.
///
/// Walks day-by-day in the sign direction of `end - start`; steps landing on
/// Saturday or Sunday are skipped. `start == end` is 0, a span contained in
/// a single weekend is 0, and swapping the arguments negates the result.
pub fn business_days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    if start == end {
        return 0;
    }

    let forward = end > start;
    let step = if forward {
        Duration::days(1)
    } else {
        Duration::days(-1)
    };

    let mut current = start;
    let mut count = 0i64;
    while current != end {
        current += step;
        if is_business_day(current) {
            count += if forward { 1 } else { -1 };
        }
    }
    count
}

/// `business_days_between` over possibly-unknown dates.
///
/// `None` in means `None` out: an unknown date yields an unknown distance,
/// never zero. Callers must not collapse `None` into "0 days".
pub fn business_days_between_opt(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<i64> {
    match (start, end) {
        (Some(s), Some(e)) => Some(business_days_between(s, e)),
        _ => None,
    }
}

/// Project a deadline `business_days` business days after `start`.
///
/// Walking a Monday forward by 5 lands on the following Monday.
pub fn project_due_date(start: NaiveDate, business_days: u32) -> NaiveDate {
    let mut current = start;
    let mut remaining = business_days;
    while remaining > 0 {
        current += Duration::days(1);
        if is_business_day(current) {
            remaining -= 1;
        }
    }
    current
}

/// Parse a stored date value leniently, truncating any time-of-day.
///
/// Accepts plain dates (`2024-03-18`), RFC 3339 timestamps and the common
/// `YYYY-MM-DD HH:MM:SS` form. Returns `None` for anything unparseable so
/// callers treat the value as unknown rather than as day zero.
pub fn parse_date_lenient(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    None
}
