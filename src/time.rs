//! Store calendar helpers.
//!
//! The store runs on Asia/Jakarta time (UTC+7, no daylight saving).
//! Transactions are stamped as RFC 3339 strings carrying the `+07:00`
//! offset; SQL bucketing shifts stored timestamps with the `'+7 hours'`
//! modifier so month/day/hour groups follow the store calendar.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Offset, SecondsFormat, Utc};
use uuid::Uuid;

/// Store offset from UTC, in seconds.
pub const STORE_UTC_OFFSET_SECS: i32 = 7 * 3600;

/// Indonesian short month names, January first.
pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "Mei", "Jun", "Jul", "Agu", "Sep", "Okt", "Nov", "Des",
];

/// Indonesian short day names, Monday first.
pub const DAY_LABELS: [&str; 7] = ["Sen", "Sel", "Rab", "Kam", "Jum", "Sab", "Min"];

pub fn store_offset() -> FixedOffset {
    FixedOffset::east_opt(STORE_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Current instant on the store clock.
pub fn now_store() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&store_offset())
}

/// Storage form of a timestamp: `2025-01-31T19:05:00+07:00`.
pub fn to_store_string(at: DateTime<FixedOffset>) -> String {
    at.with_timezone(&store_offset())
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Time-based id with a random three-digit suffix, e.g. `TRX-1717000000000-42`.
pub fn generate_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().as_u128() % 1000;
    format!("{prefix}-{}-{suffix}", Utc::now().timestamp_millis())
}

/// Label for a 1-based month number; out-of-range months yield `"-"`.
pub fn month_label(month: u32) -> &'static str {
    month
        .checked_sub(1)
        .and_then(|i| MONTH_LABELS.get(i as usize))
        .copied()
        .unwrap_or("-")
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        year.checked_add(1)
            .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1))
    } else {
        month
            .checked_add(1)
            .and_then(|next| NaiveDate::from_ymd_opt(year, next, 1))
    };
    match (first, next) {
        (Some(a), Some(b)) => (b - a).num_days() as u32,
        _ => 30,
    }
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Parse an expense date in `YYYY-MM-DD` form.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Local-calendar SQL form (`YYYY-MM-DD HH:MM:SS`) used for range comparisons
/// against `datetime(created_at, '+7 hours')`.
pub fn sql_local_midnight(date: NaiveDate) -> String {
    format!("{} 00:00:00", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_store_string_carries_offset() {
        let at = store_offset()
            .with_ymd_and_hms(2025, 1, 31, 19, 5, 0)
            .single()
            .unwrap();
        assert_eq!(to_store_string(at), "2025-01-31T19:05:00+07:00");
    }

    #[test]
    fn test_utc_instant_renders_in_store_offset() {
        let at = Utc
            .with_ymd_and_hms(2024, 12, 31, 18, 30, 0)
            .single()
            .unwrap()
            .fixed_offset();
        assert_eq!(to_store_string(at), "2025-01-01T01:30:00+07:00");
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id("TRX");
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TRX");
        assert!(parts[1].parse::<i64>().is_ok());
        let suffix: u32 = parts[2].parse().unwrap();
        assert!(suffix < 1000);
    }

    #[test]
    fn test_month_labels() {
        assert_eq!(month_label(1), "Jan");
        assert_eq!(month_label(5), "Mei");
        assert_eq!(month_label(8), "Agu");
        assert_eq!(month_label(12), "Des");
        assert_eq!(month_label(0), "-");
        assert_eq!(month_label(13), "-");
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2025, 12), 31);
        assert_eq!(days_in_month(2025, 4), 30);
        assert_eq!(days_in_month(i32::MAX, 12), 30);
        assert_eq!(days_in_month(2025, u32::MAX), 30);
    }

    #[test]
    fn test_week_start_is_monday() {
        // 2025-06-15 is a Sunday.
        let sunday = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(
            week_start(sunday),
            NaiveDate::from_ymd_opt(2025, 6, 9).unwrap()
        );
        let monday = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn test_parse_date() {
        assert!(parse_date("2025-02-28").is_some());
        assert!(parse_date(" 2025-02-28 ").is_some());
        assert!(parse_date("2025-02-30").is_none());
        assert!(parse_date("28/02/2025").is_none());
    }
}
