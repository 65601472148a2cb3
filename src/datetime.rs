//! Date/time utilities for Agora.
//!
//! Timestamps are stored by SQLite as UTC text (`YYYY-MM-DD HH:MM:SS`), dates as
//! `YYYY-MM-DD`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Storage format for dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Storage format for timestamps.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Today's date in the given timezone.
///
/// Unknown timezone names fall back to UTC.
pub fn today_in(timezone: &str) -> NaiveDate {
    let now = Utc::now();
    match timezone.parse::<Tz>() {
        Ok(tz) => now.with_timezone(&tz).date_naive(),
        Err(_) => now.date_naive(),
    }
}

/// Parse a stored date (`YYYY-MM-DD`). A trailing time part is ignored.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

/// Format a date for storage.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a stored timestamp in SQLite or RFC3339 format.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).ok()
}

/// Format a stored UTC timestamp in the given timezone.
///
/// Returns the input unchanged when either the timestamp or the timezone
/// cannot be parsed.
pub fn format_datetime(datetime_str: &str, timezone: &str, format: &str) -> String {
    let (Some(naive), Ok(tz)) = (parse_datetime(datetime_str), timezone.parse::<Tz>()) else {
        return datetime_str.to_string();
    };
    naive.and_utc().with_timezone(&tz).format(format).to_string()
}

/// Turn a `YYYY-MM` key into a label such as `2024 March`.
pub fn month_label(year_month: &str) -> String {
    NaiveDate::parse_from_str(&format!("{year_month}-01"), DATE_FORMAT)
        .map(|d| d.format("%Y %B").to_string())
        .unwrap_or_else(|_| year_month.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-03-15"),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(
            parse_date("2024-03-15 10:30:00"),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_format_date_round_trip() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert_eq!(format_date(date), "2025-01-02");
        assert_eq!(parse_date(&format_date(date)), Some(date));
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(parse_datetime("2024-01-15 10:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-01-15T10:30:00Z"), Some(expected));
        assert_eq!(parse_datetime("2024/01/15"), None);
    }

    #[test]
    fn test_format_datetime_timezone() {
        assert_eq!(
            format_datetime("2024-01-15 10:30:00", "Asia/Tokyo", "%Y/%m/%d %H:%M"),
            "2024/01/15 19:30"
        );
        assert_eq!(
            format_datetime("2024-01-15 10:30:00", "Invalid/Zone", "%H:%M"),
            "2024-01-15 10:30:00"
        );
    }

    #[test]
    fn test_today_in_unknown_timezone_falls_back() {
        let today = today_in("Nowhere/Nothing");
        assert_eq!(today, Utc::now().date_naive());
    }

    #[test]
    fn test_month_label() {
        assert_eq!(month_label("2024-03"), "2024 March");
        assert_eq!(month_label("garbage"), "garbage");
    }
}
