use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tracing::warn;

/// Format a timestamp for storage. Fixed precision, always UTC with a `Z`
/// suffix, so that string comparison in SQL matches temporal order.
pub fn fmt_ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp back out. `created_at` columns use SQLite's
/// `datetime('now')` default, which is "YYYY-MM-DD HH:MM:SS" without a
/// timezone — fall back to parsing that as naive UTC.
pub fn parse_ts(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", s, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_precision_orders_lexicographically() {
        let a = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(500);
        let c = a + chrono::Duration::seconds(1);
        assert!(fmt_ts(a) < fmt_ts(b));
        assert!(fmt_ts(b) < fmt_ts(c));
    }

    #[test]
    fn parses_both_stored_formats() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 15).unwrap();
        assert_eq!(parse_ts(&fmt_ts(t)), t);
        assert_eq!(parse_ts("2025-06-01 12:30:15"), t);
    }
}
