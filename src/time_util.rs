use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Current instant. Stored and compared in UTC throughout; callers that need
/// wall-clock fields project through [`to_local`] with the configured `TZ`.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Project a UTC instant into the wall-clock time of `tz`.
///
/// Window membership and day boundaries are evaluated in this local frame
/// (not a fixed UTC offset) so that a configured `TZ` of
/// `America/Chicago` keeps "08:00-20:00" meaning 8am-8pm Chicago time
/// across DST transitions.
pub fn to_local(instant: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    instant.with_timezone(&tz)
}

/// Parse an RFC 3339 / ISO-8601 timestamp. Naive (offset-less) inputs are
/// rejected rather than silently localized — `sqlx`'s chrono integration
/// always round-trips offset-aware values, so a naive string here means the
/// caller (typically an HTTP request body) didn't send one.
pub fn parse_iso(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

pub fn to_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse `HH:MM`, ignoring any seconds component wherever it's compared.
pub fn parse_window_time(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| anyhow::anyhow!("invalid time '{s}': {e}"))
}

/// Minute-granular, inclusive-both-ends window membership. Handles windows
/// that cross midnight (`start > end`) and single-minute windows
/// (`start == end`).
pub fn time_in_window(check: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    let check = check.with_second(0).unwrap();
    let start = start.with_second(0).unwrap();
    let end = end.with_second(0).unwrap();

    if start == end {
        check == start
    } else if start < end {
        start <= check && check <= end
    } else {
        check >= start || check <= end
    }
}

trait WithSecond {
    fn with_second(self, sec: u32) -> Option<NaiveTime>;
}

impl WithSecond for NaiveTime {
    fn with_second(self, sec: u32) -> Option<NaiveTime> {
        chrono::Timelike::with_second(&self, sec).and_then(|t| chrono::Timelike::with_nanosecond(&t, 0))
    }
}

/// Validate a `TZ` string, falling back to UTC semantics documented by the
/// caller if invalid (callers of this function should treat an `Err` as a
/// config validation failure, not silently fall back).
pub fn parse_tz(s: &str) -> anyhow::Result<Tz> {
    s.parse::<Tz>().map_err(|_| anyhow::anyhow!("unknown timezone '{s}'"))
}

pub fn resolve_local_datetime(tz: Tz, date: chrono::NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn window_normal() {
        assert!(time_in_window(t(8, 0), t(8, 0), t(20, 0)));
        assert!(time_in_window(t(20, 0), t(8, 0), t(20, 0)));
        assert!(time_in_window(t(14, 30), t(8, 0), t(20, 0)));
        assert!(!time_in_window(t(7, 59), t(8, 0), t(20, 0)));
        assert!(!time_in_window(t(20, 1), t(8, 0), t(20, 0)));
    }

    #[test]
    fn window_crosses_midnight() {
        assert!(time_in_window(t(23, 0), t(22, 0), t(2, 0)));
        assert!(time_in_window(t(1, 0), t(22, 0), t(2, 0)));
        assert!(time_in_window(t(2, 0), t(22, 0), t(2, 0)));
        assert!(!time_in_window(t(12, 0), t(22, 0), t(2, 0)));
    }

    #[test]
    fn window_single_minute() {
        assert!(time_in_window(t(10, 2), t(10, 2), t(10, 2)));
        assert!(!time_in_window(t(10, 3), t(10, 2), t(10, 2)));
    }

    #[test]
    fn window_ignores_seconds() {
        let check = NaiveTime::from_hms_opt(8, 0, 45).unwrap();
        assert!(time_in_window(check, t(8, 0), t(20, 0)));
    }
}
