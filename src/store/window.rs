//! Calendar-day windows for daily aggregation.
//!
//! Both bounds derive from a single captured instant: `[midnight, next
//! midnight)` of that instant's date in the configured zone.

use chrono::{DateTime, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Zone whose calendar day defines "today".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayZone {
    /// The server's local zone.
    #[default]
    Local,
    /// A fixed IANA zone from configuration.
    Named(chrono_tz::Tz),
}

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

impl DayZone {
    /// Parse an IANA name; `None` selects the server's local zone.
    pub fn from_name(name: Option<&str>) -> anyhow::Result<Self> {
        match name {
            None => Ok(DayZone::Local),
            Some(n) => n
                .parse::<chrono_tz::Tz>()
                .map(DayZone::Named)
                .map_err(|e| anyhow::anyhow!("unknown time zone '{n}': {e}")),
        }
    }

    /// The day containing `now`.
    pub fn window(&self, now: DateTime<Utc>) -> DayWindow {
        match self {
            DayZone::Local => window_in(&chrono::Local, now),
            DayZone::Named(tz) => window_in(tz, now),
        }
    }
}

fn window_in<Tz: TimeZone>(tz: &Tz, now: DateTime<Utc>) -> DayWindow {
    let date = now.with_timezone(tz).date_naive();
    let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
    DayWindow {
        start: midnight(tz, date),
        end: midnight(tz, next),
    }
}

/// First instant of `date` in `tz`.
///
/// Ambiguous midnights take the earlier mapping; a midnight skipped by a
/// DST jump advances in 15-minute steps to the first valid local time.
fn midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let mut local: NaiveDateTime = date.and_time(NaiveTime::MIN);
    for _ in 0..16 {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => local += chrono::Duration::minutes(15),
        }
    }
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn utc_day_is_half_open() {
        let zone = DayZone::from_name(Some("UTC")).unwrap();
        let w = zone.window(utc("2024-03-05T13:45:00Z"));
        assert_eq!(w.start, utc("2024-03-05T00:00:00Z"));
        assert_eq!(w.end, utc("2024-03-06T00:00:00Z"));
        assert!(w.contains(utc("2024-03-05T23:59:59.999Z")));
        assert!(!w.contains(w.end));
    }

    #[test]
    fn named_zone_shifts_bounds() {
        let zone = DayZone::from_name(Some("America/New_York")).unwrap();
        // 02:00 UTC on the 6th is still the 5th in New York (EST, -5h).
        let w = zone.window(utc("2024-03-06T02:00:00Z"));
        assert_eq!(w.start, utc("2024-03-05T05:00:00Z"));
        assert_eq!(w.end, utc("2024-03-06T05:00:00Z"));
    }

    #[test]
    fn dst_day_is_short() {
        let zone = DayZone::from_name(Some("America/New_York")).unwrap();
        let w = zone.window(utc("2024-03-10T12:00:00Z"));
        assert_eq!(w.start, utc("2024-03-10T05:00:00Z"));
        assert_eq!(w.end, utc("2024-03-11T04:00:00Z"));
    }

    #[test]
    fn skipped_midnight_starts_at_first_valid_time() {
        // Santiago springs forward at midnight: 00:00 on 8 Sep 2024 is
        // never shown, the day begins at 01:00 -03.
        let zone = DayZone::from_name(Some("America/Santiago")).unwrap();
        let w = zone.window(utc("2024-09-08T16:00:00Z"));
        assert_eq!(w.start, utc("2024-09-08T04:00:00Z"));
        assert_eq!(w.end, utc("2024-09-09T03:00:00Z"));
        assert!(w.contains(utc("2024-09-08T04:00:00Z")));
        assert!(!w.contains(utc("2024-09-08T03:59:59Z")));
    }

    #[test]
    fn repeated_midnight_takes_earliest() {
        // Havana falls back from 01:00 CDT to 00:00 CST on 3 Nov 2024, so
        // local midnight occurs twice; the first one (-04) opens the day.
        let zone = DayZone::from_name(Some("America/Havana")).unwrap();
        let w = zone.window(utc("2024-11-03T17:00:00Z"));
        assert_eq!(w.start, utc("2024-11-03T04:00:00Z"));
        assert_eq!(w.end, utc("2024-11-04T05:00:00Z"));
        assert!(w.contains(utc("2024-11-03T04:30:00Z")));
    }

    #[test]
    fn unknown_zone_is_rejected() {
        assert!(DayZone::from_name(Some("Mars/Olympus")).is_err());
        assert_eq!(DayZone::from_name(None).unwrap(), DayZone::Local);
    }

    #[test]
    fn local_window_contains_now() {
        let now = Utc::now();
        assert!(DayZone::Local.window(now).contains(now));
    }
}
