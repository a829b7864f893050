//! Half-open time windows used to select batches for a scheduling pass.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// A half-open interval `[begin, end)` of UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { begin, end }
    }

    /// Whether `t` falls inside the interval. `begin` is included, `end` is not.
    pub fn includes(&self, t: DateTime<Utc>) -> bool {
        self.begin <= t && t < self.end
    }

    /// Window of ingestion batches still eligible for intake at `now`.
    ///
    /// The end is pushed one minute past `now` so a batch stamped with the
    /// current minute is included. `None` if the window leaves the
    /// representable time range.
    pub fn intake_window(now: DateTime<Utc>, max_age: Duration) -> Option<Self> {
        Some(Self {
            begin: now.checked_sub_signed(max_age)?,
            end: now.checked_add_signed(Duration::minutes(1))?,
        })
    }

    /// The most recent aggregation window that has fully closed, accounting
    /// for the grace period given to late validations.
    ///
    /// `end` is `now - grace` truncated down to a multiple of `period`
    /// (relative to the Unix epoch), and `begin` is one period earlier.
    /// `None` if the window leaves the representable time range.
    pub fn aggregation_window(
        now: DateTime<Utc>,
        period: Duration,
        grace: Duration,
    ) -> Option<Self> {
        let period = Duration::seconds(period.num_seconds().max(1));
        let shifted = now.checked_sub_signed(grace)?.timestamp();
        let end_secs = shifted - shifted.rem_euclid(period.num_seconds());
        let end = DateTime::from_timestamp(end_secs, 0)?;

        Some(Self {
            begin: end.checked_sub_signed(period)?,
            end,
        })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.begin.format("%Y/%m/%d/%H/%M"),
            self.end.format("%Y/%m/%d/%H/%M")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_includes_is_half_open() {
        let interval = Interval::new(at(2021, 4, 13, 0, 0), at(2021, 4, 13, 8, 0));
        assert!(interval.includes(at(2021, 4, 13, 0, 0)));
        assert!(interval.includes(at(2021, 4, 13, 7, 59)));
        assert!(!interval.includes(at(2021, 4, 13, 8, 0)));
        assert!(!interval.includes(at(2021, 4, 12, 23, 59)));
    }

    #[test]
    fn test_intake_window_includes_current_minute() {
        let now = at(2021, 4, 13, 19, 17);
        let window = Interval::intake_window(now, Duration::hours(6)).unwrap();
        assert!(window.includes(now));
        assert!(window.includes(at(2021, 4, 13, 13, 17)));
        assert!(!window.includes(at(2021, 4, 13, 13, 16)));
    }

    #[test]
    fn test_aggregation_window_truncates_to_period() {
        let now = at(2021, 4, 13, 19, 17);
        let window = Interval::aggregation_window(now, Duration::hours(8), Duration::hours(4)).unwrap();
        // now - grace = 15:17, truncated to an 8 hour boundary = 08:00
        assert_eq!(window.end, at(2021, 4, 13, 8, 0));
        assert_eq!(window.begin, at(2021, 4, 13, 0, 0));
    }

    #[test]
    fn test_aggregation_window_on_boundary() {
        let now = at(2021, 4, 13, 20, 0);
        let window = Interval::aggregation_window(now, Duration::hours(8), Duration::hours(4)).unwrap();
        assert_eq!(window.end, at(2021, 4, 13, 16, 0));
        assert_eq!(window.begin, at(2021, 4, 13, 8, 0));
    }

    #[test]
    fn test_windows_out_of_range() {
        let now = at(2021, 4, 13, 19, 17);
        let huge = Duration::seconds(i64::MAX / 1000);
        assert_eq!(Interval::intake_window(now, huge), None);
        assert_eq!(Interval::aggregation_window(now, Duration::hours(8), huge), None);
        assert_eq!(Interval::aggregation_window(now, huge, Duration::hours(4)), None);
    }

    #[test]
    fn test_display() {
        let interval = Interval::new(at(2021, 4, 13, 0, 0), at(2021, 4, 13, 8, 0));
        assert_eq!(interval.to_string(), "2021/04/13/00/00 - 2021/04/13/08/00");
    }
}
