use chrono::{
    Datelike, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, ParseError, SubsecRound,
};
use serde::{Deserialize, Serialize};

/// Format used for every stored timestamp. Local time without an offset, so that values of the
/// same format compare correctly both as strings and as [NaiveDateTime].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub const DATE_FORMAT: &str = "%Y-%m-%d";

const END_OF_DAY: NaiveTime = match NaiveTime::from_hms_opt(23, 59, 59) {
    Some(v) => v,
    None => panic!("23:59:59 is a valid time"),
};

/// This is the standard way of converting a date to a string in timeflow.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn to_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, ParseError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
}

/// Current local time truncated to whole seconds.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

pub fn now_timestamp() -> String {
    to_timestamp(local_now())
}

/// Formats seconds as `HH:MM:SS`. Hours keep growing past 23, there is no day rollover.
/// Negative and non-finite values are shown as zero, fractions are truncated.
pub fn format_duration(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0. {
        seconds.trunc() as u64
    } else {
        0
    };
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Whole seconds from `start` to `end`. Stop-before-start is clamped to 0.
pub fn diff_seconds(start: NaiveDateTime, end: NaiveDateTime) -> i64 {
    let delta = end - start;
    // num_seconds truncates toward zero, which is the floor for non-negative deltas.
    delta.num_seconds().max(0)
}

/// Inclusive range of local timestamps used for querying entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Covers whole days from `first` 00:00:00 to `last` 23:59:59.
    pub fn days(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: first.and_time(NaiveTime::MIN),
            end: last.and_time(END_OF_DAY),
        }
    }

    pub fn today(now: NaiveDateTime) -> Self {
        Self::days(now.date(), now.date())
    }

    /// Monday 00:00:00 to Sunday 23:59:59 of the week containing `now`.
    pub fn week(now: NaiveDateTime) -> Self {
        let today = now.date();
        let monday = today - chrono::Duration::days(today.weekday().num_days_from_monday() as i64);
        let sunday = monday + chrono::Duration::days(6);
        Self::days(monday, sunday)
    }

    /// First of the month to its last day, the last day being "day 0" of the next month.
    pub fn month(now: NaiveDateTime) -> Self {
        let first = now
            .date()
            .with_day(1)
            .expect("Every month has a first day");
        let last = first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .expect("End of time should never happen");
        Self::days(first, last)
    }

    pub fn contains(&self, moment: NaiveDateTime) -> bool {
        self.start <= moment && moment <= self.end
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;

    fn at(value: &str) -> NaiveDateTime {
        parse_timestamp(value).unwrap()
    }

    #[test]
    fn test_format_duration_basic() {
        assert_eq!(format_duration(3661.), "01:01:01");
        assert_eq!(format_duration(0.), "00:00:00");
        assert_eq!(format_duration(59.9), "00:00:59");
    }

    #[test]
    fn test_format_duration_invalid_values() {
        assert_eq!(format_duration(-1.), "00:00:00");
        assert_eq!(format_duration(-3600.), "00:00:00");
        assert_eq!(format_duration(f64::NAN), "00:00:00");
        assert_eq!(format_duration(f64::INFINITY), "00:00:00");
        assert_eq!(format_duration(f64::NEG_INFINITY), "00:00:00");
    }

    #[test]
    fn test_format_duration_no_day_rollover() {
        assert_eq!(format_duration(25. * 3600. + 5.), "25:00:05");
        assert_eq!(format_duration(100. * 3600.), "100:00:00");
    }

    #[test]
    fn test_format_duration_shape() {
        for seconds in [0., 1., 61., 3599., 3600., 86399.] {
            let formatted = format_duration(seconds);
            let parts = formatted.split(':').collect::<Vec<_>>();
            assert_eq!(parts.len(), 3);
            assert!(parts.iter().all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_digit())));
        }
    }

    #[test]
    fn test_diff_seconds() {
        let start = at("2024-03-04T09:00:00");
        assert_eq!(diff_seconds(start, at("2024-03-04T10:00:30")), 3630);
        assert_eq!(diff_seconds(start, start), 0);
        assert_eq!(diff_seconds(start, at("2024-03-04T08:00:00")), 0);
    }

    #[test]
    fn test_timestamp_format() {
        let value = at("2024-12-31T23:05:09");
        assert_eq!(to_timestamp(value), "2024-12-31T23:05:09");
        assert!(parse_timestamp("2024-12-31 23:05:09").is_err());
        assert_eq!(now_timestamp().len(), "2024-12-31T23:05:09".len());
    }

    #[test]
    fn test_week_range_starts_monday() {
        // 2024-03-07 is a Thursday
        let range = DateRange::week(at("2024-03-07T15:30:00"));
        assert_eq!(range.start, at("2024-03-04T00:00:00"));
        assert_eq!(range.end, at("2024-03-10T23:59:59"));

        let sunday = DateRange::week(at("2024-03-10T23:00:00"));
        assert_eq!(sunday, range);
    }

    #[test]
    fn test_month_range() {
        let range = DateRange::month(at("2024-02-14T10:00:00"));
        assert_eq!(range.start, at("2024-02-01T00:00:00"));
        assert_eq!(range.end, at("2024-02-29T23:59:59"));

        let december = DateRange::month(at("2023-12-31T10:00:00"));
        assert_eq!(december.end, at("2023-12-31T23:59:59"));
    }

    #[test]
    fn test_today_range_contains() {
        let range = DateRange::today(at("2024-02-14T10:00:00"));
        assert!(range.contains(at("2024-02-14T00:00:00")));
        assert!(range.contains(at("2024-02-14T23:59:59")));
        assert!(!range.contains(at("2024-02-15T00:00:00")));
        assert_eq!(
            date_key(NaiveDate::from_ymd_opt(2024, 2, 14).unwrap()),
            "2024-02-14"
        );
    }
}
