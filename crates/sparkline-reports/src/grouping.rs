//! Bucket granularities and their alignment rules.

use chrono::{Datelike, Duration, Months, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sparkline_common::{ReportError, Result, Timestamp};
use std::fmt;
use std::str::FromStr;

/// Width of one report bucket. All alignment happens in UTC; weeks start on Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    /// One-hour buckets.
    Hour,
    /// One-day buckets.
    Day,
    /// Monday-to-Monday buckets.
    Week,
    /// Calendar-month buckets of 28 to 31 days.
    Month,
}

impl Grouping {
    /// Every supported grouping, finest first.
    pub const ALL: [Self; 4] = [Self::Hour, Self::Day, Self::Week, Self::Month];

    /// Parses a grouping name, case-insensitively.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            _ => Err(ReportError::invalid_grouping(name)),
        }
    }

    /// Lowercase name, as used in configuration and cache keys.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    /// Start of the bucket containing `instant`.
    pub fn align(self, instant: Timestamp) -> Timestamp {
        let midnight = Utc.from_utc_datetime(&instant.date_naive().and_time(NaiveTime::MIN));
        match self {
            Self::Hour => midnight + Duration::hours(i64::from(instant.hour())),
            Self::Day => midnight,
            Self::Week => {
                midnight - Duration::days(i64::from(instant.weekday().num_days_from_monday()))
            }
            Self::Month => midnight - Duration::days(i64::from(instant.day0())),
        }
    }

    /// Start of the bucket following the one starting at `start`.
    ///
    /// `start` must already be aligned. Months are reached by jumping past the
    /// month end and re-aligning, never by adding a fixed length.
    pub(crate) fn next_boundary(self, start: Timestamp) -> Timestamp {
        match self {
            Self::Hour => start + Duration::hours(1),
            Self::Day => start + Duration::days(1),
            Self::Week => start + Duration::weeks(1),
            Self::Month => self.align(start + Duration::days(32)),
        }
    }

    /// `instant` moved back by `units` buckets, or `None` when the result or
    /// its bucket start falls outside the representable range.
    pub fn checked_sub_units(self, instant: Timestamp, units: u32) -> Option<Timestamp> {
        let units64 = i64::from(units);
        let back = match self {
            Self::Hour => instant.checked_sub_signed(Duration::try_hours(units64)?),
            Self::Day => instant.checked_sub_signed(Duration::try_days(units64)?),
            Self::Week => instant.checked_sub_signed(Duration::try_weeks(units64)?),
            Self::Month => instant.checked_sub_months(Months::new(units)),
        }?;
        // align moves back by less than a month
        back.checked_sub_signed(Duration::days(31))?;
        Some(back)
    }

    /// Length of the bucket containing `instant`.
    pub fn duration_for(self, instant: Timestamp) -> Duration {
        let start = self.align(instant);
        self.next_boundary(start) - start
    }
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Grouping {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkline_common::test_utils::mock_timestamp;

    #[test]
    fn test_parse() {
        assert_eq!(Grouping::parse("hour").unwrap(), Grouping::Hour);
        assert_eq!("Week".parse::<Grouping>().unwrap(), Grouping::Week);
        assert_eq!(Grouping::parse(" MONTH ").unwrap(), Grouping::Month);

        let err = Grouping::parse("quarter").unwrap_err();
        assert!(matches!(err, ReportError::InvalidGrouping { ref name } if name == "quarter"));
    }

    #[test]
    fn test_align() {
        let t = mock_timestamp(2024, 2, 29, 13, 45, 12);
        assert_eq!(Grouping::Hour.align(t), mock_timestamp(2024, 2, 29, 13, 0, 0));
        assert_eq!(Grouping::Day.align(t), mock_timestamp(2024, 2, 29, 0, 0, 0));
        // 2024-02-29 is a Thursday
        assert_eq!(Grouping::Week.align(t), mock_timestamp(2024, 2, 26, 0, 0, 0));
        assert_eq!(Grouping::Month.align(t), mock_timestamp(2024, 2, 1, 0, 0, 0));
    }

    #[test]
    fn test_align_is_idempotent_on_boundaries() {
        let monday = mock_timestamp(2024, 1, 1, 0, 0, 0);
        for grouping in Grouping::ALL {
            assert_eq!(grouping.align(monday), monday, "{grouping}");
        }
    }

    #[test]
    fn test_duration_for() {
        let feb_leap = mock_timestamp(2024, 2, 10, 8, 0, 0);
        assert_eq!(Grouping::Month.duration_for(feb_leap), Duration::days(29));
        assert_eq!(
            Grouping::Month.duration_for(mock_timestamp(2023, 2, 10, 8, 0, 0)),
            Duration::days(28)
        );
        assert_eq!(
            Grouping::Month.duration_for(mock_timestamp(2024, 12, 31, 23, 59, 59)),
            Duration::days(31)
        );
        assert_eq!(Grouping::Week.duration_for(feb_leap), Duration::days(7));
        assert_eq!(Grouping::Day.duration_for(feb_leap), Duration::days(1));
        assert_eq!(Grouping::Hour.duration_for(feb_leap), Duration::hours(1));
    }

    #[test]
    fn test_checked_sub_units() {
        let t = mock_timestamp(2024, 6, 15, 12, 0, 0);
        assert_eq!(
            Grouping::Hour.checked_sub_units(t, 3),
            Some(mock_timestamp(2024, 6, 15, 9, 0, 0))
        );
        assert_eq!(
            Grouping::Week.checked_sub_units(t, 2),
            Some(mock_timestamp(2024, 6, 1, 12, 0, 0))
        );
        assert_eq!(
            Grouping::Month.checked_sub_units(mock_timestamp(2024, 3, 31, 0, 0, 0), 1),
            Some(mock_timestamp(2024, 2, 29, 0, 0, 0))
        );
        assert_eq!(Grouping::Month.checked_sub_units(t, 3_300_000), None);
        assert_eq!(Grouping::Hour.checked_sub_units(t, u32::MAX), None);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Grouping::Week).unwrap(), "\"week\"");
        let parsed: Grouping = serde_json::from_str("\"day\"").unwrap();
        assert_eq!(parsed, Grouping::Day);
    }
}
