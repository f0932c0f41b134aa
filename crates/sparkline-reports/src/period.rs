//! Aligned reporting periods and navigation between adjacent buckets.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sparkline_common::Timestamp;
use std::cmp::Ordering;
use std::fmt;

use crate::grouping::Grouping;

/// One half-open bucket `[start, end)` of a [`Grouping`].
///
/// Periods of the same grouping tile the timeline: `p.next().start() == p.end()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportingPeriod {
    grouping: Grouping,
    start: Timestamp,
}

impl ReportingPeriod {
    /// The period containing the current system time.
    pub fn current(grouping: Grouping) -> Self {
        Self::current_at(grouping, Utc::now())
    }

    /// The period containing `now`, for callers that carry their own clock.
    pub fn current_at(grouping: Grouping, now: Timestamp) -> Self {
        Self::at(grouping, now)
    }

    /// The period containing `instant`.
    pub fn at(grouping: Grouping, instant: Timestamp) -> Self {
        Self {
            grouping,
            start: grouping.align(instant),
        }
    }

    /// The bucket immediately before this one.
    #[must_use]
    pub fn previous(&self) -> Self {
        Self::at(self.grouping, self.start - Duration::nanoseconds(1))
    }

    /// The bucket immediately after this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self::at(self.grouping, self.end())
    }

    /// Timestamp emitted for this period in a series.
    pub const fn date_time(&self) -> Timestamp {
        self.start
    }

    /// Inclusive lower bound.
    pub const fn start(&self) -> Timestamp {
        self.start
    }

    /// Exclusive upper bound, the start of the next bucket.
    pub fn end(&self) -> Timestamp {
        self.grouping.next_boundary(self.start)
    }

    /// Grouping this period belongs to.
    pub const fn grouping(&self) -> Grouping {
        self.grouping
    }

    /// Whether `instant` falls inside `[start, end)`.
    pub fn contains(&self, instant: Timestamp) -> bool {
        self.start <= instant && instant < self.end()
    }

    /// Whether the period has fully elapsed at `now`, making its aggregate final.
    pub fn is_closed(&self, now: Timestamp) -> bool {
        self.end() <= now
    }
}

impl PartialOrd for ReportingPeriod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReportingPeriod {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.grouping.cmp(&other.grouping))
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.grouping, self.start.to_rfc3339())
    }
}
