//! Running totals over a report window, seeded with all earlier history.

use sparkline_common::{Conditions, Result, Timestamp};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::cache::ReportCache;
use crate::clock::Clock;
use crate::period::ReportingPeriod;
use crate::query::{AggregateQuery, TimeRange};
use crate::report::{Report, ReportOptions, RunOptions, SeriesPoint};

/// A [`Report`] whose values are running totals.
///
/// Each point is the aggregate of every matching record up to the end of
/// its period, so the first point already includes everything before the
/// window. Per-period values share the plain report's cache entries; the
/// total before the window is always queried.
#[derive(Debug)]
pub struct CumulatedReport {
    report: Report,
}

impl CumulatedReport {
    /// Builds a cumulated report; fails like [`Report::new`].
    pub fn new(
        entity: impl Into<String>,
        metric: impl Into<String>,
        options: ReportOptions,
        source: Arc<dyn AggregateQuery>,
        cache: Arc<dyn ReportCache>,
    ) -> Result<Self> {
        Report::new(entity, metric, options, source, cache).map(Self::from)
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self {
            report: self.report.with_clock(clock),
        }
    }

    /// Sets how many period queries may run at once.
    #[must_use]
    pub fn with_query_concurrency(self, concurrency: usize) -> Self {
        Self {
            report: self.report.with_query_concurrency(concurrency),
        }
    }

    /// The underlying per-period report.
    pub const fn report(&self) -> &Report {
        &self.report
    }

    /// See [`Report::options_for_run`].
    pub fn options_for_run(&self, extra: Option<&Conditions>) -> RunOptions {
        self.report.options_for_run(extra)
    }

    /// Computes the cumulated series, oldest period first.
    #[instrument(skip(self, extra), fields(entity = %self.report.entity(), metric = %self.report.metric()))]
    pub async fn run(&self, extra: Option<&Conditions>) -> Result<Vec<SeriesPoint>> {
        let options = self.report.options_for_run(extra);
        let periods = self.report.periods(options.now)?;
        // limit >= 1, so the window is never empty
        let window_start = periods.first().map_or(options.now, ReportingPeriod::start);

        let (data, initial) = tokio::try_join!(
            self.report.series(&periods, &options),
            self.initial_cumulative_value(window_start, &options),
        )?;

        debug!(initial, points = data.len(), "Cumulating series");
        Ok(Self::cumulate(&data, initial))
    }

    /// Aggregate of every matching record strictly before `instant`, `0.0` when none.
    pub async fn initial_cumulative_value(
        &self,
        instant: Timestamp,
        options: &RunOptions,
    ) -> Result<f64> {
        let value = self
            .report
            .aggregate(TimeRange::Before { end: instant }, &options.conditions)
            .await?;
        Ok(value.unwrap_or(0.0))
    }

    /// Folds `data` into running totals starting from `initial`.
    pub fn cumulate(data: &[SeriesPoint], initial: f64) -> Vec<SeriesPoint> {
        data.iter()
            .scan(initial, |total, point| {
                *total += point.value;
                Some(SeriesPoint::new(point.period_start, *total))
            })
            .collect()
    }
}

impl From<Report> for CumulatedReport {
    fn from(report: Report) -> Self {
        Self { report }
    }
}
