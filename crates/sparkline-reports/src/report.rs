//! Time-bucketed aggregate series over a sliding window of periods.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sparkline_common::{
    is_valid_identifier, validate_non_empty, Conditions, ReportError, Result, Timestamp,
};
use sparkline_config::ReportDefinition;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::cache::{CacheKey, ReportCache, ReportIdentity};
use crate::clock::{Clock, SystemClock};
use crate::grouping::Grouping;
use crate::period::ReportingPeriod;
use crate::query::{AggregateQuery, AggregateRequest, Aggregation, AggregationKind, TimeRange};

/// Per-period queries in flight for one run unless configured otherwise.
pub const DEFAULT_QUERY_CONCURRENCY: usize = 4;

/// How a report aggregates and windows its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportOptions {
    /// What to compute per period.
    pub aggregation: Aggregation,
    /// Bucket width.
    pub grouping: Grouping,
    /// Timestamp attribute the periods apply to.
    pub date_column: String,
    /// Number of periods in the window (one more when live).
    pub limit: u32,
    /// Whether the still-open period ends the series.
    pub live_data: bool,
    /// Filter applied to every run.
    pub conditions: Conditions,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            aggregation: Aggregation::Count,
            grouping: Grouping::Day,
            date_column: "created_at".to_string(),
            limit: 100,
            live_data: false,
            conditions: Conditions::new(),
        }
    }
}

impl TryFrom<&ReportDefinition> for ReportOptions {
    type Error = ReportError;

    fn try_from(definition: &ReportDefinition) -> Result<Self> {
        let kind: AggregationKind = definition.aggregation.parse()?;
        Ok(Self {
            aggregation: Aggregation::from_parts(kind, definition.value_column.as_deref())?,
            grouping: Grouping::parse(&definition.grouping)?,
            date_column: definition.date_column.clone(),
            limit: definition.limit,
            live_data: definition.live_data,
            conditions: definition.conditions.clone(),
        })
    }
}

/// Everything one run needs, resolved once up front.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// The instant the window is placed against.
    pub now: Timestamp,
    /// Base conditions AND the run's extra conditions.
    pub conditions: Conditions,
    /// Cache identity for these conditions.
    pub identity: ReportIdentity,
}

/// One point of a series: the period's start and its value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Start of the reporting period.
    pub period_start: Timestamp,
    /// Aggregate value, `0.0` when no record matched.
    pub value: f64,
}

impl SeriesPoint {
    /// A point at `period_start`.
    pub const fn new(period_start: Timestamp, value: f64) -> Self {
        Self {
            period_start,
            value,
        }
    }
}

impl From<(Timestamp, f64)> for SeriesPoint {
    fn from((period_start, value): (Timestamp, f64)) -> Self {
        Self::new(period_start, value)
    }
}

/// A named aggregate over one entity, reported per period.
///
/// Closed periods are served from the injected [`ReportCache`] when possible
/// and written back after a miss. The live period is always queried and
/// never cached.
pub struct Report {
    entity: String,
    metric: String,
    options: ReportOptions,
    source: Arc<dyn AggregateQuery>,
    cache: Arc<dyn ReportCache>,
    clock: Arc<dyn Clock>,
    query_concurrency: usize,
}

impl Report {
    /// Builds a report, rejecting configurations that could never run.
    pub fn new(
        entity: impl Into<String>,
        metric: impl Into<String>,
        options: ReportOptions,
        source: Arc<dyn AggregateQuery>,
        cache: Arc<dyn ReportCache>,
    ) -> Result<Self> {
        let entity = validate_non_empty(&entity.into(), "entity")?;
        let metric = validate_non_empty(&metric.into(), "metric")?;
        check_identifier(&entity, "entity")?;
        check_identifier(&options.date_column, "date_column")?;
        if let Aggregation::Sum { column } = &options.aggregation {
            check_identifier(column, "value_column")?;
        }
        if options.limit == 0 {
            return Err(ReportError::invalid_configuration_field(
                "limit must be positive",
                "limit",
            ));
        }

        info!(
            entity = %entity,
            metric = %metric,
            grouping = %options.grouping,
            aggregation = %options.aggregation,
            limit = options.limit,
            live_data = options.live_data,
            "Created report"
        );

        Ok(Self {
            entity,
            metric,
            options,
            source,
            cache,
            clock: Arc::new(SystemClock),
            query_concurrency: DEFAULT_QUERY_CONCURRENCY,
        })
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets how many period queries may run at once (at least one).
    #[must_use]
    pub fn with_query_concurrency(mut self, concurrency: usize) -> Self {
        self.query_concurrency = concurrency.max(1);
        self
    }

    /// A copy of this report sharing its source and cache but running on
    /// `clock` with `concurrency` queries in flight.
    pub(crate) fn rebound(&self, clock: Arc<dyn Clock>, concurrency: usize) -> Self {
        Self {
            entity: self.entity.clone(),
            metric: self.metric.clone(),
            options: self.options.clone(),
            source: Arc::clone(&self.source),
            cache: Arc::clone(&self.cache),
            clock,
            query_concurrency: concurrency.max(1),
        }
    }

    /// Entity the report reads.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Report name.
    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Aggregation and window settings.
    pub const fn options(&self) -> &ReportOptions {
        &self.options
    }

    /// Cache identity of this report when filtered by `conditions`.
    pub fn identity(&self, conditions: &Conditions) -> ReportIdentity {
        ReportIdentity {
            entity: self.entity.clone(),
            metric: self.metric.clone(),
            grouping: self.options.grouping,
            aggregation: self.options.aggregation.descriptor(),
            date_column: self.options.date_column.clone(),
            conditions_fingerprint: conditions.fingerprint(),
        }
    }

    /// Resolves the clock and the effective conditions for one run.
    pub fn options_for_run(&self, extra: Option<&Conditions>) -> RunOptions {
        let conditions = match extra {
            Some(extra) => self.options.conditions.and(extra),
            None => self.options.conditions.clone(),
        };
        RunOptions {
            now: self.clock.now(),
            identity: self.identity(&conditions),
            conditions,
        }
    }

    /// The window's periods at `now`, oldest first.
    ///
    /// Ends with the current period when live and with the one before it
    /// otherwise; starts with the period containing `now - limit` units.
    /// Fails when that start lies outside the representable time range.
    pub fn periods(&self, now: Timestamp) -> Result<Vec<ReportingPeriod>> {
        let grouping = self.options.grouping;
        let limit = self.options.limit;
        if grouping.checked_sub_units(now, limit).is_none() {
            return Err(ReportError::invalid_configuration_field(
                format!("limit {limit} reaches before the earliest representable {grouping}"),
                "limit",
            ));
        }

        let current = ReportingPeriod::current_at(grouping, now);
        let (mut period, count) = if self.options.live_data {
            (current, limit as usize + 1)
        } else {
            (current.previous(), limit as usize)
        };

        let mut periods = Vec::with_capacity(count);
        periods.push(period);
        for _ in 1..count {
            period = period.previous();
            periods.push(period);
        }
        periods.reverse();
        Ok(periods)
    }

    /// Computes the series, oldest period first.
    ///
    /// `extra` is AND-ed with the report's own conditions. A query failure
    /// for any period fails the whole run.
    #[instrument(skip(self, extra), fields(entity = %self.entity, metric = %self.metric))]
    pub async fn run(&self, extra: Option<&Conditions>) -> Result<Vec<SeriesPoint>> {
        let options = self.options_for_run(extra);
        let periods = self.periods(options.now)?;
        self.series(&periods, &options).await
    }

    /// Drops every cached period of this report when run with `extra`.
    pub async fn clear_cache(&self, extra: Option<&Conditions>) {
        let options = self.options_for_run(extra);
        self.cache.invalidate_report(&options.identity).await;
    }

    pub(crate) async fn series(
        &self,
        periods: &[ReportingPeriod],
        options: &RunOptions,
    ) -> Result<Vec<SeriesPoint>> {
        stream::iter(periods.iter().map(|period| self.period_value(*period, options)))
            .buffered(self.query_concurrency)
            .try_collect()
            .await
    }

    async fn period_value(&self, period: ReportingPeriod, options: &RunOptions) -> Result<SeriesPoint> {
        let closed = period.is_closed(options.now);
        let key = CacheKey::new(options.identity.clone(), period.start());

        if closed {
            if let Some(value) = self.cache.get(&key).await {
                return Ok(SeriesPoint::new(period.date_time(), value));
            }
        }

        let value = self
            .aggregate(TimeRange::from(&period), &options.conditions)
            .await?
            .unwrap_or(0.0);

        if closed {
            self.cache.put(key, value).await;
        }
        Ok(SeriesPoint::new(period.date_time(), value))
    }

    pub(crate) async fn aggregate(
        &self,
        range: TimeRange,
        conditions: &Conditions,
    ) -> Result<Option<f64>> {
        let request = AggregateRequest {
            entity: self.entity.clone(),
            aggregation: self.options.aggregation.clone(),
            date_column: self.options.date_column.clone(),
            range,
            conditions: conditions.clone(),
        };
        debug!(?range, "Querying aggregate");
        self.source.aggregate(&request).await
    }
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("entity", &self.entity)
            .field("metric", &self.metric)
            .field("options", &self.options)
            .field("clock", &self.clock)
            .field("query_concurrency", &self.query_concurrency)
            .finish_non_exhaustive()
    }
}

fn check_identifier(name: &str, field: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(ReportError::invalid_configuration_field(
            format!("'{name}' is not a valid {field}"),
            field,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryReportCache, NoopReportCache};
    use crate::clock::FixedClock;
    use crate::memory_store::{MemoryRecordStore, Record};
    use chrono::Duration;
    use sparkline_common::test_utils::mock_timestamp;

    fn now() -> Timestamp {
        mock_timestamp(2024, 6, 15, 12, 0, 0)
    }

    fn report_with(options: ReportOptions, store: Arc<MemoryRecordStore>) -> Report {
        Report::new("users", "registrations", options, store, Arc::new(NoopReportCache))
            .unwrap()
            .with_clock(Arc::new(FixedClock::new(now())))
    }

    #[test]
    fn test_options_from_definition() {
        let mut definition = ReportDefinition::new("users", "visits");
        definition.aggregation = "sum".to_string();
        definition.value_column = Some("profile_visits".to_string());
        definition.grouping = "week".to_string();
        definition.limit = 12;

        let options = ReportOptions::try_from(&definition).unwrap();
        assert_eq!(options.grouping, Grouping::Week);
        assert_eq!(options.aggregation.descriptor(), "sum(profile_visits)");
        assert_eq!(options.limit, 12);

        definition.value_column = None;
        assert!(ReportOptions::try_from(&definition).unwrap_err().is_configuration());

        definition.aggregation = "maximum".to_string();
        assert!(ReportOptions::try_from(&definition).is_err());

        let mut definition = ReportDefinition::new("users", "visits");
        definition.grouping = "fortnight".to_string();
        assert!(matches!(
            ReportOptions::try_from(&definition),
            Err(ReportError::InvalidGrouping { .. })
        ));
    }

    #[test]
    fn test_construction_rejects_invalid_configuration() {
        let store = Arc::new(MemoryRecordStore::new());
        let build = |entity: &str, options: ReportOptions| {
            Report::new(
                entity,
                "registrations",
                options,
                store.clone(),
                Arc::new(NoopReportCache),
            )
        };

        assert!(build("users", ReportOptions::default()).is_ok());
        assert!(build("", ReportOptions::default()).is_err());
        assert!(build("users table", ReportOptions::default()).is_err());

        let zero_limit = ReportOptions {
            limit: 0,
            ..ReportOptions::default()
        };
        let err = build("users", zero_limit).unwrap_err();
        assert!(matches!(
            err,
            ReportError::InvalidConfiguration { field: Some(ref f), .. } if f == "limit"
        ));

        let bad_column = ReportOptions {
            aggregation: Aggregation::Sum {
                column: "visits;".to_string(),
            },
            ..ReportOptions::default()
        };
        assert!(build("users", bad_column).is_err());
    }

    #[test]
    fn test_periods_window() {
        let store = Arc::new(MemoryRecordStore::new());
        for grouping in Grouping::ALL {
            for live_data in [false, true] {
                let report = report_with(
                    ReportOptions {
                        grouping,
                        limit: 10,
                        live_data,
                        ..ReportOptions::default()
                    },
                    store.clone(),
                );
                let periods = report.periods(now()).unwrap();
                let current = ReportingPeriod::current_at(grouping, now());

                assert_eq!(periods.len(), if live_data { 11 } else { 10 });
                let last = periods.last().copied().unwrap();
                if live_data {
                    assert_eq!(last, current);
                } else {
                    assert_eq!(last, current.previous());
                }
                assert!(periods.windows(2).all(|w| w[0].next() == w[1]));

                let mut first = current;
                for _ in 0..10 {
                    first = first.previous();
                }
                assert_eq!(periods[0], first, "{grouping} live={live_data}");
            }
        }
    }

    #[tokio::test]
    async fn test_unrepresentable_window_is_a_configuration_error() {
        let store = Arc::new(MemoryRecordStore::new());
        let report = report_with(
            ReportOptions {
                grouping: Grouping::Month,
                limit: 3_300_000,
                ..ReportOptions::default()
            },
            store.clone(),
        );

        let err = report.periods(now()).unwrap_err();
        assert!(matches!(
            err,
            ReportError::InvalidConfiguration { field: Some(ref f), .. } if f == "limit"
        ));
        assert!(report.run(None).await.unwrap_err().is_configuration());

        // The furthest representable window still builds.
        let report = report_with(
            ReportOptions {
                grouping: Grouping::Month,
                limit: 3_000_000,
                ..ReportOptions::default()
            },
            store,
        );
        let periods = report.periods(now()).unwrap();
        assert_eq!(periods.len(), 3_000_000);
        assert!(periods[0].start() < now());
    }

    #[test]
    fn test_options_for_run_combines_conditions() {
        let store = Arc::new(MemoryRecordStore::new());
        let base = sparkline_common::Condition::raw("deleted_at IS NULL");
        let report = report_with(
            ReportOptions {
                conditions: base.clone().into(),
                ..ReportOptions::default()
            },
            store,
        );

        let plain = report.options_for_run(None);
        assert_eq!(plain.now, now());
        assert_eq!(plain.conditions.len(), 1);

        let extra: Conditions = sparkline_common::Condition::new("login = ?", ["a"]).into();
        let filtered = report.options_for_run(Some(&extra));
        assert_eq!(filtered.conditions.len(), 2);
        assert_eq!(filtered.conditions.iter().next(), Some(&base));
        assert_ne!(
            filtered.identity.conditions_fingerprint,
            plain.identity.conditions_fingerprint
        );
    }

    #[tokio::test]
    async fn test_run_reports_per_period_values() {
        let store = Arc::new(MemoryRecordStore::new());
        store.insert_many(
            "users",
            [
                Record::new().with_timestamp("created_at", now() - Duration::days(1)),
                Record::new().with_timestamp("created_at", now() - Duration::days(3)),
                Record::new().with_timestamp("created_at", now() - Duration::days(3)),
                Record::new().with_timestamp("created_at", now()),
            ],
        );
        let report = report_with(
            ReportOptions {
                limit: 5,
                ..ReportOptions::default()
            },
            store,
        );

        let values: Vec<f64> = report
            .run(None)
            .await
            .unwrap()
            .into_iter()
            .map(|point| point.value)
            .collect();
        assert_eq!(values, vec![0.0, 0.0, 2.0, 0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_closed_periods_are_cached_live_period_is_not() {
        let store = Arc::new(MemoryRecordStore::new());
        store.insert("users", Record::new().with_timestamp("created_at", now() - Duration::days(1)));
        let cache = Arc::new(MemoryReportCache::default());
        let report = Report::new(
            "users",
            "registrations",
            ReportOptions {
                limit: 3,
                live_data: true,
                ..ReportOptions::default()
            },
            store.clone(),
            cache.clone(),
        )
        .unwrap()
        .with_clock(Arc::new(FixedClock::new(now())));

        let first = report.run(None).await.unwrap();
        assert_eq!(first.iter().map(|p| p.value).collect::<Vec<_>>(), vec![0.0, 0.0, 1.0, 0.0]);

        // A late record in a closed period stays invisible; the live one updates.
        store.insert("users", Record::new().with_timestamp("created_at", now() - Duration::days(1)));
        store.insert("users", Record::new().with_timestamp("created_at", now()));
        let second = report.run(None).await.unwrap();
        assert_eq!(second.iter().map(|p| p.value).collect::<Vec<_>>(), vec![0.0, 0.0, 1.0, 1.0]);

        let stats = cache.stats().await;
        assert_eq!(stats.get("inserts"), Some(&3));
        assert_eq!(stats.get("hits"), Some(&3));
        assert_eq!(stats.get("entry_count"), Some(&3));

        report.clear_cache(None).await;
        let third = report.run(None).await.unwrap();
        assert_eq!(third.iter().map(|p| p.value).collect::<Vec<_>>(), vec![0.0, 0.0, 2.0, 1.0]);
    }
}
