//! Per-period queries run concurrently but the series stays in period order.

use async_trait::async_trait;
use chrono::Timelike;
use sparkline_common::test_utils::mock_timestamp;
use sparkline_common::Result;
use sparkline_reports::{
    AggregateQuery, AggregateRequest, FixedClock, Grouping, NoopReportCache, Report,
    ReportOptions,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Answers with the period's hour, finishing earlier periods last.
#[derive(Debug, Default)]
struct SlowSource {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl AggregateQuery for SlowSource {
    async fn aggregate(&self, request: &AggregateRequest) -> Result<Option<f64>> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let hour = request.range.start().map_or(0, |start| start.hour());
        tokio::time::sleep(Duration::from_millis(u64::from(24 - hour) * 2)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(f64::from(hour)))
    }
}

#[tokio::test]
async fn test_series_keeps_period_order_under_fan_out() {
    let source = Arc::new(SlowSource::default());
    let report = Report::new(
        "users",
        "registrations",
        ReportOptions {
            grouping: Grouping::Hour,
            limit: 12,
            ..ReportOptions::default()
        },
        source.clone(),
        Arc::new(NoopReportCache),
    )
    .unwrap()
    .with_clock(Arc::new(FixedClock::new(mock_timestamp(2024, 6, 15, 12, 30, 0))))
    .with_query_concurrency(4);

    let values: Vec<f64> = report
        .run(None)
        .await
        .unwrap()
        .iter()
        .map(|point| point.value)
        .collect();
    let expected: Vec<f64> = (0..12_u32).map(f64::from).collect();
    assert_eq!(values, expected);

    let max = source.max_in_flight.load(Ordering::SeqCst);
    assert!(max > 1 && max <= 4, "max in flight: {max}");
}
