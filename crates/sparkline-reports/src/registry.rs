//! Reports built from configuration, looked up by entity and metric.

use arc_swap::ArcSwap;
use sparkline_common::{Conditions, ReportError, Result};
use sparkline_config::{CacheSettings, Config, ConfigValidator, ReportDefinition};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::cache::{MemoryCacheConfig, MemoryReportCache, NoopReportCache, ReportCache};
use crate::clock::{Clock, SystemClock};
use crate::cumulated::CumulatedReport;
use crate::query::AggregateQuery;
use crate::report::{Report, ReportOptions, SeriesPoint, DEFAULT_QUERY_CONCURRENCY};

/// A registered report of either kind.
#[derive(Debug)]
pub enum RegisteredReport {
    /// Per-period values.
    Plain(Report),
    /// Running totals.
    Cumulated(CumulatedReport),
}

impl RegisteredReport {
    /// Runs the report with optional extra conditions.
    pub async fn run(&self, extra: Option<&Conditions>) -> Result<Vec<SeriesPoint>> {
        match self {
            Self::Plain(report) => report.run(extra).await,
            Self::Cumulated(report) => report.run(extra).await,
        }
    }

    /// The per-period report underneath.
    pub const fn report(&self) -> &Report {
        match self {
            Self::Plain(report) => report,
            Self::Cumulated(report) => report.report(),
        }
    }

    /// Whether values are running totals.
    pub const fn is_cumulated(&self) -> bool {
        matches!(self, Self::Cumulated(_))
    }

    fn rebound(&self, clock: Arc<dyn Clock>, concurrency: usize) -> Self {
        let report = self.report().rebound(clock, concurrency);
        match self {
            Self::Plain(_) => Self::Plain(report),
            Self::Cumulated(_) => Self::Cumulated(CumulatedReport::from(report)),
        }
    }
}

type ReportMap = HashMap<(String, String), Arc<RegisteredReport>>;

/// Builds the cache configured by `settings`.
pub fn build_cache(settings: &CacheSettings) -> Arc<dyn ReportCache> {
    if settings.enabled {
        Arc::new(MemoryReportCache::new(MemoryCacheConfig {
            max_capacity: settings.max_capacity,
            time_to_idle: settings.time_to_idle_secs.map(Duration::from_secs),
        }))
    } else {
        warn!("Report cache disabled - every period will be queried on every run");
        Arc::new(NoopReportCache)
    }
}

/// The set of configured reports, sharing one record store and one cache.
///
/// The report map is swapped atomically on reload, so runs in flight keep
/// the definitions they started with.
pub struct ReportRegistry {
    reports: ArcSwap<ReportMap>,
    source: Arc<dyn AggregateQuery>,
    cache: Arc<dyn ReportCache>,
    clock: Arc<dyn Clock>,
    query_concurrency: usize,
}

impl ReportRegistry {
    /// An empty registry.
    pub fn new(source: Arc<dyn AggregateQuery>, cache: Arc<dyn ReportCache>) -> Self {
        Self {
            reports: ArcSwap::from_pointee(HashMap::new()),
            source,
            cache,
            clock: Arc::new(SystemClock),
            query_concurrency: DEFAULT_QUERY_CONCURRENCY,
        }
    }

    /// Validates `config` and registers every report it defines.
    pub fn from_config(config: &Config, source: Arc<dyn AggregateQuery>) -> Result<Self> {
        ConfigValidator::validate(config)?;
        let registry = Self::new(source, build_cache(&config.cache))
            .with_query_concurrency(config.query.concurrency);
        registry.load(&config.reports)?;
        Ok(registry)
    }

    /// Time source for every registered report and those loaded later.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.rebind_loaded();
        self
    }

    /// Query fan-out for every registered report and those loaded later.
    #[must_use]
    pub fn with_query_concurrency(mut self, concurrency: usize) -> Self {
        self.query_concurrency = concurrency.max(1);
        self.rebind_loaded();
        self
    }

    /// Replaces every registered report with the given definitions.
    ///
    /// Nothing changes unless every definition builds.
    #[instrument(skip(self, definitions), fields(count = definitions.len()))]
    pub fn load(&self, definitions: &[ReportDefinition]) -> Result<usize> {
        let mut reports = ReportMap::with_capacity(definitions.len());
        for definition in definitions {
            let key = (definition.entity.clone(), definition.metric.clone());
            if reports.contains_key(&key) {
                return Err(ReportError::invalid_configuration_field(
                    format!(
                        "Report '{}' is defined twice for entity '{}'",
                        definition.metric, definition.entity
                    ),
                    "metric",
                ));
            }
            reports.insert(key, Arc::new(self.build(definition)?));
        }

        let count = reports.len();
        self.reports.store(Arc::new(reports));
        info!("Loaded {} reports", count);
        Ok(count)
    }

    /// Validates `config` and swaps in its report definitions.
    ///
    /// Cache and query settings stay as they were when the registry was built.
    pub fn reload(&self, config: &Config) -> Result<usize> {
        ConfigValidator::validate(config)?;
        self.load(&config.reports)
    }

    /// The report registered for `entity` and `metric`.
    pub fn get(&self, entity: &str, metric: &str) -> Option<Arc<RegisteredReport>> {
        self.reports
            .load()
            .get(&(entity.to_string(), metric.to_string()))
            .cloned()
    }

    /// Runs the report registered for `entity` and `metric`.
    pub async fn run(
        &self,
        entity: &str,
        metric: &str,
        extra: Option<&Conditions>,
    ) -> Result<Vec<SeriesPoint>> {
        let report = self.get(entity, metric).ok_or_else(|| {
            ReportError::invalid_configuration_field(
                format!("No report '{metric}' is defined for entity '{entity}'"),
                "metric",
            )
        })?;
        report.run(extra).await
    }

    /// Number of registered reports.
    pub fn len(&self) -> usize {
        self.reports.load().len()
    }

    /// Whether no report is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shared cache handle.
    pub fn cache(&self) -> Arc<dyn ReportCache> {
        Arc::clone(&self.cache)
    }

    fn rebind_loaded(&self) {
        let reports: ReportMap = self
            .reports
            .load()
            .iter()
            .map(|(key, report)| {
                let report = report.rebound(Arc::clone(&self.clock), self.query_concurrency);
                (key.clone(), Arc::new(report))
            })
            .collect();
        self.reports.store(Arc::new(reports));
    }

    fn build(&self, definition: &ReportDefinition) -> Result<RegisteredReport> {
        let options = ReportOptions::try_from(definition)?;
        let report = Report::new(
            definition.entity.as_str(),
            definition.metric.as_str(),
            options,
            Arc::clone(&self.source),
            Arc::clone(&self.cache),
        )?
        .with_clock(Arc::clone(&self.clock))
        .with_query_concurrency(self.query_concurrency);

        Ok(if definition.cumulated {
            RegisteredReport::Cumulated(CumulatedReport::from(report))
        } else {
            RegisteredReport::Plain(report)
        })
    }
}

impl std::fmt::Debug for ReportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportRegistry")
            .field("reports", &self.len())
            .field("clock", &self.clock)
            .field("query_concurrency", &self.query_concurrency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryRecordStore;

    fn registry() -> ReportRegistry {
        ReportRegistry::new(Arc::new(MemoryRecordStore::new()), Arc::new(NoopReportCache))
    }

    #[test]
    fn test_load_and_lookup() {
        let registry = registry();
        assert!(registry.is_empty());

        let mut totals = ReportDefinition::new("users", "total_registrations");
        totals.cumulated = true;
        let count = registry
            .load(&[ReportDefinition::new("users", "registrations"), totals])
            .unwrap();
        assert_eq!(count, 2);

        assert!(!registry.get("users", "registrations").unwrap().is_cumulated());
        assert!(registry.get("users", "total_registrations").unwrap().is_cumulated());
        assert!(registry.get("posts", "registrations").is_none());
    }

    #[test]
    fn test_failed_load_keeps_previous_reports() {
        let registry = registry();
        registry
            .load(&[ReportDefinition::new("users", "registrations")])
            .unwrap();

        let duplicate = [
            ReportDefinition::new("users", "logins"),
            ReportDefinition::new("users", "logins"),
        ];
        let err = registry.load(&duplicate).unwrap_err();
        assert!(err.to_string().contains("defined twice"));

        let mut bad = ReportDefinition::new("users", "visits");
        bad.aggregation = "sum".to_string();
        assert!(registry.load(&[bad]).unwrap_err().is_configuration());

        assert_eq!(registry.len(), 1);
        assert!(registry.get("users", "registrations").is_some());
    }

    #[tokio::test]
    async fn test_build_cache_honours_enabled_flag() {
        use crate::cache::{CacheKey, ReportIdentity};
        use crate::grouping::Grouping;
        use sparkline_common::test_utils::mock_timestamp;

        let key = CacheKey::new(
            ReportIdentity {
                entity: "users".to_string(),
                metric: "registrations".to_string(),
                grouping: Grouping::Day,
                aggregation: "count".to_string(),
                date_column: "created_at".to_string(),
                conditions_fingerprint: 0,
            },
            mock_timestamp(2024, 6, 14, 0, 0, 0),
        );

        let enabled = build_cache(&CacheSettings::default());
        enabled.put(key.clone(), 2.0).await;
        assert_eq!(enabled.get(&key).await, Some(2.0));

        let disabled = build_cache(&CacheSettings {
            enabled: false,
            ..CacheSettings::default()
        });
        disabled.put(key.clone(), 2.0).await;
        assert_eq!(disabled.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_run_unknown_report() {
        let err = registry().run("users", "nothing", None).await.unwrap_err();
        assert!(err.is_configuration());
    }
}
