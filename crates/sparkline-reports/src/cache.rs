//! Closed-period value cache.
//!
//! Only periods whose end has passed are ever stored; that rule is enforced
//! by the report engine, so stores here are plain key/value maps.

use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sparkline_common::Timestamp;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::grouping::Grouping;

/// Everything that distinguishes one report's values from another's,
/// apart from the period.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportIdentity {
    /// Entity (table) the report reads.
    pub entity: String,
    /// Report name.
    pub metric: String,
    /// Bucket width.
    pub grouping: Grouping,
    /// Aggregation descriptor, e.g. `sum(profile_visits)`.
    pub aggregation: String,
    /// Timestamp attribute the periods apply to.
    pub date_column: String,
    /// Fingerprint of the combined conditions, `0` when unfiltered.
    pub conditions_fingerprint: u64,
}

impl fmt::Display for ReportIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.entity, self.metric, self.grouping, self.aggregation, self.date_column
        )?;
        if self.conditions_fingerprint != 0 {
            write!(f, ":cond_{:016x}", self.conditions_fingerprint)?;
        }
        Ok(())
    }
}

/// Key of one cached period value.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    /// Report the value belongs to.
    pub identity: ReportIdentity,
    /// Aligned start of the period.
    pub period_start: Timestamp,
}

impl CacheKey {
    /// Key for `identity` at the period starting at `period_start`.
    pub const fn new(identity: ReportIdentity, period_start: Timestamp) -> Self {
        Self {
            identity,
            period_start,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identity, self.period_start.format("%Y%m%dT%H"))
    }
}

/// Storage for aggregate values of closed periods.
///
/// Implementations must tolerate concurrent runs; a `put` for an existing
/// key overwrites it.
#[async_trait]
pub trait ReportCache: Send + Sync {
    /// Cached value for `key`, if any.
    async fn get(&self, key: &CacheKey) -> Option<f64>;

    /// Stores `value` under `key`.
    async fn put(&self, key: CacheKey, value: f64);

    /// Drops every cached value of one report.
    async fn invalidate_report(&self, identity: &ReportIdentity);

    /// Drops everything.
    async fn clear_all(&self);
}

/// Cache performance counters.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Lookups answered from the cache.
    pub hits: AtomicU64,
    /// Lookups that fell through to the query.
    pub misses: AtomicU64,
    /// Values stored.
    pub inserts: AtomicU64,
    /// Entries removed by invalidation.
    pub invalidations: AtomicU64,
}

impl CacheMetrics {
    /// Counts a hit.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a miss.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a stored value.
    pub fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts `count` invalidated entries.
    pub fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    /// Share of lookups answered from the cache, `0.0` before any lookup.
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let total = hits + self.misses.load(Ordering::Relaxed) as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }

    /// Snapshot of every counter by name.
    pub fn get_stats(&self) -> HashMap<String, u64> {
        let mut stats = HashMap::new();
        stats.insert("hits".to_string(), self.hits.load(Ordering::Relaxed));
        stats.insert("misses".to_string(), self.misses.load(Ordering::Relaxed));
        stats.insert("inserts".to_string(), self.inserts.load(Ordering::Relaxed));
        stats.insert(
            "invalidations".to_string(),
            self.invalidations.load(Ordering::Relaxed),
        );
        stats
    }
}

/// Sizing of a [`MemoryReportCache`].
#[derive(Debug, Clone)]
pub struct MemoryCacheConfig {
    /// Maximum number of period values kept.
    pub max_capacity: u64,
    /// Evict values not read for this long.
    pub time_to_idle: Option<Duration>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_idle: None,
        }
    }
}

/// Bounded in-memory cache built on moka.
pub struct MemoryReportCache {
    cache: Cache<CacheKey, f64>,
    metrics: Arc<CacheMetrics>,
}

impl MemoryReportCache {
    /// Creates a cache with the given sizing.
    pub fn new(config: MemoryCacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);
        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        Self {
            cache: builder.build(),
            metrics: Arc::new(CacheMetrics::default()),
        }
    }

    /// Shared handle to the counters.
    pub fn metrics(&self) -> Arc<CacheMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Counters plus the current entry count.
    pub async fn stats(&self) -> HashMap<String, u64> {
        self.cache.run_pending_tasks().await;
        let mut stats = self.metrics.get_stats();
        stats.insert("entry_count".to_string(), self.cache.entry_count());
        stats
    }
}

impl Default for MemoryReportCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

impl fmt::Debug for MemoryReportCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryReportCache")
            .field("entry_count", &self.cache.entry_count())
            .field("metrics", &self.metrics)
            .finish()
    }
}

#[async_trait]
impl ReportCache for MemoryReportCache {
    #[instrument(skip(self, key), fields(key = %key))]
    async fn get(&self, key: &CacheKey) -> Option<f64> {
        let value = self.cache.get(key).await;
        if value.is_some() {
            debug!("Cache hit");
            self.metrics.record_hit();
        } else {
            debug!("Cache miss");
            self.metrics.record_miss();
        }
        value
    }

    #[instrument(skip(self, key, value), fields(key = %key))]
    async fn put(&self, key: CacheKey, value: f64) {
        debug!(value, "Storing period value");
        self.cache.insert(key, value).await;
        self.metrics.record_insert();
    }

    #[instrument(skip(self, identity), fields(report = %identity))]
    async fn invalidate_report(&self, identity: &ReportIdentity) {
        let keys: Vec<CacheKey> = self
            .cache
            .iter()
            .filter(|(key, _)| key.identity == *identity)
            .map(|(key, _)| (*key).clone())
            .collect();

        let count = keys.len() as u64;
        for key in keys {
            self.cache.invalidate(&key).await;
        }
        self.metrics.record_invalidations(count);
        info!("Invalidated {} cached periods", count);
    }

    #[instrument(skip(self))]
    async fn clear_all(&self) {
        self.cache.run_pending_tasks().await;
        let count = self.cache.entry_count();
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        self.metrics.record_invalidations(count);
        info!("Cleared {} cached periods", count);
    }
}

/// Cache that stores nothing, used when caching is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReportCache;

#[async_trait]
impl ReportCache for NoopReportCache {
    async fn get(&self, _key: &CacheKey) -> Option<f64> {
        None
    }

    async fn put(&self, _key: CacheKey, _value: f64) {}

    async fn invalidate_report(&self, _identity: &ReportIdentity) {}

    async fn clear_all(&self) {}
}
