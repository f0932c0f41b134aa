//! Configuration schema definitions using serde with validation attributes.

use serde::{Deserialize, Serialize};
use sparkline_common::{Conditions, LogFormat, LoggingConfig};
use validator::Validate;

use crate::defaults;
use crate::validation::validate_identifier;

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    /// Closed-period cache configuration.
    #[validate]
    pub cache: CacheSettings,
    /// Query fan-out configuration.
    #[validate]
    pub query: QuerySettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Report definitions.
    #[validate]
    pub reports: Vec<ReportDefinition>,
}

/// Closed-period cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheSettings {
    /// Whether closed periods are memoized at all.
    pub enabled: bool,
    /// Maximum number of cached period values.
    #[validate(range(min = 1))]
    pub max_capacity: u64,
    /// Evict entries that were not read for this many seconds.
    pub time_to_idle_secs: Option<u64>,
}

/// Query fan-out configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct QuerySettings {
    /// Per-period aggregate queries in flight for one run.
    #[validate(range(min = 1, max = 64))]
    pub concurrency: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive string.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Optional log file; stdout when absent.
    pub file: Option<String>,
}

impl LoggingSettings {
    /// Converts these settings into the subscriber bootstrap configuration.
    pub fn to_logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.level.clone(),
            format: self.format,
            file_path: self.file.clone(),
            ..LoggingConfig::default()
        }
    }
}

/// One report as written in the configuration file.
///
/// Grouping and aggregation stay as names here; the report engine parses
/// them and rejects unknown ones when the report is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ReportDefinition {
    /// Entity (table) the records live in.
    #[validate(length(min = 1), custom = "validate_identifier")]
    pub entity: String,
    /// Report name, unique per entity.
    #[validate(length(min = 1))]
    pub metric: String,
    /// Aggregation kind name (`count` or `sum`).
    #[serde(default = "defaults::aggregation")]
    pub aggregation: String,
    /// Attribute summed by `sum` reports.
    #[serde(default)]
    #[validate(custom = "validate_identifier")]
    pub value_column: Option<String>,
    /// Timestamp attribute the periods apply to.
    #[serde(default = "defaults::date_column")]
    #[validate(custom = "validate_identifier")]
    pub date_column: String,
    /// Grouping name (`hour`, `day`, `week` or `month`).
    #[serde(default = "defaults::grouping")]
    pub grouping: String,
    /// Number of periods in the window.
    #[serde(default = "defaults::limit")]
    #[validate(range(min = 1))]
    pub limit: u32,
    /// Whether the still-open period is part of the series.
    #[serde(default)]
    pub live_data: bool,
    /// Whether values are running totals seeded with all earlier history.
    #[serde(default)]
    pub cumulated: bool,
    /// Base filter applied to every run.
    #[serde(default)]
    pub conditions: Conditions,
}

impl ReportDefinition {
    /// A definition with every optional field at its default.
    pub fn new(entity: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            metric: metric.into(),
            aggregation: defaults::aggregation(),
            value_column: None,
            date_column: defaults::date_column(),
            grouping: defaults::grouping(),
            limit: defaults::limit(),
            live_data: false,
            cumulated: false,
            conditions: Conditions::new(),
        }
    }
}
