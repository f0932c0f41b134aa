//! Default values for every configuration section.

use crate::schema::*;
use sparkline_common::LogFormat;

/// Default aggregation kind name.
pub fn aggregation() -> String {
    "count".to_string()
}

/// Default timestamp attribute.
pub fn date_column() -> String {
    "created_at".to_string()
}

/// Default grouping name.
pub fn grouping() -> String {
    "day".to_string()
}

/// Default window size.
pub const fn limit() -> u32 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheSettings::default(),
            query: QuerySettings::default(),
            logging: LoggingSettings::default(),
            reports: Vec::new(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_capacity: 10_000,
            time_to_idle_secs: None,
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}
