//! Configuration loading utilities

use std::env;
use std::path::Path;

use sparkline_common::{LogFormat, ReportError, Result as ReportResult};
use thiserror::Error;
use tracing::{debug, info};

use crate::schema::Config;
use crate::validation::ConfigValidator;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "SPARKLINE_CONFIG_PATH";

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "sparkline.yaml";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error when reading configuration file
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Environment variable parsing error
    #[error("Failed to parse environment variable '{var}': {source}")]
    EnvParseError {
        var: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl From<ConfigError> for ReportError {
    fn from(err: ConfigError) -> Self {
        let message = err.to_string();
        Self::config_with_source(message, err)
    }
}

/// Configuration loader for the report engine
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file with environment variable overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ReportResult<Config> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::from)?;
        info!(path = %path.as_ref().display(), "Loading configuration file");
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text with environment variable overrides
    pub fn from_yaml_str(content: &str) -> ReportResult<Config> {
        let mut config: Config = serde_yaml::from_str(content).map_err(ConfigError::from)?;
        Self::apply_env_overrides(&mut config)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from `SPARKLINE_CONFIG_PATH`, then `sparkline.yaml`,
    /// falling back to defaults with environment overrides
    pub fn load() -> ReportResult<Config> {
        if let Ok(config_path) = env::var(CONFIG_PATH_VAR) {
            return Self::load_from_file(config_path);
        }
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::load_from_file(DEFAULT_CONFIG_FILE);
        }

        debug!("No configuration file found, using defaults");
        let mut config = Config::default();
        Self::apply_env_overrides(&mut config)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(config: &mut Config) -> Result<(), ConfigError> {
        if let Ok(enabled) = env::var("SPARKLINE_CACHE_ENABLED") {
            config.cache.enabled = parse_var("SPARKLINE_CACHE_ENABLED", &enabled)?;
        }

        if let Ok(capacity) = env::var("SPARKLINE_CACHE_MAX_CAPACITY") {
            config.cache.max_capacity = parse_var("SPARKLINE_CACHE_MAX_CAPACITY", &capacity)?;
        }

        if let Ok(concurrency) = env::var("SPARKLINE_QUERY_CONCURRENCY") {
            config.query.concurrency = parse_var("SPARKLINE_QUERY_CONCURRENCY", &concurrency)?;
        }

        if let Ok(level) = env::var("SPARKLINE_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(format) = env::var("SPARKLINE_LOG_FORMAT") {
            config.logging.format = format
                .parse::<LogFormat>()
                .map_err(|e| ConfigError::EnvParseError {
                    var: "SPARKLINE_LOG_FORMAT".to_string(),
                    source: Box::new(e),
                })?;
        }

        Ok(())
    }
}

fn parse_var<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::EnvParseError {
        var: var.to_string(),
        source: Box::new(e),
    })
}
