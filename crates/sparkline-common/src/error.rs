//! Error types and utilities for the report engine

use thiserror::Error;

/// Result type alias for report operations
pub type Result<T> = std::result::Result<T, ReportError>;

/// Main error type for report operations
#[derive(Error, Debug)]
pub enum ReportError {
    /// Unrecognized bucket granularity
    #[error("Invalid grouping: '{name}' (expected one of hour, day, week, month)")]
    InvalidGrouping {
        name: String,
    },

    /// Report configuration that can never run (raised at construction)
    #[error("Invalid report configuration: {message}")]
    InvalidConfiguration {
        message: String,
        field: Option<String>,
    },

    /// The aggregate query collaborator could not produce a value
    #[error("Query failed: {message}")]
    QueryFailure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration file loading or parsing errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReportError {
    /// Create an invalid grouping error for the given name
    pub fn invalid_grouping(name: impl Into<String>) -> Self {
        Self::InvalidGrouping { name: name.into() }
    }

    /// Create a new invalid configuration error
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a new invalid configuration error naming the offending field
    pub fn invalid_configuration_field(msg: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new query failure
    pub fn query_failure(msg: impl Into<String>) -> Self {
        Self::QueryFailure {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new query failure with source
    pub fn query_failure_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::QueryFailure {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new configuration error with source
    pub fn config_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether this error came from the query collaborator
    pub const fn is_query_failure(&self) -> bool {
        matches!(self, Self::QueryFailure { .. })
    }

    /// Whether this error rejects a report definition
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidGrouping { .. } | Self::InvalidConfiguration { .. } | Self::Config { .. }
        )
    }
}
