//! Derive-based and cross-field validation of a loaded configuration.

use std::borrow::Cow;
use std::collections::HashSet;

use sparkline_common::{is_valid_identifier, ReportError, Result};
use tracing::debug;
use validator::{Validate, ValidationError};

use crate::schema::Config;

/// Field-level check used by the `validator` derive for table and column names.
pub fn validate_identifier(value: &str) -> std::result::Result<(), ValidationError> {
    if is_valid_identifier(value) {
        Ok(())
    } else {
        let mut error = ValidationError::new("identifier");
        error.message = Some(Cow::Owned(format!("'{value}' is not a valid identifier")));
        Err(error)
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates field constraints, then rules spanning several reports.
    pub fn validate(config: &Config) -> Result<()> {
        config
            .validate()
            .map_err(|e| ReportError::config_with_source("Configuration validation failed", e))?;

        let mut seen = HashSet::new();
        for report in &config.reports {
            if !seen.insert((report.entity.as_str(), report.metric.as_str())) {
                return Err(ReportError::config(format!(
                    "Report '{}' is defined twice for entity '{}'",
                    report.metric, report.entity
                )));
            }
        }

        debug!(reports = config.reports.len(), "Configuration validated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ReportDefinition;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_duplicate_reports_are_rejected() {
        let mut config = Config::default();
        config.reports.push(ReportDefinition::new("users", "registrations"));
        config.reports.push(ReportDefinition::new("users", "registrations"));

        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn test_field_constraints() {
        let mut config = Config::default();
        let mut report = ReportDefinition::new("users", "registrations");
        report.limit = 0;
        config.reports.push(report);
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = Config::default();
        let mut report = ReportDefinition::new("users", "visits");
        report.value_column = Some("visits; --".to_string());
        config.reports.push(report);
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = Config::default();
        config.query.concurrency = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
