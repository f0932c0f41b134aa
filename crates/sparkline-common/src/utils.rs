//! Shared utility functions.

use crate::{ReportError, Result};

/// Whether `name` is usable as a (possibly schema-qualified) table or column name.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// Validate that a string is not empty after trimming.
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ReportError::invalid_configuration_field(
            format!("{field_name} cannot be empty"),
            field_name,
        ))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("created_at"));
        assert!(is_valid_identifier("public.users"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("1users"));
        assert!(!is_valid_identifier("users; DROP TABLE users"));
        assert!(!is_valid_identifier("public..users"));
        assert!(!is_valid_identifier(".users"));
    }

    #[test]
    fn test_validate_non_empty() {
        assert_eq!(validate_non_empty(" users ", "entity").unwrap(), "users");
        assert!(validate_non_empty("", "entity").is_err());
        assert!(validate_non_empty("   ", "entity").is_err());
    }
}
