//! SQL safety helpers for the execution engine.
//!
//! Column names and partition values end up inside SQL text generated from
//! user configuration. Everything interpolated into that text passes through
//! [`SqlSecurity`]; numeric directive arguments go through [`InputValidator`].

use crate::error::{Result, TermError};
use once_cell::sync::Lazy;
use regex::Regex;

/// Longest identifier accepted for a column or table name.
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Longest string literal accepted in generated SQL.
const MAX_LITERAL_LENGTH: usize = 4096;

static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
    // Hard-coded pattern, known to compile.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("Hard-coded regex pattern should be valid")
});

/// SQL identifier and literal validation and escaping.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates and escapes a single SQL identifier (table or column name).
    ///
    /// The identifier is wrapped in double quotes so its case is preserved.
    ///
    /// # Examples
    /// ```rust
    /// use term_batch::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_identifier("pickup_id").unwrap(), "\"pickup_id\"");
    /// assert_eq!(SqlSecurity::escape_identifier("VendorID").unwrap(), "\"VendorID\"");
    ///
    /// assert!(SqlSecurity::escape_identifier("id; DROP TABLE trips--").is_err());
    /// assert!(SqlSecurity::escape_identifier(&"very_long_name_".repeat(100)).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `SecurityError` if [`validate_identifier`](Self::validate_identifier) rejects it.
    pub fn escape_identifier(identifier: &str) -> Result<String> {
        Self::validate_identifier(identifier)?;

        let escaped = identifier.replace('"', "\"\"");
        Ok(format!("\"{escaped}\""))
    }

    /// Escapes a dot-separated identifier such as `schema.table`, part by part.
    pub fn escape_qualified_identifier(identifier: &str) -> Result<String> {
        let parts = identifier
            .split('.')
            .map(Self::escape_identifier)
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join("."))
    }

    /// Validates a single SQL identifier without escaping it.
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(TermError::SecurityError(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > MAX_IDENTIFIER_LENGTH {
            return Err(TermError::SecurityError(format!(
                "SQL identifier too long (max {MAX_IDENTIFIER_LENGTH} characters)"
            )));
        }

        InputValidator::validate_no_null_bytes(identifier, "SQL identifier")?;

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(TermError::SecurityError(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers and underscores"
            )));
        }

        Ok(())
    }

    /// Quotes a string literal, doubling embedded single quotes.
    ///
    /// # Examples
    /// ```rust
    /// use term_batch::security::SqlSecurity;
    ///
    /// assert_eq!(SqlSecurity::escape_literal("2020-01").unwrap(), "'2020-01'");
    /// assert_eq!(SqlSecurity::escape_literal("O'Hare").unwrap(), "'O''Hare'");
    /// ```
    pub fn escape_literal(value: &str) -> Result<String> {
        InputValidator::validate_no_null_bytes(value, "SQL literal")?;
        InputValidator::validate_string_length(value, MAX_LITERAL_LENGTH, "SQL literal")?;

        Ok(format!("'{}'", value.replace('\'', "''")))
    }
}

/// Validation of numeric and string inputs.
pub struct InputValidator;

impl InputValidator {
    /// Validates a numeric threshold value.
    pub fn validate_threshold(value: f64, name: &str) -> Result<()> {
        if !value.is_finite() {
            return Err(TermError::SecurityError(format!(
                "Invalid {name} value: must be finite (not NaN or infinite)"
            )));
        }
        Ok(())
    }

    /// Validates a fraction between 0.0 and 1.0 inclusive.
    pub fn validate_percentage(value: f64, name: &str) -> Result<()> {
        Self::validate_threshold(value, name)?;

        if !(0.0..=1.0).contains(&value) {
            return Err(TermError::SecurityError(format!(
                "Invalid {name} value: must be between 0.0 and 1.0, got {value}"
            )));
        }
        Ok(())
    }

    /// Validates a string length.
    pub fn validate_string_length(value: &str, max_length: usize, name: &str) -> Result<()> {
        if value.len() > max_length {
            return Err(TermError::SecurityError(format!(
                "{name} too long: {} characters (max {max_length})",
                value.len()
            )));
        }
        Ok(())
    }

    /// Validates that a string doesn't contain null bytes.
    pub fn validate_no_null_bytes(value: &str, name: &str) -> Result<()> {
        if value.contains('\0') {
            return Err(TermError::SecurityError(format!(
                "{name} cannot contain null bytes"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_identifier() {
        assert_eq!(
            SqlSecurity::escape_identifier("passenger_count").unwrap(),
            "\"passenger_count\""
        );
        assert_eq!(SqlSecurity::escape_identifier("_id2").unwrap(), "\"_id2\"");
    }

    #[test]
    fn test_rejects_injection_attempts() {
        for candidate in [
            "id; DROP TABLE users--",
            "col\" OR 1=1 --",
            "a b",
            "1col",
            "",
            "   ",
            "name\0",
        ] {
            assert!(
                SqlSecurity::escape_identifier(candidate).is_err(),
                "accepted {candidate:?}"
            );
        }
    }

    #[test]
    fn test_qualified_identifier() {
        assert_eq!(
            SqlSecurity::escape_qualified_identifier("public.trips").unwrap(),
            "\"public\".\"trips\""
        );
        assert!(SqlSecurity::escape_qualified_identifier("public..trips").is_err());
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(SqlSecurity::escape_literal("").unwrap(), "''");
        assert_eq!(
            SqlSecurity::escape_literal("x' OR '1'='1").unwrap(),
            "'x'' OR ''1''=''1'"
        );
        assert!(SqlSecurity::escape_literal("a\0b").is_err());
        assert!(SqlSecurity::escape_literal(&"x".repeat(MAX_LITERAL_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_input_validator() {
        assert!(InputValidator::validate_percentage(0.5, "p").is_ok());
        assert!(InputValidator::validate_percentage(1.0, "p").is_ok());
        assert!(InputValidator::validate_percentage(1.5, "p").is_err());
        assert!(InputValidator::validate_percentage(f64::NAN, "p").is_err());
        assert!(InputValidator::validate_threshold(f64::INFINITY, "t").is_err());
        assert!(InputValidator::validate_string_length("abc", 2, "s").is_err());
    }
}
