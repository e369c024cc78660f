//! SQL generation for split and sample directives.
//!
//! A [`BatchSpec`] names at most one splitter and one sampler. Both become
//! clauses of a single `SELECT * FROM <table>` query: splitters and most
//! samplers add `WHERE` predicates, `sample_using_limit` adds a `LIMIT`.

use serde_json::Value;

use crate::core::{BatchDirective, BatchSpec, PartitionIdentity, PartitionValue};
use crate::error::{Result, TermError};
use crate::security::{InputValidator, SqlSecurity};

pub const SPLIT_ON_WHOLE_TABLE: &str = "split_on_whole_table";
pub const SPLIT_ON_COLUMN_VALUE: &str = "split_on_column_value";
pub const SPLIT_ON_DIVIDED_INTEGER: &str = "split_on_divided_integer";
pub const SPLIT_ON_MOD_INTEGER: &str = "split_on_mod_integer";
pub const SPLIT_ON_MULTI_COLUMN_VALUES: &str = "split_on_multi_column_values";

pub const SAMPLE_USING_LIMIT: &str = "sample_using_limit";
pub const SAMPLE_USING_RANDOM: &str = "sample_using_random";
pub const SAMPLE_USING_MOD: &str = "sample_using_mod";
pub const SAMPLE_USING_A_LIST: &str = "sample_using_a_list";

/// Builds the query that loads `spec` from an already registered table.
///
/// `table` must already be escaped.
pub(crate) fn batch_query(table: &str, spec: &BatchSpec) -> Result<String> {
    let mut predicates = Vec::new();
    let mut limit = None;

    if let Some(splitter) = spec.splitter() {
        predicates.extend(splitter_predicates(splitter, spec.batch_identifiers())?);
    }

    if let Some(sampler) = spec.sampler() {
        match sampler_clause(sampler)? {
            SamplerClause::Predicate(predicate) => predicates.push(predicate),
            SamplerClause::Limit(n) => limit = Some(n),
        }
    }

    let mut sql = format!("SELECT * FROM {table}");
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {n}"));
    }
    Ok(sql)
}

enum SamplerClause {
    Predicate(String),
    Limit(u64),
}

fn splitter_predicates(
    directive: &BatchDirective,
    identifiers: &PartitionIdentity,
) -> Result<Vec<String>> {
    match directive.method.as_str() {
        SPLIT_ON_WHOLE_TABLE => Ok(Vec::new()),
        SPLIT_ON_COLUMN_VALUE => {
            let column = column_kwarg(directive, "column_name")?;
            let value = identifier_value(directive, identifiers, column)?;
            Ok(vec![text_equals(column, &value.as_text())?])
        }
        SPLIT_ON_DIVIDED_INTEGER => {
            let column = column_kwarg(directive, "column_name")?;
            let divisor = positive_int_kwarg(directive, "divisor")?;
            let value = integer_identifier(directive, identifiers, column)?;
            Ok(vec![format!(
                "FLOOR(CAST({} AS DOUBLE) / {divisor}) = {value}",
                SqlSecurity::escape_identifier(column)?
            )])
        }
        SPLIT_ON_MOD_INTEGER => {
            let column = column_kwarg(directive, "column_name")?;
            let modulus = positive_int_kwarg(directive, "mod")?;
            let value = integer_identifier(directive, identifiers, column)?;
            Ok(vec![mod_equals(column, modulus, value)?])
        }
        SPLIT_ON_MULTI_COLUMN_VALUES => {
            let columns = list_kwarg(directive, "column_names")?;
            if columns.is_empty() {
                return Err(invalid(directive, "'column_names' must not be empty"));
            }
            columns
                .iter()
                .map(|column| {
                    let column = column.as_str().ok_or_else(|| {
                        invalid(directive, "'column_names' must contain only strings")
                    })?;
                    let value = identifier_value(directive, identifiers, column)?;
                    text_equals(column, &value.as_text())
                })
                .collect()
        }
        other => Err(TermError::NotSupported(format!(
            "splitter method '{other}'"
        ))),
    }
}

fn sampler_clause(directive: &BatchDirective) -> Result<SamplerClause> {
    match directive.method.as_str() {
        SAMPLE_USING_LIMIT => {
            let n = int_kwarg(directive, "n")?;
            let n = u64::try_from(n).map_err(|_| invalid(directive, "'n' must not be negative"))?;
            Ok(SamplerClause::Limit(n))
        }
        SAMPLE_USING_RANDOM => {
            let p = match directive.kwargs.get("p") {
                None => 0.1,
                Some(value) => value
                    .as_f64()
                    .ok_or_else(|| invalid(directive, "'p' must be a number"))?,
            };
            InputValidator::validate_percentage(p, "p")
                .map_err(|e| invalid(directive, &e.to_string()))?;
            Ok(SamplerClause::Predicate(format!("random() < {p}")))
        }
        SAMPLE_USING_MOD => {
            let column = column_kwarg(directive, "column_name")?;
            let modulus = positive_int_kwarg(directive, "mod")?;
            let value = int_kwarg(directive, "value")?;
            Ok(SamplerClause::Predicate(mod_equals(column, modulus, value)?))
        }
        SAMPLE_USING_A_LIST => {
            let column = column_kwarg(directive, "column_name")?;
            let values = list_kwarg(directive, "value_list")?;
            if values.is_empty() {
                return Ok(SamplerClause::Predicate("FALSE".to_string()));
            }
            let literals = values
                .iter()
                .map(|v| SqlSecurity::escape_literal(&json_text(v)))
                .collect::<Result<Vec<_>>>()?;
            Ok(SamplerClause::Predicate(format!(
                "CAST({} AS VARCHAR) IN ({})",
                SqlSecurity::escape_identifier(column)?,
                literals.join(", ")
            )))
        }
        other => Err(TermError::NotSupported(format!("sampling method '{other}'"))),
    }
}

// Values are compared as text so a captured "100" matches an integer column.
fn text_equals(column: &str, value: &str) -> Result<String> {
    Ok(format!(
        "CAST({} AS VARCHAR) = {}",
        SqlSecurity::escape_identifier(column)?,
        SqlSecurity::escape_literal(value)?
    ))
}

fn mod_equals(column: &str, modulus: i64, value: i64) -> Result<String> {
    Ok(format!(
        "CAST({} AS BIGINT) % {modulus} = {value}",
        SqlSecurity::escape_identifier(column)?
    ))
}

fn identifier_value<'a>(
    directive: &BatchDirective,
    identifiers: &'a PartitionIdentity,
    column: &str,
) -> Result<&'a PartitionValue> {
    identifiers.get(column).ok_or_else(|| {
        invalid(
            directive,
            &format!("batch identifiers have no value for column '{column}'"),
        )
    })
}

fn integer_identifier(
    directive: &BatchDirective,
    identifiers: &PartitionIdentity,
    column: &str,
) -> Result<i64> {
    match identifier_value(directive, identifiers, column)? {
        PartitionValue::Integer(i) => Ok(*i),
        other => other.as_text().trim().parse().map_err(|_| {
            invalid(
                directive,
                &format!("batch identifier '{column}' is not an integer: {other}"),
            )
        }),
    }
}

fn column_kwarg<'a>(directive: &'a BatchDirective, key: &str) -> Result<&'a str> {
    let column = str_kwarg(directive, key)?;
    SqlSecurity::validate_identifier(column)?;
    Ok(column)
}

fn str_kwarg<'a>(directive: &'a BatchDirective, key: &str) -> Result<&'a str> {
    match directive.kwargs.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(invalid(directive, &format!("'{key}' must be a string"))),
        None => Err(missing(directive, key)),
    }
}

fn int_kwarg(directive: &BatchDirective, key: &str) -> Result<i64> {
    match directive.kwargs.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| invalid(directive, &format!("'{key}' must be an integer"))),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| invalid(directive, &format!("'{key}' must be an integer"))),
        Some(_) => Err(invalid(directive, &format!("'{key}' must be an integer"))),
        None => Err(missing(directive, key)),
    }
}

fn positive_int_kwarg(directive: &BatchDirective, key: &str) -> Result<i64> {
    let value = int_kwarg(directive, key)?;
    if value <= 0 {
        return Err(invalid(directive, &format!("'{key}' must be positive")));
    }
    Ok(value)
}

fn list_kwarg<'a>(directive: &'a BatchDirective, key: &str) -> Result<&'a Vec<Value>> {
    match directive.kwargs.get(key) {
        Some(Value::Array(values)) => Ok(values),
        Some(_) => Err(invalid(directive, &format!("'{key}' must be a list"))),
        None => Err(missing(directive, key)),
    }
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn missing(directive: &BatchDirective, key: &str) -> TermError {
    TermError::InvalidBatchSpec(format!(
        "{} requires the '{key}' argument",
        directive.method
    ))
}

fn invalid(directive: &BatchDirective, message: &str) -> TermError {
    TermError::InvalidBatchSpec(format!("{}: {message}", directive.method))
}
