//! Parameterised SQL rendering of aggregate requests for database-backed adapters.

use serde_json::Value;
use sparkline_common::{is_valid_identifier, ReportError, Result, Timestamp};

use crate::query::{AggregateRequest, Aggregation, TimeRange};

impl AggregateRequest {
    /// Renders the request as one `SELECT` with `?` placeholders and its bound values.
    ///
    /// Range bounds are bound as RFC 3339 strings. Condition expressions are
    /// inlined verbatim inside parentheses and their parameters appended in
    /// order; array parameters are passed through for the adapter to expand.
    ///
    /// ```
    /// # use sparkline_common::Conditions;
    /// # use sparkline_reports::{AggregateRequest, Aggregation, TimeRange};
    /// # use chrono::{TimeZone, Utc};
    /// let request = AggregateRequest {
    ///     entity: "users".into(),
    ///     aggregation: Aggregation::Count,
    ///     date_column: "created_at".into(),
    ///     range: TimeRange::Before { end: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() },
    ///     conditions: Conditions::new(),
    /// };
    /// let (sql, params) = request.to_sql().unwrap();
    /// assert_eq!(sql, r#"SELECT COUNT(*) FROM "users" WHERE "created_at" < ?"#);
    /// assert_eq!(params.len(), 1);
    /// ```
    pub fn to_sql(&self) -> Result<(String, Vec<Value>)> {
        let table = quote_identifier(&self.entity)?;
        let date_column = quote_identifier(&self.date_column)?;
        let select = match &self.aggregation {
            Aggregation::Count => "COUNT(*)".to_string(),
            Aggregation::Sum { column } => format!("SUM({})", quote_identifier(column)?),
        };

        let mut clauses = Vec::with_capacity(2 + self.conditions.len());
        let mut params = Vec::new();

        match self.range {
            TimeRange::Between { start, end } => {
                clauses.push(format!("{date_column} >= ?"));
                params.push(bind_timestamp(start));
                clauses.push(format!("{date_column} < ?"));
                params.push(bind_timestamp(end));
            }
            TimeRange::Before { end } => {
                clauses.push(format!("{date_column} < ?"));
                params.push(bind_timestamp(end));
            }
        }

        for condition in &self.conditions {
            clauses.push(format!("({})", condition.expression));
            params.extend(condition.params.iter().cloned());
        }

        let sql = format!(
            "SELECT {select} FROM {table} WHERE {}",
            clauses.join(" AND ")
        );
        Ok((sql, params))
    }
}

fn quote_identifier(name: &str) -> Result<String> {
    if !is_valid_identifier(name) {
        return Err(ReportError::query_failure(format!(
            "Refusing to render unsafe identifier '{name}'"
        )));
    }
    Ok(name
        .split('.')
        .map(|part| format!("\"{part}\""))
        .collect::<Vec<_>>()
        .join("."))
}

fn bind_timestamp(instant: Timestamp) -> Value {
    Value::String(instant.to_rfc3339())
}
