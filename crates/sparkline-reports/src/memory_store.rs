//! In-process record store implementing [`AggregateQuery`].
//!
//! Records are JSON objects grouped by entity. Condition expressions are
//! opaque to the engine, so the store evaluates each one through a predicate
//! registered under its exact expression text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sparkline_common::{Condition, ReportError, Result, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::query::{AggregateQuery, AggregateRequest, Aggregation};

/// Predicate evaluating one condition against one record, given the condition's parameters.
pub type Predicate = Arc<dyn Fn(&Record, &[Value]) -> bool + Send + Sync>;

/// A single row: attribute name to JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `column` to `value`.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Sets `column` to `instant`, stored as RFC 3339.
    #[must_use]
    pub fn with_timestamp(self, column: impl Into<String>, instant: Timestamp) -> Self {
        self.with(column, instant.to_rfc3339())
    }

    /// Value of `column`, if present.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Matches when the record's `column` equals one of the values bound to the
/// condition. A single array parameter is flattened, so `login IN (?)` with
/// `[["a", "b"]]` behaves like SQL.
pub fn field_in(column: impl Into<String>) -> Predicate {
    let column = column.into();
    Arc::new(move |record: &Record, params: &[Value]| {
        let Some(value) = record.get(&column) else {
            return false;
        };
        params.iter().any(|param| match param {
            Value::Array(candidates) => candidates.contains(value),
            other => other == value,
        })
    })
}

/// Matches when the record's `column` equals the first bound value.
pub fn field_eq(column: impl Into<String>) -> Predicate {
    let column = column.into();
    Arc::new(move |record: &Record, params: &[Value]| match (record.get(&column), params.first()) {
        (Some(value), Some(expected)) => value == expected,
        _ => false,
    })
}

/// Tables of [`Record`]s answering aggregate requests in memory.
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    predicates: RwLock<HashMap<String, Predicate>>,
}

impl MemoryRecordStore {
    /// An empty store with no predicates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `record` to `entity`.
    pub fn insert(&self, entity: impl Into<String>, record: Record) {
        self.tables.write().entry(entity.into()).or_default().push(record);
    }

    /// Appends every record to `entity`.
    pub fn insert_many<I>(&self, entity: impl Into<String>, records: I)
    where
        I: IntoIterator<Item = Record>,
    {
        self.tables
            .write()
            .entry(entity.into())
            .or_default()
            .extend(records);
    }

    /// Removes every record of `entity`.
    pub fn clear(&self, entity: &str) {
        self.tables.write().remove(entity);
    }

    /// Number of records stored for `entity`.
    pub fn len(&self, entity: &str) -> usize {
        self.tables.read().get(entity).map_or(0, Vec::len)
    }

    /// Whether `entity` holds no records.
    pub fn is_empty(&self, entity: &str) -> bool {
        self.len(entity) == 0
    }

    /// Registers the predicate used for conditions whose expression is exactly `expression`.
    pub fn register_predicate(&self, expression: impl Into<String>, predicate: Predicate) {
        self.predicates.write().insert(expression.into(), predicate);
    }

    fn compute(&self, request: &AggregateRequest) -> Result<Option<f64>> {
        let predicates = self.predicates.read();
        let filters = request
            .conditions
            .iter()
            .map(|condition| {
                predicates
                    .get(&condition.expression)
                    .map(|predicate| (predicate, condition))
                    .ok_or_else(|| {
                        ReportError::query_failure(format!(
                            "No predicate registered for condition '{}'",
                            condition.expression
                        ))
                    })
            })
            .collect::<Result<Vec<(&Predicate, &Condition)>>>()?;

        let tables = self.tables.read();
        let Some(records) = tables.get(&request.entity) else {
            return Ok(empty_result(&request.aggregation));
        };

        let mut matched = 0_u64;
        let mut total: Option<f64> = None;

        for record in records {
            let Some(instant) = record_timestamp(record, &request.date_column)? else {
                continue;
            };
            if !request.range.contains(instant) {
                continue;
            }
            if !filters
                .iter()
                .all(|(predicate, condition)| predicate(record, &condition.params))
            {
                continue;
            }

            matched += 1;
            if let Aggregation::Sum { column } = &request.aggregation {
                if let Some(value) = numeric_value(record, column)? {
                    *total.get_or_insert(0.0) += value;
                }
            }
        }

        debug!(entity = %request.entity, matched, "Evaluated in-memory aggregate");

        Ok(match request.aggregation {
            #[allow(clippy::cast_precision_loss)]
            Aggregation::Count => Some(matched as f64),
            Aggregation::Sum { .. } => total,
        })
    }
}

#[async_trait]
impl AggregateQuery for MemoryRecordStore {
    #[instrument(skip(self, request), fields(entity = %request.entity, aggregation = %request.aggregation))]
    async fn aggregate(&self, request: &AggregateRequest) -> Result<Option<f64>> {
        self.compute(request)
    }
}

impl std::fmt::Debug for MemoryRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRecordStore")
            .field("entities", &self.tables.read().len())
            .field("predicates", &self.predicates.read().len())
            .finish()
    }
}

const fn empty_result(aggregation: &Aggregation) -> Option<f64> {
    match aggregation {
        Aggregation::Count => Some(0.0),
        Aggregation::Sum { .. } => None,
    }
}

fn record_timestamp(record: &Record, column: &str) -> Result<Option<Timestamp>> {
    match record.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
            .map(|instant| Some(instant.with_timezone(&Utc)))
            .map_err(|e| {
                ReportError::query_failure_with_source(
                    format!("Column '{column}' holds '{text}', which is not a timestamp"),
                    e,
                )
            }),
        Some(other) => Err(ReportError::query_failure(format!(
            "Column '{column}' holds {other}, which is not a timestamp"
        ))),
    }
}

fn numeric_value(record: &Record, column: &str) -> Result<Option<f64>> {
    match record.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number.as_f64().map(Some).ok_or_else(|| {
            ReportError::query_failure(format!("Column '{column}' holds an unrepresentable number"))
        }),
        Some(other) => Err(ReportError::query_failure(format!(
            "Cannot sum column '{column}': {other} is not numeric"
        ))),
    }
}
