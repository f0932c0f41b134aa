//! The boundary between the report engine and the record store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sparkline_common::{Conditions, ReportError, Result, Timestamp};
use std::fmt;
use std::str::FromStr;

use crate::period::ReportingPeriod;

/// Time span an aggregate is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeRange {
    /// Half-open `[start, end)`, one reporting period.
    Between {
        /// Inclusive lower bound.
        start: Timestamp,
        /// Exclusive upper bound.
        end: Timestamp,
    },
    /// Everything strictly before `end`, with no lower bound.
    Before {
        /// Exclusive upper bound.
        end: Timestamp,
    },
}

impl TimeRange {
    /// Whether `instant` lies in the range.
    pub fn contains(&self, instant: Timestamp) -> bool {
        match *self {
            Self::Between { start, end } => start <= instant && instant < end,
            Self::Before { end } => instant < end,
        }
    }

    /// Lower bound, if any.
    pub const fn start(&self) -> Option<Timestamp> {
        match *self {
            Self::Between { start, .. } => Some(start),
            Self::Before { .. } => None,
        }
    }

    /// Exclusive upper bound.
    pub const fn end(&self) -> Timestamp {
        match *self {
            Self::Between { end, .. } | Self::Before { end } => end,
        }
    }
}

impl From<&ReportingPeriod> for TimeRange {
    fn from(period: &ReportingPeriod) -> Self {
        Self::Between {
            start: period.start(),
            end: period.end(),
        }
    }
}

/// Aggregation kind as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    /// Number of matching records.
    #[default]
    Count,
    /// Sum of a numeric attribute over matching records.
    Sum,
}

impl FromStr for AggregationKind {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "sum" => Ok(Self::Sum),
            other @ ("maximum" | "minimum" | "average") => Err(
                ReportError::invalid_configuration_field(
                    format!("Aggregation '{other}' is not supported, use count or sum"),
                    "aggregation",
                ),
            ),
            other => Err(ReportError::invalid_configuration_field(
                format!("Unknown aggregation '{other}'"),
                "aggregation",
            )),
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Sum => write!(f, "sum"),
        }
    }
}

/// A validated aggregation. A sum always names the attribute it adds up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Aggregation {
    /// Number of matching records.
    Count,
    /// Sum of `column` over matching records.
    Sum {
        /// Numeric attribute to add up.
        column: String,
    },
}

impl Aggregation {
    /// Builds the aggregation from a kind and an optional value column.
    ///
    /// Fails when `sum` has no column. A column given to `count` is ignored.
    pub fn from_parts(kind: AggregationKind, value_column: Option<&str>) -> Result<Self> {
        match (kind, value_column.map(str::trim)) {
            (AggregationKind::Count, _) => Ok(Self::Count),
            (AggregationKind::Sum, Some(column)) if !column.is_empty() => Ok(Self::Sum {
                column: column.to_string(),
            }),
            (AggregationKind::Sum, _) => Err(ReportError::invalid_configuration_field(
                "Aggregation 'sum' requires a value column",
                "value_column",
            )),
        }
    }

    /// The kind without its column.
    pub const fn kind(&self) -> AggregationKind {
        match self {
            Self::Count => AggregationKind::Count,
            Self::Sum { .. } => AggregationKind::Sum,
        }
    }

    /// Stable textual form, e.g. `count` or `sum(profile_visits)`.
    pub fn descriptor(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Sum { column } => write!(f, "sum({column})"),
        }
    }
}

/// One aggregate to compute: `aggregation` over `entity` records whose
/// `date_column` lies in `range` and which satisfy every condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    /// Entity (table) queried.
    pub entity: String,
    /// What to compute.
    pub aggregation: Aggregation,
    /// Timestamp attribute the range applies to.
    pub date_column: String,
    /// Time span.
    pub range: TimeRange,
    /// Conjunction of filters.
    pub conditions: Conditions,
}

/// Computes aggregates against a record store.
///
/// `Ok(None)` means no matching rows (reported as `0.0` by the engine);
/// `Err` means the value could not be produced and must not be cached.
#[async_trait]
pub trait AggregateQuery: Send + Sync {
    /// Computes one aggregate.
    async fn aggregate(&self, request: &AggregateRequest) -> Result<Option<f64>>;
}
