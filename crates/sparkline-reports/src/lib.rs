//! # Sparkline Reports
//!
//! Time-bucketed aggregate series over timestamped records.
//!
//! A [`Report`] counts or sums the records of one entity per hour, day,
//! week or month over a sliding window of periods. A [`CumulatedReport`]
//! turns that window into running totals that include everything before
//! it. Values of periods that have fully elapsed are final, so they are
//! memoized in a [`ReportCache`]; the live period is always recomputed.
//!
//! Records are reached through the [`AggregateQuery`] trait.
//! [`MemoryRecordStore`] implements it in process, and
//! [`AggregateRequest::to_sql`] renders requests for database adapters.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod clock;
pub mod cumulated;
pub mod grouping;
pub mod memory_store;
pub mod period;
pub mod query;
pub mod registry;
pub mod report;
mod sql;

pub use cache::*;
pub use clock::*;
pub use cumulated::*;
pub use grouping::*;
pub use memory_store::*;
pub use period::*;
pub use query::*;
pub use registry::*;
pub use report::*;
