//! # Sparkline Common
//!
//! Shared types, error handling and logging for the sparkline report engine.
//!
//! This crate provides the foundational pieces used across the other crates
//! in the workspace: the [`ReportError`] taxonomy, the opaque [`Condition`]
//! predicate fragments reports are filtered with, and the `tracing`
//! subscriber bootstrap.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod logging;
pub mod types;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;

pub use error::{ReportError, Result};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use types::*;
pub use utils::*;
