//! # Sparkline Config
//!
//! Type-safe configuration for the sparkline report engine.
//!
//! Configuration is read from YAML, completed with defaults, overridden from
//! `SPARKLINE_*` environment variables and validated before use.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod defaults;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::*;
pub use schema::*;
pub use validation::*;
